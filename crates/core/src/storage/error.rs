use thiserror::Error;

/// Errors that can occur during repository operations.
///
/// Absence is not an error on read paths: lookups return `Ok(None)`.
/// `NotFound` is reserved for writes that target something missing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("{entity_type} not found: {id}")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },
    #[error("{entity_type} already exists: {id}")]
    AlreadyExists {
        entity_type: &'static str,
        id: String,
    },
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Transient store error: {0}")]
    Transient(String),
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Query failed: {0}")]
    QueryFailed(String),
    #[error("Codec error: {0}")]
    Codec(String),
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

impl RepositoryError {
    /// Returns true if retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::ConnectionFailed(_))
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

/// Result type for repository operations.
pub type Result<T> = std::result::Result<T, RepositoryError>;
