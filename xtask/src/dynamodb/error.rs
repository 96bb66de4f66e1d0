//! Error types for DynamoDB operations.

use projectstore_core::storage::RepositoryError;
use thiserror::Error;

/// Result type alias for dynamodb module.
pub type Result<T> = std::result::Result<T, DynamodbError>;

/// Errors that can occur during DynamoDB operations.
#[derive(Error, Debug)]
pub enum DynamodbError {
    #[error("AWS SDK error: {0}")]
    AwsSdk(String),

    #[error("Table '{table_name}' not found")]
    TableNotFound { table_name: String },

    #[error("Table '{table_name}' exists with a key schema other than PK/SK")]
    KeySchemaMismatch { table_name: String },

    #[error("Operation cancelled by user")]
    UserCancelled,

    #[error("Timeout waiting for table '{table_name}' to become active")]
    TableActivationTimeout { table_name: String },

    #[error("No project table is reachable")]
    Unavailable,

    #[error("Store error: {0}")]
    Store(#[from] RepositoryError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Prompt error: {0}")]
    Prompt(#[from] dialoguer::Error),
}
