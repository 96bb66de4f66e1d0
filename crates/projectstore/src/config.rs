use std::{env, time::Duration};

use projectstore_core::storage::MAX_PAGE_SIZE;

use crate::retry::RetryPolicy;

/// Names of the collections holding primary and index records.
///
/// Both may point at the same table (single-table design).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNames {
    /// Primary records (`ENTITY#<id>` partitions).
    pub entities: String,
    /// Owner index records (`OWNER#<owner>` partitions).
    pub index: String,
}

impl TableNames {
    pub fn new(entities: impl Into<String>, index: impl Into<String>) -> Self {
        Self {
            entities: entities.into(),
            index: index.into(),
        }
    }

    /// Every distinct collection, in configuration order.
    pub fn collections(&self) -> Vec<&str> {
        let mut collections = vec![self.entities.as_str()];
        if self.index != self.entities {
            collections.push(self.index.as_str());
        }
        collections
    }
}

/// Storage layer configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub tables: TableNames,
    pub retry: RetryPolicy,
    /// Chunks of a batch read issued in parallel (default: 4)
    pub batch_concurrency: usize,
    /// Page size used when the caller gives no limit (default: 50)
    pub default_page_size: u32,
    /// Write both records of a new entity in one transaction when the
    /// store supports it (default: false)
    pub atomic_create: bool,
}

impl StoreConfig {
    pub fn new(tables: TableNames) -> Self {
        Self {
            tables,
            retry: RetryPolicy::default(),
            batch_concurrency: 4,
            default_page_size: 50,
            atomic_create: false,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `DYNAMODB_ENTITY_TABLE` - Primary record table (default: "projects")
    /// - `DYNAMODB_INDEX_TABLE` - Owner index table (default: "user_projects")
    /// - `STORE_RETRY_MAX_ATTEMPTS` - Attempts per idempotent call (default: 3)
    /// - `STORE_RETRY_BASE_DELAY_MS` - First backoff delay (default: 50)
    /// - `STORE_REQUEST_TIMEOUT_MS` - Per-attempt timeout (default: 5000)
    /// - `STORE_BATCH_CONCURRENCY` - Parallel batch chunks (default: 4)
    /// - `STORE_PAGE_SIZE` - Default listing page size, capped at 100 (default: 50)
    /// - `STORE_ATOMIC_CREATE` - Transactional create (default: false)
    pub fn from_env() -> Self {
        let tables = TableNames::new(
            env::var("DYNAMODB_ENTITY_TABLE").unwrap_or_else(|_| "projects".to_string()),
            env::var("DYNAMODB_INDEX_TABLE").unwrap_or_else(|_| "user_projects".to_string()),
        );

        let defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            max_attempts: parse_var("STORE_RETRY_MAX_ATTEMPTS")
                .unwrap_or(defaults.max_attempts)
                .max(1),
            base_delay: parse_var("STORE_RETRY_BASE_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.base_delay),
            request_timeout: parse_var("STORE_REQUEST_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.request_timeout),
            ..defaults
        };

        Self {
            tables,
            retry,
            batch_concurrency: parse_var("STORE_BATCH_CONCURRENCY").unwrap_or(4).max(1),
            default_page_size: parse_var("STORE_PAGE_SIZE")
                .unwrap_or(50)
                .clamp(1, MAX_PAGE_SIZE),
            atomic_create: env::var("STORE_ATOMIC_CREATE")
                .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
        }
    }

    /// Resolve the page size for a listing request.
    pub fn page_size(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(self.default_page_size)
            .clamp(1, MAX_PAGE_SIZE)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collections_dedupes_single_table() {
        let split = TableNames::new("projects", "user_projects");
        assert_eq!(split.collections(), vec!["projects", "user_projects"]);

        let single = TableNames::new("projectstore", "projectstore");
        assert_eq!(single.collections(), vec!["projectstore"]);
    }

    #[test]
    fn test_page_size_is_capped() {
        let config = StoreConfig::new(TableNames::new("p", "i"));

        assert_eq!(config.page_size(None), 50);
        assert_eq!(config.page_size(Some(10)), 10);
        assert_eq!(config.page_size(Some(0)), 1);
        assert_eq!(config.page_size(Some(5_000)), MAX_PAGE_SIZE);
    }

    #[test]
    fn test_default_values() {
        // Clear environment variables to test defaults
        env::remove_var("DYNAMODB_ENTITY_TABLE");
        env::remove_var("DYNAMODB_INDEX_TABLE");
        env::remove_var("STORE_RETRY_MAX_ATTEMPTS");
        env::remove_var("STORE_RETRY_BASE_DELAY_MS");
        env::remove_var("STORE_REQUEST_TIMEOUT_MS");
        env::remove_var("STORE_BATCH_CONCURRENCY");
        env::remove_var("STORE_PAGE_SIZE");
        env::remove_var("STORE_ATOMIC_CREATE");

        let config = StoreConfig::from_env();

        assert_eq!(config.tables, TableNames::new("projects", "user_projects"));
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.base_delay, Duration::from_millis(50));
        assert_eq!(config.retry.request_timeout, Duration::from_millis(5_000));
        assert_eq!(config.batch_concurrency, 4);
        assert_eq!(config.default_page_size, 50);
        assert!(!config.atomic_create);
    }
}
