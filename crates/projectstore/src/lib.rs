//! Denormalized project storage.
//!
//! Persists entities as a primary record plus an owner index record on a
//! partitioned key-value store, and reads them back by id, by owner, or in
//! batches. [`EntityStore`] implements
//! [`EntityRepository`](projectstore_core::storage::EntityRepository) over
//! any [`RecordStore`](projectstore_core::storage::RecordStore) backend.
//!
//! # Feature Flags
//!
//! - `dynamodb` (default): AWS DynamoDB backend using `aws-sdk-dynamodb`
//! - `inmemory` (default): in-memory backend with fault injection, for tests

pub mod config;
pub mod repository;
pub mod retry;
pub mod storage;

pub use config::{StoreConfig, TableNames};
pub use repository::EntityStore;
pub use retry::RetryPolicy;
