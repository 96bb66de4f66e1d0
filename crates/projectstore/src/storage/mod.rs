//! Storage backend implementations.
//!
//! This module provides concrete implementations of the
//! [`RecordStore`](projectstore_core::storage::RecordStore) trait. Backends
//! are selected at compile time via feature flags.
//!
//! # Feature Flags
//!
//! - `dynamodb`: AWS DynamoDB backend using `aws-sdk-dynamodb`
//! - `inmemory`: in-memory backend with failure injection, for tests
//!
//! Build without DynamoDB:
//! ```bash
//! cargo build -p projectstore --no-default-features --features inmemory
//! ```

#[cfg(feature = "inmemory")]
pub mod inmemory;

#[cfg(feature = "dynamodb")]
pub mod dynamodb;

#[cfg(feature = "inmemory")]
pub use inmemory::{InMemoryStore, StoreOperation};

#[cfg(feature = "dynamodb")]
pub use dynamodb::DynamoDbStore;
