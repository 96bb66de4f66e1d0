//! In-memory storage backend for testing.
//!
//! Records live in ordered maps wrapped in `Arc<RwLock<_>>`, one map per
//! collection. Failures can be injected per operation and collection to
//! exercise partial-write and retry paths.
//!
//! # Example
//!
//! ```rust,ignore
//! use projectstore::storage::inmemory::{InMemoryStore, StoreOperation};
//!
//! let store = InMemoryStore::new();
//! store
//!     .fail_next(StoreOperation::Put, "user_projects", 1, RepositoryError::Transient("boom".into()))
//!     .await;
//! ```

mod store;

pub use store::{InMemoryStore, StoreOperation};
