//! DynamoDB storage backend implementation.
//!
//! Each collection is a DynamoDB table with a `PK`/`SK` string key schema.
//! Primary and index records may share a table or live in separate ones.

mod client;
mod conversions;
mod error;
mod store;

pub use client::{create_client, DynamoDbConfig};
pub use store::DynamoDbStore;
