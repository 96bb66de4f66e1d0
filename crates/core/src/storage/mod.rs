//! Storage vocabulary shared by the repository and its backends.

pub mod codec;
mod error;
pub mod keys;
mod reserved_words;
mod token;
mod traits;
mod types;
mod update_expression;

pub use error::{RepositoryError, Result};
pub use reserved_words::is_reserved_word;
pub use token::{decode_continuation_token, encode_continuation_token};
pub use traits::{EntityRepository, RecordStore};
pub use types::{
    ConditionalPut, HealthReport, Item, Page, PageRequest, PrefixQuery, PutCondition, QueryPage,
    RecordKey, WriteOutcome, WriteWarning, MAX_BATCH_GET_KEYS, MAX_PAGE_SIZE,
};
pub use update_expression::{build_update_expression, FieldUpdate, UpdateExpression};
