mod timestamps;
mod types;

pub use timestamps::{format_timestamp, next_updated_at, parse_timestamp, truncate_to_millis};
pub use types::{
    is_immutable_field, is_summary_field, Entity, FieldMap, FIELD_CREATED_AT, FIELD_DESCRIPTION,
    FIELD_ID, FIELD_NAME, FIELD_OWNER_ID, FIELD_STATUS, FIELD_UPDATED_AT, FIELD_USER_ID,
    SUMMARY_FIELDS,
};
