use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Schema-less bag of domain fields (name, description, status, nested
/// schema/architecture documents, ...). Passed through unmodified.
pub type FieldMap = Map<String, Value>;

pub const FIELD_ID: &str = "id";
pub const FIELD_OWNER_ID: &str = "ownerId";
/// Legacy alias of `ownerId` found on older records.
pub const FIELD_USER_ID: &str = "userId";
pub const FIELD_CREATED_AT: &str = "createdAt";
pub const FIELD_UPDATED_AT: &str = "updatedAt";
pub const FIELD_NAME: &str = "name";
pub const FIELD_DESCRIPTION: &str = "description";
pub const FIELD_STATUS: &str = "status";

/// Fields duplicated into the owner index record.
pub const SUMMARY_FIELDS: [&str; 3] = [FIELD_NAME, FIELD_DESCRIPTION, FIELD_STATUS];

/// Returns true for fields no partial update may ever write.
pub fn is_immutable_field(name: &str) -> bool {
    matches!(
        name,
        FIELD_ID | FIELD_OWNER_ID | FIELD_USER_ID | FIELD_CREATED_AT
    )
}

/// Returns true for fields denormalized into the owner index record.
pub fn is_summary_field(name: &str) -> bool {
    SUMMARY_FIELDS.contains(&name)
}

/// A project (or related) entity as seen by callers of the storage layer.
///
/// Identity and timestamps are typed; every other field lives in `fields`
/// and is opaque to this layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub id: String,
    pub owner_id: String,
    #[serde(flatten)]
    pub fields: FieldMap,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity {
    /// Creates an entity stamped with the same creation and update time.
    pub fn new(
        id: impl Into<String>,
        owner_id: impl Into<String>,
        fields: FieldMap,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            owner_id: owner_id.into(),
            fields,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns a domain field by name.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn name(&self) -> Option<&str> {
        self.str_field(FIELD_NAME)
    }

    pub fn description(&self) -> Option<&str> {
        self.str_field(FIELD_DESCRIPTION)
    }

    pub fn status(&self) -> Option<&str> {
        self.str_field(FIELD_STATUS)
    }

    /// Returns true if `owner_id` may see this entity.
    ///
    /// Legacy records written without an owner are visible to any caller
    /// that asks for them by id.
    pub fn is_owned_by(&self, owner_id: &str) -> bool {
        self.owner_id.is_empty() || self.owner_id == owner_id
    }

    fn str_field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }
}
