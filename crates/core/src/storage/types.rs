use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::keys::{PARTITION_KEY_ATTR, SORT_KEY_ATTR};

/// Largest number of keys a single batch read may carry.
pub const MAX_BATCH_GET_KEYS: usize = 100;

/// Largest page `list_entities_by_owner` will request from the store.
pub const MAX_PAGE_SIZE: u32 = 100;

/// A raw store record in vendor-neutral form.
pub type Item = Map<String, Value>;

/// The `(partition key, sort key)` address of a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordKey {
    #[serde(rename = "pk")]
    pub partition_key: String,
    #[serde(rename = "sk")]
    pub sort_key: String,
}

impl RecordKey {
    pub fn new(partition_key: impl Into<String>, sort_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            sort_key: sort_key.into(),
        }
    }

    /// Read the key attributes of a raw record.
    pub fn from_item(item: &Item) -> Option<Self> {
        let pk = item.get(PARTITION_KEY_ATTR)?.as_str()?;
        let sk = item.get(SORT_KEY_ATTR)?.as_str()?;
        Some(Self::new(pk, sk))
    }

    /// Write the key attributes into a raw record.
    pub fn write_into(&self, item: &mut Item) {
        item.insert(
            PARTITION_KEY_ATTR.to_string(),
            Value::String(self.partition_key.clone()),
        );
        item.insert(
            SORT_KEY_ATTR.to_string(),
            Value::String(self.sort_key.clone()),
        );
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.partition_key, self.sort_key)
    }
}

/// Precondition attached to a put.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PutCondition {
    /// Overwrite whatever is stored at the key.
    #[default]
    Overwrite,
    /// Fail with `AlreadyExists` if a record is stored at the key.
    MustNotExist,
}

/// One put inside a transactional batch.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionalPut {
    pub collection: String,
    pub item: Item,
    pub condition: PutCondition,
}

/// All records sharing a partition key, optionally narrowed by sort-key prefix.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PrefixQuery {
    pub partition_key: String,
    pub sort_key_prefix: Option<String>,
    pub limit: Option<u32>,
    /// Resume after this key (exclusive).
    pub exclusive_start_key: Option<RecordKey>,
}

impl PrefixQuery {
    pub fn partition(partition_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            ..Default::default()
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.sort_key_prefix = Some(prefix.into());
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn starting_after(mut self, key: Option<RecordKey>) -> Self {
        self.exclusive_start_key = key;
        self
    }
}

/// One page of a prefix query.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryPage {
    pub items: Vec<Item>,
    /// Present when the store may hold more matching records.
    pub last_key: Option<RecordKey>,
}

/// Pagination input for owner listings.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PageRequest {
    pub limit: Option<u32>,
    pub continuation_token: Option<String>,
}

impl PageRequest {
    pub fn first(limit: u32) -> Self {
        Self {
            limit: Some(limit),
            continuation_token: None,
        }
    }

    pub fn after(limit: u32, token: impl Into<String>) -> Self {
        Self {
            limit: Some(limit),
            continuation_token: Some(token.into()),
        }
    }
}

/// A page of results plus the token to fetch the next one.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_token: Option<String>,
}

/// A secondary write that failed after the primary write succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WriteWarning {
    /// The owner index record could not be written on create.
    IndexWriteFailed { entity_id: String, reason: String },
    /// The denormalized fields of the owner index record were not refreshed.
    IndexRepairFailed { entity_id: String, reason: String },
    /// One physical record of the entity could not be deleted.
    DeleteIncomplete { key: String, reason: String },
}

/// Result of a successful write, with any partial-write warnings attached.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteOutcome<T> {
    pub value: T,
    pub warnings: Vec<WriteWarning>,
}

impl<T> WriteOutcome<T> {
    pub fn clean(value: T) -> Self {
        Self {
            value,
            warnings: Vec::new(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn into_inner(self) -> T {
        self.value
    }
}

/// Availability of every record collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    /// True if at least one collection answered.
    pub available: bool,
    pub per_collection: BTreeMap<String, bool>,
}

impl HealthReport {
    pub fn from_collections(per_collection: BTreeMap<String, bool>) -> Self {
        Self {
            available: per_collection.values().any(|ok| *ok),
            per_collection,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_key_item_round_trip() {
        let key = RecordKey::new("ENTITY#p-1", "ENTITY#p-1");
        let mut item = Item::new();
        key.write_into(&mut item);

        assert_eq!(item.get("PK").unwrap(), "ENTITY#p-1");
        assert_eq!(RecordKey::from_item(&item), Some(key));
    }

    #[test]
    fn test_record_key_from_item_requires_both_keys() {
        let mut item = Item::new();
        item.insert("PK".to_string(), Value::String("OWNER#u1".to_string()));
        assert_eq!(RecordKey::from_item(&item), None);
    }

    #[test]
    fn test_record_key_ordering_groups_partitions() {
        let a = RecordKey::new("OWNER#u1", "ENTITY#b");
        let b = RecordKey::new("OWNER#u1", "ENTITY#a");
        let c = RecordKey::new("OWNER#u0", "ENTITY#z");

        let mut keys = vec![a.clone(), b.clone(), c.clone()];
        keys.sort();
        assert_eq!(keys, vec![c, b, a]);
    }

    #[test]
    fn test_health_report_available_if_any_collection_answers() {
        let mut collections = BTreeMap::new();
        collections.insert("projects".to_string(), false);
        collections.insert("user_projects".to_string(), true);
        assert!(HealthReport::from_collections(collections.clone()).available);

        collections.insert("user_projects".to_string(), false);
        assert!(!HealthReport::from_collections(collections).available);
    }

    #[test]
    fn test_health_report_empty_is_unavailable() {
        assert!(!HealthReport::from_collections(BTreeMap::new()).available);
    }

    #[test]
    fn test_write_outcome() {
        let mut outcome = WriteOutcome::clean(7);
        assert!(outcome.is_clean());

        outcome.warnings.push(WriteWarning::IndexRepairFailed {
            entity_id: "p-1".to_string(),
            reason: "throttled".to_string(),
        });
        assert!(!outcome.is_clean());
        assert_eq!(outcome.into_inner(), 7);
    }
}
