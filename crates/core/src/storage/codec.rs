//! Record codec.
//!
//! Pure functions converting between raw store records and [`Entity`]. These
//! are testable in isolation without a store.
//!
//! Decoding is total: a malformed record degrades into an entity with filled
//! defaults instead of failing, so one corrupt record never breaks a listing.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::entity::{
    format_timestamp, parse_timestamp, Entity, FieldMap, FIELD_CREATED_AT, FIELD_ID,
    FIELD_OWNER_ID, FIELD_UPDATED_AT, FIELD_USER_ID, SUMMARY_FIELDS,
};

use super::keys::{self, PARTITION_KEY_ATTR, SORT_KEY_ATTR};
use super::Item;

// ============================================================================
// Record attribute names
// ============================================================================

/// Nested attribute holding the entity payload.
pub const DATA_ATTR: &str = "data";
pub const ENTITY_TYPE_ATTR: &str = "entityType";

pub const ENTITY_TYPE_PROJECT: &str = "PROJECT";
pub const ENTITY_TYPE_PROJECT_INDEX: &str = "PROJECT_INDEX";

/// Attributes that only route a record and never belong to the payload.
const ROUTING_ATTRS: [&str; 3] = [PARTITION_KEY_ATTR, SORT_KEY_ATTR, ENTITY_TYPE_ATTR];

/// Attributes managed by this layer rather than the caller.
const MANAGED_FIELDS: [&str; 5] = [
    FIELD_ID,
    FIELD_OWNER_ID,
    FIELD_USER_ID,
    FIELD_CREATED_AT,
    FIELD_UPDATED_AT,
];

// ============================================================================
// Decoding
// ============================================================================

/// Convert a raw record into an entity.
///
/// Reads the nested `data` attribute when present and falls back to the
/// record itself otherwise, so index-shaped and flat legacy records decode
/// with the same function. `fallback_id` fills a missing id. A missing
/// timestamp is taken from its sibling (`createdAt` from `updatedAt` and the
/// other way round), and from `now` if both are missing or unparseable.
pub fn decode(item: &Item, fallback_id: &str, now: DateTime<Utc>) -> Entity {
    let nested = payload(item);
    let data = nested.unwrap_or(item);

    let id = non_empty_str(data, FIELD_ID)
        .unwrap_or(fallback_id)
        .to_string();

    let owner_id = [data, item]
        .into_iter()
        .flat_map(|map| [FIELD_OWNER_ID, FIELD_USER_ID].map(|key| non_empty_str(map, key)))
        .flatten()
        .next()
        .unwrap_or_default()
        .to_string();

    let created = timestamp_of(data, FIELD_CREATED_AT)
        .or_else(|| timestamp_of(item, FIELD_CREATED_AT));
    let updated = [
        timestamp_of(data, FIELD_UPDATED_AT),
        timestamp_of(item, FIELD_UPDATED_AT),
    ]
    .into_iter()
    .flatten()
    .max();

    let (created_at, updated_at) = match (created, updated) {
        (Some(created), Some(updated)) => (created, updated),
        (Some(created), None) => (created, created),
        (None, Some(updated)) => (updated, updated),
        (None, None) => (now, now),
    };

    let fields = data
        .iter()
        .filter(|(key, _)| !MANAGED_FIELDS.contains(&key.as_str()))
        .filter(|(key, _)| nested.is_some() || !ROUTING_ATTRS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    Entity {
        id,
        owner_id,
        fields,
        created_at,
        updated_at,
    }
}

/// Returns the nested payload of a record, if it has one.
pub fn payload(item: &Item) -> Option<&Item> {
    item.get(DATA_ATTR).and_then(Value::as_object)
}

/// Returns true if the record stores its payload under `data`.
pub fn has_data_map(item: &Item) -> bool {
    payload(item).is_some()
}

/// The most recent parseable `updatedAt` of a raw record, used to pick the
/// authoritative record among sort-key variants.
pub fn record_updated_at(item: &Item) -> Option<DateTime<Utc>> {
    let nested = payload(item).and_then(|data| timestamp_of(data, FIELD_UPDATED_AT));
    [nested, timestamp_of(item, FIELD_UPDATED_AT)]
        .into_iter()
        .flatten()
        .max()
}

/// The entity id a record belongs to, read from its payload or its keys.
pub fn record_entity_id(item: &Item) -> Option<String> {
    let from_payload = payload(item)
        .and_then(|data| non_empty_str(data, FIELD_ID))
        .or_else(|| non_empty_str(item, FIELD_ID));
    let from_keys = || {
        let pk = item.get(PARTITION_KEY_ATTR).and_then(Value::as_str)?;
        let sk = item.get(SORT_KEY_ATTR).and_then(Value::as_str)?;
        keys::entity_id_from_pk(pk).or_else(|| keys::entity_id_from_index_sk(sk))
    };
    from_payload.or_else(from_keys).map(str::to_string)
}

// ============================================================================
// Encoding
// ============================================================================

/// The full payload stored under `data` on a primary record.
pub fn entity_payload(entity: &Entity) -> Item {
    let mut data = entity.fields.clone();
    for key in MANAGED_FIELDS {
        data.remove(key);
    }
    data.insert(FIELD_ID.to_string(), Value::String(entity.id.clone()));
    data.insert(
        FIELD_OWNER_ID.to_string(),
        Value::String(entity.owner_id.clone()),
    );
    data.insert(
        FIELD_CREATED_AT.to_string(),
        Value::String(format_timestamp(entity.created_at)),
    );
    data.insert(
        FIELD_UPDATED_AT.to_string(),
        Value::String(format_timestamp(entity.updated_at)),
    );
    data
}

/// Convert an entity into its primary record.
pub fn encode(entity: &Entity) -> Item {
    let mut item = Item::new();
    keys::primary_key(&entity.id).write_into(&mut item);
    item.insert(
        ENTITY_TYPE_ATTR.to_string(),
        Value::String(ENTITY_TYPE_PROJECT.to_string()),
    );
    item.insert(
        FIELD_OWNER_ID.to_string(),
        Value::String(entity.owner_id.clone()),
    );
    item.insert(
        FIELD_CREATED_AT.to_string(),
        Value::String(format_timestamp(entity.created_at)),
    );
    item.insert(
        FIELD_UPDATED_AT.to_string(),
        Value::String(format_timestamp(entity.updated_at)),
    );
    item.insert(
        DATA_ATTR.to_string(),
        Value::Object(entity_payload(entity)),
    );
    item
}

/// The denormalized summary fields present on an entity.
pub fn summary_fields(entity: &Entity) -> FieldMap {
    SUMMARY_FIELDS
        .iter()
        .filter_map(|key| {
            entity
                .fields
                .get(*key)
                .map(|value| (key.to_string(), value.clone()))
        })
        .collect()
}

/// The summary projection stored under `data` on an index record.
pub fn index_projection(entity: &Entity) -> Item {
    let mut data = summary_fields(entity);
    data.insert(FIELD_ID.to_string(), Value::String(entity.id.clone()));
    data.insert(
        FIELD_OWNER_ID.to_string(),
        Value::String(entity.owner_id.clone()),
    );
    data.insert(
        FIELD_CREATED_AT.to_string(),
        Value::String(format_timestamp(entity.created_at)),
    );
    data
}

/// Convert an entity into its owner index record.
pub fn encode_index(entity: &Entity) -> Item {
    let mut item = Item::new();
    keys::index_key(&entity.owner_id, &entity.id).write_into(&mut item);
    item.insert(
        ENTITY_TYPE_ATTR.to_string(),
        Value::String(ENTITY_TYPE_PROJECT_INDEX.to_string()),
    );
    item.insert(
        FIELD_UPDATED_AT.to_string(),
        Value::String(format_timestamp(entity.updated_at)),
    );
    item.insert(
        DATA_ATTR.to_string(),
        Value::Object(index_projection(entity)),
    );
    item
}

// ============================================================================
// Helper functions
// ============================================================================

fn non_empty_str<'a>(map: &'a Item, key: &str) -> Option<&'a str> {
    map.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

fn timestamp_of(map: &Item, key: &str) -> Option<DateTime<Utc>> {
    map.get(key).and_then(parse_timestamp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn as_item(value: Value) -> Item {
        value.as_object().unwrap().clone()
    }

    fn sample_entity() -> Entity {
        let fields = as_item(json!({
            "name": "Shop",
            "description": "Online store",
            "status": "draft",
            "schema": { "tables": [{ "name": "orders", "columns": ["id", "total"] }] },
            "decisions": [{ "title": "Use Postgres", "accepted": true }]
        }));
        Entity {
            id: "p-1".to_string(),
            owner_id: "u1".to_string(),
            fields,
            created_at: ts("2024-01-15T10:30:00Z"),
            updated_at: ts("2024-01-16T08:00:00.250Z"),
        }
    }

    #[test]
    fn test_entity_round_trip() {
        let entity = sample_entity();
        let decoded = decode(&encode(&entity), "ignored", ts("2030-01-01T00:00:00Z"));
        assert_eq!(decoded, entity);
    }

    #[test]
    fn test_encode_layout() {
        let item = encode(&sample_entity());

        assert_eq!(item["PK"], "ENTITY#p-1");
        assert_eq!(item["SK"], "ENTITY#p-1");
        assert_eq!(item["entityType"], "PROJECT");
        assert_eq!(item["ownerId"], "u1");
        assert_eq!(item["updatedAt"], "2024-01-16T08:00:00.250Z");
        assert_eq!(item["data"]["name"], "Shop");
        assert_eq!(item["data"]["id"], "p-1");
        assert_eq!(item["data"]["schema"]["tables"][0]["name"], "orders");
        assert!(item.get("name").is_none());
    }

    #[test]
    fn test_encode_ignores_managed_keys_in_fields() {
        let mut entity = sample_entity();
        entity
            .fields
            .insert("ownerId".to_string(), json!("someone-else"));
        entity.fields.insert("id".to_string(), json!("other"));

        let item = encode(&entity);
        assert_eq!(item["data"]["ownerId"], "u1");
        assert_eq!(item["data"]["id"], "p-1");
    }

    #[test]
    fn test_encode_index_layout() {
        let item = encode_index(&sample_entity());

        assert_eq!(item["PK"], "OWNER#u1");
        assert_eq!(item["SK"], "ENTITY#p-1");
        assert_eq!(item["entityType"], "PROJECT_INDEX");
        assert_eq!(item["updatedAt"], "2024-01-16T08:00:00.250Z");
        assert_eq!(
            Value::Object(item["data"].as_object().unwrap().clone()),
            json!({
                "id": "p-1",
                "ownerId": "u1",
                "name": "Shop",
                "description": "Online store",
                "status": "draft",
                "createdAt": "2024-01-15T10:30:00.000Z"
            })
        );
    }

    #[test]
    fn test_decode_index_record_uses_top_level_updated_at() {
        let entity = sample_entity();
        let decoded = decode(&encode_index(&entity), "p-1", ts("2030-01-01T00:00:00Z"));

        assert_eq!(decoded.id, "p-1");
        assert_eq!(decoded.owner_id, "u1");
        assert_eq!(decoded.name(), Some("Shop"));
        assert_eq!(decoded.created_at, entity.created_at);
        assert_eq!(decoded.updated_at, entity.updated_at);
        assert!(decoded.field("schema").is_none());
    }

    #[test]
    fn test_decode_flat_legacy_record() {
        let item = as_item(json!({
            "PK": "ENTITY#p-9",
            "SK": "CHAT#2024-01-01",
            "entityType": "PROJECT",
            "userId": "u7",
            "name": "Legacy",
            "createdAt": "2024-01-01T00:00:00Z",
            "updatedAt": "2024-01-02T00:00:00Z"
        }));

        let decoded = decode(&item, "p-9", ts("2030-01-01T00:00:00Z"));

        assert_eq!(decoded.id, "p-9");
        assert_eq!(decoded.owner_id, "u7");
        assert_eq!(decoded.name(), Some("Legacy"));
        assert_eq!(decoded.fields.len(), 1);
        assert_eq!(decoded.updated_at, ts("2024-01-02T00:00:00Z"));
    }

    #[test]
    fn test_decode_fills_missing_fields() {
        let now = ts("2030-01-01T00:00:00Z");
        let decoded = decode(&Item::new(), "p-404", now);

        assert_eq!(decoded.id, "p-404");
        assert_eq!(decoded.owner_id, "");
        assert_eq!(decoded.created_at, now);
        assert_eq!(decoded.updated_at, now);
        assert!(decoded.fields.is_empty());
    }

    #[test]
    fn test_decode_replaces_unparseable_timestamps() {
        let now = ts("2030-01-01T00:00:00Z");
        let item = as_item(json!({
            "data": { "id": "p-1", "createdAt": "not a date", "updatedAt": 42.5 }
        }));

        let decoded = decode(&item, "p-1", now);

        assert_eq!(decoded.created_at, now);
        assert_eq!(decoded.updated_at, now);
    }

    #[test]
    fn test_decode_borrows_sibling_timestamp() {
        let item = as_item(json!({
            "data": { "id": "p-1", "updatedAt": "2024-03-01T00:00:00Z" }
        }));

        let decoded = decode(&item, "p-1", ts("2030-01-01T00:00:00Z"));

        assert_eq!(decoded.created_at, ts("2024-03-01T00:00:00Z"));
        assert_eq!(decoded.updated_at, ts("2024-03-01T00:00:00Z"));
    }

    #[test]
    fn test_decode_tolerates_non_object_data() {
        let item = as_item(json!({
            "PK": "ENTITY#p-1",
            "SK": "ENTITY#p-1",
            "data": "corrupted"
        }));

        let decoded = decode(&item, "p-1", ts("2030-01-01T00:00:00Z"));

        assert_eq!(decoded.id, "p-1");
        assert_eq!(decoded.field("data"), Some(&json!("corrupted")));
        assert!(decoded.field("PK").is_none());
    }

    #[test]
    fn test_decode_prefers_latest_updated_at() {
        let item = as_item(json!({
            "updatedAt": "2024-05-01T00:00:00Z",
            "data": { "id": "p-1", "updatedAt": "2024-04-01T00:00:00Z" }
        }));

        assert_eq!(
            record_updated_at(&item),
            Some(ts("2024-05-01T00:00:00Z"))
        );
        assert_eq!(
            decode(&item, "p-1", ts("2030-01-01T00:00:00Z")).updated_at,
            ts("2024-05-01T00:00:00Z")
        );
    }

    #[test]
    fn test_record_entity_id() {
        let entity = sample_entity();
        assert_eq!(record_entity_id(&encode(&entity)).as_deref(), Some("p-1"));
        assert_eq!(
            record_entity_id(&encode_index(&entity)).as_deref(),
            Some("p-1")
        );

        let keys_only = as_item(json!({ "PK": "OWNER#u1", "SK": "ENTITY#p-3" }));
        assert_eq!(record_entity_id(&keys_only).as_deref(), Some("p-3"));
        assert_eq!(record_entity_id(&Item::new()), None);
    }

    #[test]
    fn test_summary_fields_skip_absent() {
        let mut entity = sample_entity();
        entity.fields.remove("description");

        let summary = summary_fields(&entity);
        assert_eq!(summary.len(), 2);
        assert!(summary.contains_key("name"));
        assert!(summary.contains_key("status"));
    }
}
