//! DynamoDB attribute conversion functions.
//!
//! Pure functions converting between DynamoDB `AttributeValue` maps and the
//! JSON-shaped records used by the repository. These are testable in
//! isolation without DynamoDB access.

use std::collections::HashMap;

use aws_sdk_dynamodb::types::AttributeValue;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{Number, Value};

use projectstore_core::storage::keys::{PARTITION_KEY_ATTR, SORT_KEY_ATTR};
use projectstore_core::storage::{Item, RecordKey};

pub type Attributes = HashMap<String, AttributeValue>;

// ============================================================================
// JSON to DynamoDB
// ============================================================================

pub fn to_attribute_value(value: &Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null(true),
        Value::Bool(b) => AttributeValue::Bool(*b),
        Value::Number(n) => AttributeValue::N(n.to_string()),
        Value::String(s) => AttributeValue::S(s.clone()),
        Value::Array(values) => AttributeValue::L(values.iter().map(to_attribute_value).collect()),
        Value::Object(map) => AttributeValue::M(
            map.iter()
                .map(|(k, v)| (k.clone(), to_attribute_value(v)))
                .collect(),
        ),
    }
}

/// Convert a record into a DynamoDB item.
pub fn item_to_attributes(item: &Item) -> Attributes {
    item.iter()
        .map(|(k, v)| (k.clone(), to_attribute_value(v)))
        .collect()
}

pub fn key_to_attributes(key: &RecordKey) -> Attributes {
    HashMap::from([
        (
            PARTITION_KEY_ATTR.to_string(),
            AttributeValue::S(key.partition_key.clone()),
        ),
        (
            SORT_KEY_ATTR.to_string(),
            AttributeValue::S(key.sort_key.clone()),
        ),
    ])
}

// ============================================================================
// DynamoDB to JSON
// ============================================================================

/// Convert an attribute value to JSON.
///
/// Never fails: binary values become base64 strings, sets become arrays and
/// numbers that do not fit a JSON number are kept as their string form.
pub fn from_attribute_value(value: &AttributeValue) -> Value {
    match value {
        AttributeValue::S(s) => Value::String(s.clone()),
        AttributeValue::N(n) => parse_number(n),
        AttributeValue::Bool(b) => Value::Bool(*b),
        AttributeValue::Null(_) => Value::Null,
        AttributeValue::L(values) => {
            Value::Array(values.iter().map(from_attribute_value).collect())
        }
        AttributeValue::M(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), from_attribute_value(v)))
                .collect(),
        ),
        AttributeValue::Ss(values) => {
            Value::Array(values.iter().cloned().map(Value::String).collect())
        }
        AttributeValue::Ns(values) => Value::Array(values.iter().map(|n| parse_number(n)).collect()),
        AttributeValue::B(blob) => Value::String(STANDARD.encode(blob.as_ref())),
        AttributeValue::Bs(blobs) => Value::Array(
            blobs
                .iter()
                .map(|blob| Value::String(STANDARD.encode(blob.as_ref())))
                .collect(),
        ),
        other => {
            tracing::warn!(attribute = ?other, "Unknown DynamoDB attribute type, reading as null");
            Value::Null
        }
    }
}

/// Convert a DynamoDB item into a record.
pub fn attributes_to_item(attributes: &Attributes) -> Item {
    attributes
        .iter()
        .map(|(k, v)| (k.clone(), from_attribute_value(v)))
        .collect()
}

/// Read the `PK`/`SK` pair of a DynamoDB key map.
pub fn attributes_to_key(attributes: &Attributes) -> Option<RecordKey> {
    let pk = attributes.get(PARTITION_KEY_ATTR)?.as_s().ok()?;
    let sk = attributes.get(SORT_KEY_ATTR)?.as_s().ok()?;
    Some(RecordKey::new(pk.as_str(), sk.as_str()))
}

fn parse_number(n: &str) -> Value {
    if let Ok(i) = n.parse::<i64>() {
        return Value::from(i);
    }
    if let Ok(u) = n.parse::<u64>() {
        return Value::from(u);
    }
    n.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(n.to_string()))
}
