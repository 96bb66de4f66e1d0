//! Partial-update expressions.
//!
//! Translates a [`FieldUpdate`] into a `SET` expression plus the attribute
//! name and value tables that go with it. Field names that are reserved
//! words (or not plain identifiers) are referenced through `#` aliases.
//! Pure: the same update always yields the same expression.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::entity::{is_immutable_field, FieldMap};

use super::codec::DATA_ATTR;
use super::keys::{PARTITION_KEY_ATTR, SORT_KEY_ATTR};
use super::reserved_words::is_reserved_word;
use super::{RepositoryError, Result};

/// A partial update of a single record.
///
/// Identity fields (`id`, `ownerId`, `userId`), `createdAt` and the key
/// attributes are never written, whatever the maps contain.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldUpdate {
    /// Fields set inside the nested `data` attribute.
    pub data: FieldMap,
    /// Top-level attributes set alongside.
    pub attributes: FieldMap,
    /// Fail with `NotFound` rather than creating a partial record.
    pub require_existing: bool,
}

impl FieldUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_data(mut self, name: impl Into<String>, value: Value) -> Self {
        self.data.insert(name.into(), value);
        self
    }

    pub fn set_attribute(mut self, name: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    pub fn require_existing(mut self) -> Self {
        self.require_existing = true;
        self
    }

    /// Nested fields that will actually be written.
    pub fn writable_data(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.data
            .iter()
            .filter(|(name, _)| !is_immutable_field(name))
    }

    /// Top-level attributes that will actually be written.
    pub fn writable_attributes(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.attributes.iter().filter(|(name, _)| {
            !is_immutable_field(name)
                && name.as_str() != PARTITION_KEY_ATTR
                && name.as_str() != SORT_KEY_ATTR
        })
    }
}

/// A rendered update expression.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UpdateExpression {
    /// e.g. `SET #data.#status = :v0, updatedAt = :v1`
    pub expression: String,
    /// Alias (`#status`) to attribute name (`status`).
    pub names: BTreeMap<String, String>,
    /// Placeholder (`:v0`) to value.
    pub values: BTreeMap<String, Value>,
}

/// Build the `SET` expression for an update.
pub fn build_update_expression(update: &FieldUpdate) -> Result<UpdateExpression> {
    let mut aliases = AliasTable::default();
    let mut clauses = Vec::new();

    let data: Vec<_> = update.writable_data().collect();
    if !data.is_empty() {
        let data_ref = aliases.name_ref(DATA_ATTR)?;
        for (name, value) in data {
            let path = format!("{data_ref}.{}", aliases.name_ref(name)?);
            clauses.push(format!("{path} = {}", aliases.value_ref(value)));
        }
    }

    for (name, value) in update.writable_attributes() {
        let path = aliases.name_ref(name)?;
        clauses.push(format!("{path} = {}", aliases.value_ref(value)));
    }

    if clauses.is_empty() {
        return Err(RepositoryError::validation(
            "update does not set any writable field",
        ));
    }

    Ok(UpdateExpression {
        expression: format!("SET {}", clauses.join(", ")),
        names: aliases.names,
        values: aliases.values,
    })
}

#[derive(Default)]
struct AliasTable {
    names: BTreeMap<String, String>,
    values: BTreeMap<String, Value>,
    generated: usize,
}

impl AliasTable {
    fn name_ref(&mut self, name: &str) -> Result<String> {
        if name.is_empty() {
            return Err(RepositoryError::validation("field names must not be empty"));
        }
        if is_plain_identifier(name) && !is_reserved_word(name) {
            return Ok(name.to_string());
        }
        if let Some((alias, _)) = self.names.iter().find(|(_, existing)| *existing == name) {
            return Ok(alias.clone());
        }

        let alias = if is_plain_identifier(name) {
            format!("#{name}")
        } else {
            self.generated += 1;
            format!("#attr{}", self.generated - 1)
        };
        self.names.insert(alias.clone(), name.to_string());
        Ok(alias)
    }

    fn value_ref(&mut self, value: &Value) -> String {
        let placeholder = format!(":v{}", self.values.len());
        self.values.insert(placeholder.clone(), value.clone());
        placeholder
    }
}

/// Names usable literally in an expression: an ASCII letter followed by
/// ASCII letters and digits.
fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric())
}
