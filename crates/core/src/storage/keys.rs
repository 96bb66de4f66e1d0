//! Key generation functions.
//!
//! Pure functions for generating partition and sort keys. All functions are
//! sync and have no side effects.
//!
//! | Record  | Partition key       | Sort key          |
//! |---------|---------------------|-------------------|
//! | Primary | `ENTITY#<entityId>` | variant, canonically `ENTITY#<entityId>` |
//! | Index   | `OWNER#<ownerId>`   | `ENTITY#<entityId>` |

use super::{RecordKey, RepositoryError, Result};

// ============================================================================
// Key prefixes and attribute names
// ============================================================================

pub const ENTITY_PREFIX: &str = "ENTITY#";
pub const OWNER_PREFIX: &str = "OWNER#";
pub const KEY_DELIMITER: char = '#';

pub const PARTITION_KEY_ATTR: &str = "PK";
pub const SORT_KEY_ATTR: &str = "SK";

/// Identifiers end up inside 2 KB partition keys.
const MAX_IDENTIFIER_LEN: usize = 1024;

/// Reject identifiers that would break the key scheme.
///
/// An identifier must be non-empty, bounded in length, free of the key
/// delimiter and free of control characters.
pub fn validate_identifier(kind: &str, id: &str) -> Result<()> {
    if id.trim().is_empty() {
        return Err(RepositoryError::validation(format!("{kind} id is empty")));
    }
    if id.len() > MAX_IDENTIFIER_LEN {
        return Err(RepositoryError::validation(format!(
            "{kind} id exceeds {MAX_IDENTIFIER_LEN} bytes"
        )));
    }
    if id.contains(KEY_DELIMITER) {
        return Err(RepositoryError::validation(format!(
            "{kind} id must not contain '{KEY_DELIMITER}': {id}"
        )));
    }
    if id.chars().any(char::is_control) {
        return Err(RepositoryError::validation(format!(
            "{kind} id contains control characters"
        )));
    }
    Ok(())
}

// ============================================================================
// Primary record keys
// ============================================================================

/// Generate partition key for a primary record.
///
/// Pattern: `ENTITY#<entity_id>`
pub fn entity_pk(entity_id: &str) -> String {
    format!("{ENTITY_PREFIX}{entity_id}")
}

/// Generate the canonical sort key for a primary record.
///
/// Pattern: `ENTITY#<entity_id>` (same as PK). Other sort-key variants may
/// exist in the same partition; readers take the most recent one.
pub fn entity_sk(entity_id: &str) -> String {
    format!("{ENTITY_PREFIX}{entity_id}")
}

pub fn primary_key(entity_id: &str) -> RecordKey {
    RecordKey::new(entity_pk(entity_id), entity_sk(entity_id))
}

/// Recover the entity id from a primary partition key.
pub fn entity_id_from_pk(pk: &str) -> Option<&str> {
    pk.strip_prefix(ENTITY_PREFIX).filter(|id| !id.is_empty())
}

// ============================================================================
// Index record keys
// ============================================================================

/// Generate partition key for an owner's index records.
///
/// Pattern: `OWNER#<owner_id>`
pub fn owner_pk(owner_id: &str) -> String {
    format!("{OWNER_PREFIX}{owner_id}")
}

/// Generate sort key for an index record.
///
/// Pattern: `ENTITY#<entity_id>`
pub fn index_sk(entity_id: &str) -> String {
    format!("{ENTITY_PREFIX}{entity_id}")
}

pub fn index_key(owner_id: &str, entity_id: &str) -> RecordKey {
    RecordKey::new(owner_pk(owner_id), index_sk(entity_id))
}

/// Sort key prefix matching every index record in an owner partition.
pub fn index_sk_prefix() -> &'static str {
    ENTITY_PREFIX
}

/// Recover the entity id from an index sort key.
pub fn entity_id_from_index_sk(sk: &str) -> Option<&str> {
    sk.strip_prefix(ENTITY_PREFIX).filter(|id| !id.is_empty())
}
