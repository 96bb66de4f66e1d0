//! Continuation tokens.
//!
//! A token is the store's last evaluated key, serialized as JSON and
//! encoded with URL-safe base64 so callers can pass it around verbatim.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use super::{RecordKey, RepositoryError, Result};

/// Encode the last evaluated key of a page.
pub fn encode_continuation_token(key: &RecordKey) -> Result<String> {
    let json = serde_json::to_vec(key)
        .map_err(|e| RepositoryError::Codec(format!("Failed to encode token: {}", e)))?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

/// Decode a token and check that it belongs to `expected_partition`.
///
/// A token minted for another partition (another owner's listing) is a
/// validation error rather than a silent jump into foreign data.
pub fn decode_continuation_token(token: &str, expected_partition: &str) -> Result<RecordKey> {
    let bytes = URL_SAFE_NO_PAD
        .decode(token.trim())
        .map_err(|_| RepositoryError::validation("continuation token is not valid base64"))?;
    let key: RecordKey = serde_json::from_slice(&bytes)
        .map_err(|_| RepositoryError::validation("continuation token is malformed"))?;

    if key.partition_key != expected_partition {
        return Err(RepositoryError::validation(
            "continuation token belongs to a different listing",
        ));
    }
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_round_trip() {
        let key = RecordKey::new("OWNER#u1", "ENTITY#p-1");
        let token = encode_continuation_token(&key).unwrap();

        assert!(!token.contains('='));
        assert!(!token.contains('+'));
        assert_eq!(decode_continuation_token(&token, "OWNER#u1").unwrap(), key);
    }

    #[test]
    fn test_token_for_other_partition_is_rejected() {
        let token = encode_continuation_token(&RecordKey::new("OWNER#u2", "ENTITY#p-9")).unwrap();

        let err = decode_continuation_token(&token, "OWNER#u1").unwrap_err();
        assert!(matches!(err, RepositoryError::Validation(_)));
    }

    #[test]
    fn test_garbage_token_is_rejected() {
        assert!(matches!(
            decode_continuation_token("%%%", "OWNER#u1"),
            Err(RepositoryError::Validation(_))
        ));

        let not_a_key = URL_SAFE_NO_PAD.encode(b"{\"cursor\":1}");
        assert!(matches!(
            decode_continuation_token(&not_a_key, "OWNER#u1"),
            Err(RepositoryError::Validation(_))
        ));
    }
}
