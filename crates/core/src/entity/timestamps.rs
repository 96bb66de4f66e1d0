//! ISO-8601 timestamp helpers.
//!
//! Timestamps are stored as RFC 3339 strings with millisecond precision, so
//! every value produced here is truncated to milliseconds first. That keeps
//! an entity equal to itself after a round trip through the store.

use chrono::{DateTime, Datelike, Duration, NaiveDateTime, SecondsFormat, Utc};
use serde_json::Value;

/// Largest year a stored timestamp may carry.
const MAX_YEAR: i32 = 9999;

/// Drops sub-millisecond precision.
pub fn truncate_to_millis(dt: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(dt.timestamp_millis()).unwrap_or(dt)
}

/// Format a timestamp for storage (`2024-01-15T10:30:00.000Z`).
pub fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a stored timestamp.
///
/// Accepts RFC 3339 strings, naive ISO-8601 strings (assumed UTC) and epoch
/// milliseconds. Returns `None` for anything else, including instants past
/// year 9999 that [`format_timestamp`] cannot write back.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    let parsed = match value {
        Value::String(s) => {
            let s = s.trim();
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
                .or_else(|| {
                    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
                        .ok()
                        .map(|naive| naive.and_utc())
                })
                .map(truncate_to_millis)
        }
        Value::Number(n) => n
            .as_i64()
            .and_then(DateTime::from_timestamp_millis)
            .map(truncate_to_millis),
        _ => None,
    };
    parsed.filter(|dt| (0..=MAX_YEAR).contains(&dt.year()))
}

/// Compute the `updatedAt` for a write following one stamped `previous`.
///
/// Always strictly later than `previous`, even if the clock went backwards or
/// two writes land within the same millisecond.
pub fn next_updated_at(now: DateTime<Utc>, previous: DateTime<Utc>) -> DateTime<Utc> {
    let now = truncate_to_millis(now);
    if now > previous {
        now
    } else {
        previous
            .checked_add_signed(Duration::milliseconds(1))
            .unwrap_or(now)
    }
}
