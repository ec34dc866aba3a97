//! Timestamp utilities
//!
//! Watermarks and dedup records are persisted as unix epoch milliseconds;
//! the catalog API speaks ISO-8601.

use crate::{Error, Result};
use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Default monitoring start time: 24 hours before now
pub fn default_start_time() -> DateTime<Utc> {
    now() - Duration::hours(24)
}

/// Parse an ISO-8601 timestamp, with or without an explicit offset.
///
/// Accepts `2025-10-20T00:00:00Z`, `2025-10-20T00:00:00+02:00` and the
/// offset-less `2025-10-20T00:00:00` (interpreted as UTC).
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(Utc.from_utc_datetime(&naive));
    }
    Err(Error::Config(format!(
        "invalid timestamp '{}': use ISO format, e.g. 2025-10-20T00:00:00Z",
        s
    )))
}

/// Convert a timestamp to unix epoch milliseconds for persistence
pub fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

/// Convert persisted unix epoch milliseconds back to a timestamp
///
/// Returns `None` for values outside the representable range.
pub fn from_millis(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}
