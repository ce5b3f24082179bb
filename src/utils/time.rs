// src/utils/time.rs
// Timestamp helpers shared by every store

use chrono::{DateTime, Utc};

/// Current time as unix milliseconds, used for `created_at`/`updated_at`
/// bookkeeping columns.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Render a `DateTime<Utc>` as RFC3339 for storage in a TEXT column.
pub fn to_rfc3339(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

/// Parse an RFC3339 string back into a `DateTime<Utc>`.
pub fn from_rfc3339(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
