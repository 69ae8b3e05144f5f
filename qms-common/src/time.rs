//! Timestamp utilities

use chrono::{DateTime, SecondsFormat, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Current time as RFC 3339 with millisecond precision (`2024-05-01T08:30:00.123Z`)
pub fn now_rfc3339() -> String {
    to_rfc3339(now())
}

/// Format a timestamp the way records and upload descriptors carry it
pub fn to_rfc3339(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Milliseconds since the Unix epoch
pub fn epoch_millis() -> i64 {
    now().timestamp_millis()
}
