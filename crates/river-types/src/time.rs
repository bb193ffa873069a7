//! Minute-precision time helpers.
//!
//! The upstream tracker's JQL timestamp filtering only has minute
//! resolution, so the incremental watermark and the pagination decisions
//! all work on minute-truncated instants.

use chrono::{DateTime, Duration, DurationRound, SecondsFormat, Utc};

/// Truncate an instant down to the start of its minute.
pub fn truncate_to_minute(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt.duration_trunc(Duration::minutes(1)).unwrap_or(dt)
}

/// Parse an ISO-8601 timestamp as produced by the tracker REST API.
///
/// Accepts both RFC 3339 offsets (`+00:00`, `Z`) and the compact
/// `+0000` form JIRA emits. Returns `None` on malformed input.
pub fn parse_iso_datetime(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .or_else(|| DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f%z").ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parse an ISO-8601 timestamp and truncate it to minute precision.
pub fn parse_iso_datetime_minute_precise(value: &str) -> Option<DateTime<Utc>> {
    parse_iso_datetime(value).map(truncate_to_minute)
}

/// Format an instant as an ISO-8601 string with second precision.
pub fn format_iso_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}
