//! Time arguments as the calendar and task APIs expect them.
//!
//! Callers pass RFC3339 strings. A value without an offset is read as
//! Asia/Shanghai local time, the platform's default zone.

use chrono::{DateTime, FixedOffset, NaiveDateTime};

/// Zone attached to every calendar event.
pub const DEFAULT_TIMEZONE: &str = "Asia/Shanghai";
const DEFAULT_OFFSET_SECS: i32 = 8 * 3600;
/// Task timestamps below this are taken to be seconds, not milliseconds.
const MILLIS_THRESHOLD: i64 = 1_000_000_000_000;

fn parse(value: &str) -> Result<DateTime<FixedOffset>, String> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed);
    }

    let naive = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f"))
        .map_err(|error| format!("`{value}` is not an RFC3339 time: {error}"))?;
    let offset = FixedOffset::east_opt(DEFAULT_OFFSET_SECS)
        .ok_or_else(|| "default offset out of range".to_string())?;
    naive
        .and_local_timezone(offset)
        .single()
        .ok_or_else(|| format!("`{value}` is ambiguous in {DEFAULT_TIMEZONE}"))
}

/// Unix seconds, as calendar events take them.
pub fn unix_seconds(value: &str) -> Result<i64, String> {
    parse(value).map(|parsed| parsed.timestamp())
}

/// Unix milliseconds, as tasks take them. Bare digit strings are accepted and
/// scaled up from seconds when they look like seconds.
pub fn unix_millis(value: &str) -> Result<i64, String> {
    let trimmed = value.trim();
    if !trimmed.is_empty() && trimmed.bytes().all(|byte| byte.is_ascii_digit()) {
        let number: i64 =
            trimmed.parse().map_err(|error| format!("`{trimmed}` is not a timestamp: {error}"))?;
        return Ok(if number < MILLIS_THRESHOLD { number.saturating_mul(1000) } else { number });
    }

    parse(trimmed).map(|parsed| parsed.timestamp_millis())
}
