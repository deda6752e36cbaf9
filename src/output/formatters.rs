//! Display helpers for timestamps and durations

use std::time::Duration;

use chrono::{DateTime, Local, Utc};

/// Local date/time, e.g. `2025-01-15 14:30`
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

/// Optional timestamp, `-` when absent
pub fn format_optional_timestamp(at: Option<DateTime<Utc>>) -> String {
    at.map(format_timestamp).unwrap_or_else(|| "-".to_string())
}

/// Human-readable duration
///
/// # Example output
/// - `2h 15m` (hours, minutes)
/// - `5m 10s` (minutes, seconds)
/// - `45s` (seconds only)
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let hours = secs / 3600;
    let mins = (secs % 3600) / 60;
    let secs = secs % 60;

    if hours > 0 {
        format!("{}h {}m", hours, mins)
    } else if mins > 0 {
        format!("{}m {}s", mins, secs)
    } else {
        format!("{}s", secs)
    }
}

/// `yes`/`no`
pub fn format_bool(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}
