use chrono::{DateTime, NaiveDateTime, Utc};

/// Parse a recorded timestamp.
///
/// Accepts RFC 3339 (`Z` or `±hh:mm`) and offset-less ISO 8601, which is
/// taken to be UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Seconds between `start` and `end` (or `now` when `end` is absent or blank).
///
/// `None` if either recorded timestamp does not parse.
pub fn elapsed_seconds(start: &str, end: Option<&str>, now: DateTime<Utc>) -> Option<f64> {
    let start = parse_timestamp(start)?;
    let end = match end.filter(|e| !e.trim().is_empty()) {
        Some(e) => parse_timestamp(e)?,
        None => now,
    };
    Some((end - start).num_milliseconds() as f64 / 1000.0)
}

/// Human-readable duration: `42s`, `3m 07s`, `2h 05m`. Negative or absent is `-`.
pub fn format_duration(seconds: Option<f64>) -> String {
    let Some(seconds) = seconds.filter(|s| *s >= 0.0) else {
        return "-".to_string();
    };
    let seconds = seconds as u64;
    if seconds < 60 {
        return format!("{seconds}s");
    }
    let (minutes, secs) = (seconds / 60, seconds % 60);
    if minutes < 60 {
        return format!("{minutes}m {secs:02}s");
    }
    let (hours, minutes) = (minutes / 60, minutes % 60);
    format!("{hours}h {minutes:02}m")
}
