use crate::date::CivilDate;
use crate::error::CliError;

/// Parses an instant as Unix milliseconds. Accepts RFC3339 with offset, or a
/// bare `YYYY-MM-DD` meaning local midnight of that date.
pub fn parse_instant_ms(ts: &str, label: &str) -> Result<i64, CliError> {
    let t = ts.trim();
    if t.is_empty() {
        return Err(CliError::usage(format!("Invalid {}: (empty)", label)));
    }
    if let Some(date) = CivilDate::parse_iso(t) {
        return Ok(date.local_midnight_unix_ms());
    }
    chrono::DateTime::parse_from_rfc3339(t)
        .map(|dt| dt.timestamp_millis())
        .map_err(|_| CliError::usage(format!("Invalid {}: {}", label, ts)))
}

/// RFC3339 rendering in UTC, used for queue timestamps in table output.
pub fn format_unix_ms(unix_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(unix_ms)
        .map(|dt| dt.to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
        .unwrap_or_else(|| unix_ms.to_string())
}
