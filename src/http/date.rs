//! HTTP-date helpers (IMF-fixdate plus the legacy RFC 850 / asctime forms).

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

const IMF_FIXDATE: &str = "%a, %d %b %Y %H:%M:%S GMT";
const RFC850: &str = "%A, %d-%b-%y %H:%M:%S GMT";
const ASCTIME: &str = "%a %b %e %H:%M:%S %Y";

/// Formats milliseconds since the epoch as an IMF-fixdate.
pub fn format_ms(ms: i64) -> String {
    match Utc.timestamp_millis_opt(ms).single() {
        Some(t) => t.format(IMF_FIXDATE).to_string(),
        None => Utc
            .timestamp_millis_opt(0)
            .single()
            .map(|t| t.format(IMF_FIXDATE).to_string())
            .unwrap_or_default(),
    }
}

/// Parses any of the three accepted HTTP-date forms into epoch milliseconds.
pub fn parse_ms(value: &str) -> Option<i64> {
    let value = value.trim();
    if let Ok(t) = DateTime::parse_from_rfc2822(value) {
        return Some(t.timestamp_millis());
    }
    for fmt in [IMF_FIXDATE, RFC850, ASCTIME] {
        if let Ok(t) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(t.and_utc().timestamp_millis());
        }
    }
    None
}
