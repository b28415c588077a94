// Timestamp and value conversions for provider APIs
use chrono::{DateTime, NaiveDateTime, Utc};

const API_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

pub fn format_api_time(time: DateTime<Utc>) -> String {
    time.format(API_FORMAT).to_string()
}

/// Accepts `...Z`, numeric offsets with or without a colon, and RFC 3339.
pub fn parse_api_time(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(time) = DateTime::parse_from_rfc3339(text) {
        return Some(time.with_timezone(&Utc));
    }
    if let Ok(time) = DateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%z") {
        return Some(time.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(text, API_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// Numeric values only; `NaN` and infinities count as missing.
pub fn parse_api_value(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}
