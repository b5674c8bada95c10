use chrono::{DateTime, NaiveDateTime, Utc};

/// Handles parsing the "Connected Since" session-start marker written by OpenVPN
pub struct TimestampParser;

/// Textual formats seen in the wild, newest first.
const TEXT_FORMATS: [&str; 2] = [
    // status-version 2/3 and 2.4+ status-version 1
    "%Y-%m-%d %H:%M:%S",
    // pre-2.4 status-version 1, e.g. "Thu Jan 15 10:30:00 2024"
    "%a %b %e %H:%M:%S %Y",
];

impl TimestampParser {
    /// Parse a unix-seconds column (`Connected Since (time_t)`)
    pub fn parse_unix(value: &str) -> Option<DateTime<Utc>> {
        let secs: i64 = value.trim().parse().ok()?;
        if secs <= 0 {
            return None;
        }
        DateTime::from_timestamp(secs, 0)
    }

    /// Parse a textual timestamp. The server writes local time without an
    /// offset; it is read as UTC so the same session always maps to the same value.
    pub fn parse_text(value: &str) -> Option<DateTime<Utc>> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }

        // Collapse the double space chrono does not expect for single-digit days
        let normalized = value.split_whitespace().collect::<Vec<_>>().join(" ");

        TEXT_FORMATS.iter().find_map(|format| {
            NaiveDateTime::parse_from_str(&normalized, format)
                .ok()
                .map(|naive| DateTime::from_naive_utc_and_offset(naive, Utc))
        })
    }

    /// Prefer the unix column when present, fall back to the textual one
    pub fn parse_session_start(text: &str, unix: Option<&str>) -> Option<DateTime<Utc>> {
        unix.and_then(Self::parse_unix)
            .or_else(|| Self::parse_text(text))
    }
}
