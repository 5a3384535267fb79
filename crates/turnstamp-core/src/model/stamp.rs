use chrono::{DateTime, NaiveDateTime, Utc};

/// Timestamp form stored in ledger records.
pub const STORED_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";
/// Timestamp form embedded in transcript headers.
pub const DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

pub fn format_stored(at: DateTime<Utc>) -> String {
    at.format(STORED_FORMAT).to_string()
}

/// Parse a stored timestamp. RFC 3339 with an offset is accepted as well.
pub fn parse_stored(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    NaiveDateTime::parse_from_str(raw, STORED_FORMAT)
        .map(|naive| naive.and_utc())
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
        })
}

/// Render a stored timestamp for a header. Unparseable input is shown as-is.
pub fn display_from_stored(raw: &str) -> String {
    match parse_stored(raw) {
        Some(at) => at.format(DISPLAY_FORMAT).to_string(),
        None => raw.trim().to_string(),
    }
}

pub fn is_display(text: &str) -> bool {
    NaiveDateTime::parse_from_str(text, DISPLAY_FORMAT).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_stored_and_display_forms() {
        let at = Utc.with_ymd_and_hms(2025, 3, 14, 9, 26, 53).unwrap();
        let stored = format_stored(at);
        assert_eq!(stored, "2025-03-14T09:26:53Z");
        assert_eq!(display_from_stored(&stored), "2025-03-14 09:26:53 UTC");
        assert!(is_display("2025-03-14 09:26:53 UTC"));
        assert!(!is_display(&stored));
    }

    #[test]
    fn test_rfc3339_with_offset() {
        assert_eq!(
            display_from_stored("2025-03-14T11:26:53+02:00"),
            "2025-03-14 09:26:53 UTC"
        );
    }

    #[test]
    fn test_garbage_passes_through() {
        assert_eq!(display_from_stored(" yesterday "), "yesterday");
        assert!(parse_stored("yesterday").is_none());
        assert!(!is_display("model gpt-5, mode Agent"));
    }
}
