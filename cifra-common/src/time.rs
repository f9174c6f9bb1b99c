//! Timestamp utilities

use chrono::{DateTime, SecondsFormat, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Current time as ISO 8601 with millisecond precision and a `Z` suffix
///
/// This is the format used for envelope and health timestamps.
pub fn iso_timestamp() -> String {
    to_iso(&now())
}

/// Format a timestamp as ISO 8601 with millisecond precision (`2024-01-31T12:00:00.000Z`)
pub fn to_iso(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::time::Duration;

    #[test]
    fn test_now_returns_valid_timestamp() {
        let timestamp = now();
        // Should be a reasonable timestamp (after year 2000)
        assert!(timestamp.timestamp() > 946_684_800);
    }

    #[tokio::test]
    async fn test_now_successive_calls_advance() {
        let time1 = now();
        tokio::time::sleep(Duration::from_millis(10)).await;
        let time2 = now();
        assert!(time2 > time1);
    }

    #[test]
    fn test_to_iso_uses_millis_and_zulu() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 31, 12, 0, 5).unwrap();
        assert_eq!(to_iso(&ts), "2024-01-31T12:00:05.000Z");
    }

    #[test]
    fn test_iso_timestamp_round_trips_through_chrono() {
        let formatted = iso_timestamp();
        assert!(formatted.ends_with('Z'));
        assert!(DateTime::parse_from_rfc3339(&formatted).is_ok());
    }
}
