//! Local-time timestamp keys
//!
//! Every key is formatted from wall-clock time as received. No timezone
//! conversion happens anywhere in the engine.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};
use chrono_tz::Europe::Madrid;

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Parse an upstream timestamp into local wall-clock time.
///
/// Accepts date-only, minute and second precision (with optional fraction),
/// a `T` or space separator, and a trailing `Z` or UTC offset, which is
/// dropped rather than applied.
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_local());
    }
    let s = s.strip_suffix('Z').unwrap_or(s);
    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .map(|d| d.and_time(NaiveTime::MIN))
        })
}

/// `YYYY-MM-DDTHH:MM`
#[must_use]
pub fn minute_key(dt: NaiveDateTime) -> String {
    dt.format("%Y-%m-%dT%H:%M").to_string()
}

/// `YYYY-MM-DDTHH:00`
#[must_use]
pub fn hour_key(dt: NaiveDateTime) -> String {
    dt.format("%Y-%m-%dT%H:00").to_string()
}

/// `YYYY-MM-DD`
#[must_use]
pub fn day_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Calendar-day prefix of a timestamp string, without parsing it
#[must_use]
pub fn day_prefix(raw: &str) -> Option<&str> {
    raw.get(..10)
}

/// `HH:MM` part of a `...THH:MM...` timestamp
#[must_use]
pub fn clock_of(raw: &str) -> Option<String> {
    if let Some((_, rest)) = raw.split_once('T') {
        return rest.get(..5).map(str::to_string);
    }
    parse_timestamp(raw).map(|dt| format!("{:02}:{:02}", dt.hour(), dt.minute()))
}

/// Current wall-clock time in Barcelona
#[must_use]
pub fn local_now() -> NaiveDateTime {
    Utc::now().with_timezone(&Madrid).naive_local()
}

#[must_use]
pub fn start_of_day(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

#[must_use]
pub fn end_of_day(date: NaiveDate) -> NaiveDateTime {
    // 23:59:59.999, the last representable instant the range helpers use
    date.and_hms_milli_opt(23, 59, 59, 999)
        .unwrap_or_else(|| date.and_time(NaiveTime::MIN))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("2024-01-01", "2024-01-01T00:00")]
    #[case("2024-01-01T13:30", "2024-01-01T13:30")]
    #[case("2024-01-01T13:30:00", "2024-01-01T13:30")]
    #[case("2024-01-01T13:30:00.000", "2024-01-01T13:30")]
    #[case("2024-01-01T13:30:00.000Z", "2024-01-01T13:30")]
    #[case("2024-01-01T13:30Z", "2024-01-01T13:30")]
    #[case("2024-01-01T13:30:00+01:00", "2024-01-01T13:30")]
    #[case("2024-01-01 13:30", "2024-01-01T13:30")]
    fn test_parse_timestamp_formats(#[case] raw: &str, #[case] expected: &str) {
        let parsed = parse_timestamp(raw).expect("should parse");
        assert_eq!(minute_key(parsed), expected);
    }

    #[rstest]
    #[case("")]
    #[case("yesterday")]
    #[case("2024-13-01")]
    fn test_parse_timestamp_rejects_garbage(#[case] raw: &str) {
        assert!(parse_timestamp(raw).is_none());
    }

    #[test]
    fn test_clock_and_day_prefix() {
        assert_eq!(clock_of("2024-03-05T14:27:00.000").as_deref(), Some("14:27"));
        assert_eq!(day_prefix("2024-03-05T14:27:00.000"), Some("2024-03-05"));
        assert_eq!(day_prefix("2024"), None);
    }

    #[test]
    fn test_day_bounds() {
        let date = NaiveDate::from_ymd_opt(2026, 2, 3).unwrap();
        assert_eq!(minute_key(start_of_day(date)), "2026-02-03T00:00");
        assert_eq!(
            end_of_day(date).format("%H:%M:%S%.3f").to_string(),
            "23:59:59.999"
        );
        assert_eq!(hour_key(end_of_day(date)), "2026-02-03T23:00");
    }
}
