//! Date and time parsing for filter values
//!
//! Filter values arrive as free-form strings. Timestamps without an offset
//! are taken as UTC; date-only layouts land on midnight.

use chrono::{
    DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Timelike, Utc,
};

/// Naive date-time layouts tried after RFC 3339 and RFC 2822
const DATETIME_LAYOUTS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
];

/// Date-only layouts
const DATE_LAYOUTS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%d-%b-%Y",
    "%b %d, %Y",
    "%B %d, %Y",
];

/// Time-of-day layouts
const TIME_LAYOUTS: &[&str] = &[
    "%H:%M:%S%.f",
    "%H:%M:%S",
    "%H:%M",
    "%I:%M:%S %p",
    "%I:%M %p",
    "%I:%M%p",
];

/// Parse a timestamp in any supported layout
pub fn parse_timestamp(s: &str) -> Option<DateTime<FixedOffset>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt);
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt);
    }
    let utc = FixedOffset::east_opt(0)?;
    for layout in DATETIME_LAYOUTS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, layout) {
            return Some(naive.and_utc().with_timezone(&utc));
        }
    }
    for layout in DATE_LAYOUTS {
        if let Ok(date) = NaiveDate::parse_from_str(s, layout) {
            return Some(date.and_time(NaiveTime::MIN).and_utc().with_timezone(&utc));
        }
    }
    None
}

/// Parse a time of day, truncated to whole seconds
///
/// Accepts bare clock layouts and falls back to the time part of a full
/// timestamp.
pub fn parse_time_of_day(s: &str) -> Option<NaiveTime> {
    let s = s.trim();
    let parsed = TIME_LAYOUTS
        .iter()
        .find_map(|layout| NaiveTime::parse_from_str(s, layout).ok())
        .or_else(|| parse_timestamp(s).map(|dt| dt.time()))?;
    Some(truncate_to_seconds(parsed))
}

pub fn truncate_to_seconds(t: NaiveTime) -> NaiveTime {
    t.with_nanosecond(0).unwrap_or(t)
}

/// True when the timestamp carries no time of day (exactly midnight)
pub fn is_date_only(dt: &DateTime<FixedOffset>) -> bool {
    dt.time() == NaiveTime::MIN
}

/// Midnight of the value's calendar day, in the value's own offset
pub fn start_of_day(dt: &DateTime<FixedOffset>) -> DateTime<Utc> {
    local_to_utc(dt.date_naive().and_time(NaiveTime::MIN), dt.offset())
}

/// Last nanosecond of the value's calendar day, in the value's own offset
pub fn end_of_day(dt: &DateTime<FixedOffset>) -> DateTime<Utc> {
    let next_midnight = dt.date_naive().and_time(NaiveTime::MIN) + TimeDelta::days(1);
    local_to_utc(next_midnight - TimeDelta::nanoseconds(1), dt.offset())
}

fn local_to_utc(local: NaiveDateTime, offset: &FixedOffset) -> DateTime<Utc> {
    (local - TimeDelta::seconds(offset.local_minus_utc().into())).and_utc()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone};

    #[test]
    fn test_parse_rfc3339() {
        let dt = parse_timestamp("2025-01-10T23:00:00Z").unwrap();
        assert_eq!(dt.hour(), 23);
        assert!(!is_date_only(&dt));
    }

    #[test]
    fn test_parse_rfc3339_with_offset() {
        let dt = parse_timestamp("2025-01-10T08:30:00+02:00").unwrap();
        assert_eq!(dt.offset().local_minus_utc(), 7200);
        assert_eq!(dt.with_timezone(&Utc).hour(), 6);
    }

    #[test]
    fn test_parse_date_only_layouts() {
        for s in ["2025-01-10", "2025/01/10", "01/10/2025", "10-Jan-2025", "Jan 10, 2025"] {
            let dt = parse_timestamp(s).unwrap_or_else(|| panic!("failed to parse {s}"));
            assert_eq!(dt.year(), 2025, "{s}");
            assert_eq!(dt.month(), 1, "{s}");
            assert_eq!(dt.day(), 10, "{s}");
            assert!(is_date_only(&dt), "{s}");
        }
    }

    #[test]
    fn test_parse_naive_datetime_is_utc() {
        let dt = parse_timestamp("2025-01-10 15:04:05").unwrap();
        assert_eq!(dt.offset().local_minus_utc(), 0);
        assert_eq!(dt.minute(), 4);
    }

    #[test]
    fn test_parse_invalid() {
        assert!(parse_timestamp("").is_none());
        assert!(parse_timestamp("not a date").is_none());
        assert!(parse_timestamp("2025-13-45").is_none());
    }

    #[test]
    fn test_midnight_counts_as_date_only() {
        let dt = parse_timestamp("2025-01-10T00:00:00Z").unwrap();
        assert!(is_date_only(&dt));
    }

    #[test]
    fn test_day_bounds() {
        let dt = parse_timestamp("2025-01-10").unwrap();
        assert_eq!(
            start_of_day(&dt),
            Utc.with_ymd_and_hms(2025, 1, 10, 0, 0, 0).unwrap()
        );
        let end = end_of_day(&dt);
        assert_eq!(end.date_naive().day(), 10);
        assert_eq!(end.hour(), 23);
        assert_eq!(end.nanosecond(), 999_999_999);
    }

    #[test]
    fn test_day_bounds_respect_offset() {
        let dt = parse_timestamp("2025-01-10T12:00:00+02:00").unwrap();
        assert_eq!(
            start_of_day(&dt),
            Utc.with_ymd_and_hms(2025, 1, 9, 22, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_parse_time_of_day() {
        let t = parse_time_of_day("14:30:15.750").unwrap();
        assert_eq!((t.hour(), t.minute(), t.second(), t.nanosecond()), (14, 30, 15, 0));
        assert_eq!(parse_time_of_day("09:05").unwrap().minute(), 5);
        assert_eq!(parse_time_of_day("3:04 PM").unwrap().hour(), 15);
        assert_eq!(parse_time_of_day("2025-01-10T08:15:00Z").unwrap().hour(), 8);
        assert!(parse_time_of_day("noon").is_none());
    }
}
