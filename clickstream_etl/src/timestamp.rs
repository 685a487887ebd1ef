//! Event time normalization.
//!
//! `event_time` arrives either as an ISO-8601 string or as epoch seconds in a string.
//! ISO-8601 is tried first; a value matching neither becomes `None`.
use chrono::{DateTime, NaiveDate, NaiveDateTime, SubsecRound, TimeZone, Utc};

const OFFSET_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%z"];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.fZ",
    "%Y-%m-%d %H:%M:%S%.fZ",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Parses `event_time`, truncated to microseconds.
pub fn normalize_event_time(raw: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw?.trim();
    parse_iso8601(raw)
        .or_else(|| parse_epoch_seconds(raw))
        .map(|ts| ts.trunc_subsecs(6))
}

fn parse_iso8601(s: &str) -> Option<DateTime<Utc>> {
    // every accepted form starts with a YYYY-MM-DD date
    if s.len() < 10 || s.as_bytes()[4] != b'-' {
        return None;
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    for format in OFFSET_FORMATS {
        if let Ok(ts) = DateTime::parse_from_str(s, format) {
            return Some(ts.with_timezone(&Utc));
        }
    }
    for format in NAIVE_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(s, format) {
            return Some(Utc.from_utc_datetime(&ts));
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ts| Utc.from_utc_datetime(&ts))
}

/// `[+-]digits[.digits]`; any fraction is dropped, not rounded.
fn parse_epoch_seconds(s: &str) -> Option<DateTime<Utc>> {
    let (whole, fraction) = match s.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (s, ""),
    };
    let digits = whole.strip_prefix(|c: char| c == '+' || c == '-').unwrap_or(whole);
    if digits.is_empty()
        || !digits.bytes().all(|b| b.is_ascii_digit())
        || !fraction.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }
    let secs = whole.parse::<i64>().ok()?;
    Utc.timestamp_opt(secs, 0).single()
}

/// Text form used inside click ids: `YYYY-MM-DD HH:MM:SS[.f]`, UTC, with trailing zeros
/// of the fraction trimmed (`20.5`, not `20.500`).
pub fn timestamp_string(ts: &DateTime<Utc>) -> String {
    let mut out = ts.format("%Y-%m-%d %H:%M:%S").to_string();
    let micros = ts.timestamp_subsec_micros();
    if micros > 0 {
        let fraction = format!("{:06}", micros);
        out.push('.');
        out.push_str(fraction.trim_end_matches('0'));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_epoch_seconds() {
        assert_eq!(
            normalize_event_time(Some("1700000000")),
            Some(ts("2023-11-14T22:13:20Z"))
        );
        assert_eq!(
            normalize_event_time(Some(" 0 ")),
            Some(ts("1970-01-01T00:00:00Z"))
        );
        assert_eq!(
            normalize_event_time(Some("-60")),
            Some(ts("1969-12-31T23:59:00Z"))
        );
        assert_eq!(
            normalize_event_time(Some("+60")),
            Some(ts("1970-01-01T00:01:00Z"))
        );
    }

    #[test]
    fn test_fractional_epoch_seconds_are_truncated() {
        let expected = Some(ts("2023-11-14T22:13:20Z"));
        assert_eq!(normalize_event_time(Some("1700000000.5")), expected);
        assert_eq!(normalize_event_time(Some("1700000000.999")), expected);
        assert_eq!(normalize_event_time(Some("1700000000.")), expected);
        assert_eq!(
            normalize_event_time(Some("-60.9")),
            Some(ts("1969-12-31T23:59:00Z"))
        );
        assert_eq!(normalize_event_time(Some(".5")), None);
        assert_eq!(normalize_event_time(Some("1700000000.5x")), None);
        assert_eq!(normalize_event_time(Some("1.2.3")), None);
    }

    #[test]
    fn test_rfc3339() {
        assert_eq!(
            normalize_event_time(Some("2023-11-14T22:13:20Z")),
            Some(ts("2023-11-14T22:13:20Z"))
        );
        assert_eq!(
            normalize_event_time(Some("2023-11-15T00:13:20+02:00")),
            Some(ts("2023-11-14T22:13:20Z"))
        );
        assert_eq!(
            normalize_event_time(Some("2023-11-14T22:13:20.123456789Z")),
            Some(ts("2023-11-14T22:13:20.123456Z"))
        );
    }

    #[test]
    fn test_zoneless_forms_are_utc() {
        let expected = Some(ts("2023-11-14T22:13:20Z"));
        assert_eq!(normalize_event_time(Some("2023-11-14T22:13:20")), expected);
        assert_eq!(normalize_event_time(Some("2023-11-14 22:13:20")), expected);
        assert_eq!(
            normalize_event_time(Some("2023-11-14 22:13:20.5")),
            Some(ts("2023-11-14T22:13:20.5Z"))
        );
        assert_eq!(
            normalize_event_time(Some("2023-11-14T22:13")),
            Some(ts("2023-11-14T22:13:00Z"))
        );
        assert_eq!(
            normalize_event_time(Some("2023-11-14")),
            Some(ts("2023-11-14T00:00:00Z"))
        );
    }

    #[test]
    fn test_space_separated_with_offset() {
        assert_eq!(
            normalize_event_time(Some("2023-11-14 23:13:20+01:00")),
            Some(ts("2023-11-14T22:13:20Z"))
        );
    }

    #[test]
    fn test_unparseable_is_none() {
        assert_eq!(normalize_event_time(Some("not-a-date")), None);
        assert_eq!(normalize_event_time(Some("")), None);
        assert_eq!(normalize_event_time(Some("1e9")), None);
        assert_eq!(normalize_event_time(Some("2023-13-45")), None);
        assert_eq!(normalize_event_time(None), None);
    }

    #[test]
    fn test_timestamp_string() {
        assert_eq!(
            timestamp_string(&ts("2023-11-14T22:13:20Z")),
            "2023-11-14 22:13:20"
        );
        assert_eq!(
            timestamp_string(&ts("2023-11-14T22:13:20.5Z")),
            "2023-11-14 22:13:20.5"
        );
        assert_eq!(
            timestamp_string(&ts("2023-11-14T22:13:20.120Z")),
            "2023-11-14 22:13:20.12"
        );
        assert_eq!(
            timestamp_string(&ts("2023-11-14T22:13:20.000123Z")),
            "2023-11-14 22:13:20.000123"
        );
    }
}
