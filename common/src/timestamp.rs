//! ISO-8601 timestamp encoding for session documents.
//!
//! Timestamps are written as RFC 3339 with microsecond precision and the
//! local offset.  On read, offset-less values such as
//! `2025-09-22T10:11:12.123456` are also accepted and taken as local time,
//! so logs written by older capture tools still load.

use chrono::{DateTime, Local, NaiveDateTime, SecondsFormat, SubsecRound, TimeZone};
use serde::{Deserialize, Deserializer, Serializer};

/// Current local time truncated to the precision that survives a
/// round-trip through the document.
pub fn now() -> DateTime<Local> {
    Local::now().trunc_subsecs(6)
}

pub fn format(ts: &DateTime<Local>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, false)
}

/// Parse an RFC 3339 or naive ISO-8601 timestamp.
pub fn parse(s: &str) -> Result<DateTime<Local>, String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Local));
    }
    let naive = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .map_err(|e| format!("invalid timestamp {s:?}: {e}"))?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .ok_or_else(|| format!("timestamp {s:?} does not exist in the local timezone"))
}

pub fn serialize<S>(ts: &DateTime<Local>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format(ts))
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Local>, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse(&s).map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_roundtrip_keeps_microseconds() {
        let ts = now();
        let parsed = parse(&format(&ts)).unwrap();
        assert_eq!(parsed, ts);
    }

    #[test]
    fn test_parse_naive_iso() {
        let ts = parse("2025-09-22T10:11:12.123456").unwrap();
        assert_eq!(ts.year(), 2025);
        assert_eq!(ts.hour(), 10);
        assert_eq!(ts.nanosecond(), 123_456_000);
    }

    #[test]
    fn test_parse_with_offset() {
        let a = parse("2025-09-22T10:00:00+00:00").unwrap();
        let b = parse("2025-09-22T12:00:00+02:00").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse("yesterday").is_err());
    }
}
