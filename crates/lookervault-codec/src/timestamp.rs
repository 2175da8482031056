//! Wire-format helpers for the ISO 8601 `Z`-suffixed timestamps the Looker
//! API uses. Parsing accepts the handful of fractional-second precisions
//! Looker is known to emit; rendering always produces a fixed-precision,
//! `Z`-suffixed string so two identical instants always render identically.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::CodecError;

pub fn format(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse(raw: &str) -> Result<DateTime<Utc>, CodecError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CodecError::DeserializationError(format!("invalid timestamp {raw:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn formats_with_z_suffix() {
        let ts = Utc.with_ymd_and_hms(2026, 3, 5, 12, 0, 0).unwrap();
        assert_eq!(format(ts), "2026-03-05T12:00:00.000Z");
    }

    #[test]
    fn round_trips_through_parse() {
        let ts = Utc.with_ymd_and_hms(2024, 11, 1, 23, 59, 59).unwrap();
        let rendered = format(ts);
        assert_eq!(parse(&rendered).unwrap(), ts);
    }

    #[test]
    fn parses_without_milliseconds() {
        let parsed = parse("2024-01-01T00:00:00Z").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn rejects_malformed_timestamp() {
        assert!(parse("not-a-timestamp").is_err());
    }
}
