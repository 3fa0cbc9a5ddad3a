//! Time helpers: UTC timestamps plus the two wire formats used by the API —
//! calendar dates (`2025-06-01`) for collection dates and minute-precision
//! clock times (`08:30`) for collection times.

use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{Date, OffsetDateTime, Time};

use crate::error::Result;

const DATE_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");
const CLOCK_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[hour]:[minute]");

/// Current UTC timestamp.
pub fn now_utc() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

/// Parses a calendar date in `YYYY-MM-DD` form.
pub fn parse_date(s: &str) -> Result<Date> {
    Ok(Date::parse(s, DATE_FORMAT)?)
}

/// Parses a clock time in `HH:MM` form.
pub fn parse_clock_time(s: &str) -> Result<Time> {
    Ok(Time::parse(s, CLOCK_FORMAT)?)
}

/// Formats a calendar date as `YYYY-MM-DD`.
pub fn format_date(date: Date) -> String {
    date.format(DATE_FORMAT).unwrap_or_else(|_| date.to_string())
}

/// Formats a clock time as `HH:MM`.
pub fn format_clock_time(t: Time) -> String {
    t.format(CLOCK_FORMAT).unwrap_or_else(|_| t.to_string())
}

/// Serde adapter for `Date` fields in `YYYY-MM-DD` form.
pub mod iso_date {
    use serde::{Deserialize, Deserializer, Serializer, de::Error as _, ser::Error as _};
    use time::Date;

    use super::DATE_FORMAT;

    pub fn serialize<S: Serializer>(date: &Date, serializer: S) -> Result<S::Ok, S::Error> {
        let s = date.format(DATE_FORMAT).map_err(S::Error::custom)?;
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Date, D::Error> {
        let s = String::deserialize(deserializer)?;
        Date::parse(&s, DATE_FORMAT).map_err(D::Error::custom)
    }
}

/// Serde adapter for `Time` fields in `HH:MM` form.
pub mod clock_time {
    use serde::{Deserialize, Deserializer, Serializer, de::Error as _, ser::Error as _};
    use time::Time;

    use super::CLOCK_FORMAT;

    pub fn serialize<S: Serializer>(t: &Time, serializer: S) -> Result<S::Ok, S::Error> {
        let s = t.format(CLOCK_FORMAT).map_err(S::Error::custom)?;
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Time, D::Error> {
        let s = String::deserialize(deserializer)?;
        Time::parse(&s, CLOCK_FORMAT).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_format_date() {
        let date = parse_date("2025-06-01").unwrap();
        assert_eq!(format_date(date), "2025-06-01");
    }

    #[test]
    fn test_parse_date_rejects_garbage() {
        assert!(parse_date("06/01/2025").is_err());
        assert!(parse_date("not a date").is_err());
        assert!(parse_date("2025-13-01").is_err());
    }

    #[test]
    fn test_parse_and_format_clock_time() {
        let t = parse_clock_time("08:30").unwrap();
        assert_eq!(format_clock_time(t), "08:30");
    }

    #[test]
    fn test_parse_clock_time_rejects_seconds() {
        assert!(parse_clock_time("08:30:15").is_err());
        assert!(parse_clock_time("25:00").is_err());
    }

    #[test]
    fn test_serde_adapters_roundtrip() {
        use serde::{Deserialize, Serialize};

        #[derive(Serialize, Deserialize)]
        struct Probe {
            #[serde(with = "iso_date")]
            date: time::Date,
            #[serde(with = "clock_time")]
            time: time::Time,
        }

        let probe = Probe {
            date: parse_date("2025-06-01").unwrap(),
            time: parse_clock_time("14:45").unwrap(),
        };
        let json = serde_json::to_value(&probe).unwrap();
        assert_eq!(json["date"], "2025-06-01");
        assert_eq!(json["time"], "14:45");

        let back: Probe = serde_json::from_value(json).unwrap();
        assert_eq!(back.date, probe.date);
        assert_eq!(back.time, probe.time);
    }
}
