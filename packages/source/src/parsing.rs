//! Field parsers shared by the log readers.
//!
//! Open-data exports disagree on timestamp layout, so every timestamp is
//! tried against a short list of known formats.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y"];

const TIME_FORMATS: &[&str] = &[
    "%H:%M:%S%.f",
    "%H:%M:%S",
    "%H:%M",
    "%I:%M:%S %p",
    "%I:%M %p",
];

/// Parses a combined local timestamp.
#[must_use]
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| parse_date(s).and_then(|d| d.and_hms_opt(0, 0, 0)))
}

/// Parses a date-only field. A trailing midnight time component
/// (`2024-01-15T00:00:00.000`) is tolerated; any other trailing text
/// rejects the field.
#[must_use]
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    let (date_part, rest) = s.split_once(['T', ' ']).unwrap_or((s, ""));
    if !rest.is_empty() && parse_time(rest) != Some(NaiveTime::MIN) {
        return None;
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(date_part, fmt).ok())
}

/// Parses a time-of-day field.
#[must_use]
pub fn parse_time(s: &str) -> Option<NaiveTime> {
    let s = s.trim();
    TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(s, fmt).ok())
}

/// Joins a separate date and optional time field. Without a time field the
/// date column may carry a full timestamp. An unparseable time falls back to
/// midnight; a bad date fails the row.
#[must_use]
pub fn parse_date_time(date: &str, time: Option<&str>) -> Option<NaiveDateTime> {
    let Some(time) = time.map(str::trim).filter(|t| !t.is_empty()) else {
        return parse_timestamp(date);
    };
    let date = parse_date(date)?;
    Some(date.and_time(parse_time(time).unwrap_or(NaiveTime::MIN)))
}

/// Parses a coordinate. Returns `None` for blanks and non-finite values.
#[must_use]
pub fn parse_coordinate(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parses a count that may carry thousands separators (`"1,234"`).
#[must_use]
pub fn parse_count(s: &str) -> Option<f64> {
    let cleaned: String = s.trim().chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
}
