//! Recorded-time parsing.
//!
//! Groups carry either a relative time (`5分钟前`, "5 minutes ago") or an
//! absolute date (`2024-05-01`). Both resolve to a second-precision
//! [`NaiveDateTime`] relative to a caller-supplied `now`.

use chrono::{Duration, NaiveDate, NaiveDateTime, Timelike};
use thiserror::Error;

/// Suffix marking a relative time ("ago").
const AGO: &str = "前";

/// Unit markers in lookup order; the first one present in the text wins.
const UNITS: [(&str, Unit); 4] = [
    ("小时", Unit::Hours),
    ("分钟", Unit::Minutes),
    ("天", Unit::Days),
    ("秒", Unit::Seconds),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Unit {
    Hours,
    Minutes,
    Days,
    Seconds,
}

impl Unit {
    fn duration(self, n: i64) -> Option<Duration> {
        match self {
            Unit::Hours => Duration::try_hours(n),
            Unit::Minutes => Duration::try_minutes(n),
            Unit::Days => Duration::try_days(n),
            Unit::Seconds => Duration::try_seconds(n),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeParseError {
    #[error("unrecognized time unit in `{0}`")]
    UnrecognizedUnit(String),
    #[error("invalid magnitude in relative time `{0}`")]
    InvalidMagnitude(String),
    #[error("invalid time format `{0}`")]
    InvalidFormat(String),
}

/// Resolve a group's recorded-time text against `now`.
pub fn parse_recorded_time(text: &str, now: NaiveDateTime) -> Result<NaiveDateTime, TimeParseError> {
    let text = text.trim();

    let parsed = if text.ends_with(AGO) {
        let (marker, unit) = UNITS
            .iter()
            .find(|(marker, _)| text.contains(marker))
            .ok_or_else(|| TimeParseError::UnrecognizedUnit(text.to_string()))?;

        let magnitude = text
            .split(marker)
            .next()
            .unwrap_or_default()
            .trim()
            .parse::<i64>()
            .map_err(|_| TimeParseError::InvalidMagnitude(text.to_string()))?;

        unit.duration(magnitude)
            .and_then(|delta| now.checked_sub_signed(delta))
            .ok_or_else(|| TimeParseError::InvalidMagnitude(text.to_string()))?
    } else {
        NaiveDate::parse_from_str(text, "%Y-%m-%d")
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .ok_or_else(|| TimeParseError::InvalidFormat(text.to_string()))?
    };

    Ok(parsed.with_nanosecond(0).unwrap_or(parsed))
}
