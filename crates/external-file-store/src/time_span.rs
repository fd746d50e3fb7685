//! Textual `days:hours:minutes:seconds` encoding for durations
//!
//! This is the storage representation of an artifact's cache period and the
//! format accepted for scavenger settings. Formatting always emits all four
//! components (`"0:0:5:0"` is five minutes); parsing also accepts the shorter
//! `d`, `h:m`, `h:m:s` and `d.h:m:s` forms.

use std::fmt;
use std::time::Duration;

const SECS_PER_MINUTE: u64 = 60;
const SECS_PER_HOUR: u64 = 60 * SECS_PER_MINUTE;
const SECS_PER_DAY: u64 = 24 * SECS_PER_HOUR;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseTimeSpanError {
    input: String,
    reason: &'static str,
}

impl fmt::Display for ParseTimeSpanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid time span '{}': {}", self.input, self.reason)
    }
}

impl std::error::Error for ParseTimeSpanError {}

/// Format a duration as `d:h:m:s`. Sub-second precision is dropped.
pub fn format_time_span(duration: Duration) -> String {
    let total = duration.as_secs();
    let days = total / SECS_PER_DAY;
    let hours = (total % SECS_PER_DAY) / SECS_PER_HOUR;
    let minutes = (total % SECS_PER_HOUR) / SECS_PER_MINUTE;
    let seconds = total % SECS_PER_MINUTE;
    format!("{}:{}:{}:{}", days, hours, minutes, seconds)
}

/// Parse a duration from its textual time span form.
pub fn parse_time_span(input: &str) -> Result<Duration, ParseTimeSpanError> {
    let err = |reason| ParseTimeSpanError {
        input: input.to_string(),
        reason,
    };

    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(err("empty"));
    }

    let parts: Vec<&str> = trimmed.split(':').collect();
    let (days, hours, minutes, seconds) = match parts.as_slice() {
        [d] => (number(d).ok_or_else(|| err("days must be a number"))?, 0, 0, 0),
        [h, m] => {
            let (d, h) = split_days(h).ok_or_else(|| err("hours must be a number"))?;
            (d, h, number(m).ok_or_else(|| err("minutes must be a number"))?, 0)
        }
        [h, m, s] => {
            let (d, h) = split_days(h).ok_or_else(|| err("hours must be a number"))?;
            (
                d,
                h,
                number(m).ok_or_else(|| err("minutes must be a number"))?,
                number(s).ok_or_else(|| err("seconds must be a number"))?,
            )
        }
        [d, h, m, s] => (
            number(d).ok_or_else(|| err("days must be a number"))?,
            number(h).ok_or_else(|| err("hours must be a number"))?,
            number(m).ok_or_else(|| err("minutes must be a number"))?,
            number(s).ok_or_else(|| err("seconds must be a number"))?,
        ),
        _ => return Err(err("too many components")),
    };

    if hours > 23 {
        return Err(err("hours out of range"));
    }
    if minutes > 59 {
        return Err(err("minutes out of range"));
    }
    if seconds > 59 {
        return Err(err("seconds out of range"));
    }

    let total = days
        .checked_mul(SECS_PER_DAY)
        .and_then(|d| d.checked_add(hours * SECS_PER_HOUR + minutes * SECS_PER_MINUTE + seconds))
        .ok_or_else(|| err("overflow"))?;

    Ok(Duration::from_secs(total))
}

fn number(s: &str) -> Option<u64> {
    let s = s.trim();
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

// "1.02" in the leading position of `d.h:m:s`
fn split_days(s: &str) -> Option<(u64, u64)> {
    match s.split_once('.') {
        Some((d, h)) => Some((number(d)?, number(h)?)),
        None => Some((0, number(s)?)),
    }
}

/// Serde adapter for `#[serde(with = "time_span::serde_text")]` fields.
pub mod serde_text {
    use super::{format_time_span, parse_time_span};
    use serde::{de, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_time_span(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(deserializer)?;
        parse_time_span(&text).map_err(de::Error::custom)
    }
}
