//! Wall-clock parsing and rendering.
//!
//! Input rows carry local-clock date and time columns; output rows carry the
//! same format back. Everything in between works on epoch seconds. The
//! functions are generic over [`chrono::TimeZone`] so the CLI can use the
//! machine's local zone while tests pin [`chrono::Utc`].

use std::fmt;

use chrono::{LocalResult, NaiveDateTime, TimeZone};
use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;

/// Combined input pattern, e.g. `2020/01/01 10:15:00`.
pub const DATE_TIME_FORMAT: &str = "%Y/%m/%d %H:%M:%S";
/// Rendered date column, e.g. `2020/01/01`.
pub const DATE_FORMAT: &str = "%Y/%m/%d";
/// Rendered time column, e.g. `10:59:59`.
pub const TIME_FORMAT: &str = "%H:%M:%S";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClockError {
    #[error("cannot parse `{value}` as YYYY/MM/DD HH:MM:SS")]
    Unparseable { value: String },

    #[error("`{value}` does not exist on the local clock")]
    Nonexistent { value: String },

    #[error("epoch second {second} cannot be rendered as a date")]
    OutOfRange { second: i64 },
}

impl ClockError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Unparseable { .. } => ErrorCode::InvalidTimestamp,
            Self::Nonexistent { .. } => ErrorCode::NonexistentLocalTime,
            Self::OutOfRange { .. } => ErrorCode::TimestampOutOfRange,
        }
    }
}

/// Which clock the date/time columns are read and written in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Zone {
    /// The host's local time zone.
    #[default]
    Local,
    Utc,
}

impl Zone {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Utc => "utc",
        }
    }

    /// Parse a user-supplied zone name (case-insensitive).
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "local" => Some(Self::Local),
            "utc" | "z" => Some(Self::Utc),
            _ => None,
        }
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse separate date and time columns into epoch seconds.
///
/// When the local time is ambiguous (clocks turned back) the earlier
/// instant wins.
///
/// # Errors
///
/// [`ClockError::Unparseable`] when the text does not match
/// [`DATE_TIME_FORMAT`], [`ClockError::Nonexistent`] when it falls in a
/// daylight-saving gap.
pub fn parse_local<Tz: TimeZone>(zone: &Tz, date: &str, time: &str) -> Result<i64, ClockError> {
    let value = format!("{} {}", date.trim(), time.trim());
    let naive = NaiveDateTime::parse_from_str(&value, DATE_TIME_FORMAT)
        .map_err(|_| ClockError::Unparseable { value: value.clone() })?;

    match zone.from_local_datetime(&naive) {
        LocalResult::Single(at) | LocalResult::Ambiguous(at, _) => Ok(at.timestamp()),
        LocalResult::None => Err(ClockError::Nonexistent { value }),
    }
}

/// Render epoch seconds as `(date, time)` columns.
///
/// # Errors
///
/// [`ClockError::OutOfRange`] when chrono cannot represent the instant.
pub fn render<Tz>(zone: &Tz, second: i64) -> Result<(String, String), ClockError>
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    let at = zone
        .timestamp_opt(second, 0)
        .single()
        .ok_or(ClockError::OutOfRange { second })?;

    Ok((
        at.format(DATE_FORMAT).to_string(),
        at.format(TIME_FORMAT).to_string(),
    ))
}
