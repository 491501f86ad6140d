//! Interval and resolved-row types.

use serde::{Deserialize, Serialize};

use crate::bucket::{BucketWindow, bucket_of};

/// Rendered in place of a coordinate that was never observed.
pub const NO_ANSWER: &str = "no answer";

/// Last known (X, Y) of a machine. Either coordinate may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Position {
    pub x: Option<String>,
    pub y: Option<String>,
}

impl Position {
    /// Position with both coordinates unknown.
    #[must_use]
    pub const fn unknown() -> Self {
        Self { x: None, y: None }
    }

    /// Build from raw CSV cells; blank cells become absent coordinates.
    #[must_use]
    pub fn from_cells(x: &str, y: &str) -> Self {
        fn cell(raw: &str) -> Option<String> {
            let trimmed = raw.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }

        Self {
            x: cell(x),
            y: cell(y),
        }
    }

    /// Coordinates as output columns, with [`NO_ANSWER`] for absent values.
    #[must_use]
    pub fn rendered(&self) -> (String, String) {
        (
            self.x.clone().unwrap_or_else(|| NO_ANSWER.to_string()),
            self.y.clone().unwrap_or_else(|| NO_ANSWER.to_string()),
        )
    }
}

/// One ON/OFF observation of a machine, positioned where it stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntervalRecord {
    pub machine_id: String,
    pub on_second: i64,
    pub off_second: i64,
    pub position: Position,
    /// 1-based line in the source file, for diagnostics.
    pub line: u64,
}

impl IntervalRecord {
    #[must_use]
    pub const fn on_window(&self) -> BucketWindow {
        bucket_of(self.on_second)
    }

    #[must_use]
    pub const fn off_window(&self) -> BucketWindow {
        bucket_of(self.off_second)
    }
}

/// One output row: where a machine was at the end of an hour bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResolvedRow {
    #[serde(rename = "id")]
    pub machine_id: String,
    pub date: String,
    pub time: String,
    #[serde(rename = "endX")]
    pub x: String,
    #[serde(rename = "endY")]
    pub y: String,
}

impl ResolvedRow {
    /// Bucket identity used to collapse repeated rows.
    #[must_use]
    pub fn key(&self) -> AggregationKey<'_> {
        AggregationKey {
            date: &self.date,
            time: &self.time,
        }
    }
}

/// `(date, time)` of a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AggregationKey<'a> {
    pub date: &'a str,
    pub time: &'a str,
}
