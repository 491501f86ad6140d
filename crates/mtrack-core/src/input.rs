//! CSV input loading.
//!
//! The whole file is read and validated up front into an immutable
//! [`IntervalTable`]. Nothing is written until this succeeds, so a bad row
//! anywhere in the file means no output at all.
//!
//! Required columns: `ID`, `ONDate`, `ONTime`, `OFFDate`, `OFFTime`,
//! `endX`, `endY`. Column order is free and extra columns are ignored.

use std::collections::HashSet;
use std::fs::File;
use std::io;
use std::path::Path;

use chrono::TimeZone;
use serde::Deserialize;
use tracing::{debug, info};

use crate::clock::{self, ClockError};
use crate::error::ErrorCode;
use crate::model::{IntervalRecord, Position};

/// Header names an input file must carry.
pub const REQUIRED_COLUMNS: [&str; 7] = [
    "ID", "ONDate", "ONTime", "OFFDate", "OFFTime", "endX", "endY",
];

#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("failed to open {source_name}: {source}")]
    Open {
        source_name: String,
        #[source]
        source: io::Error,
    },

    #[error("{source_name}: missing required column `{column}`")]
    MissingColumn {
        source_name: String,
        column: &'static str,
    },

    #[error("line {line}: {source}")]
    Timestamp {
        line: u64,
        #[source]
        source: ClockError,
    },

    #[error("line {line}: OFF time of `{machine_id}` is before its ON time")]
    InvertedInterval { line: u64, machine_id: String },

    #[error("{source_name}: malformed CSV: {source}")]
    Csv {
        source_name: String,
        #[source]
        source: csv::Error,
    },
}

impl InputError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Open { .. } | Self::Csv { .. } => ErrorCode::InputUnreadable,
            Self::MissingColumn { .. } => ErrorCode::MissingColumn,
            Self::Timestamp { source, .. } => source.code(),
            Self::InvertedInterval { .. } => ErrorCode::InvertedInterval,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawRow {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "ONDate")]
    on_date: String,
    #[serde(rename = "ONTime")]
    on_time: String,
    #[serde(rename = "OFFDate")]
    off_date: String,
    #[serde(rename = "OFFTime")]
    off_time: String,
    #[serde(rename = "endX")]
    end_x: String,
    #[serde(rename = "endY")]
    end_y: String,
}

/// Every interval of one input file, in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntervalTable {
    records: Vec<IntervalRecord>,
    ids: Vec<String>,
}

impl IntervalTable {
    /// Read and validate a CSV file.
    ///
    /// # Errors
    ///
    /// Any [`InputError`]; the first bad row aborts the load.
    pub fn load<Tz: TimeZone>(path: &Path, zone: &Tz) -> Result<Self, InputError> {
        let source_name = path.display().to_string();
        let file = File::open(path).map_err(|source| InputError::Open {
            source_name: source_name.clone(),
            source,
        })?;

        let table = Self::from_reader(file, zone, &source_name)?;
        info!(
            path = %source_name,
            rows = table.len(),
            machines = table.ids().len(),
            "loaded intervals"
        );
        Ok(table)
    }

    /// Read CSV from any reader. `source_name` only labels errors.
    ///
    /// # Errors
    ///
    /// Any [`InputError`]; the first bad row aborts the load.
    pub fn from_reader<R, Tz>(reader: R, zone: &Tz, source_name: &str) -> Result<Self, InputError>
    where
        R: io::Read,
        Tz: TimeZone,
    {
        let csv_error = |source: csv::Error| InputError::Csv {
            source_name: source_name.to_string(),
            source,
        };

        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = reader.headers().map_err(csv_error)?.clone();
        for column in REQUIRED_COLUMNS {
            let present = headers
                .iter()
                .any(|h| h.trim_start_matches('\u{feff}') == column);
            if !present {
                return Err(InputError::MissingColumn {
                    source_name: source_name.to_string(),
                    column,
                });
            }
        }

        let mut records = Vec::new();
        for result in reader.records() {
            let record = result.map_err(csv_error)?;
            let line = record.position().map_or(0, csv::Position::line);
            let raw: RawRow = record.deserialize(Some(&headers)).map_err(csv_error)?;
            records.push(parse_row(raw, line, zone)?);
        }

        Ok(Self::from_records(records))
    }

    /// Build a table from already parsed records.
    #[must_use]
    pub fn from_records(records: Vec<IntervalRecord>) -> Self {
        let ids = {
            let mut seen = HashSet::new();
            records
                .iter()
                .filter(|r| seen.insert(r.machine_id.as_str()))
                .map(|r| r.machine_id.clone())
                .collect()
        };
        Self { records, ids }
    }

    /// Distinct machine ids, in order of first appearance.
    #[must_use]
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    /// Records exactly as they appeared in the file.
    #[must_use]
    pub fn records(&self) -> &[IntervalRecord] {
        &self.records
    }

    /// One machine's intervals, ready for resolution.
    ///
    /// Sorted by `(on, off)`; ties keep input order.
    #[must_use]
    pub fn by_id(&self, machine_id: &str) -> Vec<IntervalRecord> {
        sorted(
            self.records
                .iter()
                .filter(|r| r.machine_id == machine_id)
                .cloned()
                .collect(),
        )
    }

    /// Every interval as one sequence, sorted like [`Self::by_id`].
    #[must_use]
    pub fn all(&self) -> Vec<IntervalRecord> {
        sorted(self.records.clone())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn sorted(mut records: Vec<IntervalRecord>) -> Vec<IntervalRecord> {
    records.sort_by_key(|r| (r.on_second, r.off_second));
    records
}

fn parse_row<Tz: TimeZone>(raw: RawRow, line: u64, zone: &Tz) -> Result<IntervalRecord, InputError> {
    let timestamp = |date: &str, time: &str| {
        clock::parse_local(zone, date, time).map_err(|source| InputError::Timestamp { line, source })
    };

    let on_second = timestamp(&raw.on_date, &raw.on_time)?;
    let off_second = timestamp(&raw.off_date, &raw.off_time)?;
    if off_second < on_second {
        return Err(InputError::InvertedInterval {
            line,
            machine_id: raw.id,
        });
    }

    debug!(line, machine = %raw.id, on_second, off_second, "parsed interval");

    Ok(IntervalRecord {
        position: Position::from_cells(&raw.end_x, &raw.end_y),
        machine_id: raw.id,
        on_second,
        off_second,
        line,
    })
}
