//! Output routing and CSV destinations.
//!
//! A [`Router`] sends each resolved row to one destination file chosen by
//! the [`Grouping`], with one [`Aggregator`] per destination:
//!
//! | grouping | directory  | one file per         |
//! |----------|------------|----------------------|
//! | `id`     | `by_id/`   | machine id           |
//! | `date`   | `by_date/` | hour bucket          |
//! | `all`    | `by_all/`  | run (`all.csv`)      |
//!
//! Aggregated rows stay in memory until [`Router::finish`], which writes
//! each destination through a [`CsvStore`] one at a time. A `date` run over
//! months of input therefore holds one open file, not one per hour. A run
//! that fails before `finish` leaves the previous files untouched.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::aggregate::Aggregator;
use crate::error::ErrorCode;
use crate::model::ResolvedRow;

/// Header written once at the top of every destination.
pub const OUTPUT_COLUMNS: [&str; 5] = ["id", "date", "time", "endX", "endY"];

#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("unknown grouping `{0}`; expected one of: id, date, all")]
    UnknownGrouping(String),

    #[error("cannot prepare output directory {}: {source}", .path.display())]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("failed to persist {}: {source}", .path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl OutputError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::UnknownGrouping(_) => ErrorCode::UnknownGrouping,
            Self::Directory { .. } => ErrorCode::OutputNotConfigured,
            Self::Write { .. } | Self::Persist { .. } => ErrorCode::OutputWriteFailed,
        }
    }
}

/// How resolved rows are split across destination files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Grouping {
    /// One file per machine id.
    Id,
    /// One file per hour bucket, holding every machine's row for it.
    Date,
    /// A single combined file.
    All,
}

impl Grouping {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Date => "date",
            Self::All => "all",
        }
    }

    /// Directory under the output root that holds this grouping's files.
    #[must_use]
    pub const fn directory(self) -> &'static str {
        match self {
            Self::Id => "by_id",
            Self::Date => "by_date",
            Self::All => "by_all",
        }
    }

    /// File stem (without `.csv`) that `row` belongs to.
    #[must_use]
    pub fn destination(self, row: &ResolvedRow) -> String {
        match self {
            Self::Id => file_safe(&row.machine_id),
            Self::Date => format!("{}_{}", row.date.replace('/', "_"), row.time.replace(':', "_")),
            Self::All => "all".to_string(),
        }
    }
}

impl fmt::Display for Grouping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Grouping {
    type Err = OutputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "id" => Ok(Self::Id),
            "date" => Ok(Self::Date),
            "all" => Ok(Self::All),
            _ => Err(OutputError::UnknownGrouping(s.to_string())),
        }
    }
}

fn file_safe(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    match cleaned.as_str() {
        "" | "." | ".." => format!("_{cleaned}"),
        _ => cleaned,
    }
}

/// What one destination ended up holding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DestinationSummary {
    pub name: String,
    pub path: PathBuf,
    pub rows: u64,
}

/// One CSV destination, replaced through a temporary sibling.
#[derive(Debug)]
pub struct CsvStore {
    path: PathBuf,
    tmp_path: PathBuf,
}

impl CsvStore {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        let tmp_path = path.with_extension("csv.tmp");
        Self { path, tmp_path }
    }

    /// Write `rows` under the header to `<name>.csv.tmp`, sync it and move
    /// it over the destination. Returns the number of rows written.
    ///
    /// # Errors
    ///
    /// [`OutputError::Write`] / [`OutputError::Persist`] on I/O failure; the
    /// temporary file is removed and the destination is left as it was.
    pub fn replace(&self, rows: &[ResolvedRow]) -> Result<u64, OutputError> {
        let written = self
            .stage(rows)
            .and_then(|written| {
                fs::rename(&self.tmp_path, &self.path)
                    .map_err(|source| self.persist_error(source))?;
                Ok(written)
            })
            .inspect_err(|_| {
                let _ = fs::remove_file(&self.tmp_path);
            })?;

        debug!(path = %self.path.display(), rows = written, "replaced destination");
        Ok(written)
    }

    fn stage(&self, rows: &[ResolvedRow]) -> Result<u64, OutputError> {
        let file = File::create(&self.tmp_path).map_err(|source| self.persist_error(source))?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(file);

        let write_error = |source| OutputError::Write {
            path: self.path.clone(),
            source,
        };
        writer.write_record(OUTPUT_COLUMNS).map_err(write_error)?;

        let mut written = 0;
        for row in rows {
            writer.serialize(row).map_err(write_error)?;
            written += 1;
        }

        let file = writer
            .into_inner()
            .map_err(|err| self.persist_error(err.into_error()))?;
        file.sync_all().map_err(|source| self.persist_error(source))?;
        Ok(written)
    }

    fn persist_error(&self, source: std::io::Error) -> OutputError {
        OutputError::Persist {
            path: self.path.clone(),
            source,
        }
    }
}

/// Routes rows to per-destination aggregators.
#[derive(Debug)]
pub struct Router {
    grouping: Grouping,
    directory: PathBuf,
    destinations: BTreeMap<String, Aggregator<Vec<ResolvedRow>>>,
}

impl Router {
    /// Prepare `<output_root>/<grouping directory>/`.
    ///
    /// # Errors
    ///
    /// [`OutputError::Directory`] when the directory cannot be created.
    pub fn create(output_root: &Path, grouping: Grouping) -> Result<Self, OutputError> {
        let directory = output_root.join(grouping.directory());
        fs::create_dir_all(&directory).map_err(|source| OutputError::Directory {
            path: directory.clone(),
            source,
        })?;

        Ok(Self {
            grouping,
            directory,
            destinations: BTreeMap::new(),
        })
    }

    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Hand one row to the aggregator of its destination.
    pub fn route(&mut self, row: ResolvedRow) {
        let Ok(()) = self
            .destinations
            .entry(self.grouping.destination(&row))
            .or_insert_with(|| Aggregator::new(Vec::new()))
            .observe(row);
    }

    /// Close the current resolved sequence.
    ///
    /// Pending rows are flushed so rows of the next sequence never replace
    /// them. In `date` mode this keeps one row per machine in each hour file.
    pub fn end_sequence(&mut self) {
        for aggregator in self.destinations.values_mut() {
            let Ok(()) = aggregator.flush();
        }
    }

    /// Flush every aggregator and replace every destination file.
    ///
    /// # Errors
    ///
    /// The first [`OutputError`]; destinations after it are not written.
    pub fn finish(self) -> Result<Vec<DestinationSummary>, OutputError> {
        let mut summaries = Vec::with_capacity(self.destinations.len());
        for (name, aggregator) in self.destinations {
            let Ok(rows) = aggregator.finish();
            let path = self.directory.join(format!("{name}.csv"));
            let written = CsvStore::new(path.clone()).replace(&rows)?;
            summaries.push(DestinationSummary {
                name,
                path,
                rows: written,
            });
        }

        info!(
            grouping = %self.grouping,
            destinations = summaries.len(),
            rows = summaries.iter().map(|s| s.rows).sum::<u64>(),
            "committed output"
        );
        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn row(machine: &str, time: &str, x: &str) -> ResolvedRow {
        ResolvedRow {
            machine_id: machine.to_string(),
            date: "2020/01/01".to_string(),
            time: time.to_string(),
            x: x.to_string(),
            y: x.to_string(),
        }
    }

    #[test]
    fn grouping_parses_known_modes() {
        assert_eq!("ID".parse::<Grouping>().ok(), Some(Grouping::Id));
        assert_eq!("date".parse::<Grouping>().ok(), Some(Grouping::Date));
        assert_eq!("all".parse::<Grouping>().ok(), Some(Grouping::All));

        let err = "week".parse::<Grouping>().unwrap_err();
        assert_eq!(err.code(), ErrorCode::UnknownGrouping);
    }

    #[test]
    fn destination_names_follow_grouping() {
        let r = row("M/1", "11:00:00", "1");
        assert_eq!(Grouping::Id.destination(&r), "M_1");
        assert_eq!(Grouping::Date.destination(&r), "2020_01_01_11_00_00");
        assert_eq!(Grouping::All.destination(&r), "all");
    }

    #[test]
    fn dot_ids_cannot_escape_the_directory() {
        assert_eq!(file_safe(".."), "_..");
        assert_eq!(file_safe(""), "_");
        assert_eq!(file_safe("M-7.a"), "M-7.a");
    }

    #[test]
    fn router_writes_one_header_and_collapsed_rows() {
        let dir = TempDir::new().unwrap();
        let mut router = Router::create(dir.path(), Grouping::Id).unwrap();

        router.route(row("M1", "11:00:00", "no answer"));
        router.route(row("M1", "11:00:00", "1"));
        router.route(row("M2", "11:00:00", "5"));
        router.route(row("M1", "12:00:00", "2"));

        let summaries = router.finish().unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].name, "M1");
        assert_eq!(summaries[0].rows, 2);

        let m1 = fs::read_to_string(dir.path().join("by_id/M1.csv")).unwrap();
        assert_eq!(
            m1,
            "id,date,time,endX,endY\n\
             M1,2020/01/01,11:00:00,1,1\n\
             M1,2020/01/01,12:00:00,2,2\n"
        );
        assert!(!dir.path().join("by_id/M1.csv.tmp").exists());
    }

    #[test]
    fn dropped_router_leaves_previous_files() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("by_all")).unwrap();
        fs::write(dir.path().join("by_all/all.csv"), "previous run\n").unwrap();

        {
            let mut router = Router::create(dir.path(), Grouping::All).unwrap();
            router.route(row("M1", "11:00:00", "1"));
        }

        let entries: Vec<_> = fs::read_dir(dir.path().join("by_all"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("all.csv")]);
        assert_eq!(
            fs::read_to_string(dir.path().join("by_all/all.csv")).unwrap(),
            "previous run\n"
        );
    }

    #[test]
    fn date_grouping_over_many_hours_writes_every_file() {
        let dir = TempDir::new().unwrap();
        let mut router = Router::create(dir.path(), Grouping::Date).unwrap();
        for hour in 0..2_000 {
            let mut r = row("M1", "00:00:00", "1");
            r.date = format!("day{:04}", hour / 24);
            r.time = format!("{:02}:00:00", hour % 24);
            router.route(r);
        }

        let summaries = router.finish().unwrap();
        assert_eq!(summaries.len(), 2_000);
        assert!(summaries.iter().all(|s| s.rows == 1));
        assert_eq!(fs::read_dir(dir.path().join("by_date")).unwrap().count(), 2_000);
    }

    #[test]
    fn end_sequence_keeps_rows_of_both_sequences() {
        let dir = TempDir::new().unwrap();
        let mut router = Router::create(dir.path(), Grouping::Date).unwrap();
        router.route(row("M1", "11:00:00", "no answer"));
        router.route(row("M1", "11:00:00", "1"));
        router.end_sequence();
        router.route(row("M2", "11:00:00", "2"));
        router.finish().unwrap();

        let body = fs::read_to_string(dir.path().join("by_date/2020_01_01_11_00_00.csv")).unwrap();
        assert_eq!(
            body,
            "id,date,time,endX,endY\n\
             M1,2020/01/01,11:00:00,1,1\n\
             M2,2020/01/01,11:00:00,2,2\n"
        );
    }

    #[test]
    fn failed_replace_removes_the_temporary_file() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("M1.csv");
        fs::create_dir(&target).unwrap();

        let err = CsvStore::new(target.clone())
            .replace(&[row("M1", "11:00:00", "1")])
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::OutputWriteFailed);
        assert!(!dir.path().join("M1.csv.tmp").exists());
        assert!(target.is_dir());
    }

    #[test]
    fn output_directory_must_be_creatable() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "").unwrap();

        let err = Router::create(&blocker, Grouping::Id).unwrap_err();
        assert_eq!(err.code(), ErrorCode::OutputNotConfigured);
    }
}
