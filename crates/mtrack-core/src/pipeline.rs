//! One end-to-end run: load, resolve, aggregate, persist.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{Local, TimeZone, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::clock::Zone;
use crate::config::RunConfig;
use crate::error::ErrorCode;
use crate::input::{InputError, IntervalTable};
use crate::lock::{LockError, OutputLock};
use crate::model::IntervalRecord;
use crate::resolve::{OverlapPolicy, ResolveError, Resolver};
use crate::route::{DestinationSummary, Grouping, OutputError, Router};
use crate::timing;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Output(#[from] OutputError),

    #[error(transparent)]
    Lock(#[from] LockError),
}

impl PipelineError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Input(err) => err.code(),
            Self::Resolve(err) => err.code(),
            Self::Output(err) => err.code(),
            Self::Lock(err) => err.code(),
        }
    }
}

/// What a run read and wrote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub grouping: Grouping,
    pub input: PathBuf,
    pub output_directory: PathBuf,
    pub intervals: usize,
    pub machines: usize,
    /// Rows produced by the resolver, before aggregation.
    pub resolved_rows: u64,
    /// Rows written across all destinations.
    pub written_rows: u64,
    pub destinations: Vec<DestinationSummary>,
}

/// Run with the clock selected in `config`.
///
/// # Errors
///
/// Any [`PipelineError`]; no destination is replaced when one is returned
/// before the persist stage.
pub fn run(input: &Path, grouping: Grouping, config: &RunConfig) -> Result<RunSummary, PipelineError> {
    match config.timezone {
        Zone::Local => run_in(input, grouping, config, &Local),
        Zone::Utc => run_in(input, grouping, config, &Utc),
    }
}

/// Run with an explicit clock.
///
/// # Errors
///
/// See [`run`].
pub fn run_in<Tz>(
    input: &Path,
    grouping: Grouping,
    config: &RunConfig,
    zone: &Tz,
) -> Result<RunSummary, PipelineError>
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    let mut router = Router::create(&config.output_dir, grouping)?;
    let lock = OutputLock::acquire(router.directory(), config.lock_timeout)?;
    debug!(lock = %lock.path().display(), "acquired output lock");

    let table = timing::timed("load", || IntervalTable::load(input, zone))?;
    let resolved_rows = timing::timed("resolve", || {
        resolve_into(&table, grouping, zone, config.overlap, &mut router)
    })?;

    let output_directory = router.directory().to_path_buf();
    let destinations = timing::timed("persist", || router.finish())?;
    drop(lock);

    let summary = RunSummary {
        grouping,
        input: input.to_path_buf(),
        output_directory,
        intervals: table.len(),
        machines: table.ids().len(),
        resolved_rows,
        written_rows: destinations.iter().map(|d| d.rows).sum(),
        destinations,
    };
    info!(
        grouping = %summary.grouping,
        resolved = summary.resolved_rows,
        written = summary.written_rows,
        "run complete"
    );
    Ok(summary)
}

/// Resolve every sequence of `table` for `grouping` and route the rows.
///
/// `id` and `date` resolve machine by machine; `all` resolves the whole
/// table as one sequence. Aggregation runs never span two sequences.
/// Returns the number of resolved rows.
///
/// # Errors
///
/// The first resolver or output error.
pub fn resolve_into<Tz>(
    table: &IntervalTable,
    grouping: Grouping,
    zone: &Tz,
    policy: OverlapPolicy,
    router: &mut Router,
) -> Result<u64, PipelineError>
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    match grouping {
        Grouping::All => route_sequence(table.all(), zone, policy, router),
        Grouping::Id | Grouping::Date => {
            let mut total = 0;
            for id in table.ids() {
                let sequence = table.by_id(id);
                debug!(machine = %id, intervals = sequence.len(), "resolving machine");
                total += route_sequence(sequence, zone, policy, router)?;
            }
            Ok(total)
        }
    }
}

fn route_sequence<Tz>(
    sequence: Vec<IntervalRecord>,
    zone: &Tz,
    policy: OverlapPolicy,
    router: &mut Router,
) -> Result<u64, PipelineError>
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    let mut rows = 0;
    for row in Resolver::with_policy(sequence, zone.clone(), policy) {
        router.route(row?);
        rows += 1;
    }
    router.end_sequence();
    Ok(rows)
}
