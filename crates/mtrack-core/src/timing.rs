//! Opt-in stage timing for a run.
//!
//! Stages are wrapped with [`timed`]; nothing is recorded unless timing was
//! switched on with [`set_timing_enabled`] (the CLI does this for `--timing`
//! or `MTRACK_TIMING`).

use std::cell::RefCell;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use serde_json::json;

/// Accumulated time per stage, in first-recorded order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimingReport {
    pub stages: Vec<StageTiming>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageTiming {
    pub name: String,
    pub total: Duration,
    pub count: usize,
}

thread_local! {
    static STAGES: RefCell<Vec<StageTiming>> = const { RefCell::new(Vec::new()) };
}

static TIMING_ENABLED: AtomicBool = AtomicBool::new(false);

/// Returns true when `MTRACK_TIMING` is set to `1`, `true`, `yes` or `on`.
#[must_use]
pub fn timing_enabled_from_env() -> bool {
    std::env::var("MTRACK_TIMING")
        .ok()
        .is_some_and(|value| is_truthy(&value))
}

pub fn set_timing_enabled(enabled: bool) {
    TIMING_ENABLED.store(enabled, Ordering::Relaxed);
    if !enabled {
        clear_timings();
    }
}

#[must_use]
pub fn is_timing_enabled() -> bool {
    TIMING_ENABLED.load(Ordering::Relaxed)
}

pub fn clear_timings() {
    STAGES.with(|stages| stages.borrow_mut().clear());
}

/// Run `f`, adding its duration to stage `name` when timing is enabled.
pub fn timed<R>(name: &str, f: impl FnOnce() -> R) -> R {
    if !is_timing_enabled() {
        return f();
    }

    let started = Instant::now();
    let result = f();
    record(name, started.elapsed());
    result
}

/// Drain this thread's stages into a report.
#[must_use]
pub fn collect_report() -> TimingReport {
    TimingReport {
        stages: STAGES.with(|stages| std::mem::take(&mut *stages.borrow_mut())),
    }
}

fn record(name: &str, elapsed: Duration) {
    STAGES.with(|stages| {
        let mut stages = stages.borrow_mut();
        if let Some(stage) = stages.iter_mut().find(|s| s.name == name) {
            stage.total += elapsed;
            stage.count += 1;
        } else {
            stages.push(StageTiming {
                name: name.to_string(),
                total: elapsed,
                count: 1,
            });
        }
    });
}

impl TimingReport {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    #[must_use]
    pub fn total(&self) -> Duration {
        self.stages.iter().map(|s| s.total).sum()
    }

    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let stages = self
            .stages
            .iter()
            .map(|s| {
                json!({
                    "name": s.name,
                    "count": s.count,
                    "total_us": s.total.as_micros(),
                })
            })
            .collect::<Vec<_>>();

        json!({ "stages": stages, "total_us": self.total().as_micros() })
    }

    /// Plain-text table for stderr.
    #[must_use]
    pub fn display_table(&self) -> String {
        if self.stages.is_empty() {
            return "No timing samples recorded.".to_string();
        }

        let mut out = String::new();
        out.push_str("stage            count      total\n");
        out.push_str("----------------------------------\n");
        for stage in &self.stages {
            let _ = writeln!(
                out,
                "{:<16} {:>5} {:>10}",
                stage.name,
                stage.count,
                format_duration(stage.total)
            );
        }
        let _ = writeln!(out, "{:<16} {:>5} {:>10}", "total", "", format_duration(self.total()));
        out
    }
}

fn format_duration(duration: Duration) -> String {
    let micros = duration.as_micros();
    if micros >= 1_000_000 {
        format!("{}.{:03}s", micros / 1_000_000, (micros % 1_000_000) / 1_000)
    } else if micros >= 1_000 {
        format!("{}.{:03}ms", micros / 1_000, micros % 1_000)
    } else {
        format!("{micros}µs")
    }
}

fn is_truthy(value: &str) -> bool {
    ["1", "true", "yes", "on"]
        .iter()
        .any(|t| value.trim().eq_ignore_ascii_case(t))
}
