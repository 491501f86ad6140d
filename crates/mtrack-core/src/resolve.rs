//! Interval resolution.
//!
//! Expands an ordered sequence of ON/OFF intervals into one point per hour
//! bucket. Points sit on bucket ends (see [`crate::bucket`]).
//!
//! # Algorithm
//!
//! For each interval, with `start`/`end` the buckets of its ON and OFF
//! seconds:
//!
//! 1. **Stop-fill** (from the second interval on). `previous_end` is the
//!    second before `start`. When at least one whole bucket separates the
//!    previous OFF bucket from `start`, every bucket end from the previous
//!    OFF bucket's end through `previous_end` gets an unknown position;
//!    otherwise only `previous_end` does. Then `previous_end` is emitted
//!    again carrying the previous interval's position.
//! 2. **Move-fill**. When the interval spans at least two bucket boundaries
//!    (`end.end - 1 - start.start >= 7200`), every bucket end after `start`
//!    and before the last moving second gets an unknown position.
//! 3. **Finalize**, once the input is exhausted: the last OFF bucket's end,
//!    carrying the last position.
//!
//! Stop-fill emits the unknown point and the carried position on the same
//! second when the gap is short; the aggregator keeps the carried position
//! because it is emitted last.
//!
//! The resolver never sorts. Input order is the timeline order, and an
//! interval starting before the previous interval of the same machine ended
//! is rejected unless [`OverlapPolicy::Allow`] is set. Intervals of
//! different machines may overlap freely; that is what a combined sequence
//! of a fleet looks like.

use std::collections::{HashMap, VecDeque};
use std::fmt;

use chrono::TimeZone;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::bucket::{BucketWindow, HOUR};
use crate::clock::{self, ClockError};
use crate::error::ErrorCode;
use crate::model::{IntervalRecord, Position, ResolvedRow};

/// What to do with an interval that starts before the same machine's
/// previous interval ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlapPolicy {
    /// Stop the sequence with [`ResolveError::Overlap`].
    #[default]
    Reject,
    /// Log a warning and run the arithmetic unchanged.
    Allow,
}

impl OverlapPolicy {
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "reject" => Some(Self::Reject),
            "allow" => Some(Self::Allow),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error(
        "line {line}: interval for `{machine_id}` starts before the interval on line {previous_line} ended"
    )]
    Overlap {
        machine_id: String,
        line: u64,
        previous_line: u64,
    },

    #[error(transparent)]
    Clock(#[from] ClockError),
}

impl ResolveError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Overlap { .. } => ErrorCode::OverlappingInterval,
            Self::Clock(err) => err.code(),
        }
    }
}

/// A resolved point before clock rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Point {
    pub machine_id: String,
    pub second: i64,
    pub position: Position,
}

/// State carried from one interval to the next.
#[derive(Debug)]
struct LastInterval {
    machine_id: String,
    off_window: BucketWindow,
    position: Position,
}

/// Latest OFF second seen for a machine, and the line it came from.
#[derive(Debug, Clone, Copy)]
struct LastOff {
    second: i64,
    line: u64,
}

/// Lazy point stream over an interval sequence.
///
/// Single pass: the underlying interval iterator is consumed as points are
/// pulled, and the stream cannot be restarted. After yielding an error it
/// yields nothing more.
#[derive(Debug)]
pub struct Points<I> {
    intervals: I,
    policy: OverlapPolicy,
    queue: VecDeque<Point>,
    last: Option<LastInterval>,
    last_off: HashMap<String, LastOff>,
    finished: bool,
}

impl<I> Points<I>
where
    I: Iterator<Item = IntervalRecord>,
{
    pub fn new(intervals: impl IntoIterator<IntoIter = I>, policy: OverlapPolicy) -> Self {
        Self {
            intervals: intervals.into_iter(),
            policy,
            queue: VecDeque::new(),
            last: None,
            last_off: HashMap::new(),
            finished: false,
        }
    }

    fn push(&mut self, machine_id: &str, second: i64, position: Position) {
        self.queue.push_back(Point {
            machine_id: machine_id.to_string(),
            second,
            position,
        });
    }

    fn expand(&mut self, interval: IntervalRecord) -> Result<(), ResolveError> {
        let start = interval.on_window();
        let end = interval.off_window();

        self.check_overlap(&interval)?;
        if let Some(last) = self.last.take() {
            self.stop_fill(&last, start, &interval.machine_id);
        }

        debug!(
            machine = %interval.machine_id,
            line = interval.line,
            start = start.start_second,
            end = end.end_second,
            "resolving interval"
        );
        self.move_fill(start, end, &interval.machine_id);

        self.last = Some(LastInterval {
            machine_id: interval.machine_id,
            off_window: end,
            position: interval.position,
        });
        Ok(())
    }

    fn check_overlap(&mut self, interval: &IntervalRecord) -> Result<(), ResolveError> {
        let current = LastOff {
            second: interval.off_second,
            line: interval.line,
        };
        let Some(previous) = self.last_off.get_mut(&interval.machine_id) else {
            self.last_off.insert(interval.machine_id.clone(), current);
            return Ok(());
        };

        if interval.on_second < previous.second {
            match self.policy {
                OverlapPolicy::Reject => {
                    return Err(ResolveError::Overlap {
                        machine_id: interval.machine_id.clone(),
                        line: interval.line,
                        previous_line: previous.line,
                    });
                }
                OverlapPolicy::Allow => warn!(
                    machine = %interval.machine_id,
                    line = interval.line,
                    previous_line = previous.line,
                    "interval overlaps its predecessor"
                ),
            }
        }
        if current.second >= previous.second {
            *previous = current;
        }
        Ok(())
    }

    fn stop_fill(&mut self, last: &LastInterval, start: BucketWindow, machine_id: &str) {
        let previous_end = start.start_second - 1;
        let gap = previous_end - last.off_window.end_second;

        let mut second = if gap >= HOUR {
            last.off_window.end_second
        } else {
            previous_end
        };
        while second <= previous_end {
            self.push(machine_id, second, Position::unknown());
            second += HOUR;
        }

        self.push(machine_id, previous_end, last.position.clone());
    }

    fn move_fill(&mut self, start: BucketWindow, end: BucketWindow, machine_id: &str) {
        let last_moving = end.end_second - 1;
        if last_moving - start.start_second < 2 * HOUR {
            return;
        }

        let mut boundary = start.start_second + HOUR;
        while boundary < last_moving {
            self.push(machine_id, boundary - 1, Position::unknown());
            boundary += HOUR;
        }
    }

    fn finalize(&mut self) {
        if let Some(last) = self.last.take() {
            let second = last.off_window.start_second + HOUR - 1;
            self.push(&last.machine_id, second, last.position);
        }
        self.finished = true;
    }
}

impl<I> Iterator for Points<I>
where
    I: Iterator<Item = IntervalRecord>,
{
    type Item = Result<Point, ResolveError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(point) = self.queue.pop_front() {
                return Some(Ok(point));
            }
            if self.finished {
                return None;
            }

            match self.intervals.next() {
                Some(interval) => {
                    if let Err(err) = self.expand(interval) {
                        self.queue.clear();
                        self.last = None;
                        self.last_off.clear();
                        self.finished = true;
                        return Some(Err(err));
                    }
                }
                None => self.finalize(),
            }
        }
    }
}

/// Resolves intervals into rendered [`ResolvedRow`]s.
///
/// Pull-based and single-consumption, like [`Points`]. Callers stop at the
/// first `Err`.
#[derive(Debug)]
pub struct Resolver<I, Tz> {
    points: Points<I>,
    zone: Tz,
}

impl<I, Tz> Resolver<I, Tz>
where
    I: Iterator<Item = IntervalRecord>,
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    pub fn new(intervals: impl IntoIterator<IntoIter = I>, zone: Tz) -> Self {
        Self::with_policy(intervals, zone, OverlapPolicy::default())
    }

    pub fn with_policy(
        intervals: impl IntoIterator<IntoIter = I>,
        zone: Tz,
        policy: OverlapPolicy,
    ) -> Self {
        Self {
            points: Points::new(intervals, policy),
            zone,
        }
    }

    fn render(&self, point: Point) -> Result<ResolvedRow, ResolveError> {
        let (date, time) = clock::render(&self.zone, point.second)?;
        let (x, y) = point.position.rendered();
        Ok(ResolvedRow {
            machine_id: point.machine_id,
            date,
            time,
            x,
            y,
        })
    }
}

impl<I, Tz> Iterator for Resolver<I, Tz>
where
    I: Iterator<Item = IntervalRecord>,
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    type Item = Result<ResolvedRow, ResolveError>;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.points.next()?.and_then(|point| self.render(point)))
    }
}
