//! Hour-bucket arithmetic.
//!
//! Buckets are one hour wide and start one second past each epoch-aligned
//! hour, so a bucket covers `HH:00:01` through `HH+1:00:00`:
//!
//! ```text
//! 00:00:01 (start) |----------*====*-------| 01:00:00 (end)
//!                             ^
//!                          [target]
//! ```
//!
//! Windows tile the timeline without gaps. [`bucket_of`] returns the window
//! holding `t`, except on an exact hour where it returns the window starting
//! at `t + 1`. The resolver places all of its points on bucket ends, so any
//! comparison against bucket bounds must go through [`bucket_of`] to keep
//! the +1 offset consistent.

/// Seconds in one bucket.
pub const HOUR: i64 = 3600;

/// Inclusive window of one hour bucket, in epoch seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BucketWindow {
    pub start_second: i64,
    pub end_second: i64,
}

/// Bucket for `second`: `second - second mod 3600 + 1` through 3599 seconds
/// later.
///
/// A second sitting exactly on an epoch-aligned hour (`HH:00:00`) opens the
/// bucket that starts one second later, so an interval switched on at
/// `08:00:00` is first accounted for at `09:00:00`.
#[must_use]
pub const fn bucket_of(second: i64) -> BucketWindow {
    let start_second = second - second.rem_euclid(HOUR) + 1;
    BucketWindow {
        start_second,
        end_second: start_second + HOUR - 1,
    }
}
