//! Collapses runs of rows that share an hour bucket.
//!
//! The resolver can emit several rows for the same bucket end (an unknown
//! fill followed by a carried position, or fills from two neighbouring
//! intervals). The aggregator holds one pending row and writes it only once
//! a row with a different key arrives, so the last row seen for a bucket is
//! the one that reaches the sink. The final pending row is written by
//! [`Aggregator::flush`] / [`Aggregator::finish`]; dropping an aggregator
//! without flushing loses it.

use std::convert::Infallible;

use crate::model::ResolvedRow;

/// Destination for aggregated rows.
pub trait RowSink {
    type Error;

    fn write_row(&mut self, row: &ResolvedRow) -> Result<(), Self::Error>;
}

impl RowSink for Vec<ResolvedRow> {
    type Error = Infallible;

    fn write_row(&mut self, row: &ResolvedRow) -> Result<(), Self::Error> {
        self.push(row.clone());
        Ok(())
    }
}

impl<S: RowSink + ?Sized> RowSink for &mut S {
    type Error = S::Error;

    fn write_row(&mut self, row: &ResolvedRow) -> Result<(), Self::Error> {
        (**self).write_row(row)
    }
}

#[derive(Debug)]
pub struct Aggregator<S> {
    sink: S,
    pending: Option<ResolvedRow>,
    observed: u64,
    written: u64,
}

impl<S: RowSink> Aggregator<S> {
    pub const fn new(sink: S) -> Self {
        Self {
            sink,
            pending: None,
            observed: 0,
            written: 0,
        }
    }

    /// Buffer `row`, writing the pending row first if its key differs.
    ///
    /// # Errors
    ///
    /// Propagates sink write failures.
    pub fn observe(&mut self, row: ResolvedRow) -> Result<(), S::Error> {
        self.observed += 1;

        let key_changed = self
            .pending
            .as_ref()
            .is_some_and(|pending| pending.key() != row.key());
        if key_changed {
            self.flush()?;
        }

        self.pending = Some(row);
        Ok(())
    }

    /// Write the pending row, if any.
    ///
    /// # Errors
    ///
    /// Propagates sink write failures.
    pub fn flush(&mut self) -> Result<(), S::Error> {
        if let Some(pending) = self.pending.take() {
            self.sink.write_row(&pending)?;
            self.written += 1;
        }
        Ok(())
    }

    /// Flush and hand back the sink.
    ///
    /// # Errors
    ///
    /// Propagates sink write failures.
    pub fn finish(mut self) -> Result<S, S::Error> {
        self.flush()?;
        Ok(self.sink)
    }

    /// Rows passed to [`Self::observe`].
    #[must_use]
    pub const fn observed(&self) -> u64 {
        self.observed
    }

    /// Rows written to the sink so far.
    #[must_use]
    pub const fn written(&self) -> u64 {
        self.written
    }

    #[must_use]
    pub const fn pending(&self) -> Option<&ResolvedRow> {
        self.pending.as_ref()
    }
}
