//! `SimOutputObserver<W>` — bridges `SimObserver` to an `OutputWriter`.

use qsim_core::SimTime;
use qsim_events::Event;
use qsim_sim::{SimObserver, SimStats, StepSummary};

use crate::row::{EventRow, StepSummaryRow};
use crate::writer::OutputWriter;
use crate::{OutputError, OutputResult};

/// A [`SimObserver`] that writes the merged event stream and per-step
/// summaries to any [`OutputWriter`] backend (CSV, SQLite, Parquet, …).
///
/// Errors from the writer are stored internally because `SimObserver` methods
/// have no return value.  After `sim.run()` returns, check for errors with
/// [`take_error`][Self::take_error].
pub struct SimOutputObserver<W: OutputWriter> {
    writer:     W,
    last_error: Option<OutputError>,
}

impl<W: OutputWriter> SimOutputObserver<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, last_error: None }
    }

    /// Take the stored write error (if any) after `sim.run()` returns.
    ///
    /// Returns `None` if all writes succeeded.
    pub fn take_error(&mut self) -> Option<OutputError> {
        self.last_error.take()
    }

    /// Unwrap the inner writer (e.g. to inspect files after the sim).
    pub fn into_writer(self) -> W {
        self.writer
    }

    fn store_err(&mut self, result: OutputResult<()>) {
        if let Err(e) = result {
            // Keep only the first error.
            if self.last_error.is_none() {
                self.last_error = Some(e);
            }
        }
    }
}

impl<W: OutputWriter> SimObserver for SimOutputObserver<W> {
    fn on_events(&mut self, events: &[Event]) {
        if events.is_empty() {
            return;
        }
        let rows: Vec<EventRow> = events.iter().map(EventRow::from).collect();
        let result = self.writer.write_events(&rows);
        self.store_err(result);
    }

    fn on_step_end(&mut self, _now: SimTime, summary: &StepSummary) {
        let result = self.writer.write_step_summary(&StepSummaryRow::from(summary));
        self.store_err(result);
    }

    fn on_sim_end(&mut self, _stats: &SimStats) {
        let result = self.writer.finish();
        self.store_err(result);
    }
}
