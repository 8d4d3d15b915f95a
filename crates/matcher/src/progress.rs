//! Progress observation for long matching runs.
//!
//! Observers see immutable reports only. The engine calls them synchronously,
//! once per source record in processing order; a panicking observer is
//! detached for the rest of the run and matching continues.

use crate::model::{Classification, MatchDiagnostics};

/// What the engine reports after classifying one source record.
#[derive(Debug, Clone, Copy)]
pub struct RecordReport<'a> {
    /// Zero-based position in processing order.
    pub position: usize,
    pub total: usize,
    /// Index of the source record in the caller's collection.
    pub source_index: usize,
    pub classification: &'a Classification,
}

pub trait MatchObserver {
    /// Called once before the first record, with the number of source records.
    fn begin(&mut self, _total: usize) {}

    /// Called once per processed source record.
    fn record_done(&mut self, _report: &RecordReport<'_>) {}

    /// Called once after the last record.
    fn finish(&mut self, _diagnostics: &MatchDiagnostics) {}
}

/// A no-op observer.
pub struct NullObserver;
impl MatchObserver for NullObserver {}

/// Plain closures work as per-record observers.
impl<F> MatchObserver for F
where
    F: FnMut(&RecordReport<'_>),
{
    fn record_done(&mut self, report: &RecordReport<'_>) {
        self(report)
    }
}
