//! Execution context: cancellation checks and progress reporting.

use std::sync::Arc;

use crate::error::SortError;

/// Hooks supplied by the surrounding execution environment.
pub trait ExecutionContext: Send + Sync {
    /// Returns `true` once the caller wants the sort aborted.
    fn is_canceled(&self) -> bool;

    /// Receives overall progress in `[0.0, 1.0]` together with a short status message.
    fn set_progress(&self, fraction: f64, message: &str);
}

/// Context that is never canceled and discards progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopContext;

impl ExecutionContext for NoopContext {
    fn is_canceled(&self) -> bool {
        false
    }

    fn set_progress(&self, _fraction: f64, _message: &str) {}
}

// phase boundaries of the overall progress range
pub(crate) const BUILD_PHASE_END: f64 = 0.3;
pub(crate) const INTERMEDIATE_PHASE_END: f64 = 0.6;

// progress is pushed at most once per this many rows
const REPORT_EVERY: u64 = 1024;

/// Reports progress through a context, never letting the fraction go backwards.
pub(crate) struct Progress {
    context: Arc<dyn ExecutionContext>,
    last: f64,
}

impl Progress {
    pub fn new(context: Arc<dyn ExecutionContext>) -> Self {
        Progress { context, last: 0.0 }
    }

    /// Returns [`SortError::Canceled`] if the context requested cancellation.
    pub fn check_canceled(&self) -> Result<(), SortError> {
        if self.context.is_canceled() {
            log::debug!("cancellation requested");
            return Err(SortError::Canceled);
        }
        Ok(())
    }

    /// Reports `fraction` unless it would move progress backwards.
    pub fn report(&mut self, fraction: f64, message: &str) {
        let fraction = fraction.clamp(0.0, 1.0).max(self.last);
        self.last = fraction;
        self.context.set_progress(fraction, message);
    }

    /// Reports the position of `done` rows within `[start, end)`, throttled by row count.
    pub fn rows(&mut self, done: u64, total: u64, start: f64, end: f64, message: &str) {
        if done % REPORT_EVERY != 0 || total == 0 {
            return;
        }
        let fraction = start + (end - start) * (done as f64 / total as f64);
        self.report(fraction, &format!("{} ({} of {} rows)", message, done, total));
    }

    /// Repeats the last fraction with a new message.
    pub fn message(&mut self, message: &str) {
        let last = self.last;
        self.report(last, message);
    }
}
