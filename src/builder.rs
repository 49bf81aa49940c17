//! Run builder: turns the input row stream into sorted runs.

use crate::buffer::RowBatch;
use crate::compare::RowComparator;
use crate::context::{Progress, BUILD_PHASE_END};
use crate::error::SortError;
use crate::oracle::MemoryPressureOracle;
use crate::row::Row;
use crate::store::{RunHandle, RunStore};

/// Result of the run building phase.
pub(crate) enum BuiltRuns {
    /// The whole input fit in a single batch, sorted but never spilled.
    InMemory(Vec<Row>),
    /// Sorted runs persisted in the run store.
    Spilled(Vec<RunHandle>),
}

/// Accumulates rows into a batch and flushes it into a sorted run whenever the row limit, the
/// memory limit or the memory pressure oracle says so.
pub(crate) struct RunBuilder<'a, S: RunStore> {
    store: &'a mut S,
    comparator: &'a RowComparator,
    oracle: &'a dyn MemoryPressureOracle,
    pool: Option<&'a rayon::ThreadPool>,
    progress: &'a mut Progress,
    batch: RowBatch,
    width: usize,
    check_interval: usize,
    since_check: usize,
    runs: Vec<RunHandle>,
    rows: u64,
    expected_rows: Option<u64>,
}

impl<'a, S: RunStore> RunBuilder<'a, S> {
    pub fn new(
        store: &'a mut S,
        comparator: &'a RowComparator,
        oracle: &'a dyn MemoryPressureOracle,
        pool: Option<&'a rayon::ThreadPool>,
        progress: &'a mut Progress,
        batch: RowBatch,
        width: usize,
        check_interval: usize,
    ) -> Self {
        RunBuilder {
            store,
            comparator,
            oracle,
            pool,
            progress,
            batch,
            width,
            check_interval: check_interval.max(1),
            since_check: 0,
            runs: Vec::new(),
            rows: 0,
            expected_rows: None,
        }
    }

    /// Sets the number of rows the input is known to produce, enabling progress reports.
    pub fn with_expected_rows(mut self, expected_rows: Option<u64>) -> Self {
        self.expected_rows = expected_rows;
        return self;
    }

    /// Number of rows offered so far.
    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Adds a row to the current batch, flushing the batch if required.
    pub fn offer(&mut self, row: Row) -> Result<(), SortError> {
        if row.width() != self.width {
            return Err(SortError::InvalidRow {
                expected: self.width,
                actual: row.width(),
            });
        }

        self.batch.push(row);
        self.rows += 1;

        if let Some(expected) = self.expected_rows {
            self.progress
                .rows(self.rows, expected, 0.0, BUILD_PHASE_END, "reading input");
        }

        if self.batch.is_full() {
            log::debug!("row limit reached");
            return self.flush();
        }
        if self.batch.is_over_budget() {
            log::debug!("batch memory limit reached");
            return self.flush();
        }

        self.since_check += 1;
        if self.since_check >= self.check_interval {
            self.since_check = 0;
            if self.oracle.low_memory_action_required() {
                log::debug!("low memory, flushing {} rows", self.batch.len());
                return self.flush();
            }
        }

        Ok(())
    }

    fn flush(&mut self) -> Result<(), SortError> {
        self.progress.check_canceled()?;
        if self.batch.is_empty() {
            return Ok(());
        }

        log::debug!("sorting batch of {} rows ...", self.batch.len());
        let comparator = self.comparator;
        self.batch.sort_by(self.pool, |a, b| comparator.compare(a, b));

        log::debug!("saving run #{}", self.runs.len());
        let rows = self.batch.take();
        let handle = self.store.create_run(rows.into_iter().map(Ok))?;
        self.runs.push(handle);
        self.since_check = 0;

        Ok(())
    }

    /// Finishes the input.
    ///
    /// If nothing was spilled and `in_memory` is set the last batch is returned sorted without
    /// touching the store, otherwise it is flushed as a final run.
    pub fn finish(mut self, in_memory: bool) -> Result<BuiltRuns, SortError> {
        if in_memory && self.runs.is_empty() {
            self.progress.check_canceled()?;
            let comparator = self.comparator;
            self.batch.sort_by(self.pool, |a, b| comparator.compare(a, b));
            log::debug!("input fit in memory ({} rows)", self.batch.len());
            return Ok(BuiltRuns::InMemory(self.batch.take()));
        }

        self.flush()?;
        log::debug!("run building done: {} rows in {} runs", self.rows, self.runs.len());
        self.progress.report(BUILD_PHASE_END, "input sorted into runs");

        Ok(BuiltRuns::Spilled(self.runs))
    }
}
