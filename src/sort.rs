//! External sorter.

use std::path::Path;
use std::sync::Arc;

use log;

use crate::buffer::RowBatch;
use crate::builder::{BuiltRuns, RunBuilder};
use crate::cell::MissingOrder;
use crate::compare::{RowComparator, SortSpec};
use crate::context::{ExecutionContext, NoopContext, Progress, BUILD_PHASE_END, INTERMEDIATE_PHASE_END};
use crate::error::{BoxedError, ConfigError, SortError};
use crate::merger::HeapMerger;
use crate::oracle::{MemoryPressureOracle, NoMemoryPressure};
use crate::projection::Projection;
use crate::row::{Row, Schema};
use crate::sink::RowSink;
use crate::store::{FileRunStore, RunHandle, RunStore};

/// Default maximum number of runs read at the same time.
pub const DEFAULT_MAX_OPEN_CONTAINERS: usize = 32;

/// Outcome of a successful sort.
#[derive(Debug, Clone, PartialEq)]
pub struct SortSummary {
    /// Rows read from the input.
    pub input_rows: u64,
    /// Rows pushed to the sink.
    pub output_rows: u64,
    /// Sorted runs written while reading the input. Zero if the input was sorted in memory.
    pub runs: usize,
    /// Merge passes that wrote intermediate runs.
    pub intermediate_passes: usize,
    /// Schema of the emitted rows.
    pub schema: Schema,
}

/// External sorter builder. Provides methods for [`ExternalSorter`] initialization.
#[derive(Clone)]
pub struct ExternalSorterBuilder {
    /// Maximum number of rows in a single run.
    max_rows_per_container: usize,
    /// Maximum number of runs read at the same time while merging.
    max_open_containers: usize,
    /// Number of rows between two memory pressure checks.
    memory_check_interval: usize,
    /// Memory pressure signal.
    oracle: Arc<dyn MemoryPressureOracle>,
    /// Cancellation and progress hooks.
    context: Arc<dyn ExecutionContext>,
    /// Placement of missing cells.
    missing_order: MissingOrder,
    /// Whether an input fitting a single batch is sorted without spilling.
    in_memory: bool,
    /// Number of threads to be used to sort batches in parallel.
    threads_number: Option<usize>,
    /// Directory to be used to store temporary data.
    tmp_dir: Option<Box<Path>>,
    /// Run file read/write buffer size.
    rw_buf_size: Option<usize>,
    /// Maximum estimated memory of a single batch.
    #[cfg(feature = "memory-limit")]
    max_batch_bytes: Option<u64>,
}

impl ExternalSorterBuilder {
    /// Creates an instance of a builder with default parameters.
    pub fn new() -> Self {
        ExternalSorterBuilder::default()
    }

    /// Builds an [`ExternalSorter`] storing runs in temporary files.
    pub fn build(self) -> Result<ExternalSorter<FileRunStore>, SortError> {
        self.validate()?;
        let store = FileRunStore::new(self.tmp_dir.as_deref(), self.rw_buf_size)?;
        self.build_with_store(store)
    }

    /// Builds an [`ExternalSorter`] storing runs in `store`.
    pub fn build_with_store<S: RunStore>(self, store: S) -> Result<ExternalSorter<S>, SortError> {
        self.validate()?;

        return Ok(ExternalSorter {
            thread_pool: Self::init_thread_pool(self.threads_number)?,
            max_rows_per_container: self.max_rows_per_container,
            max_open_containers: self.max_open_containers,
            memory_check_interval: self.memory_check_interval,
            oracle: self.oracle,
            context: self.context,
            missing_order: self.missing_order,
            in_memory: self.in_memory,
            #[cfg(feature = "memory-limit")]
            max_batch_bytes: self.max_batch_bytes,
            store,
        });
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_open_containers < 2 {
            return Err(ConfigError::InvalidOption {
                name: "max_open_containers",
                reason: format!("at least 2 runs must be mergeable at once, got {}", self.max_open_containers),
            });
        }
        if self.max_rows_per_container == 0 {
            return Err(ConfigError::InvalidOption {
                name: "max_rows_per_container",
                reason: "must be positive".to_string(),
            });
        }
        if self.memory_check_interval == 0 {
            return Err(ConfigError::InvalidOption {
                name: "memory_check_interval",
                reason: "must be positive".to_string(),
            });
        }
        if self.threads_number == Some(0) {
            return Err(ConfigError::InvalidOption {
                name: "threads_number",
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }

    fn init_thread_pool(threads_number: Option<usize>) -> Result<Option<rayon::ThreadPool>, SortError> {
        let threads_number = match threads_number {
            Some(threads_number) => threads_number,
            None => {
                log::info!("sorting batches on the calling thread");
                return Ok(None);
            }
        };

        log::info!("initializing thread-pool (threads: {})", threads_number);
        let thread_pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads_number)
            .build()
            .map_err(SortError::ThreadPoolBuildError)?;

        return Ok(Some(thread_pool));
    }

    /// Sets the maximum number of rows per run. Unbounded by default.
    pub fn with_max_rows_per_container(mut self, max_rows: usize) -> ExternalSorterBuilder {
        self.max_rows_per_container = max_rows;
        return self;
    }

    /// Sets the maximum number of runs read at the same time. Must be at least 2.
    pub fn with_max_open_containers(mut self, max_open: usize) -> ExternalSorterBuilder {
        self.max_open_containers = max_open;
        return self;
    }

    /// Sets the memory pressure oracle.
    pub fn with_memory_oracle(mut self, oracle: Arc<dyn MemoryPressureOracle>) -> ExternalSorterBuilder {
        self.oracle = oracle;
        return self;
    }

    /// Sets the number of rows between two oracle polls.
    pub fn with_memory_check_interval(mut self, rows: usize) -> ExternalSorterBuilder {
        self.memory_check_interval = rows;
        return self;
    }

    /// Sets the execution context used for cancellation and progress.
    pub fn with_context(mut self, context: Arc<dyn ExecutionContext>) -> ExternalSorterBuilder {
        self.context = context;
        return self;
    }

    /// Sets where missing cells sort.
    pub fn with_missing_order(mut self, missing_order: MissingOrder) -> ExternalSorterBuilder {
        self.missing_order = missing_order;
        return self;
    }

    /// Enables or disables sorting a single batch without spilling it. Enabled by default.
    pub fn with_in_memory_fast_path(mut self, enabled: bool) -> ExternalSorterBuilder {
        self.in_memory = enabled;
        return self;
    }

    /// Sets number of threads to be used to sort batches in parallel.
    pub fn with_threads_number(mut self, threads_number: usize) -> ExternalSorterBuilder {
        self.threads_number = Some(threads_number);
        return self;
    }

    /// Sets directory to be used to store temporary data.
    pub fn with_tmp_dir(mut self, path: &Path) -> ExternalSorterBuilder {
        self.tmp_dir = Some(path.into());
        return self;
    }

    /// Sets run read/write buffer size.
    pub fn with_rw_buf_size(mut self, buf_size: usize) -> ExternalSorterBuilder {
        self.rw_buf_size = Some(buf_size);
        return self;
    }

    /// Sets the maximum estimated memory of a batch.
    #[cfg(feature = "memory-limit")]
    pub fn with_max_batch_bytes(mut self, bytes: u64) -> ExternalSorterBuilder {
        self.max_batch_bytes = Some(bytes);
        return self;
    }
}

impl Default for ExternalSorterBuilder {
    fn default() -> Self {
        ExternalSorterBuilder {
            max_rows_per_container: usize::MAX,
            max_open_containers: DEFAULT_MAX_OPEN_CONTAINERS,
            memory_check_interval: 1,
            oracle: Arc::new(NoMemoryPressure),
            context: Arc::new(NoopContext),
            missing_order: MissingOrder::default(),
            in_memory: true,
            threads_number: None,
            tmp_dir: None,
            rw_buf_size: None,
            #[cfg(feature = "memory-limit")]
            max_batch_bytes: None,
        }
    }
}

/// External sorter.
pub struct ExternalSorter<S: RunStore = FileRunStore> {
    max_rows_per_container: usize,
    max_open_containers: usize,
    memory_check_interval: usize,
    oracle: Arc<dyn MemoryPressureOracle>,
    context: Arc<dyn ExecutionContext>,
    missing_order: MissingOrder,
    in_memory: bool,
    /// Batch sorting thread pool.
    thread_pool: Option<rayon::ThreadPool>,
    #[cfg(feature = "memory-limit")]
    max_batch_bytes: Option<u64>,
    store: S,
}

impl ExternalSorter<FileRunStore> {
    /// Directory holding the run files.
    pub fn tmp_path(&self) -> &Path {
        self.store.path()
    }
}

impl<S: RunStore> ExternalSorter<S> {
    /// Run store used by the sorter.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Sorts rows from the input and pushes them, in order, to `sink`.
    ///
    /// # Arguments
    /// * `schema` - Schema of the input rows
    /// * `input` - Input stream rows to be fetched from
    /// * `spec` - Sort keys, in terms of `schema` columns
    /// * `sink` - Consumer of the sorted rows
    ///
    /// On error, including cancellation, every temporary run is deleted before returning and
    /// whatever the sink received must be discarded.
    pub fn sort<I, E, K>(
        &mut self,
        schema: &Schema,
        input: I,
        spec: &SortSpec,
        sink: &mut K,
    ) -> Result<SortSummary, SortError>
    where
        I: IntoIterator<Item = Result<Row, E>>,
        E: Into<BoxedError>,
        K: RowSink + ?Sized,
    {
        let comparator = RowComparator::new(spec, schema, self.missing_order)?;
        self.run(schema, input, None, &comparator, sink)
    }

    /// Sorts rows from the input restricted to `columns`.
    ///
    /// Every row is projected to `columns` (in that order) before it is sorted; `spec` refers to
    /// positions within `columns`. Emitted rows carry only the projected cells.
    pub fn sort_projected<I, E, K>(
        &mut self,
        schema: &Schema,
        input: I,
        columns: &[usize],
        spec: &SortSpec,
        sink: &mut K,
    ) -> Result<SortSummary, SortError>
    where
        I: IntoIterator<Item = Result<Row, E>>,
        E: Into<BoxedError>,
        K: RowSink + ?Sized,
    {
        let projection = Projection::new(schema, columns)?;
        let comparator = RowComparator::new(spec, projection.schema(), self.missing_order)?;
        self.run(schema, input, Some(&projection), &comparator, sink)
    }

    fn run<I, E, K>(
        &mut self,
        schema: &Schema,
        input: I,
        projection: Option<&Projection>,
        comparator: &RowComparator,
        sink: &mut K,
    ) -> Result<SortSummary, SortError>
    where
        I: IntoIterator<Item = Result<Row, E>>,
        E: Into<BoxedError>,
        K: RowSink + ?Sized,
    {
        let mut progress = Progress::new(self.context.clone());
        let result = self.run_inner(schema, input, projection, comparator, sink, &mut progress);

        if let Err(err) = &result {
            log::debug!("sorting failed: {}", err);
            if let Err(purge_err) = self.store.purge() {
                log::warn!("temporary runs cleanup failed: {}", purge_err);
            }
        }

        return result;
    }

    fn new_batch(&self) -> RowBatch {
        let batch = RowBatch::new(self.max_rows_per_container);
        #[cfg(feature = "memory-limit")]
        let batch = match self.max_batch_bytes {
            Some(bytes) => batch.with_byte_limit(bytes),
            None => batch,
        };
        batch
    }

    fn run_inner<I, E, K>(
        &mut self,
        schema: &Schema,
        input: I,
        projection: Option<&Projection>,
        comparator: &RowComparator,
        sink: &mut K,
        progress: &mut Progress,
    ) -> Result<SortSummary, SortError>
    where
        I: IntoIterator<Item = Result<Row, E>>,
        E: Into<BoxedError>,
        K: RowSink + ?Sized,
    {
        let output_schema = match projection {
            Some(projection) => projection.schema().clone(),
            None => schema.clone(),
        };

        let input = input.into_iter();
        let expected_rows = match input.size_hint() {
            (lower, Some(upper)) if lower == upper => Some(lower as u64),
            _ => None,
        };

        let batch = self.new_batch();
        let mut builder = RunBuilder::new(
            &mut self.store,
            comparator,
            self.oracle.as_ref(),
            self.thread_pool.as_ref(),
            progress,
            batch,
            output_schema.width(),
            self.memory_check_interval,
        )
        .with_expected_rows(expected_rows);

        for item in input {
            let row = item.map_err(|err| SortError::InputError(err.into()))?;
            let row = match projection {
                Some(projection) => {
                    if row.width() != schema.width() {
                        return Err(SortError::InvalidRow {
                            expected: schema.width(),
                            actual: row.width(),
                        });
                    }
                    projection.apply(row)
                }
                None => row,
            };
            builder.offer(row)?;
        }

        let input_rows = builder.rows();
        let built = builder.finish(self.in_memory)?;

        let (runs, intermediate_passes, output_rows) = match built {
            BuiltRuns::InMemory(rows) => {
                let output_rows = Self::emit(rows.into_iter().map(Ok), input_rows, sink, progress)?;
                (0, 0, output_rows)
            }
            BuiltRuns::Spilled(runs) => {
                let run_count = runs.len();
                let (passes, output_rows) = self.merge(runs, comparator, sink, progress)?;
                (run_count, passes, output_rows)
            }
        };

        progress.report(1.0, "sorting finished");
        log::info!(
            "sorted {} rows ({} runs, {} intermediate merge passes)",
            output_rows,
            runs,
            intermediate_passes
        );

        return Ok(SortSummary {
            input_rows,
            output_rows,
            runs,
            intermediate_passes,
            schema: output_schema,
        });
    }

    /// Merges `runs` into `sink`, never reading more than `max_open_containers` runs at once.
    ///
    /// While there are more runs than that, consecutive groups are merged into intermediate
    /// runs, reducing the run count by that factor each pass.
    fn merge<K>(
        &mut self,
        mut runs: Vec<RunHandle>,
        comparator: &RowComparator,
        sink: &mut K,
        progress: &mut Progress,
    ) -> Result<(usize, u64), SortError>
    where
        K: RowSink + ?Sized,
    {
        let fan_in = self.max_open_containers;
        let total_rows: u64 = runs.iter().map(|run| run.rows()).sum();
        let planned_passes = plan_passes(runs.len(), fan_in);
        let intermediate_rows = total_rows * planned_passes as u64;
        let compare = |a: &Row, b: &Row| comparator.compare(a, b);

        let mut pass = 0;
        let mut merged_rows: u64 = 0;

        while runs.len() > fan_in {
            pass += 1;
            log::debug!("merge pass {}/{}: {} runs", pass, planned_passes, runs.len());
            progress.message(&format!("merge pass {} of {}: {} runs", pass, planned_passes, runs.len()));

            let mut next_runs = Vec::with_capacity((runs.len() + fan_in - 1) / fan_in);
            while !runs.is_empty() {
                let tail = runs.split_off(fan_in.min(runs.len()));
                let group = std::mem::replace(&mut runs, tail);

                if group.len() == 1 {
                    next_runs.extend(group);
                    continue;
                }

                let readers = group
                    .into_iter()
                    .map(|run| self.store.open_reader(run))
                    .collect::<Result<Vec<S::Reader>, SortError>>()?;

                let merged = HeapMerger::new(readers, compare).map(|row| -> Result<Row, SortError> {
                    progress.check_canceled()?;
                    merged_rows += 1;
                    progress.rows(
                        merged_rows,
                        intermediate_rows,
                        BUILD_PHASE_END,
                        INTERMEDIATE_PHASE_END,
                        "merging runs",
                    );
                    row
                });
                let run = self.store.create_run(merged)?;
                log::trace!("intermediate run {} written ({} rows)", run.id(), run.rows());
                next_runs.push(run);
            }

            runs = next_runs;
            progress.report(
                BUILD_PHASE_END + (INTERMEDIATE_PHASE_END - BUILD_PHASE_END) * pass as f64 / planned_passes as f64,
                &format!("merge pass {} of {} done", pass, planned_passes),
            );
        }

        log::debug!("final merge of {} runs", runs.len());
        progress.message(&format!("final merge of {} runs", runs.len()));
        let readers = runs
            .into_iter()
            .map(|run| self.store.open_reader(run))
            .collect::<Result<Vec<S::Reader>, SortError>>()?;

        let output_rows = Self::emit(HeapMerger::new(readers, compare), total_rows, sink, progress)?;

        return Ok((pass, output_rows));
    }

    /// Pushes sorted rows to the sink, checking for cancellation before each row.
    fn emit<R, K>(rows: R, total_rows: u64, sink: &mut K, progress: &mut Progress) -> Result<u64, SortError>
    where
        R: Iterator<Item = Result<Row, SortError>>,
        K: RowSink + ?Sized,
    {
        let mut emitted = 0;
        for row in rows {
            progress.check_canceled()?;
            sink.accept(row?).map_err(SortError::SinkError)?;
            emitted += 1;
            progress.rows(emitted, total_rows, INTERMEDIATE_PHASE_END, 1.0, "writing sorted rows");
        }

        Ok(emitted)
    }
}

/// Number of intermediate merge passes needed to bring `runs` down to `fan_in`.
fn plan_passes(mut runs: usize, fan_in: usize) -> usize {
    let mut passes = 0;
    while runs > fan_in {
        runs = (runs + fan_in - 1) / fan_in;
        passes += 1;
    }
    passes
}
