//! `ext-table-sort` is an external, memory-pressure-aware, multi-key sort for tabular rows.
//!
//! External sorting is required when the rows being sorted do not fit into the main memory (RAM)
//! of a computer and instead must be resided in slower external memory, usually a hard disk drive.
//! Rows are accumulated into in-memory batches; a batch is sorted and written to disk as a *run*
//! whenever it reaches a row limit or a memory pressure signal fires. The runs are then merged
//! into a single sorted stream pushed to a sink. For more information see
//! [External Sorting](https://en.wikipedia.org/wiki/External_sorting).
//!
//! # Overview
//!
//! `ext-table-sort` supports the following features:
//!
//! * **Multi-key sorting:**
//!   rows are compared by an ordered list of columns, each ascending or descending, with missing
//!   cells placed at a configurable extreme.
//! * **Memory pressure awareness:**
//!   any [`MemoryPressureOracle`] can force the current batch to disk before memory runs out.
//! * **Bounded file handles:**
//!   at most `max_open_containers` runs are read at once; larger run counts are merged in several
//!   passes.
//! * **Column projection:**
//!   rows can be narrowed to a subset of columns before sorting to cut comparison and I/O cost.
//! * **Cancellation and progress:**
//!   an [`ExecutionContext`] is polled for cancellation and receives progress updates; temporary
//!   runs are always cleaned up on failure.
//! * **Memory limit support:**
//!   batches can be limited by their estimated memory size (`memory-limit` feature required).
//!
//! # Example
//!
//! ```no_run
//! use std::convert::Infallible;
//! use std::path;
//!
//! use ext_table_sort::{
//!     Cell, ColumnSpec, ColumnType, ExternalSorterBuilder, Row, Schema, SortKey, SortSpec,
//! };
//!
//! let schema = Schema::new(vec![
//!     ColumnSpec::new("name", ColumnType::Text),
//!     ColumnSpec::new("age", ColumnType::Int),
//! ]);
//! let rows = vec![
//!     Row::new(0, vec![Cell::Text("bob".into()), Cell::Int(42)]),
//!     Row::new(1, vec![Cell::Text("alice".into()), Cell::Missing]),
//! ];
//!
//! let mut sorter = ExternalSorterBuilder::new()
//!     .with_tmp_dir(path::Path::new("./"))
//!     .with_max_rows_per_container(1_000_000)
//!     .build()
//!     .unwrap();
//!
//! let mut sorted: Vec<Row> = Vec::new();
//! sorter
//!     .sort(
//!         &schema,
//!         rows.into_iter().map(Ok::<_, Infallible>),
//!         &SortSpec::new(vec![SortKey::desc(1), SortKey::asc(0)]),
//!         &mut sorted,
//!     )
//!     .unwrap();
//! ```

pub mod buffer;
mod builder;
pub mod cell;
pub mod compare;
pub mod context;
pub mod error;
pub mod merger;
pub mod oracle;
pub mod projection;
pub mod row;
pub mod sink;
pub mod sort;
pub mod store;

pub use buffer::RowBatch;
pub use cell::{Cell, ColumnType, MissingOrder};
pub use compare::{Direction, RowComparator, SortColumn, SortKey, SortSpec};
pub use context::{ExecutionContext, NoopContext};
pub use error::{BoxedError, ConfigError, SortError};
pub use merger::HeapMerger;
pub use oracle::{MemoryBudget, MemoryPressureOracle, NoMemoryPressure, PressureFlag};
pub use projection::Projection;
pub use row::{ColumnSpec, Row, RowKey, Schema};
pub use sink::{CountingSink, FnSink, RowSink};
pub use sort::{ExternalSorter, ExternalSorterBuilder, SortSummary, DEFAULT_MAX_OPEN_CONTAINERS};
pub use store::{FileRunStore, MemoryRunStore, RunHandle, RunStore, RunStoreStats};
