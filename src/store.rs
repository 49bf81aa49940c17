//! Sorted run storage.
//!
//! A run is written once, read once and deleted. Opening a reader hands the run over to the
//! reader: it is deleted as soon as the reader is drained, or when the reader is dropped.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::io::prelude::*;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tempfile;

use crate::error::SortError;
use crate::row::Row;

/// Identifier of a persisted run.
#[derive(Debug, PartialEq, Eq)]
pub struct RunHandle {
    id: u64,
    rows: u64,
}

impl RunHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Number of rows in the run.
    pub fn rows(&self) -> u64 {
        self.rows
    }
}

/// Snapshot of run store instrumentation counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStoreStats {
    /// Runs created since the store was built.
    pub runs_created: usize,
    /// Runs not yet deleted.
    pub live_runs: usize,
    /// Readers currently open.
    pub open_readers: usize,
    /// Highest number of readers open at the same time.
    pub peak_open_readers: usize,
}

/// Run storage interface.
pub trait RunStore {
    /// Forward-only reader over a single run.
    type Reader: Iterator<Item = Result<Row, SortError>>;

    /// Persists an already sorted row sequence as a new run.
    /// If `rows` yields an error, or writing fails, no run is left behind.
    fn create_run<I>(&mut self, rows: I) -> Result<RunHandle, SortError>
    where
        I: IntoIterator<Item = Result<Row, SortError>>;

    /// Opens a run for reading. The reader takes ownership of the run.
    fn open_reader(&mut self, handle: RunHandle) -> Result<Self::Reader, SortError>;

    /// Deletes a run that has not been opened.
    fn delete_run(&mut self, handle: RunHandle) -> Result<(), SortError>;

    /// Deletes every run that has not been opened.
    fn purge(&mut self) -> Result<(), SortError>;

    /// Returns instrumentation counters.
    fn stats(&self) -> RunStoreStats;
}

#[derive(Debug, Default)]
struct Counters {
    runs_created: AtomicUsize,
    live_runs: AtomicUsize,
    open_readers: AtomicUsize,
    peak_open_readers: AtomicUsize,
}

impl Counters {
    fn snapshot(&self) -> RunStoreStats {
        RunStoreStats {
            runs_created: self.runs_created.load(Ordering::Relaxed),
            live_runs: self.live_runs.load(Ordering::Relaxed),
            open_readers: self.open_readers.load(Ordering::Relaxed),
            peak_open_readers: self.peak_open_readers.load(Ordering::Relaxed),
        }
    }

    fn run_created(&self) {
        self.runs_created.fetch_add(1, Ordering::Relaxed);
        self.live_runs.fetch_add(1, Ordering::Relaxed);
    }

    fn run_deleted(&self) {
        self.live_runs.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Open reader accounting. Released on drop.
#[derive(Debug)]
struct OpenGuard {
    counters: Arc<Counters>,
}

impl OpenGuard {
    fn new(counters: Arc<Counters>) -> Self {
        let open = counters.open_readers.fetch_add(1, Ordering::Relaxed) + 1;
        counters.peak_open_readers.fetch_max(open, Ordering::Relaxed);
        OpenGuard { counters }
    }
}

impl Drop for OpenGuard {
    fn drop(&mut self) {
        self.counters.open_readers.fetch_sub(1, Ordering::Relaxed);
    }
}

/// File system run store.
///
/// Each run is a MessagePack encoded file inside a private temporary directory.
/// For more information see https://msgpack.org/.
pub struct FileRunStore {
    dir: tempfile::TempDir,
    rw_buf_size: Option<usize>,
    runs: HashMap<u64, tempfile::TempPath>,
    next_id: u64,
    counters: Arc<Counters>,
}

impl FileRunStore {
    /// Creates a store in a new temporary directory inside `tmp_path`,
    /// or inside the OS temporary directory if `tmp_path` is [`None`].
    pub fn new(tmp_path: Option<&Path>, rw_buf_size: Option<usize>) -> Result<Self, SortError> {
        let dir = if let Some(tmp_path) = tmp_path {
            tempfile::tempdir_in(tmp_path)
        } else {
            tempfile::tempdir()
        }
        .map_err(SortError::TempDir)?;

        log::info!("using {} as a temporary directory", dir.path().display());

        return Ok(FileRunStore {
            dir,
            rw_buf_size,
            runs: HashMap::new(),
            next_id: 0,
            counters: Arc::new(Counters::default()),
        });
    }

    /// Directory holding the run files.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    fn write_rows<I>(writer: &mut io::BufWriter<fs::File>, rows: I) -> Result<u64, SortError>
    where
        I: IntoIterator<Item = Result<Row, SortError>>,
    {
        let mut count = 0;
        for row in rows.into_iter() {
            rmp_serde::encode::write(writer, &row?)?;
            count += 1;
        }
        writer.flush()?;

        return Ok(count);
    }
}

impl RunStore for FileRunStore {
    type Reader = RmpRunReader;

    fn create_run<I>(&mut self, rows: I) -> Result<RunHandle, SortError>
    where
        I: IntoIterator<Item = Result<Row, SortError>>,
    {
        let tmp_file = tempfile::Builder::new()
            .prefix("run-")
            .tempfile_in(self.dir.path())
            .map_err(SortError::TempDir)?;

        let mut writer = match self.rw_buf_size {
            Some(buf_size) => io::BufWriter::with_capacity(buf_size, tmp_file.reopen()?),
            None => io::BufWriter::new(tmp_file.reopen()?),
        };

        // on error the temporary file is dropped and removed with it
        let rows = Self::write_rows(&mut writer, rows)?;
        drop(writer);

        let id = self.next_id;
        self.next_id += 1;
        self.runs.insert(id, tmp_file.into_temp_path());
        self.counters.run_created();

        log::trace!("run {} saved ({} rows)", id, rows);
        return Ok(RunHandle { id, rows });
    }

    fn open_reader(&mut self, handle: RunHandle) -> Result<Self::Reader, SortError> {
        let path = self
            .runs
            .remove(&handle.id)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("run {} not found", handle.id)))?;

        let file = match fs::File::open(&path) {
            Ok(file) => file,
            Err(err) => {
                self.counters.run_deleted();
                return Err(err.into());
            }
        };
        let reader = match self.rw_buf_size {
            Some(buf_size) => io::BufReader::with_capacity(buf_size, file),
            None => io::BufReader::new(file),
        };

        return Ok(RmpRunReader {
            open: Some((reader, OpenGuard::new(self.counters.clone()))),
            path: Some(path),
            remaining: handle.rows,
            counters: self.counters.clone(),
        });
    }

    fn delete_run(&mut self, handle: RunHandle) -> Result<(), SortError> {
        if let Some(path) = self.runs.remove(&handle.id) {
            self.counters.run_deleted();
            path.close()?;
        }
        Ok(())
    }

    fn purge(&mut self) -> Result<(), SortError> {
        let mut result = Ok(());
        for (_, path) in self.runs.drain() {
            self.counters.run_deleted();
            if let Err(err) = path.close() {
                log::warn!("run file removal failed: {}", err);
                result = Err(err.into());
            }
        }
        result
    }

    fn stats(&self) -> RunStoreStats {
        self.counters.snapshot()
    }
}

/// RMP (Rust MessagePack) run reader.
pub struct RmpRunReader {
    open: Option<(io::BufReader<fs::File>, OpenGuard)>,
    path: Option<tempfile::TempPath>,
    remaining: u64,
    counters: Arc<Counters>,
}

impl RmpRunReader {
    /// Closes the file and deletes the run.
    fn close(&mut self) -> Result<(), SortError> {
        self.open = None;
        if let Some(path) = self.path.take() {
            self.counters.run_deleted();
            path.close()?;
        }
        Ok(())
    }
}

impl Iterator for RmpRunReader {
    type Item = Result<Row, SortError>;

    fn next(&mut self) -> Option<Self::Item> {
        let (reader, _) = self.open.as_mut()?;

        if self.remaining == 0 {
            return self.close().err().map(Err);
        }

        match rmp_serde::decode::from_read(reader) {
            Ok(row) => {
                self.remaining -= 1;
                Some(Ok(row))
            }
            Err(err) => {
                self.open = None;
                Some(Err(err.into()))
            }
        }
    }
}

impl Drop for RmpRunReader {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            log::warn!("run file removal failed: {}", err);
        }
    }
}

/// In-memory run store.
#[derive(Default)]
pub struct MemoryRunStore {
    runs: HashMap<u64, Vec<Row>>,
    next_id: u64,
    counters: Arc<Counters>,
}

impl MemoryRunStore {
    pub fn new() -> Self {
        MemoryRunStore::default()
    }
}

impl RunStore for MemoryRunStore {
    type Reader = MemoryRunReader;

    fn create_run<I>(&mut self, rows: I) -> Result<RunHandle, SortError>
    where
        I: IntoIterator<Item = Result<Row, SortError>>,
    {
        let rows = rows.into_iter().collect::<Result<Vec<Row>, SortError>>()?;

        let id = self.next_id;
        self.next_id += 1;
        let handle = RunHandle {
            id,
            rows: rows.len() as u64,
        };
        self.runs.insert(id, rows);
        self.counters.run_created();

        return Ok(handle);
    }

    fn open_reader(&mut self, handle: RunHandle) -> Result<Self::Reader, SortError> {
        let rows = self
            .runs
            .remove(&handle.id)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("run {} not found", handle.id)))?;

        return Ok(MemoryRunReader {
            rows: Some((rows.into_iter(), OpenGuard::new(self.counters.clone()))),
            counters: self.counters.clone(),
        });
    }

    fn delete_run(&mut self, handle: RunHandle) -> Result<(), SortError> {
        if self.runs.remove(&handle.id).is_some() {
            self.counters.run_deleted();
        }
        Ok(())
    }

    fn purge(&mut self) -> Result<(), SortError> {
        for _ in self.runs.drain() {
            self.counters.run_deleted();
        }
        Ok(())
    }

    fn stats(&self) -> RunStoreStats {
        self.counters.snapshot()
    }
}

/// Reader over an in-memory run.
pub struct MemoryRunReader {
    rows: Option<(std::vec::IntoIter<Row>, OpenGuard)>,
    counters: Arc<Counters>,
}

impl Iterator for MemoryRunReader {
    type Item = Result<Row, SortError>;

    fn next(&mut self) -> Option<Self::Item> {
        let (rows, _) = self.rows.as_mut()?;
        match rows.next() {
            Some(row) => Some(Ok(row)),
            None => {
                self.rows = None;
                self.counters.run_deleted();
                None
            }
        }
    }
}

impl Drop for MemoryRunReader {
    fn drop(&mut self) {
        if self.rows.take().is_some() {
            self.counters.run_deleted();
        }
    }
}

#[cfg(test)]
mod test {
    use std::io;

    use rstest::*;

    use super::{FileRunStore, MemoryRunStore, RunStore};
    use crate::cell::Cell;
    use crate::error::SortError;
    use crate::row::Row;

    #[fixture]
    fn tmp_dir() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    fn rows(n: u64) -> Vec<Row> {
        (0..n)
            .map(|i| Row::new(i, vec![Cell::Int(i as i64), Cell::Text(format!("row{}", i)), Cell::Missing]))
            .collect()
    }

    fn run_files(store: &FileRunStore) -> usize {
        std::fs::read_dir(store.path()).unwrap().count()
    }

    #[rstest]
    #[case(None)]
    #[case(Some(16))]
    fn test_file_run(tmp_dir: tempfile::TempDir, #[case] rw_buf_size: Option<usize>) {
        let mut store = FileRunStore::new(Some(tmp_dir.path()), rw_buf_size).unwrap();
        let saved = rows(100);

        let handle = store.create_run(saved.clone().into_iter().map(Ok)).unwrap();
        assert_eq!(handle.rows(), 100);
        assert_eq!(run_files(&store), 1);

        let reader = store.open_reader(handle).unwrap();
        assert_eq!(store.stats().open_readers, 1);

        let restored: Result<Vec<Row>, SortError> = reader.collect();
        assert_eq!(restored.unwrap(), saved);

        let stats = store.stats();
        assert_eq!(stats.open_readers, 0);
        assert_eq!(stats.live_runs, 0);
        assert_eq!(stats.runs_created, 1);
        assert_eq!(run_files(&store), 0);
    }

    #[rstest]
    fn test_failed_write_leaves_nothing(tmp_dir: tempfile::TempDir) {
        let mut store = FileRunStore::new(Some(tmp_dir.path()), None).unwrap();

        let input = rows(3)
            .into_iter()
            .map(Ok)
            .chain(std::iter::once(Err(SortError::IO(io::Error::new(io::ErrorKind::Other, "disk full")))));

        assert!(store.create_run(input).is_err());
        assert_eq!(run_files(&store), 0);
        assert_eq!(store.stats().live_runs, 0);
    }

    #[rstest]
    fn test_dropped_reader_deletes_run(tmp_dir: tempfile::TempDir) {
        let mut store = FileRunStore::new(Some(tmp_dir.path()), None).unwrap();

        let handle = store.create_run(rows(10).into_iter().map(Ok)).unwrap();
        let mut reader = store.open_reader(handle).unwrap();
        assert!(reader.next().unwrap().is_ok());
        drop(reader);

        assert_eq!(run_files(&store), 0);
        assert_eq!(store.stats(), super::RunStoreStats {
            runs_created: 1,
            live_runs: 0,
            open_readers: 0,
            peak_open_readers: 1,
        });
    }

    #[rstest]
    fn test_purge(tmp_dir: tempfile::TempDir) {
        let mut store = FileRunStore::new(Some(tmp_dir.path()), None).unwrap();

        let first = store.create_run(rows(5).into_iter().map(Ok)).unwrap();
        store.create_run(rows(5).into_iter().map(Ok)).unwrap();
        store.create_run(rows(0).into_iter().map(Ok)).unwrap();
        assert_eq!(run_files(&store), 3);

        store.delete_run(first).unwrap();
        assert_eq!(run_files(&store), 2);

        store.purge().unwrap();
        assert_eq!(run_files(&store), 0);
        assert_eq!(store.stats().live_runs, 0);
    }

    #[test]
    fn test_memory_run() {
        let mut store = MemoryRunStore::new();
        let saved = rows(20);

        let first = store.create_run(saved.clone().into_iter().map(Ok)).unwrap();
        let second = store.create_run(saved.clone().into_iter().map(Ok)).unwrap();

        let a = store.open_reader(first).unwrap();
        let b = store.open_reader(second).unwrap();
        assert_eq!(store.stats().peak_open_readers, 2);

        let restored: Vec<Row> = a.chain(b).map(Result::unwrap).collect();
        assert_eq!(restored.len(), 40);
        assert_eq!(store.stats().live_runs, 0);
    }
}
