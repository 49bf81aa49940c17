//! Limited in-memory row batch.

use std::cmp::Ordering;

use rayon;
use rayon::slice::ParallelSliceMut;

use crate::row::Row;

/// Mutable batch of rows that have not been sorted or persisted yet.
///
/// The batch is limited by a row count and, with the `memory-limit` feature, by the estimated
/// memory its rows occupy.
pub struct RowBatch {
    row_limit: usize,
    #[cfg(feature = "memory-limit")]
    byte_limit: u64,
    #[cfg(feature = "memory-limit")]
    current_size: u64,
    inner: Vec<Row>,
}

impl RowBatch {
    pub fn new(row_limit: usize) -> Self {
        RowBatch {
            row_limit,
            #[cfg(feature = "memory-limit")]
            byte_limit: u64::MAX,
            #[cfg(feature = "memory-limit")]
            current_size: 0,
            inner: Vec::new(),
        }
    }

    /// Limits the batch by the estimated deep size of its rows.
    #[cfg(feature = "memory-limit")]
    pub fn with_byte_limit(mut self, byte_limit: u64) -> Self {
        self.byte_limit = byte_limit;
        return self;
    }

    /// Adds a new row to the batch.
    pub fn push(&mut self, row: Row) {
        #[cfg(feature = "memory-limit")]
        {
            self.current_size += deepsize::DeepSizeOf::deep_size_of(&row) as u64;
        }
        self.inner.push(row);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Checks if the batch reached its row limit.
    pub fn is_full(&self) -> bool {
        self.inner.len() >= self.row_limit
    }

    /// Checks if the batch reached its memory limit.
    #[cfg(feature = "memory-limit")]
    pub fn is_over_budget(&self) -> bool {
        self.current_size >= self.byte_limit
    }

    #[cfg(not(feature = "memory-limit"))]
    pub fn is_over_budget(&self) -> bool {
        false
    }

    /// Estimated memory occupied by the batch rows.
    #[cfg(feature = "memory-limit")]
    pub fn mem_size(&self) -> u64 {
        self.current_size
    }

    /// Sorts the batch in place, on `pool` if one is given, on the calling thread otherwise.
    pub fn sort_by<F>(&mut self, pool: Option<&rayon::ThreadPool>, compare: F)
    where
        F: Fn(&Row, &Row) -> Ordering + Sync + Send,
    {
        match pool {
            Some(pool) => pool.install(|| self.inner.par_sort_unstable_by(compare)),
            None => self.inner.sort_unstable_by(compare),
        }
    }

    /// Takes the rows out, leaving the batch empty with the same limits.
    pub fn take(&mut self) -> Vec<Row> {
        #[cfg(feature = "memory-limit")]
        {
            self.current_size = 0;
        }
        std::mem::take(&mut self.inner)
    }
}

impl IntoIterator for RowBatch {
    type Item = Row;
    type IntoIter = <Vec<Row> as IntoIterator>::IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.into_iter()
    }
}

#[cfg(test)]
mod test {
    use super::RowBatch;
    use crate::cell::{Cell, MissingOrder};
    use crate::row::Row;

    #[test]
    fn test_limited_batch() {
        let mut batch = RowBatch::new(2);

        batch.push(Row::new(0, vec![Cell::Int(1)]));
        assert_eq!(batch.is_full(), false);
        batch.push(Row::new(1, vec![Cell::Int(0)]));
        assert_eq!(batch.is_full(), true);

        batch.sort_by(None, |a, b| {
            a.cells[0].compare(&b.cells[0], MissingOrder::Smallest)
        });
        let data: Vec<u64> = batch.take().into_iter().map(|r| r.key.0).collect();
        assert_eq!(data, vec![1, 0]);
        assert!(batch.is_empty());
    }

    #[test]
    fn test_parallel_sort() {
        let pool = rayon::ThreadPoolBuilder::new().num_threads(2).build().unwrap();
        let mut batch = RowBatch::new(usize::MAX);
        for i in (0..100).rev() {
            batch.push(Row::new(i, vec![Cell::Int(i as i64)]));
        }

        batch.sort_by(Some(&pool), |a, b| a.key.cmp(&b.key));
        let keys: Vec<u64> = batch.into_iter().map(|r| r.key.0).collect();
        assert_eq!(keys, (0..100u64).collect::<Vec<_>>());
    }

    #[cfg(feature = "memory-limit")]
    #[test]
    fn test_memory_limited_batch() {
        let mut batch = RowBatch::new(usize::MAX).with_byte_limit(1);
        assert_eq!(batch.is_over_budget(), false);

        batch.push(Row::new(0, vec![Cell::Text("hello!".into())]));
        assert!(batch.mem_size() > 0);
        assert_eq!(batch.is_over_budget(), true);

        batch.take();
        assert_eq!(batch.mem_size(), 0);
    }
}
