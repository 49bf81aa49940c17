//! Binary heap merger.

use std::cmp::Ordering;

use crate::error::SortError;
use crate::row::Row;

/// Binary heap merger implementation.
/// Merges multiple sorted inputs into a single sorted output.
/// Time complexity is *m* \* log(*n*) in worst case where *m* is the number of rows,
/// *n* is the number of inputs.
///
/// The heap is an explicit array of input indices ordered by each input's current head row.
/// Heads comparing equal are taken from the input with the lower index first. An input is
/// dropped as soon as it is exhausted.
pub struct HeapMerger<R, F>
where
    R: Iterator<Item = Result<Row, SortError>>,
    F: Fn(&Row, &Row) -> Ordering,
{
    inputs: Vec<Option<R>>,
    heads: Vec<Option<Row>>,
    heap: Vec<usize>,
    compare: F,
    initiated: bool,
    failed: bool,
}

impl<R, F> HeapMerger<R, F>
where
    R: Iterator<Item = Result<Row, SortError>>,
    F: Fn(&Row, &Row) -> Ordering,
{
    /// Creates an instance of a heap merger using `inputs`.
    /// Inputs should be sorted according to `compare` otherwise the result is undefined.
    ///
    /// # Arguments
    /// * `inputs` - Inputs to be merged in a single sorted one
    /// * `compare` - Function to be used to compare rows
    pub fn new<I>(inputs: I, compare: F) -> Self
    where
        I: IntoIterator<Item = R>,
    {
        let inputs = Vec::from_iter(inputs.into_iter().map(Some));
        let heads = inputs.iter().map(|_| None).collect();

        return HeapMerger {
            heap: Vec::with_capacity(inputs.len()),
            inputs,
            heads,
            compare,
            initiated: false,
            failed: false,
        };
    }

    /// Number of inputs not exhausted yet.
    pub fn open_inputs(&self) -> usize {
        self.inputs.iter().filter(|i| i.is_some()).count()
    }

    fn less(&self, a: usize, b: usize) -> bool {
        let (head_a, head_b) = match (&self.heads[a], &self.heads[b]) {
            (Some(head_a), Some(head_b)) => (head_a, head_b),
            _ => return a < b,
        };
        match (self.compare)(head_a, head_b) {
            Ordering::Equal => a < b,
            ord => ord == Ordering::Less,
        }
    }

    fn sift_up(&mut self, mut pos: usize) {
        while pos > 0 {
            let parent = (pos - 1) / 2;
            if !self.less(self.heap[pos], self.heap[parent]) {
                break;
            }
            self.heap.swap(pos, parent);
            pos = parent;
        }
    }

    fn sift_down(&mut self, mut pos: usize) {
        let len = self.heap.len();
        loop {
            let left = 2 * pos + 1;
            let right = left + 1;
            let mut smallest = pos;

            if left < len && self.less(self.heap[left], self.heap[smallest]) {
                smallest = left;
            }
            if right < len && self.less(self.heap[right], self.heap[smallest]) {
                smallest = right;
            }
            if smallest == pos {
                break;
            }
            self.heap.swap(pos, smallest);
            pos = smallest;
        }
    }

    /// Pulls the next row of input `idx` into its head slot.
    /// Returns `false` if the input is exhausted, in which case it is dropped.
    fn advance(&mut self, idx: usize) -> Result<bool, SortError> {
        let next = match self.inputs[idx].as_mut() {
            Some(input) => input.next(),
            None => None,
        };

        match next {
            Some(Ok(row)) => {
                self.heads[idx] = Some(row);
                Ok(true)
            }
            Some(Err(err)) => Err(err),
            None => {
                self.inputs[idx] = None;
                Ok(false)
            }
        }
    }

    fn init(&mut self) -> Result<(), SortError> {
        for idx in 0..self.inputs.len() {
            if self.advance(idx)? {
                self.heap.push(idx);
                let pos = self.heap.len() - 1;
                self.sift_up(pos);
            }
        }
        Ok(())
    }

    fn fail(&mut self, err: SortError) -> Option<Result<Row, SortError>> {
        self.failed = true;
        self.heap.clear();
        self.inputs.clear();
        Some(Err(err))
    }
}

impl<R, F> Iterator for HeapMerger<R, F>
where
    R: Iterator<Item = Result<Row, SortError>>,
    F: Fn(&Row, &Row) -> Ordering,
{
    type Item = Result<Row, SortError>;

    /// Returns the next row from the inputs in ascending order.
    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        if !self.initiated {
            self.initiated = true;
            if let Err(err) = self.init() {
                return self.fail(err);
            }
        }

        let idx = *self.heap.first()?;
        let result = self.heads[idx].take()?;

        match self.advance(idx) {
            Ok(true) => self.sift_down(0),
            Ok(false) => {
                let last = self.heap.len() - 1;
                self.heap.swap(0, last);
                self.heap.pop();
                self.sift_down(0);
            }
            Err(err) => return self.fail(err),
        }

        return Some(Ok(result));
    }
}
