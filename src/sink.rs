//! Push-style consumers of sorted rows.

use crate::error::BoxedError;
use crate::row::Row;

/// Receives the sorted rows one by one, in final order.
pub trait RowSink {
    fn accept(&mut self, row: Row) -> Result<(), BoxedError>;
}

/// Collects rows into a vector. Meant for small results and tests.
impl RowSink for Vec<Row> {
    fn accept(&mut self, row: Row) -> Result<(), BoxedError> {
        self.push(row);
        Ok(())
    }
}

impl<S: RowSink + ?Sized> RowSink for &mut S {
    fn accept(&mut self, row: Row) -> Result<(), BoxedError> {
        (**self).accept(row)
    }
}

/// Sink calling a closure for every row.
pub struct FnSink<F>(F);

/// Wraps a closure into a [`RowSink`].
pub fn from_fn<F>(f: F) -> FnSink<F>
where
    F: FnMut(Row) -> Result<(), BoxedError>,
{
    FnSink(f)
}

impl<F> RowSink for FnSink<F>
where
    F: FnMut(Row) -> Result<(), BoxedError>,
{
    fn accept(&mut self, row: Row) -> Result<(), BoxedError> {
        (self.0)(row)
    }
}

/// Sink that only counts rows.
#[derive(Debug, Default)]
pub struct CountingSink {
    pub rows: u64,
}

impl RowSink for CountingSink {
    fn accept(&mut self, _row: Row) -> Result<(), BoxedError> {
        self.rows += 1;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::{from_fn, CountingSink, RowSink};
    use crate::row::Row;

    #[test]
    fn test_fn_sink() {
        let mut keys = Vec::new();
        {
            let mut sink = from_fn(|row: Row| {
                keys.push(row.key.0);
                Ok(())
            });
            sink.accept(Row::new(3, vec![])).unwrap();
            sink.accept(Row::new(1, vec![])).unwrap();
        }
        assert_eq!(keys, vec![3, 1]);
    }

    #[test]
    fn test_failing_sink() {
        let mut sink = from_fn(|_row: Row| Err("closed".into()));
        assert_eq!(sink.accept(Row::new(0, vec![])).unwrap_err().to_string(), "closed");
    }

    #[test]
    fn test_counting_sink() {
        fn push_two<S: RowSink>(mut sink: S) {
            sink.accept(Row::new(0, vec![])).unwrap();
            sink.accept(Row::new(1, vec![])).unwrap();
        }

        let mut sink = CountingSink::default();
        push_two(&mut sink);
        assert_eq!(sink.rows, 2);
    }
}
