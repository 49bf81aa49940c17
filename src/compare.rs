//! Composite row comparator built from a sort specification.

use std::cmp::Ordering;
use std::fmt;

use crate::cell::MissingOrder;
use crate::error::ConfigError;
use crate::row::{Row, Schema};

/// Sort direction of a single key.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// What a sort key compares.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum SortColumn {
    /// Cell at the given 0-based column position.
    Cell(usize),
    /// The row's stable key. Append it last to make ties reproducible.
    RowKey,
}

/// Single (column, direction) sort key.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub column: SortColumn,
    pub direction: Direction,
}

impl SortKey {
    pub fn asc(column: usize) -> Self {
        SortKey {
            column: SortColumn::Cell(column),
            direction: Direction::Ascending,
        }
    }

    pub fn desc(column: usize) -> Self {
        SortKey {
            column: SortColumn::Cell(column),
            direction: Direction::Descending,
        }
    }

    pub fn row_key(direction: Direction) -> Self {
        SortKey {
            column: SortColumn::RowKey,
            direction,
        }
    }
}

/// Ordered list of sort keys compared lexicographically. May be empty.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SortSpec {
    keys: Vec<SortKey>,
}

impl SortSpec {
    pub fn new(keys: Vec<SortKey>) -> Self {
        SortSpec { keys }
    }

    pub fn keys(&self) -> &[SortKey] {
        &self.keys
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl fmt::Display for SortColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortColumn::Cell(idx) => write!(f, "column {}", idx),
            SortColumn::RowKey => write!(f, "row key"),
        }
    }
}

impl FromIterator<SortKey> for SortSpec {
    fn from_iter<I: IntoIterator<Item = SortKey>>(iter: I) -> Self {
        SortSpec::new(iter.into_iter().collect())
    }
}

#[derive(Debug, Clone)]
struct ResolvedKey {
    column: SortColumn,
    descending: bool,
}

/// Composite row comparator.
///
/// Evaluates keys in specification order and stops at the first key that is not equal.
/// Rows equal on every key compare [`Ordering::Equal`]; no implicit tie-break is added.
#[derive(Debug, Clone)]
pub struct RowComparator {
    keys: Vec<ResolvedKey>,
    missing: MissingOrder,
}

impl RowComparator {
    /// Validates `spec` against `schema` and builds the comparator.
    ///
    /// # Errors
    /// * [`ConfigError::ColumnOutOfRange`] if a key refers to a column outside the schema.
    /// * [`ConfigError::ConflictingDirections`] if a column is used twice with opposite directions.
    ///
    /// A column repeated with the same direction is redundant and ignored.
    pub fn new(spec: &SortSpec, schema: &Schema, missing: MissingOrder) -> Result<Self, ConfigError> {
        let mut keys: Vec<ResolvedKey> = Vec::with_capacity(spec.keys().len());

        for key in spec.keys() {
            let descending = key.direction == Direction::Descending;
            if let SortColumn::Cell(column) = key.column {
                if column >= schema.width() {
                    return Err(ConfigError::ColumnOutOfRange {
                        column,
                        width: schema.width(),
                    });
                }
            }

            if let Some(prev) = keys.iter().find(|k| k.column == key.column) {
                if prev.descending != descending {
                    return Err(ConfigError::ConflictingDirections { column: key.column });
                }
                log::trace!("dropping redundant sort key {:?}", key);
                continue;
            }

            keys.push(ResolvedKey {
                column: key.column,
                descending,
            });
        }

        return Ok(RowComparator { keys, missing });
    }

    /// Compares two rows.
    pub fn compare(&self, a: &Row, b: &Row) -> Ordering {
        for key in &self.keys {
            let ord = match key.column {
                SortColumn::Cell(idx) => a.cells[idx].compare(&b.cells[idx], self.missing),
                SortColumn::RowKey => a.key.cmp(&b.key),
            };
            let ord = if key.descending { ord.reverse() } else { ord };
            if ord != Ordering::Equal {
                return ord;
            }
        }

        Ordering::Equal
    }

    /// Number of effective keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
