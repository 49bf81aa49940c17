//! Column projection applied to rows before they are sorted.

use std::collections::HashSet;

use crate::error::ConfigError;
use crate::row::{Row, Schema};

/// Selection of columns, in output order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
    columns: Vec<usize>,
    schema: Schema,
}

impl Projection {
    /// Selects `columns` (0-based positions in `schema`), in the given order.
    ///
    /// # Errors
    /// * [`ConfigError::ProjectionOutOfRange`] if a column is not in the schema.
    /// * [`ConfigError::DuplicateProjection`] if a column is selected twice.
    pub fn new(schema: &Schema, columns: &[usize]) -> Result<Self, ConfigError> {
        let mut seen = HashSet::with_capacity(columns.len());
        for &column in columns {
            if column >= schema.width() {
                return Err(ConfigError::ProjectionOutOfRange {
                    column,
                    width: schema.width(),
                });
            }
            if !seen.insert(column) {
                return Err(ConfigError::DuplicateProjection { column });
            }
        }

        return Ok(Projection {
            columns: columns.to_vec(),
            schema: schema.select(columns),
        });
    }

    /// Selects columns by name.
    pub fn by_names<S: AsRef<str>>(schema: &Schema, names: &[S]) -> Result<Self, ConfigError> {
        let columns = names
            .iter()
            .map(|name| {
                schema
                    .index_of(name.as_ref())
                    .ok_or_else(|| ConfigError::UnknownColumn(name.as_ref().to_string()))
            })
            .collect::<Result<Vec<usize>, ConfigError>>()?;

        Projection::new(schema, &columns)
    }

    /// Schema of the projected rows.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn columns(&self) -> &[usize] {
        &self.columns
    }

    /// Projects a row of the source schema. The row key is kept.
    pub fn apply(&self, mut row: Row) -> Row {
        let cells = self
            .columns
            .iter()
            .map(|&idx| std::mem::replace(&mut row.cells[idx], crate::cell::Cell::Missing))
            .collect();

        Row { key: row.key, cells }
    }
}
