//! Rows and table schemas.

use serde::{Deserialize, Serialize};

use crate::cell::{Cell, ColumnType};

/// Stable row identifier. Used for identity and optional tie-breaking only.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "memory-limit", derive(deepsize::DeepSizeOf))]
pub struct RowKey(pub u64);

impl From<u64> for RowKey {
    fn from(value: u64) -> Self {
        RowKey(value)
    }
}

/// A fixed-width sequence of cells with a stable key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "memory-limit", derive(deepsize::DeepSizeOf))]
pub struct Row {
    pub key: RowKey,
    pub cells: Vec<Cell>,
}

impl Row {
    pub fn new(key: impl Into<RowKey>, cells: Vec<Cell>) -> Self {
        Row { key: key.into(), cells }
    }

    pub fn width(&self) -> usize {
        self.cells.len()
    }

    pub fn cell(&self, idx: usize) -> Option<&Cell> {
        self.cells.get(idx)
    }
}

/// Named, typed column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: String,
    pub column_type: ColumnType,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        ColumnSpec {
            name: name.into(),
            column_type,
        }
    }
}

/// Ordered list of columns describing the rows being sorted.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Schema {
    columns: Vec<ColumnSpec>,
}

impl Schema {
    pub fn new(columns: Vec<ColumnSpec>) -> Self {
        Schema { columns }
    }

    /// Builds a schema with generated column names (`col0`, `col1`, ...).
    pub fn from_types(types: impl IntoIterator<Item = ColumnType>) -> Self {
        Schema {
            columns: types
                .into_iter()
                .enumerate()
                .map(|(idx, ty)| ColumnSpec::new(format!("col{}", idx), ty))
                .collect(),
        }
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn column(&self, idx: usize) -> Option<&ColumnSpec> {
        self.columns.get(idx)
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    /// Returns the position of the column named `name`.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Returns the schema restricted to `indices`, in that order. Indices must be in range.
    pub(crate) fn select(&self, indices: &[usize]) -> Schema {
        Schema {
            columns: indices.iter().map(|&idx| self.columns[idx].clone()).collect(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::{ColumnSpec, Schema};
    use crate::cell::ColumnType;

    #[test]
    fn test_schema_lookup() {
        let schema = Schema::new(vec![
            ColumnSpec::new("id", ColumnType::Int),
            ColumnSpec::new("name", ColumnType::Text),
        ]);

        assert_eq!(schema.width(), 2);
        assert_eq!(schema.index_of("name"), Some(1));
        assert_eq!(schema.index_of("age"), None);

        let selected = schema.select(&[1, 0]);
        assert_eq!(selected.column(0).unwrap().name, "name");
        assert_eq!(selected.column(1).unwrap().column_type, ColumnType::Int);
    }

    #[test]
    fn test_generated_names() {
        let schema = Schema::from_types([ColumnType::Int, ColumnType::Double]);
        assert_eq!(schema.column(1).unwrap().name, "col1");
    }
}
