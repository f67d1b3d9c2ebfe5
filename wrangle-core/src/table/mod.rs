//! In-memory columnar table used by every pipeline stage.
//!
//! A [`Table`] is a row index (the original row position of each row) plus an
//! ordered list of named, typed columns. Cells are `Option`s: `None` is a hard
//! null, as is a float `NaN`.

pub(crate) mod codec;

use crate::error::TableError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Inferred column data type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Int,
    Float,
    Text,
}

impl std::fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColumnKind::Int => write!(f, "int"),
            ColumnKind::Float => write!(f, "float"),
            ColumnKind::Text => write!(f, "text"),
        }
    }
}

/// Typed cell storage for one column.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Int(Vec<Option<i64>>),
    Float(Vec<Option<f64>>),
    Text(Vec<Option<String>>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Int(v) => v.len(),
            ColumnData::Float(v) => v.len(),
            ColumnData::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> ColumnKind {
        match self {
            ColumnData::Int(_) => ColumnKind::Int,
            ColumnData::Float(_) => ColumnKind::Float,
            ColumnData::Text(_) => ColumnKind::Text,
        }
    }

    /// Whether the cell at `row` is a hard null.
    pub fn is_null(&self, row: usize) -> bool {
        match self {
            ColumnData::Int(v) => v[row].is_none(),
            ColumnData::Float(v) => v[row].is_none_or(f64::is_nan),
            ColumnData::Text(v) => v[row].is_none(),
        }
    }

    /// Render a cell the way it is written to CSV. Empty cells render as `None`.
    pub fn format_cell(&self, row: usize) -> Option<String> {
        match self {
            ColumnData::Int(v) => v[row].map(|n| n.to_string()),
            ColumnData::Float(v) => v[row].map(|f| f.to_string()),
            ColumnData::Text(v) => v[row].clone(),
        }
    }

    /// Select rows by position, in the given order.
    pub fn take(&self, rows: &[usize]) -> ColumnData {
        match self {
            ColumnData::Int(v) => ColumnData::Int(rows.iter().map(|&r| v[r]).collect()),
            ColumnData::Float(v) => ColumnData::Float(rows.iter().map(|&r| v[r]).collect()),
            ColumnData::Text(v) => ColumnData::Text(rows.iter().map(|&r| v[r].clone()).collect()),
        }
    }

    fn key(&self, row: usize) -> CellKey<'_> {
        match self {
            ColumnData::Int(v) => v[row].map_or(CellKey::Null, CellKey::Int),
            ColumnData::Float(v) => match v[row] {
                None => CellKey::Null,
                Some(f) if f.is_nan() => CellKey::Null,
                // -0.0 and 0.0 compare equal
                Some(f) if f == 0.0 => CellKey::Float(0.0f64.to_bits()),
                Some(f) => CellKey::Float(f.to_bits()),
            },
            ColumnData::Text(v) => v[row].as_deref().map_or(CellKey::Null, CellKey::Text),
        }
    }
}

#[derive(Debug, Hash, PartialEq, Eq)]
enum CellKey<'a> {
    Null,
    Int(i64),
    Float(u64),
    Text(&'a str),
}

/// A named column.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

impl Column {
    pub fn new(name: impl Into<String>, data: ColumnData) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    pub fn int(name: impl Into<String>, values: impl IntoIterator<Item = i64>) -> Self {
        Self::new(name, ColumnData::Int(values.into_iter().map(Some).collect()))
    }

    pub fn float(name: impl Into<String>, values: impl IntoIterator<Item = f64>) -> Self {
        Self::new(
            name,
            ColumnData::Float(values.into_iter().map(Some).collect()),
        )
    }

    pub fn text<S: Into<String>>(
        name: impl Into<String>,
        values: impl IntoIterator<Item = S>,
    ) -> Self {
        Self::new(
            name,
            ColumnData::Text(values.into_iter().map(|s| Some(s.into())).collect()),
        )
    }

    pub fn kind(&self) -> ColumnKind {
        self.data.kind()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// A table of rows with a preserved row index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    index: Vec<u64>,
    columns: Vec<Column>,
}

impl Table {
    /// Build a table with the default `0..n` row index.
    pub fn new(columns: Vec<Column>) -> Result<Self, TableError> {
        let height = columns.first().map_or(0, Column::len);
        Self::with_index((0..height as u64).collect(), columns)
    }

    /// Build a table with an explicit row index.
    pub fn with_index(index: Vec<u64>, columns: Vec<Column>) -> Result<Self, TableError> {
        let mut seen = HashSet::new();
        for column in &columns {
            if !seen.insert(column.name.as_str()) {
                return Err(TableError::DuplicateColumn {
                    column: column.name.clone(),
                });
            }
            if column.len() != index.len() {
                return Err(TableError::LengthMismatch {
                    column: column.name.clone(),
                    expected: index.len(),
                    actual: column.len(),
                });
            }
        }
        Ok(Self { index, columns })
    }

    pub fn height(&self) -> usize {
        self.index.len()
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn index(&self) -> &[u64] {
        &self.index
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Select rows by position, keeping their original index values.
    pub fn take(&self, rows: &[usize]) -> Table {
        Table {
            index: rows.iter().map(|&r| self.index[r]).collect(),
            columns: self
                .columns
                .iter()
                .map(|c| Column::new(c.name.clone(), c.data.take(rows)))
                .collect(),
        }
    }

    /// Number of rows that repeat an earlier row across every column.
    ///
    /// The row index is not part of the comparison.
    pub fn duplicate_rows(&self) -> usize {
        let mut seen = HashSet::with_capacity(self.height());
        (0..self.height())
            .filter(|&row| {
                let key: Vec<CellKey<'_>> = self.columns.iter().map(|c| c.data.key(row)).collect();
                !seen.insert(key)
            })
            .count()
    }
}
