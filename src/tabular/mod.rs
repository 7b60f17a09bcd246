//! # Tabular Results
//!
//! Immutable, randomly accessible snapshots of a result cursor.
//!
//! A [`TabularResult`] is built by draining a forward-only
//! [`RowCursor`](crate::database::driver::RowCursor) exactly once. Cells that
//! were themselves cursors are materialized recursively into nested results,
//! and large character objects are read into text, so nothing in the snapshot
//! depends on the live connection afterwards.
//!
//! ## Views
//!
//! - [`TabularResult::as_row_sequence`] - rows accessed by column position
//! - [`TabularResult::as_row_map`] - rows accessed by column name
//! - [`TabularResult::as_column_sequence`] / [`TabularResult::transpose`] -
//!   column-major access by position or name
//! - [`TabularResult::render_as_text`] - tab separated diagnostic dump
//!
//! When two columns share a name only the first is addressable by name.
//!
//! ```rust
//! use dbtemplate_core::tabular::{Cell, ColumnDescriptor, TabularResult};
//! use dbtemplate_core::types::Value;
//!
//! let table = TabularResult::from_parts(
//!     vec![ColumnDescriptor::new(1, "ID", "INT8"), ColumnDescriptor::new(2, "NAME", "TEXT")],
//!     vec![vec![Cell::from(Value::Int(1)), Cell::from(Value::from("alpha"))]],
//! )
//! .unwrap();
//!
//! assert_eq!(table.cell_by_name(0, "NAME").unwrap().as_str(), Some("alpha"));
//! assert_eq!(table.transpose().column_by_name("ID").unwrap()[0].as_i64(), Some(1));
//! ```

mod cell;
mod column;
pub mod materialize;
mod views;

pub use cell::Cell;
pub use column::{ColumnDescriptor, Nullability};
pub use materialize::materialize;
pub use views::{RowMap, RowView, Transposed};

use crate::database::driver::RowCursor;
use crate::error::{DriverError, DriverResult, SqlError, SqlResult};
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, PartialEq)]
struct TabularData {
    columns: Vec<ColumnDescriptor>,
    index: HashMap<String, usize>,
    rows: Vec<Vec<Cell>>,
}

/// An immutable materialized result set.
///
/// Cloning is cheap: clones share the same underlying storage.
#[derive(Debug, Clone, PartialEq)]
pub struct TabularResult {
    data: Arc<TabularData>,
}

impl TabularResult {
    /// Build a result from column metadata and row cells.
    ///
    /// Every row must have exactly one cell per column.
    pub fn from_parts(columns: Vec<ColumnDescriptor>, rows: Vec<Vec<Cell>>) -> DriverResult<Self> {
        let width = columns.len();
        if let Some((row, cells)) = rows.iter().enumerate().find(|(_, r)| r.len() != width) {
            return Err(DriverError::Protocol(format!(
                "row {row} has {} cells but the result has {width} columns",
                cells.len()
            )));
        }

        let mut index = HashMap::with_capacity(width);
        for (i, column) in columns.iter().enumerate() {
            index.entry(column.name.clone()).or_insert(i);
        }

        Ok(Self {
            data: Arc::new(TabularData {
                columns,
                index,
                rows,
            }),
        })
    }

    /// Drain a cursor into a new result; the cursor is closed either way
    pub async fn materialize(cursor: Box<dyn RowCursor>) -> DriverResult<Self> {
        materialize(cursor).await
    }

    pub fn row_count(&self) -> usize {
        self.data.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.data.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.rows.is_empty()
    }

    pub fn column_descriptors(&self) -> &[ColumnDescriptor] {
        &self.data.columns
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.data.columns.iter().map(|c| c.name.as_str())
    }

    /// 0-based index of the first column with this name
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.data.index.get(name).copied()
    }

    /// 1-based position of the first column with this name
    pub fn find_column(&self, name: &str) -> Option<usize> {
        self.column_index(name).map(|i| i + 1)
    }

    /// Cell at a 0-based row and column
    pub fn cell(&self, row: usize, column: usize) -> SqlResult<&Cell> {
        self.get(row, column).ok_or(SqlError::IndexOutOfRange {
            row,
            column,
            row_count: self.row_count(),
            column_count: self.column_count(),
        })
    }

    /// Cell at a 0-based row in the first column with this name
    pub fn cell_by_name(&self, row: usize, column: &str) -> SqlResult<&Cell> {
        let index = self
            .column_index(column)
            .ok_or_else(|| SqlError::UnknownColumn(column.to_string()))?;
        self.cell(row, index)
    }

    pub fn get(&self, row: usize, column: usize) -> Option<&Cell> {
        self.data.rows.get(row).and_then(|r| r.get(column))
    }

    pub fn row(&self, row: usize) -> Option<RowView<'_>> {
        self.data
            .rows
            .get(row)
            .map(|cells| RowView::new(row, cells))
    }

    /// Rows as positional accessors
    pub fn as_row_sequence(&self) -> impl ExactSizeIterator<Item = RowView<'_>> {
        self.data
            .rows
            .iter()
            .enumerate()
            .map(|(i, cells)| RowView::new(i, cells))
    }

    /// Rows as name-keyed accessors
    pub fn as_row_map(&self) -> impl ExactSizeIterator<Item = RowMap<'_>> {
        self.data
            .rows
            .iter()
            .map(|cells| RowMap::new(cells, &self.data.columns, &self.data.index))
    }

    /// Column-major view; recomputed on every call
    pub fn as_column_sequence(&self) -> Transposed<'_> {
        Transposed::new(&self.data.columns, &self.data.index, &self.data.rows)
    }

    pub fn transpose(&self) -> Transposed<'_> {
        self.as_column_sequence()
    }

    /// Diagnostic text: a header of column names, then one line per row,
    /// every field followed by a tab
    pub fn render_as_text(&self) -> String {
        let mut out = String::new();
        for column in &self.data.columns {
            out.push_str(&column.name);
            out.push('\t');
        }
        out.push('\n');
        for row in &self.data.rows {
            for cell in row {
                out.push_str(&cell.to_string());
                out.push('\t');
            }
            out.push('\n');
        }
        out
    }
}

impl fmt::Display for TabularResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render_as_text())
    }
}

impl Serialize for TabularResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("TabularResult", 2)?;
        state.serialize_field("columns", &self.data.columns)?;
        state.serialize_field("rows", &self.data.rows)?;
        state.end()
    }
}
