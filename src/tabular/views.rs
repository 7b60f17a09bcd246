use super::{Cell, ColumnDescriptor};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::ops::Index;

/// Positional accessor over one row.
#[derive(Debug, Clone, Copy)]
pub struct RowView<'a> {
    index: usize,
    cells: &'a [Cell],
}

impl<'a> RowView<'a> {
    pub(super) fn new(index: usize, cells: &'a [Cell]) -> Self {
        Self { index, cells }
    }

    /// 0-based row number within the result
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn get(&self, column: usize) -> Option<&'a Cell> {
        self.cells.get(column)
    }

    pub fn cells(&self) -> &'a [Cell] {
        self.cells
    }

    pub fn iter(&self) -> std::slice::Iter<'a, Cell> {
        self.cells.iter()
    }
}

impl Index<usize> for RowView<'_> {
    type Output = Cell;

    fn index(&self, column: usize) -> &Cell {
        &self.cells[column]
    }
}

impl Serialize for RowView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.cells.serialize(serializer)
    }
}

/// Name-keyed accessor over one row, with the positional values alongside.
#[derive(Debug, Clone, Copy)]
pub struct RowMap<'a> {
    cells: &'a [Cell],
    columns: &'a [ColumnDescriptor],
    index: &'a HashMap<String, usize>,
}

impl<'a> RowMap<'a> {
    pub(super) fn new(
        cells: &'a [Cell],
        columns: &'a [ColumnDescriptor],
        index: &'a HashMap<String, usize>,
    ) -> Self {
        Self {
            cells,
            columns,
            index,
        }
    }

    pub fn get(&self, name: &str) -> Option<&'a Cell> {
        self.index.get(name).and_then(|i| self.cells.get(*i))
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Addressable column names in positional order; shadowed duplicates are
    /// skipped
    pub fn keys(&self) -> impl Iterator<Item = &'a str> {
        let index = self.index;
        self.columns
            .iter()
            .enumerate()
            .filter(move |(i, c)| index.get(&c.name) == Some(i))
            .map(|(_, c)| c.name.as_str())
    }

    /// Every cell in positional order, including shadowed duplicates
    pub fn values(&self) -> &'a [Cell] {
        self.cells
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

impl Index<&str> for RowMap<'_> {
    type Output = Cell;

    fn index(&self, name: &str) -> &Cell {
        match self.get(name) {
            Some(cell) => cell,
            None => panic!("no column labeled {name:?}"),
        }
    }
}

impl Serialize for RowMap<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for key in self.keys() {
            map.serialize_entry(key, &self[key])?;
        }
        map.end()
    }
}

/// Column-major view of a result.
///
/// `column(c)[r]` is the cell at row `r`, column `c` of the source.
#[derive(Debug, Clone)]
pub struct Transposed<'a> {
    columns: Vec<Vec<&'a Cell>>,
    descriptors: &'a [ColumnDescriptor],
    index: &'a HashMap<String, usize>,
}

impl<'a> Transposed<'a> {
    pub(super) fn new(
        descriptors: &'a [ColumnDescriptor],
        index: &'a HashMap<String, usize>,
        rows: &'a [Vec<Cell>],
    ) -> Self {
        let mut columns: Vec<Vec<&'a Cell>> = (0..descriptors.len())
            .map(|_| Vec::with_capacity(rows.len()))
            .collect();
        for row in rows {
            for (column, cell) in columns.iter_mut().zip(row) {
                column.push(cell);
            }
        }
        Self {
            columns,
            descriptors,
            index,
        }
    }

    /// Number of columns
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn column(&self, column: usize) -> Option<&[&'a Cell]> {
        self.columns.get(column).map(Vec::as_slice)
    }

    /// Column by name, first occurrence wins
    pub fn column_by_name(&self, name: &str) -> Option<&[&'a Cell]> {
        self.index.get(name).and_then(|i| self.column(*i))
    }

    pub fn descriptor(&self, column: usize) -> Option<&'a ColumnDescriptor> {
        self.descriptors.get(column)
    }

    pub fn iter(&self) -> impl Iterator<Item = &[&'a Cell]> {
        self.columns.iter().map(Vec::as_slice)
    }
}

impl<'a> Index<usize> for Transposed<'a> {
    type Output = [&'a Cell];

    fn index(&self, column: usize) -> &[&'a Cell] {
        &self.columns[column]
    }
}
