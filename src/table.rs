//! In-memory tabular dataset
//!
//! Rows stay in source order; every cell is text or missing until the store
//! infers a column type on persist.

use serde::{Deserialize, Serialize};

/// A decoded dataset with named columns
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataTable {
    columns: Vec<String>,
    rows: Vec<Vec<Option<String>>>,
}

impl DataTable {
    /// Build a table, padding or truncating rows to the column count
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Option<String>>>) -> Self {
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, None);
                row
            })
            .collect();
        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Option<String>>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Values of one column, top to bottom
    pub fn column_values(&self, index: usize) -> impl Iterator<Item = Option<&str>> + '_ {
        self.rows
            .iter()
            .map(move |row| row.get(index).and_then(|v| v.as_deref()))
    }

    /// Replace column names; the count must match
    pub(crate) fn set_columns(&mut self, columns: Vec<String>) {
        debug_assert_eq!(columns.len(), self.columns.len());
        self.columns = columns;
    }

    /// Keep only the columns at `indices`, in that order
    pub(crate) fn select_columns(&mut self, indices: &[usize]) {
        self.columns = indices.iter().map(|&i| self.columns[i].clone()).collect();
        for row in &mut self.rows {
            *row = indices.iter().map(|&i| row[i].take()).collect();
        }
    }

    /// Append an all-null column
    pub(crate) fn push_null_column(&mut self, name: impl Into<String>) {
        self.columns.push(name.into());
        for row in &mut self.rows {
            row.push(None);
        }
    }

    /// Rough in-memory footprint in megabytes
    pub fn memory_usage_mb(&self) -> f64 {
        let header: usize = self.columns.iter().map(|c| c.len()).sum();
        let cells: usize = self
            .rows
            .iter()
            .flatten()
            .map(|cell| std::mem::size_of::<Option<String>>() + cell.as_ref().map_or(0, String::len))
            .sum();
        (header + cells) as f64 / 1024.0 / 1024.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(s: &str) -> Option<String> {
        Some(s.to_string())
    }

    #[test]
    fn test_rows_padded_to_width() {
        let table = DataTable::new(
            vec!["a".into(), "b".into()],
            vec![vec![cell("1")], vec![cell("1"), cell("2"), cell("3")]],
        );
        assert_eq!(table.rows()[0], vec![cell("1"), None]);
        assert_eq!(table.rows()[1].len(), 2);
    }

    #[test]
    fn test_select_and_push_columns() {
        let mut table = DataTable::new(
            vec!["a".into(), "b".into(), "c".into()],
            vec![vec![cell("1"), cell("2"), cell("3")]],
        );
        table.select_columns(&[2, 0]);
        table.push_null_column("d");
        assert_eq!(table.columns(), &["c", "a", "d"]);
        assert_eq!(table.rows()[0], vec![cell("3"), cell("1"), None]);
        assert_eq!(table.column_index("d"), Some(2));
        assert!(table.memory_usage_mb() > 0.0);
    }
}
