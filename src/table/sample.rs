//! Samples-shape accumulation table
//!
//! Outer-joins per-item series on a composite (timestamp, group values) key.
//! The final Arrow batch carries the timestamp column, the group-by columns,
//! then one data column per item.

use super::value::{Series, Value};
use std::collections::HashMap;

/// Composite row key: timestamp plus group-by column values
pub type RowKey = (i64, Vec<String>);

/// Column-oriented table keyed by (timestamp, group values)
#[derive(Debug, Clone, Default)]
pub struct SampleTable {
    /// Names of the group-by key columns, in caller order
    group_columns: Vec<String>,
    /// Row keys, insertion order until sorted
    index: Vec<RowKey>,
    /// Row key -> position in `index`
    lookup: HashMap<RowKey, usize>,
    /// Data column names, insertion order
    columns: Vec<String>,
    /// Column-major cells, `data[col][row]`
    data: Vec<Vec<Value>>,
}

impl SampleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a table whose rows are additionally keyed by group-by columns
    pub fn with_group_columns(group_columns: Vec<String>) -> Self {
        Self {
            group_columns,
            ..Self::default()
        }
    }

    pub fn group_columns(&self) -> &[String] {
        &self.group_columns
    }

    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    pub fn num_rows(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Row keys in current order
    pub fn index(&self) -> &[RowKey] {
        &self.index
    }

    fn ensure_row(&mut self, key: RowKey) -> usize {
        if let Some(&row) = self.lookup.get(&key) {
            return row;
        }
        let row = self.index.len();
        self.index.push(key.clone());
        self.lookup.insert(key, row);
        for column in &mut self.data {
            column.push(Value::Null);
        }
        row
    }

    fn ensure_column(&mut self, name: &str) -> usize {
        if let Some(col) = self.columns.iter().position(|c| c == name) {
            return col;
        }
        self.columns.push(name.to_string());
        self.data.push(vec![Value::Null; self.index.len()]);
        self.columns.len() - 1
    }

    /// Outer-join a series into the table under `name`, with the given
    /// group-by key values. Cells already populated keep their first value.
    pub fn insert_series(&mut self, name: &str, group: &[String], series: &Series) {
        let col = self.ensure_column(name);
        for (key, value) in series.iter() {
            let row = self.ensure_row((key, group.to_vec()));
            if self.data[col][row].is_null() {
                self.data[col][row] = value.clone();
            }
        }
    }

    /// Ensure a row exists for the given key without touching any column
    pub fn touch(&mut self, key: i64, group: &[String]) {
        self.ensure_row((key, group.to_vec()));
    }

    /// Row keys belonging to one group, in current row order
    pub fn keys_for_group(&self, group: &[String]) -> Vec<i64> {
        self.index
            .iter()
            .filter(|(_, g)| g.as_slice() == group)
            .map(|(ts, _)| *ts)
            .collect()
    }

    /// Remove a data column if present
    pub fn drop_column(&mut self, name: &str) {
        if let Some(col) = self.columns.iter().position(|c| c == name) {
            self.columns.remove(col);
            self.data.remove(col);
        }
    }

    /// Broadcast a constant value down an entire column (scalar results)
    pub fn insert_constant(&mut self, name: &str, value: &Value) {
        let col = self.ensure_column(name);
        for cell in &mut self.data[col] {
            *cell = value.clone();
        }
    }

    /// Read a cell by column name and row position
    pub fn cell(&self, name: &str, row: usize) -> Option<&Value> {
        let col = self.columns.iter().position(|c| c == name)?;
        self.data[col].get(row)
    }

    /// Sort rows by (timestamp, group values)
    pub fn sort_index(&mut self) {
        let mut order: Vec<usize> = (0..self.index.len()).collect();
        order.sort_by(|&a, &b| self.index[a].cmp(&self.index[b]));

        self.index = order.iter().map(|&i| self.index[i].clone()).collect();
        for column in &mut self.data {
            *column = order.iter().map(|&i| column[i].clone()).collect();
        }
        self.lookup = self
            .index
            .iter()
            .enumerate()
            .map(|(row, key)| (key.clone(), row))
            .collect();
    }

    /// Reorder data columns to match `order`. Columns absent from the table
    /// are skipped; columns absent from `order` retain their relative
    /// position at the end.
    pub fn reorder_columns(&mut self, order: &[String]) {
        let mut new_positions: Vec<usize> = Vec::with_capacity(self.columns.len());
        for name in order {
            if let Some(col) = self.columns.iter().position(|c| c == name) {
                if !new_positions.contains(&col) {
                    new_positions.push(col);
                }
            }
        }
        for col in 0..self.columns.len() {
            if !new_positions.contains(&col) {
                new_positions.push(col);
            }
        }

        self.columns = new_positions
            .iter()
            .map(|&c| self.columns[c].clone())
            .collect();
        self.data = new_positions
            .iter()
            .map(|&c| std::mem::take(&mut self.data[c]))
            .collect();
    }

    /// Iterate a column's cells in row order
    pub fn column(&self, name: &str) -> Option<&[Value]> {
        let col = self.columns.iter().position(|c| c == name)?;
        Some(&self.data[col])
    }
}
