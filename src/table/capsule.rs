//! Capsules-shape accumulation table
//!
//! Row-stacked: one row per capsule. Columns are discovered as capsules carry
//! new property names; when the same property name arrives twice in one row,
//! the last value wins.

use super::value::Value;

/// Row-oriented table of capsules
#[derive(Debug, Clone, Default)]
pub struct CapsuleTable {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

/// Incrementally builds one capsule row, discovering columns on its table
pub struct CapsuleRow<'a> {
    table: &'a mut CapsuleTable,
    cells: Vec<Value>,
}

impl CapsuleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a table with a fixed initial column set
    pub fn with_columns(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Start a new row
    pub fn row(&mut self) -> CapsuleRow<'_> {
        let cells = vec![Value::Null; self.columns.len()];
        CapsuleRow { table: self, cells }
    }

    fn ensure_column(&mut self, name: &str) -> usize {
        if let Some(col) = self.columns.iter().position(|c| c == name) {
            return col;
        }
        self.columns.push(name.to_string());
        for row in &mut self.rows {
            row.push(Value::Null);
        }
        self.columns.len() - 1
    }

    /// Read a cell by column name and row position
    pub fn cell(&self, name: &str, row: usize) -> Option<&Value> {
        let col = self.columns.iter().position(|c| c == name)?;
        self.rows.get(row).map(|r| &r[col])
    }

    /// One full row of cells, aligned to `column_names`
    pub fn row_cells(&self, row: usize) -> Option<&[Value]> {
        self.rows.get(row).map(Vec::as_slice)
    }

    /// Stack another table underneath this one, unioning columns
    pub fn append(&mut self, other: CapsuleTable) {
        let mapping: Vec<usize> = other
            .columns
            .iter()
            .map(|name| self.ensure_column(name))
            .collect();
        let width = self.columns.len();
        for other_row in other.rows {
            let mut row = vec![Value::Null; width];
            for (other_col, value) in other_row.into_iter().enumerate() {
                row[mapping[other_col]] = value;
            }
            self.rows.push(row);
        }
    }

    /// Move the named columns to the front, in the given order, creating any
    /// that are missing (all-null). Remaining columns keep relative order.
    pub fn force_front_columns(&mut self, front: &[&str]) {
        for name in front {
            self.ensure_column(name);
        }

        let mut order: Vec<usize> = Vec::with_capacity(self.columns.len());
        for name in front {
            // Just ensured, so the position exists
            if let Some(col) = self.columns.iter().position(|c| c == name) {
                order.push(col);
            }
        }
        for col in 0..self.columns.len() {
            if !order.contains(&col) {
                order.push(col);
            }
        }

        self.columns = order.iter().map(|&c| self.columns[c].clone()).collect();
        for row in &mut self.rows {
            *row = order.iter().map(|&c| row[c].clone()).collect();
        }
    }

    /// Broadcast a constant value down an entire column (scalar results)
    pub fn insert_constant(&mut self, name: &str, value: &Value) {
        let col = self.ensure_column(name);
        for row in &mut self.rows {
            row[col] = value.clone();
        }
    }

    /// Reorder columns to match `order`; names absent from `order` keep
    /// their relative position at the end.
    pub fn reorder_columns(&mut self, order: &[String]) {
        let mut positions: Vec<usize> = Vec::with_capacity(self.columns.len());
        for name in order {
            if let Some(col) = self.columns.iter().position(|c| c == name) {
                if !positions.contains(&col) {
                    positions.push(col);
                }
            }
        }
        for col in 0..self.columns.len() {
            if !positions.contains(&col) {
                positions.push(col);
            }
        }

        self.columns = positions.iter().map(|&c| self.columns[c].clone()).collect();
        for row in &mut self.rows {
            *row = positions.iter().map(|&c| row[c].clone()).collect();
        }
    }

    /// Sort rows by the given columns, nulls last
    pub fn sort_by_columns(&mut self, columns: &[&str]) {
        let positions: Vec<Option<usize>> = columns
            .iter()
            .map(|name| self.columns.iter().position(|c| c == name))
            .collect();

        self.rows.sort_by(|a, b| {
            for pos in positions.iter().flatten() {
                let ord = compare_cells(&a[*pos], &b[*pos]);
                if ord != std::cmp::Ordering::Equal {
                    return ord;
                }
            }
            std::cmp::Ordering::Equal
        });
    }
}

impl CapsuleRow<'_> {
    /// Set a cell; the last write to a name within this row wins
    pub fn set(&mut self, name: &str, value: Value) {
        let col = self.table.ensure_column(name);
        if col >= self.cells.len() {
            self.cells.resize(col + 1, Value::Null);
        }
        self.cells[col] = value;
    }

    /// Commit the row to the table
    pub fn finish(mut self) {
        self.cells.resize(self.table.columns.len(), Value::Null);
        self.table.rows.push(self.cells);
    }
}

fn compare_cells(a: &Value, b: &Value) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Greater,
        (_, Value::Null) => Ordering::Less,
        (Value::Timestamp(x), Value::Timestamp(y)) | (Value::Int(x), Value::Int(y)) => x.cmp(y),
        (Value::Str(x), Value::Str(y)) => x.cmp(y),
        _ => {
            let (x, y) = (a.as_f64(), b.as_f64());
            match (x, y) {
                (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
                _ => a.render().cmp(&b.render()),
            }
        }
    }
}
