//! Column bookkeeping shared across pull phases
//!
//! Jobs complete in arbitrary order, so output column order cannot come from
//! completion timing. Each row registers the columns it contributed under its
//! input index; the final ordering walks rows in input order.

use std::collections::BTreeMap;

/// Mutable pull state owned by the orchestrator
#[derive(Debug, Default)]
pub struct PullContext {
    /// Row index -> column names that row contributed, in discovery order
    column_names: BTreeMap<usize, Vec<String>>,
}

impl PullContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record columns contributed by one row
    pub fn add_columns(&mut self, row_index: usize, names: &[String]) {
        let entry = self.column_names.entry(row_index).or_default();
        for name in names {
            if !entry.contains(name) {
                entry.push(name.clone());
            }
        }
    }

    /// Canonical output column order: rows in input order, each row's columns
    /// in discovery order, first occurrence wins.
    pub fn final_column_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for row_names in self.column_names.values() {
            for name in row_names {
                if !names.contains(name) {
                    names.push(name.clone());
                }
            }
        }
        names
    }

    /// Columns recorded for one row
    pub fn row_columns(&self, row_index: usize) -> &[String] {
        self.column_names
            .get(&row_index)
            .map_or(&[], Vec::as_slice)
    }
}
