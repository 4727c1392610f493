//! Typed push plan
//!
//! The metadata push runs as two explicit passes over a plan built once up
//! front, instead of re-filtering rows by predicate between passes. Pass
//! membership is fixed at build time.

use super::types::{PushData, PushKind, PushPhase, PushRow};
use crate::error::{Error, Result};

/// One planned row: its request position and the pass it belongs to
#[derive(Debug, Clone, Copy)]
pub struct PlannedRow {
    pub index: usize,
    pub phase: PushPhase,
}

/// The fixed two-pass plan for one push call
#[derive(Debug, Clone, Default)]
pub struct PushPlan {
    rows: Vec<PlannedRow>,
}

impl PushPlan {
    /// Validate the rows and assign each to a pass
    pub fn build(rows: &[PushRow]) -> Result<Self> {
        let mut planned = Vec::with_capacity(rows.len());

        for (index, row) in rows.iter().enumerate() {
            if row.item.name.is_empty() {
                return Err(Error::invalid_argument(
                    "metadata",
                    format!("push row {index} has no Name"),
                ));
            }
            match (&row.item.kind, &row.data) {
                (PushKind::Signal, Some(PushData::Capsules(_))) => {
                    return Err(Error::invalid_argument(
                        "data",
                        format!("push row {index} ('{}') is a signal but carries capsules", row.item.name),
                    ));
                }
                (PushKind::Condition, Some(PushData::Samples(_))) => {
                    return Err(Error::invalid_argument(
                        "data",
                        format!("push row {index} ('{}') is a condition but carries samples", row.item.name),
                    ));
                }
                (PushKind::Condition, _) if row.item.maximum_duration.is_none() => {
                    return Err(Error::invalid_argument(
                        "metadata",
                        format!(
                            "condition '{}' requires a Maximum Duration",
                            row.item.name
                        ),
                    ));
                }
                _ => {}
            }
            if row.item.phase == PushPhase::Deferred && row.data.is_some() {
                return Err(Error::invalid_argument(
                    "metadata",
                    format!(
                        "push row {index} ('{}') is deferred to the second metadata pass \
                         and cannot carry data",
                        row.item.name
                    ),
                ));
            }

            planned.push(PlannedRow {
                index,
                phase: row.item.phase,
            });
        }

        Ok(Self { rows: planned })
    }

    /// Row indices belonging to one pass, in request order
    pub fn rows_in_phase(&self, phase: PushPhase) -> impl Iterator<Item = usize> + '_ {
        self.rows
            .iter()
            .filter(move |row| row.phase == phase)
            .map(|row| row.index)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
