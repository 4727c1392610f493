//! Options and result types for the push engine

use crate::error::{Error, Result};
use crate::table::{Series, Value};
use crate::types::TypeMismatchPolicy;
use std::collections::BTreeMap;
use std::time::Duration;

/// Which metadata pass a row belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PushPhase {
    /// Pushed before any data; produces the server IDs other rows may need
    #[default]
    Structure,
    /// Pushed after data, with the first pass's IDs available for resolution
    Deferred,
}

/// Kind of item a push row creates or updates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PushKind {
    #[default]
    Signal,
    Condition,
}

/// Metadata for one pushed item
#[derive(Debug, Clone, Default)]
pub struct PushItem {
    pub name: String,
    pub kind: PushKind,
    pub phase: PushPhase,
    /// Datasource-scoped identity; derived from scope + name when absent
    pub data_id: Option<String>,
    /// Datasource identity overrides; request-level defaults apply when absent
    pub datasource_class: Option<String>,
    pub datasource_id: Option<String>,
    /// Scope target: an ID, or the name of another row in this push
    pub scoped_to: Option<String>,
    pub description: Option<String>,
    pub interpolation_method: Option<String>,
    pub maximum_interpolation: Option<String>,
    pub key_unit_of_measure: Option<String>,
    pub value_unit_of_measure: Option<String>,
    /// Required for conditions with capsule data
    pub maximum_duration: Option<String>,
    /// Units applied to outgoing capsule properties, by property name
    pub capsule_property_units: BTreeMap<String, String>,
    /// Extra item properties pushed verbatim
    pub properties: BTreeMap<String, String>,
}

impl PushItem {
    pub fn signal(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: PushKind::Signal,
            ..Self::default()
        }
    }

    pub fn condition(name: impl Into<String>, maximum_duration: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: PushKind::Condition,
            maximum_duration: Some(maximum_duration.into()),
            ..Self::default()
        }
    }

    pub fn with_value_uom(mut self, uom: impl Into<String>) -> Self {
        self.value_unit_of_measure = Some(uom.into());
        self
    }

    pub fn with_scope(mut self, scoped_to: impl Into<String>) -> Self {
        self.scoped_to = Some(scoped_to.into());
        self
    }

    pub fn deferred(mut self) -> Self {
        self.phase = PushPhase::Deferred;
        self
    }
}

/// One capsule to write
#[derive(Debug, Clone, Default)]
pub struct CapsuleRecord {
    /// ns since epoch UTC
    pub start: i64,
    pub end: i64,
    pub properties: BTreeMap<String, Value>,
}

/// The data attached to one push row
#[derive(Debug, Clone)]
pub enum PushData {
    Samples(Series),
    Capsules(Vec<CapsuleRecord>),
}

/// One row of a push call: metadata plus optional data
#[derive(Debug, Clone)]
pub struct PushRow {
    pub item: PushItem,
    pub data: Option<PushData>,
}

impl PushRow {
    pub fn new(item: PushItem) -> Self {
        Self { item, data: None }
    }

    pub fn with_samples(item: PushItem, series: Series) -> Self {
        Self {
            item,
            data: Some(PushData::Samples(series)),
        }
    }

    pub fn with_capsules(item: PushItem, capsules: Vec<CapsuleRecord>) -> Self {
        Self {
            item,
            data: Some(PushData::Capsules(capsules)),
        }
    }
}

/// The closed range an overwrite push replaces, ns since epoch UTC.
///
/// Both bounds are required and the start must precede the end; the start
/// is advanced past the last flushed key between successive pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplaceInterval {
    start: i64,
    end: i64,
}

impl ReplaceInterval {
    pub fn new(start: i64, end: i64) -> Result<Self> {
        if start >= end {
            return Err(Error::invalid_argument(
                "replace",
                format!("replace start ({start}) must be before end ({end})"),
            ));
        }
        Ok(Self { start, end })
    }

    pub fn start(self) -> i64 {
        self.start
    }

    pub fn end(self) -> i64 {
        self.end
    }
}

/// Where stale-item archival should look
#[derive(Debug, Clone, Default)]
pub struct ArchiveScope {
    /// Datasource whose items were touched by this push
    pub datasource_id: String,
    /// Asset-tree node the manual walk starts from
    pub root_asset_id: String,
}

/// One push call
#[derive(Debug, Clone)]
pub struct PushRequest {
    pub rows: Vec<PushRow>,
    /// Overwrite mode: replace this range instead of appending
    pub replace: Option<ReplaceInterval>,
    /// Archive items the sync token did not touch after the data push
    pub archive: Option<ArchiveScope>,
    pub type_mismatches: TypeMismatchPolicy,
    /// Datasource identity defaults for rows that carry none
    pub datasource_class: String,
    pub datasource_id: String,
    /// Scope default for rows that carry none
    pub scoped_to: Option<String>,
    /// Marks every pushed item as touched; required for archival
    pub sync_token: Option<String>,
}

impl Default for PushRequest {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            replace: None,
            archive: None,
            type_mismatches: TypeMismatchPolicy::default(),
            datasource_class: "quarry".to_string(),
            datasource_id: "quarry".to_string(),
            scoped_to: None,
            sync_token: None,
        }
    }
}

/// What one row's data write accomplished
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteSummary {
    pub count: u64,
    /// Smallest key written
    pub earliest: Option<i64>,
    /// Largest key written
    pub latest: Option<i64>,
}

impl WriteSummary {
    /// Min/max merge of another summary into this one
    pub fn absorb(&mut self, other: WriteSummary) {
        self.count += other.count;
        self.earliest = match (self.earliest, other.earliest) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        self.latest = match (self.latest, other.latest) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
    }

    pub fn record(&mut self, key: i64) {
        self.count += 1;
        self.earliest = Some(self.earliest.map_or(key, |e| e.min(key)));
        self.latest = Some(self.latest.map_or(key, |l| l.max(key)));
    }
}

/// One row of a push result
#[derive(Debug, Clone)]
pub struct PushRowResult {
    /// Position in the request's row list
    pub index: usize,
    /// Server ID after the metadata push, if it succeeded
    pub id: Option<String>,
    pub push_count: u64,
    pub push_time: Duration,
    /// Terminal ledger value: "Success" or "[Error] ..."
    pub push_result: String,
}

/// Result of a push call
#[derive(Debug, Default)]
pub struct PushResult {
    pub rows: Vec<PushRowResult>,
    /// Smallest sample/capsule key written across all rows
    pub earliest: Option<i64>,
    pub latest: Option<i64>,
    /// Items archived by the manual tree walk; `None` when archival was
    /// skipped or delegated to the bulk datasource cleanup
    pub archived: Option<u64>,
}

#[cfg(test)]
mod types_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_replace_interval_validation() {
        assert!(ReplaceInterval::new(0, 100).is_ok());
        assert!(ReplaceInterval::new(100, 100).is_err());
        assert!(ReplaceInterval::new(200, 100).is_err());
    }

    #[test]
    fn test_write_summary_merge() {
        let mut total = WriteSummary::default();
        total.absorb(WriteSummary {
            count: 2,
            earliest: Some(100),
            latest: Some(200),
        });
        total.absorb(WriteSummary {
            count: 3,
            earliest: Some(50),
            latest: Some(150),
        });
        assert_eq!(total.count, 5);
        assert_eq!(total.earliest, Some(50));
        assert_eq!(total.latest, Some(200));
    }
}
