//! Options and result types for the pull engine

use crate::table::{CapsuleTable, Series, Value};
use crate::types::{EnumsAs, ErrorHandling, HeaderMode, InvalidValuesAs, ItemRef, ReturnType, Shape};
use arrow::record_batch::RecordBatch;

/// Server-side resampling interval
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Grid {
    /// No resampling; raw sample timestamps come back as stored
    #[default]
    None,
    /// Estimate a period from the queried signals (median of estimates)
    Auto,
    /// Explicit period, e.g. "15min" or "500ms"
    Period(String),
}

/// An on-the-fly calculation applied while data is retrieved
#[derive(Debug, Clone, PartialEq)]
pub enum Calculation {
    /// Formula applied to every row; must reference exactly one of
    /// `$signal`, `$condition` or `$scalar`
    Formula(String),
    /// A calculated item swapped across the queried assets
    AcrossAssets(ItemRef),
}

/// Options for one pull call
#[derive(Debug, Clone)]
pub struct PullOptions {
    /// Range start, ns since epoch UTC
    pub start: i64,
    /// Range end, ns since epoch UTC
    pub end: i64,
    pub grid: Grid,
    pub header: HeaderMode,
    /// Metadata columns forming a composite row key alongside the timestamp
    pub group_by: Vec<String>,
    pub shape: Shape,
    /// Restrict capsule property columns to these names; `None` keeps all
    pub capsule_properties: Option<Vec<String>>,
    /// Display timezone recorded on the result; data stays UTC ns internally
    pub tz_convert: Option<String>,
    pub calculation: Option<Calculation>,
    /// Keep one out-of-range sample on each side of the range
    pub bounding_values: bool,
    pub invalid_values_as: InvalidValuesAs,
    /// `None` leaves `ENUM{{n|s}}` strings raw
    pub enums_as: Option<EnumsAs>,
    pub errors: ErrorHandling,
}

impl Default for PullOptions {
    fn default() -> Self {
        Self {
            start: 0,
            end: 0,
            grid: Grid::Period("15min".to_string()),
            header: HeaderMode::Auto,
            group_by: Vec::new(),
            shape: Shape::Auto,
            capsule_properties: None,
            tz_convert: None,
            calculation: None,
            bounding_values: false,
            invalid_values_as: InvalidValuesAs::Null,
            enums_as: Some(EnumsAs::String),
            errors: ErrorHandling::Raise,
        }
    }
}

/// One input row after return-type resolution and asset-swap indirection
#[derive(Debug, Clone)]
pub struct QueryRow {
    /// Position in the caller's item list; ledger key
    pub index: usize,
    pub item: ItemRef,
    /// Item actually fetched (differs from `item.id` after an asset swap)
    pub effective_id: String,
    pub return_type: ReturnType,
    /// Resolved column header
    pub header: String,
    /// Per-row formula override, already parameter-bound
    pub formula: Option<String>,
}

/// The payload a row job produced for one phase
#[derive(Debug, Clone)]
pub enum RowData {
    /// Named series: the item column plus any capsule-property columns
    Samples(Vec<(String, Series)>),
    Capsules(CapsuleTable),
    Scalar { column: String, value: Value },
}

/// One row's contribution to a phase, handed to merge or to the callback
#[derive(Debug, Clone)]
pub struct RowResult {
    pub row_index: usize,
    /// Output column names this row contributed, in discovery order
    pub column_names: Vec<String>,
    pub data: RowData,
}

/// Result of a pull call
#[derive(Debug)]
pub struct PullResult {
    /// `None` for callback-driven pulls
    pub table: Option<RecordBatch>,
    /// Effective range and grid after resolution
    pub start: i64,
    pub end: i64,
    pub grid: Option<String>,
    pub tz_convert: Option<String>,
    /// The resolved query rows, in input order
    pub query: Vec<QueryRow>,
}
