//! Common types used throughout quarry
//!
//! The item model: what kind of thing a row refers to, how it was defined,
//! and the caller-facing policy enums shared by pull and push.

use crate::error::{Error, Result};
use std::collections::BTreeMap;

// ============================================================================
// Item kinds and return types
// ============================================================================

/// The kind of item a row refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemKind {
    /// A time-indexed sequence of scalar samples
    Signal,
    /// A set of time intervals ("capsules"), each optionally carrying properties
    Condition,
    /// A single constant value
    Scalar,
    /// A node in an asset tree
    Asset,
}

impl ItemKind {
    /// The lowercase formula parameter name for this kind (`$signal`, ...)
    pub fn parameter_name(self) -> &'static str {
        match self {
            ItemKind::Signal => "signal",
            ItemKind::Condition => "condition",
            ItemKind::Scalar => "scalar",
            ItemKind::Asset => "asset",
        }
    }

    /// Display name, e.g. "Signal"
    pub fn name(self) -> &'static str {
        match self {
            ItemKind::Signal => "Signal",
            ItemKind::Condition => "Condition",
            ItemKind::Scalar => "Scalar",
            ItemKind::Asset => "Asset",
        }
    }
}

/// Whether an item is stored data or a calculation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemOrigin {
    /// Raw data persisted by a datasource
    Stored,
    /// Defined by a formula
    Calculated,
}

/// The resolved return type of a query row: origin x kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReturnType {
    pub origin: ItemOrigin,
    pub kind: ItemKind,
}

impl ReturnType {
    pub fn new(origin: ItemOrigin, kind: ItemKind) -> Self {
        Self { origin, kind }
    }

    pub fn stored(kind: ItemKind) -> Self {
        Self::new(ItemOrigin::Stored, kind)
    }

    pub fn calculated(kind: ItemKind) -> Self {
        Self::new(ItemOrigin::Calculated, kind)
    }

    /// Parse a server-reported type string into the closed union.
    ///
    /// The server reports types like `StoredSignal`, `CalculatedCondition`,
    /// `LiteralScalar` or plain `Signal`. Unknown strings are an error rather
    /// than falling back to substring checks.
    pub fn parse(s: &str) -> Result<Self> {
        let rt = match s {
            "Signal" | "StoredSignal" => Self::stored(ItemKind::Signal),
            "CalculatedSignal" => Self::calculated(ItemKind::Signal),
            "Condition" | "StoredCondition" => Self::stored(ItemKind::Condition),
            "CalculatedCondition" => Self::calculated(ItemKind::Condition),
            "Scalar" | "LiteralScalar" | "StoredScalar" => Self::stored(ItemKind::Scalar),
            "CalculatedScalar" => Self::calculated(ItemKind::Scalar),
            "Asset" => Self::stored(ItemKind::Asset),
            other => {
                return Err(Error::decode(format!("Unrecognized item type '{other}'")));
            }
        };
        Ok(rt)
    }

    /// Format back into the server's naming (`CalculatedSignal` etc.)
    pub fn as_str(self) -> &'static str {
        match (self.origin, self.kind) {
            (ItemOrigin::Stored, ItemKind::Signal) => "StoredSignal",
            (ItemOrigin::Calculated, ItemKind::Signal) => "CalculatedSignal",
            (ItemOrigin::Stored, ItemKind::Condition) => "StoredCondition",
            (ItemOrigin::Calculated, ItemKind::Condition) => "CalculatedCondition",
            (ItemOrigin::Stored, ItemKind::Scalar) => "LiteralScalar",
            (ItemOrigin::Calculated, ItemKind::Scalar) => "CalculatedScalar",
            (_, ItemKind::Asset) => "Asset",
        }
    }

    /// Signals, conditions and scalars can be pulled; assets must first be
    /// resolved to the type of their associated calculation.
    pub fn is_pull_eligible(self) -> bool {
        !matches!(self.kind, ItemKind::Asset)
    }
}

impl std::fmt::Display for ReturnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Item references
// ============================================================================

/// Identifies one signal/condition/scalar/asset to pull from or push to.
///
/// Immutable once dispatched to a fetch/write operation. Usually constructed
/// from the caller's query or metadata table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemRef {
    /// Server ID of the item
    pub id: String,
    /// Server-reported type string, e.g. "StoredSignal"
    pub item_type: Option<String>,
    /// Item name
    pub name: Option<String>,
    /// Asset tree path ("Plant >> Area A")
    pub path: Option<String>,
    /// Direct parent asset name
    pub asset: Option<String>,
    /// Explicit column header override
    pub header: Option<String>,
    /// Per-row "on-the-fly" formula applied while data is retrieved
    pub calculation: Option<String>,
    /// Per-row start override (ns since epoch, UTC), honored in callback pulls
    pub start: Option<i64>,
    /// Per-row end override (ns since epoch, UTC)
    pub end: Option<i64>,
    /// Statistic to compute when this signal participates in a capsule table
    pub statistic: Option<String>,
    /// Any additional metadata properties carried along from the query table
    pub properties: BTreeMap<String, String>,
}

impl ItemRef {
    /// Create a reference from an ID and type string
    pub fn new(id: impl Into<String>, item_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            item_type: Some(item_type.into()),
            ..Default::default()
        }
    }

    /// Set the name
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the asset tree path
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Set the parent asset name
    #[must_use]
    pub fn with_asset(mut self, asset: impl Into<String>) -> Self {
        self.asset = Some(asset.into());
        self
    }

    /// Set the per-row calculation formula
    #[must_use]
    pub fn with_calculation(mut self, formula: impl Into<String>) -> Self {
        self.calculation = Some(formula.into());
        self
    }

    /// Set the statistic for capsule-table pulls
    #[must_use]
    pub fn with_statistic(mut self, statistic: impl Into<String>) -> Self {
        self.statistic = Some(statistic.into());
        self
    }

    /// Look up a named field the way a tabular query row would, falling back
    /// to the free-form properties map. Used for group-by and header lookups.
    pub fn field(&self, name: &str) -> Option<&str> {
        match name {
            "ID" => Some(self.id.as_str()),
            "Type" => self.item_type.as_deref(),
            "Name" => self.name.as_deref(),
            "Path" => self.path.as_deref(),
            "Asset" => self.asset.as_deref(),
            "Header" => self.header.as_deref(),
            "Statistic" => self.statistic.as_deref(),
            other => self.properties.get(other).map(String::as_str),
        }
    }

    /// Parse this row's declared type, if any
    pub fn return_type(&self) -> Result<ReturnType> {
        match &self.item_type {
            Some(t) => ReturnType::parse(t),
            None => Err(Error::invalid_argument(
                "items",
                format!("row for item '{}' has no Type", self.id),
            )),
        }
    }
}

// ============================================================================
// Policy enums shared by pull and push
// ============================================================================

/// What to do when a row fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorHandling {
    /// Propagate the first failure as an error
    #[default]
    Raise,
    /// Record the failure in the status ledger's Result column and continue
    Catalog,
}

/// Output shape of a pull
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Shape {
    /// Samples when signals (or scalars without conditions) are present,
    /// otherwise capsules
    #[default]
    Auto,
    /// One column per item, indexed by timestamp; conditions become 0/1 series
    Samples,
    /// One row per capsule
    Capsules,
}

/// How to pick the column header for each item
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum HeaderMode {
    /// Concatenate Path, Asset and Name when present; honor an explicit
    /// Header field first
    #[default]
    Auto,
    /// Use the item ID (guaranteed unique)
    Id,
    /// Use a named metadata field
    Field(String),
}

/// How to decode `ENUM{{int|string}}` sample values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnumsAs {
    /// Return the human-readable name only
    #[default]
    String,
    /// Return the numeric code only
    Numeric,
    /// Return both as a (code, name) pair
    Tuple,
}

/// Substitution for invalid/missing sample and scalar values
#[derive(Debug, Clone, PartialEq, Default)]
pub enum InvalidValuesAs {
    /// Leave invalid values as nulls (NaN in numeric output)
    #[default]
    Null,
    /// A "magic" number, preserving numeric column types
    Number(f64),
    /// A marker string; forces value-by-value processing on numeric series
    Text(String),
}

/// What to do when a pushed value's type does not match its column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TypeMismatchPolicy {
    /// Hard error
    #[default]
    Raise,
    /// Skip the sample
    Drop,
    /// Substitute an invalid (null) sample, interrupting interpolation
    Invalid,
}

/// Backoff strategy for HTTP retries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackoffType {
    /// Same delay every retry
    Constant,
    /// Delay grows linearly with the attempt number
    Linear,
    /// Delay doubles each attempt
    #[default]
    Exponential,
}
