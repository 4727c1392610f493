//! Wire types for the analytics server's REST API
//!
//! All request/response bodies are JSON with camelCase field names. Optional
//! fields are omitted from requests when `None`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Formula execution
// ============================================================================

/// Request body for `POST /formulas/run`
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormulaRunInput {
    /// Formula source text
    pub formula: String,
    /// Parameter bindings of the form `name=ITEM_ID`
    pub parameters: Vec<String>,
    /// Range start, ns since epoch UTC
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<i64>,
    /// Range end, ns since epoch UTC
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<i64>,
    /// Maximum rows per page
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    /// Offset-mode page start (capsule table paging only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
    /// Token-mode page cursor from the previous response
    #[serde(skip_serializing_if = "Option::is_none")]
    pub continuation_token: Option<String>,
}

/// Response body for `POST /formulas/run`
///
/// Exactly one of `samples`, `capsules`, `scalar` or `table` is populated,
/// depending on the formula's return type.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormulaRunOutput {
    #[serde(default)]
    pub samples: Option<SeriesSamplesOutput>,
    #[serde(default)]
    pub capsules: Option<CapsulesOutput>,
    #[serde(default)]
    pub scalar: Option<ScalarValueOutput>,
    #[serde(default)]
    pub table: Option<TableOutput>,
    #[serde(default)]
    pub return_type: Option<String>,
}

/// One page of signal samples
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesSamplesOutput {
    #[serde(default)]
    pub samples: Vec<SampleOutput>,
    /// Absent or empty when this is the last page (token mode)
    #[serde(default)]
    pub continuation_token: Option<String>,
}

/// One sample on the wire
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleOutput {
    /// Timestamp key, ns since epoch UTC. Absent keys mark invalid samples.
    #[serde(default)]
    pub key: Option<i64>,
    /// Sample value; null/absent marks an invalid sample
    #[serde(default)]
    pub value: Option<Value>,
}

/// One page of capsules
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapsulesOutput {
    #[serde(default)]
    pub capsules: Vec<CapsuleOutput>,
    #[serde(default)]
    pub continuation_token: Option<String>,
}

/// One capsule on the wire
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapsuleOutput {
    #[serde(default)]
    pub id: Option<String>,
    /// Absent start means the capsule extends to the beginning of time
    #[serde(default)]
    pub start: Option<i64>,
    /// Absent end means the capsule is still open
    #[serde(default)]
    pub end: Option<i64>,
    #[serde(default)]
    pub is_uncertain: Option<bool>,
    #[serde(default)]
    pub properties: Vec<PropertyOutput>,
}

/// A named property with an optional unit
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyOutput {
    pub name: String,
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_of_measure: Option<String>,
}

/// A scalar result
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScalarValueOutput {
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub uom: Option<String>,
}

/// A tabular result (capsule table formulas)
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableOutput {
    #[serde(default)]
    pub headers: Option<Vec<String>>,
    #[serde(default)]
    pub data: Vec<Vec<Value>>,
}

/// Request body for `POST /formulas/compile`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormulaCompileInput {
    pub formula: String,
    pub parameters: Vec<String>,
}

/// Response body for `POST /formulas/compile`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormulaCompileOutput {
    #[serde(default)]
    pub return_type: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
}

// ============================================================================
// Items
// ============================================================================

/// Response body for `GET /items/{id}`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemOutput {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "type")]
    pub item_type: Option<String>,
    #[serde(default)]
    pub scoped_to: Option<String>,
    #[serde(default)]
    pub properties: Vec<PropertyOutput>,
}

impl ItemOutput {
    /// Look up a property value by name, stringified
    pub fn property(&self, name: &str) -> Option<String> {
        self.properties.iter().find(|p| p.name == name).map(|p| {
            p.value
                .as_str()
                .map_or_else(|| p.value.to_string(), ToString::to_string)
        })
    }
}

/// A lightweight item reference inside other responses
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemPreview {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "type")]
    pub item_type: Option<String>,
    /// Asset-tree ancestors, root first
    #[serde(default)]
    pub ancestors: Vec<ItemPreview>,
}

/// Response body for `GET /items/{id}/dependencies`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemDependencyOutput {
    #[serde(default)]
    pub dependencies: Vec<ItemPreview>,
}

/// Request body for `POST /items/{id}/swap`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapInput {
    /// Asset to swap the calculation onto
    pub asset_id: String,
}

// ============================================================================
// Signal ingestion
// ============================================================================

/// Request body for `PUT /signals` (create-or-update by datasource identity)
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalInput {
    pub name: String,
    pub datasource_class: String,
    pub datasource_id: String,
    pub data_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interpolation_method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum_interpolation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_unit_of_measure: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_unit_of_measure: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scoped_to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_token: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub additional_properties: Vec<PropertyOutput>,
}

/// Response body for `PUT /signals`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalOutput {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "type")]
    pub item_type: Option<String>,
}

/// Closed time interval for overwrite writes, ns since epoch UTC
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Interval {
    pub start: i64,
    pub end: i64,
}

/// Request body for `POST|PUT /signals/{id}/samples`
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SamplesInput {
    pub samples: Vec<SampleOutput>,
    /// Present only on overwrite (PUT): the range being replaced
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<Interval>,
}

// ============================================================================
// Condition ingestion
// ============================================================================

/// One condition in a `POST /conditions/batch` request
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionInput {
    pub name: String,
    pub datasource_class: String,
    pub datasource_id: String,
    pub data_id: String,
    pub maximum_duration: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scoped_to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_token: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<PropertyOutput>,
}

/// Request body for `POST /conditions/batch`
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionBatchInput {
    pub conditions: Vec<ConditionInput>,
}

/// One entry in a batch response
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemUpdateOutput {
    #[serde(default)]
    pub item: Option<ItemPreview>,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// Response body for `POST /conditions/batch`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemBatchOutput {
    #[serde(default)]
    pub item_updates: Vec<ItemUpdateOutput>,
}

/// One capsule in a `POST|PUT /conditions/{id}/capsules` request
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapsuleInput {
    pub start: i64,
    pub end: i64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<PropertyOutput>,
}

/// Request body for `POST|PUT /conditions/{id}/capsules`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapsulesInput {
    /// Always "ns"; capsule keys are nanoseconds since epoch
    pub key_unit_of_measure: String,
    pub capsules: Vec<CapsuleInput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<Interval>,
}

impl Default for CapsulesInput {
    fn default() -> Self {
        Self {
            key_unit_of_measure: "ns".to_string(),
            capsules: Vec::new(),
            interval: None,
        }
    }
}

// ============================================================================
// Trees & datasources
// ============================================================================

/// One child in a tree listing
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeItemOutput {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "type")]
    pub item_type: Option<String>,
    #[serde(default)]
    pub sync_token: Option<String>,
    #[serde(default)]
    pub has_children: bool,
}

/// Response body for `GET /trees/{id}/children`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeChildrenOutput {
    #[serde(default)]
    pub children: Vec<TreeItemOutput>,
}

/// Response body for `GET /datasources/{id}`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasourceOutput {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub datasource_class: Option<String>,
    #[serde(default)]
    pub datasource_id: Option<String>,
    /// Count of items currently indexed under this datasource
    #[serde(default)]
    pub item_count: Option<u64>,
}

/// Request body for `POST /datasources/{id}/cleanup`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupInput {
    /// Items whose sync token differs from this value are archived
    pub sync_token: String,
}

/// Generic server acknowledgement
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusMessageOutput {
    #[serde(default)]
    pub status_message: Option<String>,
}
