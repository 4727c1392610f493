//! Wire protocol for the analytics server
//!
//! Serde request/response types plus a typed [`ApiClient`] wrapping the
//! retrying HTTP client.

mod client;
mod types;

pub use client::ApiClient;
pub use types::{
    CapsuleInput, CapsuleOutput, CapsulesInput, CapsulesOutput, CleanupInput, ConditionBatchInput,
    ConditionInput, DatasourceOutput, FormulaCompileInput, FormulaCompileOutput, FormulaRunInput,
    FormulaRunOutput, Interval, ItemBatchOutput, ItemDependencyOutput, ItemOutput, ItemPreview,
    ItemUpdateOutput, PropertyOutput, SampleOutput, SamplesInput, ScalarValueOutput,
    SeriesSamplesOutput, SignalInput, SignalOutput, StatusMessageOutput, SwapInput, TableOutput,
    TreeChildrenOutput, TreeItemOutput,
};

#[cfg(test)]
mod tests;
