//! Metadata push
//!
//! Creates or updates items by datasource identity ahead of (and, for the
//! deferred pass, after) the data push. Signals go up one by one; conditions
//! go up in a single batch per pass.

use super::plan::PushPlan;
use super::types::{PushItem, PushKind, PushPhase, PushRequest};
use crate::api::{ConditionInput, PropertyOutput, SignalInput};
use crate::error::{Error, Result};
use crate::session::Session;
use crate::status::Status;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Datasource-scoped data ID: the same (scope, name) pair always maps to the
/// same item on re-push.
pub fn scoped_data_id(scope: Option<&str>, name: &str) -> String {
    format!("[{}] {}", scope.unwrap_or(""), name)
}

/// Resolve a row's scope: explicit value, else the request default. A value
/// naming another pushed row resolves to that row's server ID.
fn resolve_scope(
    item: &PushItem,
    request: &PushRequest,
    ids_by_name: &BTreeMap<String, String>,
) -> Option<String> {
    let raw = item
        .scoped_to
        .clone()
        .or_else(|| request.scoped_to.clone())?;
    Some(ids_by_name.get(&raw).cloned().unwrap_or(raw))
}

fn extra_properties(item: &PushItem) -> Vec<PropertyOutput> {
    item.properties
        .iter()
        .map(|(name, value)| PropertyOutput {
            name: name.clone(),
            value: serde_json::Value::String(value.clone()),
            unit_of_measure: None,
        })
        .collect()
}

fn signal_input(
    request: &PushRequest,
    item: &PushItem,
    ids_by_name: &BTreeMap<String, String>,
) -> SignalInput {
    let scoped_to = resolve_scope(item, request, ids_by_name);
    SignalInput {
        name: item.name.clone(),
        datasource_class: item
            .datasource_class
            .clone()
            .unwrap_or_else(|| request.datasource_class.clone()),
        datasource_id: item
            .datasource_id
            .clone()
            .unwrap_or_else(|| request.datasource_id.clone()),
        data_id: item
            .data_id
            .clone()
            .unwrap_or_else(|| scoped_data_id(scoped_to.as_deref(), &item.name)),
        description: item.description.clone(),
        interpolation_method: item.interpolation_method.clone(),
        maximum_interpolation: item.maximum_interpolation.clone(),
        key_unit_of_measure: item.key_unit_of_measure.clone(),
        value_unit_of_measure: item.value_unit_of_measure.clone(),
        scoped_to,
        sync_token: request.sync_token.clone(),
        additional_properties: extra_properties(item),
    }
}

fn condition_input(
    request: &PushRequest,
    item: &PushItem,
    ids_by_name: &BTreeMap<String, String>,
) -> ConditionInput {
    let scoped_to = resolve_scope(item, request, ids_by_name);
    ConditionInput {
        name: item.name.clone(),
        datasource_class: item
            .datasource_class
            .clone()
            .unwrap_or_else(|| request.datasource_class.clone()),
        datasource_id: item
            .datasource_id
            .clone()
            .unwrap_or_else(|| request.datasource_id.clone()),
        data_id: item
            .data_id
            .clone()
            .unwrap_or_else(|| scoped_data_id(scoped_to.as_deref(), &item.name)),
        maximum_duration: item.maximum_duration.clone().unwrap_or_default(),
        description: item.description.clone(),
        scoped_to,
        sync_token: request.sync_token.clone(),
        properties: extra_properties(item),
    }
}

/// Put one signal, retrying once without a scope when the server refuses to
/// re-scope a globally-scoped item.
async fn put_signal_with_scope_retry(
    session: &Session,
    input: SignalInput,
) -> Result<crate::api::SignalOutput> {
    match session.client().put_signal(&input).await {
        Err(Error::HttpStatus { status, body })
            if input.scoped_to.is_some()
                && (400..500).contains(&status)
                && body.to_lowercase().contains("scope") =>
        {
            warn!(
                name = %input.name,
                "signal is globally scoped; retrying without a scope"
            );
            let mut retry = input;
            retry.scoped_to = None;
            session.client().put_signal(&retry).await
        }
        other => other,
    }
}

/// Push metadata for every row in one pass.
///
/// Server IDs land in `ids` (by row index) and `ids_by_name` (by row name);
/// rows whose metadata push fails get a ledger entry and no ID, which takes
/// them out of the data push.
pub async fn push_metadata(
    session: &Session,
    request: &PushRequest,
    plan: &PushPlan,
    phase: PushPhase,
    status: &Status,
    ids: &mut BTreeMap<usize, String>,
    ids_by_name: &mut BTreeMap<String, String>,
) -> Result<()> {
    let mut condition_rows: Vec<usize> = Vec::new();
    let mut conditions: Vec<ConditionInput> = Vec::new();

    for index in plan.rows_in_phase(phase) {
        status.check_interrupt()?;
        let item = &request.rows[index].item;

        match item.kind {
            PushKind::Signal => {
                let input = signal_input(request, item, ids_by_name);
                match put_signal_with_scope_retry(session, input).await {
                    Ok(output) => {
                        ids.insert(index, output.id.clone());
                        ids_by_name.insert(item.name.clone(), output.id);
                    }
                    Err(e) => status.raise_or_catalog(index, e)?,
                }
            }
            PushKind::Condition => {
                condition_rows.push(index);
                conditions.push(condition_input(request, item, ids_by_name));
            }
        }
    }

    if !conditions.is_empty() {
        let batch = crate::api::ConditionBatchInput { conditions };
        let output = session.client().batch_conditions(&batch).await?;
        if output.item_updates.len() != condition_rows.len() {
            return Err(Error::decode(format!(
                "condition batch returned {} updates for {} conditions",
                output.item_updates.len(),
                condition_rows.len()
            )));
        }
        for (index, update) in condition_rows.into_iter().zip(output.item_updates) {
            if let Some(message) = update.error_message {
                status.raise_or_catalog(index, Error::api(message))?;
                continue;
            }
            let Some(item) = update.item else {
                status.raise_or_catalog(
                    index,
                    Error::decode("condition batch update carried no item"),
                )?;
                continue;
            };
            ids.insert(index, item.id.clone());
            ids_by_name.insert(request.rows[index].item.name.clone(), item.id);
        }
    }

    debug!(?phase, pushed = ids.len(), "metadata pass complete");
    Ok(())
}
