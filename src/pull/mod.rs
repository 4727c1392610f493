//! Pull engine
//!
//! Drives the phases signals -> conditions -> scalars -> final ordering,
//! dispatching one fetch job per query row and merging row results into a
//! single output table. The signals phase is omitted for capsules shape.

mod condition;
mod context;
mod grid;
mod scalar;
mod signal;
mod types;

pub use condition::{
    build_capsule_table_formula, capsules_to_samples, fetch_capsule_table, fetch_capsules,
    statistic_to_aggregation_function, CapsuleFetch, CapsuleTableFetch, StatColumn,
    OPEN_END_SENTINEL_NS,
};
pub use context::PullContext;
pub use grid::{estimate_auto_grid, parse_period_ns};
pub use scalar::{fetch_scalar, ScalarFetch};
pub use signal::{fetch_signal, sanitize_enum, SignalFetch};
pub use types::{Calculation, Grid, PullOptions, PullResult, QueryRow, RowData, RowResult};

use crate::error::{Error, Result};
use crate::session::Session;
use crate::status::{Jobs, Status};
use crate::table::{
    capsule_table_to_batch, sample_table_to_batch, CapsuleTable, SampleTable, Series, Value,
    CAPSULE_FRONT_COLUMNS,
};
use crate::types::{HeaderMode, ItemKind, ItemRef, ReturnType, Shape};
use std::collections::{BTreeMap, HashSet};
use std::time::Instant;
use tracing::debug;

/// Synthetic signal used to build a timestamp skeleton for pure
/// condition-as-samples pulls; dropped from the final table.
const PLACEHOLDER_COLUMN: &str = "__placeholder__";

/// Pull data for the given items into one Arrow table
pub async fn pull(
    session: &Session,
    items: &[ItemRef],
    options: &PullOptions,
    status: &Status,
) -> Result<PullResult> {
    pull_inner(session, items, options, status, None).await
}

/// Pull data, handing each row's raw result to `callback` instead of
/// merging into a table. Per-row Start/End overrides are honored here.
pub async fn pull_with_callback(
    session: &Session,
    items: &[ItemRef],
    options: &PullOptions,
    status: &Status,
    callback: &mut (dyn FnMut(RowResult) + Send),
) -> Result<PullResult> {
    pull_inner(session, items, options, status, Some(callback)).await
}

#[allow(clippy::too_many_lines)]
async fn pull_inner(
    session: &Session,
    items: &[ItemRef],
    options: &PullOptions,
    status: &Status,
    mut callback: Option<&mut (dyn FnMut(RowResult) + Send)>,
) -> Result<PullResult> {
    if options.start >= options.end {
        return Err(Error::invalid_argument(
            "start",
            format!(
                "start ({}) must be before end ({})",
                options.start, options.end
            ),
        ));
    }
    if let Grid::Period(period) = &options.grid {
        parse_period_ns(period)?;
    }

    let max_concurrent = session.options().max_concurrent_requests;
    let callback_mode = callback.is_some();

    // ------------------------------------------------------------------
    // Resolve query rows: return types, swaps, headers
    // ------------------------------------------------------------------
    let mut rows: BTreeMap<usize, QueryRow> = BTreeMap::new();
    for (index, item) in items.iter().enumerate() {
        match resolve_query_row(session, index, item, options).await {
            Ok(row) => {
                rows.insert(index, row);
            }
            Err(e) => status.raise_or_catalog(index, e)?,
        }
    }

    let shape = effective_shape(options.shape, rows.values());
    let signal_rows: Vec<usize> = row_indices_of_kind(&rows, ItemKind::Signal);
    let condition_rows: Vec<usize> = row_indices_of_kind(&rows, ItemKind::Condition);
    let scalar_rows: Vec<usize> = row_indices_of_kind(&rows, ItemKind::Scalar);

    let grid: Option<String> = match &options.grid {
        Grid::None => None,
        Grid::Period(period) => Some(period.clone()),
        Grid::Auto => {
            let signal_query: Vec<QueryRow> = rows.values().cloned().collect();
            if signal_rows.is_empty() {
                None
            } else {
                Some(estimate_auto_grid(session, &signal_query, options.start, options.end).await?)
            }
        }
    };

    // Pure condition-as-samples needs a concrete grid for the skeleton
    let needs_placeholder =
        shape == Shape::Samples && signal_rows.is_empty() && !condition_rows.is_empty();
    if needs_placeholder && grid.is_none() {
        return Err(Error::config(
            "Pulling conditions with shape=samples and no signals requires an explicit grid \
             (grid=none and grid=auto cannot produce a timestamp skeleton)",
        ));
    }

    let mut table = SampleTable::with_group_columns(options.group_by.clone());
    let mut cap_table = CapsuleTable::with_columns(
        CAPSULE_FRONT_COLUMNS.iter().map(ToString::to_string).collect(),
    );
    let mut ctx = PullContext::new();
    let mut used_names: HashSet<String> = HashSet::new();
    let mut deferred_scalars: Vec<(usize, String, Value)> = Vec::new();
    let mut placeholder_series: Option<Series> = None;

    // ------------------------------------------------------------------
    // Signals phase (omitted for capsules shape)
    // ------------------------------------------------------------------
    if shape == Shape::Samples {
        let mut jobs: Jobs<'_, RowData> = Jobs::new();

        for &index in &signal_rows {
            let row = &rows[&index];
            let mut formula = row
                .formula
                .clone()
                .unwrap_or_else(|| "$signal".to_string());
            if let Some(g) = &grid {
                formula = format!("{formula}.resample({g})");
            }
            let (start, end) = row_range(row, options, callback_mode);
            let fetch = SignalFetch {
                formula,
                parameters: vec![format!("signal={}", row.effective_id)],
                start,
                end,
                bounding_values: options.bounding_values,
                invalid_values_as: options.invalid_values_as.clone(),
                enums_as: options.enums_as,
            };
            let header = row.header.clone();
            jobs.add(index, async move {
                let started = Instant::now();
                let result = fetch_signal(session, status, index, &fetch).await;
                status.update_row(index, |l| l.time += started.elapsed());
                result.map(|series| RowData::Samples(vec![(header, series)]))
            });
        }

        if needs_placeholder {
            let placeholder_index = items.len();
            let g = grid.clone().unwrap_or_default();
            let fetch = SignalFetch {
                formula: format!("0.toSignal({g})"),
                parameters: Vec::new(),
                start: options.start,
                end: options.end,
                bounding_values: false,
                invalid_values_as: options.invalid_values_as.clone(),
                enums_as: None,
            };
            jobs.add(placeholder_index, async move {
                let started = Instant::now();
                let result = fetch_signal(session, status, placeholder_index, &fetch).await;
                status.update_row(placeholder_index, |l| l.time += started.elapsed());
                result.map(|series| RowData::Samples(vec![(PLACEHOLDER_COLUMN.to_string(), series)]))
            });
        }

        let results = jobs.execute(max_concurrent).await;
        status.check_interrupt()?;

        for (index, result) in results {
            match result {
                Ok(RowData::Samples(columns)) => {
                    if index >= items.len() {
                        // Placeholder: retained for skeleton insertion below
                        if let Some((_, series)) = columns.into_iter().next() {
                            placeholder_series = Some(series);
                        }
                        status.set_result(index, "Success");
                        continue;
                    }
                    let row = &rows[&index];
                    if let Some(cb) = callback.as_mut() {
                        emit_callback(cb, status, index, columns_result(index, columns));
                        continue;
                    }
                    merge_sample_columns(
                        &mut table,
                        &mut used_names,
                        &mut ctx,
                        &options.group_by,
                        row,
                        columns,
                    )?;
                    status.set_result(index, "Success");
                }
                Ok(_) => unreachable!("signal jobs produce sample data"),
                Err(e) => status.raise_or_catalog(index, e)?,
            }
        }

        // Insert the skeleton under every condition group so that each
        // group's index is populated before reshaping
        if let Some(series) = &placeholder_series {
            if options.group_by.is_empty() {
                table.insert_series(PLACEHOLDER_COLUMN, &[], series);
            } else {
                let mut groups: Vec<Vec<String>> = Vec::new();
                for &index in &condition_rows {
                    let group = group_values(&rows[&index], &options.group_by)?;
                    if !groups.contains(&group) {
                        groups.push(group);
                    }
                }
                for group in &groups {
                    table.insert_series(PLACEHOLDER_COLUMN, group, series);
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Conditions phase
    // ------------------------------------------------------------------
    if !condition_rows.is_empty() {
        let use_capsule_table = shape == Shape::Capsules && !signal_rows.is_empty();
        let mut jobs: Jobs<'_, RowData> = Jobs::new();

        for &index in &condition_rows {
            let row = &rows[&index];
            let (start, end) = row_range(row, options, callback_mode);

            if use_capsule_table {
                let mut parameters = vec![format!("c0={}", row.effective_id)];
                let mut stat_columns = Vec::new();
                for (pos, &sig_index) in signal_rows.iter().enumerate() {
                    let sig = &rows[&sig_index];
                    let param = format!("s{pos}");
                    let statistic = sig
                        .item
                        .statistic
                        .clone()
                        .unwrap_or_else(|| "Average".to_string());
                    parameters.push(format!("{param}={}", sig.effective_id));
                    stat_columns.push(StatColumn {
                        param,
                        header: format!("{} ({})", sig.header, statistic),
                        statistic,
                    });
                }
                let fetch = CapsuleTableFetch {
                    start,
                    end,
                    condition_name: row.header.clone(),
                    condition_param: "c0".to_string(),
                    parameters,
                    properties: options.capsule_properties.clone().unwrap_or_default(),
                    stat_columns,
                };
                jobs.add(index, async move {
                    let started = Instant::now();
                    let result = fetch_capsule_table(session, status, index, &fetch).await;
                    status.update_row(index, |l| l.time += started.elapsed());
                    result.map(RowData::Capsules)
                });
            } else {
                let fetch = CapsuleFetch {
                    formula: row
                        .formula
                        .clone()
                        .unwrap_or_else(|| "$condition".to_string()),
                    parameters: vec![format!("condition={}", row.effective_id)],
                    start,
                    end,
                    condition_name: row.header.clone(),
                    capsule_properties: options.capsule_properties.clone(),
                };
                jobs.add(index, async move {
                    let started = Instant::now();
                    let result = fetch_capsules(session, status, index, &fetch).await;
                    status.update_row(index, |l| l.time += started.elapsed());
                    result.map(RowData::Capsules)
                });
            }
        }

        let results = jobs.execute(max_concurrent).await;
        status.check_interrupt()?;

        for (index, result) in results {
            match result {
                Ok(RowData::Capsules(caps)) => {
                    let row = &rows[&index];
                    if let Some(cb) = callback.as_mut() {
                        let names = caps.column_names().to_vec();
                        emit_callback(
                            cb,
                            status,
                            index,
                            RowResult {
                                row_index: index,
                                column_names: names,
                                data: RowData::Capsules(caps),
                            },
                        );
                        continue;
                    }
                    if shape == Shape::Capsules {
                        ctx.add_columns(index, caps.column_names());
                        cap_table.append(caps);
                    } else {
                        let group = group_values(row, &options.group_by)?;
                        let keys = table.keys_for_group(&group);
                        let columns = capsules_to_samples(&caps, &keys, &row.header);
                        merge_sample_columns(
                            &mut table,
                            &mut used_names,
                            &mut ctx,
                            &options.group_by,
                            row,
                            columns,
                        )?;
                    }
                    status.set_result(index, "Success");
                }
                Ok(_) => unreachable!("condition jobs produce capsule data"),
                Err(e) => status.raise_or_catalog(index, e)?,
            }
        }

        if use_capsule_table {
            // Stat signal rows were delivered through the condition jobs
            for &sig_index in &signal_rows {
                let sig = &rows[&sig_index];
                let statistic = sig
                    .item
                    .statistic
                    .clone()
                    .unwrap_or_else(|| "Average".to_string());
                ctx.add_columns(sig_index, &[format!("{} ({})", sig.header, statistic)]);
                status.set_result(sig_index, "Success");
            }
        }
    }

    // ------------------------------------------------------------------
    // Scalars phase (merge deferred until the final phase)
    // ------------------------------------------------------------------
    if !scalar_rows.is_empty() {
        let mut jobs: Jobs<'_, RowData> = Jobs::new();
        for &index in &scalar_rows {
            let row = &rows[&index];
            let (start, end) = row_range(row, options, callback_mode);
            let fetch = ScalarFetch {
                formula: row.formula.clone().unwrap_or_else(|| "$scalar".to_string()),
                parameters: vec![format!("scalar={}", row.effective_id)],
                start,
                end,
                invalid_values_as: options.invalid_values_as.clone(),
            };
            let header = row.header.clone();
            jobs.add(index, async move {
                let started = Instant::now();
                let result = fetch_scalar(session, status, index, &fetch).await;
                status.update_row(index, |l| l.time += started.elapsed());
                result.map(|value| RowData::Scalar {
                    column: header,
                    value,
                })
            });
        }

        let results = jobs.execute(max_concurrent).await;
        status.check_interrupt()?;

        for (index, result) in results {
            match result {
                Ok(RowData::Scalar { column, value }) => {
                    if let Some(cb) = callback.as_mut() {
                        emit_callback(
                            cb,
                            status,
                            index,
                            RowResult {
                                row_index: index,
                                column_names: vec![column.clone()],
                                data: RowData::Scalar { column, value },
                            },
                        );
                        continue;
                    }
                    ctx.add_columns(index, &[column.clone()]);
                    deferred_scalars.push((index, column, value));
                    status.set_result(index, "Success");
                }
                Ok(_) => unreachable!("scalar jobs produce scalar data"),
                Err(e) => status.raise_or_catalog(index, e)?,
            }
        }
    }

    // ------------------------------------------------------------------
    // Final phase: canonical column ordering, dtype coercion
    // ------------------------------------------------------------------
    let batch = if callback_mode {
        None
    } else if shape == Shape::Capsules {
        for (_, column, value) in &deferred_scalars {
            cap_table.insert_constant(column, value);
        }
        cap_table.reorder_columns(&ctx.final_column_names());
        cap_table.force_front_columns(&CAPSULE_FRONT_COLUMNS);
        Some(capsule_table_to_batch(&cap_table)?)
    } else {
        if table.is_empty() && !deferred_scalars.is_empty() && options.group_by.is_empty() {
            table.touch(options.start, &[]);
        }
        for (_, column, value) in &deferred_scalars {
            table.insert_constant(column, value);
        }
        table.drop_column(PLACEHOLDER_COLUMN);
        table.sort_index();
        table.reorder_columns(&ctx.final_column_names());
        Some(sample_table_to_batch(&table)?)
    };

    debug!(
        rows = items.len(),
        shape = ?shape,
        "pull complete"
    );

    Ok(PullResult {
        table: batch,
        start: options.start,
        end: options.end,
        grid,
        tz_convert: options.tz_convert.clone(),
        query: rows.into_values().collect(),
    })
}

// ============================================================================
// Row resolution
// ============================================================================

async fn resolve_query_row(
    session: &Session,
    index: usize,
    item: &ItemRef,
    options: &PullOptions,
) -> Result<QueryRow> {
    let declared = item.return_type()?;

    let row_formula: Option<String> = match (&item.calculation, &options.calculation) {
        (Some(f), _) => Some(f.clone()),
        (None, Some(Calculation::Formula(f))) => Some(f.clone()),
        _ => None,
    };

    let (effective_id, return_type, formula) = if declared.kind == ItemKind::Asset {
        let Some(Calculation::AcrossAssets(calc)) = &options.calculation else {
            return Err(Error::invalid_argument(
                "items",
                format!(
                    "row for asset '{}' requires an across-assets calculation",
                    item.id
                ),
            ));
        };
        let swapped = swap_onto_asset(session, calc, item).await?;
        let swapped_type = swapped.item_type.as_deref().unwrap_or_default();
        (swapped.id.clone(), ReturnType::parse(swapped_type)?, None)
    } else if let Some(formula) = row_formula {
        let parameters = vec![format!(
            "{}={}",
            declared.kind.parameter_name(),
            item.id
        )];
        let compiled = session.client().compile_formula(&formula, &parameters).await?;
        if let Some(message) = compiled.error_message {
            return Err(Error::formula_compile(message));
        }
        let compiled_type = compiled
            .return_type
            .ok_or_else(|| Error::formula_compile("compile returned no type"))?;
        (item.id.clone(), ReturnType::parse(&compiled_type)?, Some(formula))
    } else {
        (item.id.clone(), declared, None)
    };

    if !return_type.is_pull_eligible() {
        return Err(Error::invalid_argument(
            "items",
            format!("item '{}' resolved to non-pullable type {return_type}", item.id),
        ));
    }

    let header = resolve_header(session, item, &options.header).await?;

    Ok(QueryRow {
        index,
        item: item.clone(),
        effective_id,
        return_type,
        header,
        formula,
    })
}

/// Swap a calculated item onto the given asset.
///
/// The calculation's dependencies must all hang off one distinct direct
/// parent asset; anything else is ambiguous and refused.
async fn swap_onto_asset(
    session: &Session,
    calc: &ItemRef,
    asset: &ItemRef,
) -> Result<crate::api::ItemOutput> {
    let dependencies = session.client().get_dependencies(&calc.id).await?;
    let mut parent_assets: HashSet<String> = HashSet::new();
    for dependency in &dependencies.dependencies {
        if let Some(parent) = dependency.ancestors.last() {
            parent_assets.insert(parent.id.clone());
        }
    }
    if parent_assets.len() > 1 {
        return Err(Error::invalid_argument(
            "calculation",
            format!(
                "calculation '{}' depends on items under {} distinct assets; swapping requires \
                 exactly one",
                calc.id,
                parent_assets.len()
            ),
        ));
    }
    session.client().swap_item(&calc.id, &asset.id).await
}

async fn resolve_header(session: &Session, item: &ItemRef, mode: &HeaderMode) -> Result<String> {
    match mode {
        HeaderMode::Id => Ok(item.id.clone()),
        HeaderMode::Field(name) => item.field(name).map(ToString::to_string).ok_or_else(|| {
            Error::invalid_argument(
                "header",
                format!("metadata column '{name}' missing for item '{}'", item.id),
            )
        }),
        HeaderMode::Auto => {
            if let Some(header) = &item.header {
                return Ok(header.clone());
            }
            let name = match &item.name {
                Some(name) => name.clone(),
                None => session
                    .client()
                    .get_item(&item.id)
                    .await?
                    .name
                    .unwrap_or_else(|| item.id.clone()),
            };
            let mut parts: Vec<&str> = Vec::new();
            if let Some(path) = &item.path {
                parts.push(path);
            }
            if let Some(asset) = &item.asset {
                parts.push(asset);
            }
            parts.push(&name);
            Ok(parts.join(" >> "))
        }
    }
}

// ============================================================================
// Merge helpers
// ============================================================================

fn effective_shape<'a>(requested: Shape, rows: impl Iterator<Item = &'a QueryRow>) -> Shape {
    if requested != Shape::Auto {
        return requested;
    }
    let mut any_signal = false;
    let mut any_condition = false;
    let mut any_scalar = false;
    for row in rows {
        match row.return_type.kind {
            ItemKind::Signal => any_signal = true,
            ItemKind::Condition => any_condition = true,
            ItemKind::Scalar => any_scalar = true,
            ItemKind::Asset => {}
        }
    }
    if any_signal || (any_scalar && !any_condition) {
        Shape::Samples
    } else if any_condition {
        Shape::Capsules
    } else {
        Shape::Samples
    }
}

fn row_indices_of_kind(rows: &BTreeMap<usize, QueryRow>, kind: ItemKind) -> Vec<usize> {
    rows.values()
        .filter(|row| row.return_type.kind == kind)
        .map(|row| row.index)
        .collect()
}

fn row_range(row: &QueryRow, options: &PullOptions, callback_mode: bool) -> (i64, i64) {
    if callback_mode {
        (
            row.item.start.unwrap_or(options.start),
            row.item.end.unwrap_or(options.end),
        )
    } else {
        (options.start, options.end)
    }
}

fn group_values(row: &QueryRow, group_by: &[String]) -> Result<Vec<String>> {
    group_by
        .iter()
        .map(|column| {
            row.item.field(column).map(ToString::to_string).ok_or_else(|| {
                Error::invalid_argument(
                    "group_by",
                    format!("metadata column '{column}' missing for item '{}'", row.item.id),
                )
            })
        })
        .collect()
}

fn merge_sample_columns(
    table: &mut SampleTable,
    used_names: &mut HashSet<String>,
    ctx: &mut PullContext,
    group_by: &[String],
    row: &QueryRow,
    columns: Vec<(String, Series)>,
) -> Result<()> {
    let group = group_values(row, group_by)?;
    let names: Vec<String> = columns.iter().map(|(name, _)| name.clone()).collect();
    for (name, series) in &columns {
        if group_by.is_empty() && !used_names.insert(name.clone()) {
            return Err(Error::config(format!(
                "Column name '{name}' appears more than once in the output. Use header=Id or \
                 supply group_by columns to disambiguate."
            )));
        }
        table.insert_series(name, &group, series);
    }
    ctx.add_columns(row.index, &names);
    Ok(())
}

fn columns_result(index: usize, columns: Vec<(String, Series)>) -> RowResult {
    let names = columns.iter().map(|(name, _)| name.clone()).collect();
    RowResult {
        row_index: index,
        column_names: names,
        data: RowData::Samples(columns),
    }
}

fn emit_callback(
    callback: &mut (dyn FnMut(RowResult) + Send),
    status: &Status,
    index: usize,
    result: RowResult,
) {
    callback(result);
    status.set_result(index, "Success");
}

#[cfg(test)]
mod tests;
