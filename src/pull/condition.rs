//! Capsule paginator
//!
//! Two query strategies: direct formula evaluation (Strategy A) and the
//! capsule-table aggregation with signal statistics (Strategy B). Also owns
//! the reshaping of capsules into 0/1 sample series.

use crate::api::FormulaRunInput;
use crate::error::{Error, Result};
use crate::session::{PaginationProtocol, Session};
use crate::status::Status;
use crate::table::{CapsuleTable, Series, Value, CAPSULE_FRONT_COLUMNS};
use std::collections::HashSet;
use tracing::debug;

/// End sentinel for still-open capsules when reshaping to samples
/// (2200-01-01T00:00:00Z in ns)
pub const OPEN_END_SENTINEL_NS: i64 = 7_258_118_400_000_000_000;

// ============================================================================
// Strategy A: direct formula evaluation
// ============================================================================

/// Parameters for one direct capsule fetch
#[derive(Debug, Clone)]
pub struct CapsuleFetch {
    pub formula: String,
    pub parameters: Vec<String>,
    pub start: i64,
    pub end: i64,
    /// Value of the output `Condition` column
    pub condition_name: String,
    /// Restrict property columns to these names; `None` keeps all
    pub capsule_properties: Option<Vec<String>>,
}

/// Fetch all pages of one condition's capsules into a capsule table.
///
/// Page-seam duplicates (same start and end) are dropped; the check
/// deactivates at the first non-duplicate since results arrive sorted. A
/// full offset-mode page that makes no range progress is a fatal
/// too-much-data error.
pub async fn fetch_capsules(
    session: &Session,
    status: &Status,
    row_index: usize,
    fetch: &CapsuleFetch,
) -> Result<CapsuleTable> {
    let page_size = session.options().pull_page_size;
    let token_mode = session.options().pagination == PaginationProtocol::ContinuationToken;

    let mut table = CapsuleTable::with_columns(
        CAPSULE_FRONT_COLUMNS.iter().map(ToString::to_string).collect(),
    );
    let mut seen: HashSet<(Option<i64>, Option<i64>)> = HashSet::new();
    let mut current_start = fetch.start;
    let mut token: Option<String> = None;

    loop {
        status.check_interrupt()?;

        let input = FormulaRunInput {
            formula: fetch.formula.clone(),
            parameters: fetch.parameters.clone(),
            start: Some(current_start),
            end: Some(fetch.end),
            limit: Some(page_size),
            continuation_token: token.take().filter(|t| !t.is_empty()),
            ..Default::default()
        };

        let (output, bytes) = session.client().run_formula(&input).await?;
        let page = output.capsules.ok_or_else(|| {
            Error::decode(format!(
                "formula '{}' did not return capsules",
                fetch.formula
            ))
        })?;

        status.update_row(row_index, |row| {
            row.pages += 1;
            row.data_processed += bytes;
        });

        let page_full = page.capsules.len() >= page_size;
        let next_token = page.continuation_token.clone().filter(|t| !t.is_empty());

        // Same-start overflow: a full page that cannot advance the range
        if !token_mode && page_full {
            let starts: HashSet<Option<i64>> =
                page.capsules.iter().map(|c| c.start).collect();
            if starts.len() <= 1 {
                return Err(Error::TooMuchData {
                    count: page.capsules.len(),
                    start: current_start,
                    end: fetch.end,
                });
            }
        }

        let mut dedupe_active = true;
        let mut kept = 0_u64;
        let mut next_start = current_start;

        for capsule in &page.capsules {
            let key = (capsule.start, capsule.end);
            if dedupe_active && seen.contains(&key) {
                continue;
            }
            dedupe_active = false;
            seen.insert(key);

            let mut row = table.row();
            row.set("Condition", Value::Str(fetch.condition_name.clone()));
            row.set(
                "Capsule Start",
                capsule.start.map_or(Value::Null, Value::Timestamp),
            );
            row.set(
                "Capsule End",
                capsule.end.map_or(Value::Null, Value::Timestamp),
            );
            row.set(
                "Capsule Is Uncertain",
                Value::Bool(capsule.is_uncertain.unwrap_or(false)),
            );
            for property in &capsule.properties {
                if let Some(filter) = &fetch.capsule_properties {
                    if !filter.contains(&property.name) {
                        continue;
                    }
                }
                row.set(&property.name, Value::from_json(&property.value));
            }
            row.finish();
            kept += 1;

            // Advance past the last capsule; open starts fall back to the end
            let advance = capsule.start.or(capsule.end).unwrap_or(current_start);
            next_start = next_start.max(advance);
        }

        status.update_row(row_index, |row| row.count += kept);
        current_start = next_start;

        if token_mode {
            match next_token {
                Some(t) => token = Some(t),
                None => break,
            }
        } else if !page_full {
            break;
        }
    }

    debug!(row_index, capsules = table.num_rows(), "capsule fetch complete");
    Ok(table)
}

// ============================================================================
// Strategy B: capsule table with signal statistics
// ============================================================================

/// One statistic column over a signal, computed per capsule
#[derive(Debug, Clone)]
pub struct StatColumn {
    /// Formula parameter name, `s0`, `s1`, ...
    pub param: String,
    /// Output column header
    pub header: String,
    /// Statistic name as given in the query row, e.g. "Average"
    pub statistic: String,
}

/// Parameters for one capsule-table fetch
#[derive(Debug, Clone)]
pub struct CapsuleTableFetch {
    pub start: i64,
    pub end: i64,
    pub condition_name: String,
    /// Formula parameter name bound to the condition, e.g. "c0"
    pub condition_param: String,
    /// All parameter bindings: the condition plus every stat signal
    pub parameters: Vec<String>,
    /// Requested capsule property names
    pub properties: Vec<String>,
    pub stat_columns: Vec<StatColumn>,
}

/// Table columns always present, in wire order, before requested properties
const REQUIRED_TABLE_COLUMNS: [&str; 5] = [
    "Capsule ID",
    "Original Uncertainty",
    "Condition ID",
    "Start",
    "End",
];

/// Map a query row's statistic name to a formula aggregation function
pub fn statistic_to_aggregation_function(statistic: &str) -> String {
    match statistic.to_lowercase().as_str() {
        "standard deviation" => "stdDev()".to_string(),
        "total duration" => "totalDuration()".to_string(),
        "rate" => "rate('s')".to_string(),
        other => {
            // camelCase the words: "value at start" -> valueAtStart()
            let mut words = other.split_whitespace();
            let mut name = words.next().unwrap_or_default().to_string();
            for word in words {
                let mut chars = word.chars();
                if let Some(first) = chars.next() {
                    name.push(first.to_ascii_uppercase());
                    name.push_str(chars.as_str());
                }
            }
            format!("{name}()")
        }
    }
}

/// Assemble the capsule-table formula for one page
pub fn build_capsule_table_formula(
    fetch: &CapsuleTableFetch,
    offset: usize,
    page_size: usize,
) -> String {
    let mut columns: Vec<String> = REQUIRED_TABLE_COLUMNS
        .iter()
        .map(ToString::to_string)
        .collect();
    columns.extend(fetch.properties.iter().cloned());
    columns.push("Capsule SortKey".to_string());
    let quoted = columns
        .iter()
        .map(|c| format!("'{c}'"))
        .collect::<Vec<_>>()
        .join(", ");

    let mut formula = format!(
        "capsuleTable(capsule({}ns, {}ns), CapsuleBoundary.Overlap, group(${}), {quoted})",
        fetch.start, fetch.end, fetch.condition_param
    );
    for stat in &fetch.stat_columns {
        formula.push_str(&format!(
            ".addStatColumn('{p}', ${p}, {agg})",
            p = stat.param,
            agg = statistic_to_aggregation_function(&stat.statistic)
        ));
    }
    formula.push_str(
        ".sort('Capsule ID', 'inv, asc', 'Condition Id', 'asc', 'Capsule SortKey', 'asc')",
    );
    formula.push_str(&format!(".limit({}, {})", offset + 1, offset + 1 + page_size));
    formula
}

fn cell_to_timestamp(value: &serde_json::Value) -> Value {
    value.as_i64().map_or(Value::Null, Value::Timestamp)
}

/// Fetch all pages of one condition's capsule table.
///
/// Pages by `.limit(offset, offset+pageSize)`; the stable sort key makes
/// same-start pages safe, so the offset simply advances a full page each
/// time regardless of range progress.
pub async fn fetch_capsule_table(
    session: &Session,
    status: &Status,
    row_index: usize,
    fetch: &CapsuleTableFetch,
) -> Result<CapsuleTable> {
    let page_size = session.options().pull_page_size;

    let mut table = CapsuleTable::with_columns(
        CAPSULE_FRONT_COLUMNS.iter().map(ToString::to_string).collect(),
    );
    let mut offset = 0_usize;

    // Column positions in each wire row
    let props_at = REQUIRED_TABLE_COLUMNS.len();
    let stats_at = props_at + fetch.properties.len() + 1; // +1 for the sort key

    loop {
        status.check_interrupt()?;

        let input = FormulaRunInput {
            formula: build_capsule_table_formula(fetch, offset, page_size),
            parameters: fetch.parameters.clone(),
            start: Some(fetch.start),
            end: Some(fetch.end),
            ..Default::default()
        };

        let (output, bytes) = session.client().run_formula(&input).await?;
        let page = output.table.ok_or_else(|| {
            Error::decode("capsule table formula did not return a table".to_string())
        })?;

        status.update_row(row_index, |row| {
            row.pages += 1;
            row.data_processed += bytes;
            row.count += page.data.len() as u64;
        });

        for wire_row in &page.data {
            if wire_row.len() < stats_at {
                return Err(Error::decode(format!(
                    "capsule table row has {} columns, expected at least {}",
                    wire_row.len(),
                    stats_at
                )));
            }

            let mut row = table.row();
            row.set("Condition", Value::Str(fetch.condition_name.clone()));
            row.set("Capsule Start", cell_to_timestamp(&wire_row[3]));
            row.set("Capsule End", cell_to_timestamp(&wire_row[4]));
            row.set(
                "Capsule Is Uncertain",
                Value::Bool(wire_row[1].as_f64().is_some_and(|u| u != 0.0)),
            );
            for (pos, name) in fetch.properties.iter().enumerate() {
                row.set(name, Value::from_json(&wire_row[props_at + pos]));
            }
            for (pos, stat) in fetch.stat_columns.iter().enumerate() {
                row.set(&stat.header, Value::from_json(&wire_row[stats_at + pos]));
            }
            row.finish();
        }

        if page.data.len() < page_size {
            break;
        }
        offset += page_size;
    }

    debug!(
        row_index,
        capsules = table.num_rows(),
        "capsule table fetch complete"
    );
    Ok(table)
}

// ============================================================================
// Reshaping capsules into sample series
// ============================================================================

/// Reshape a capsule table into a 0/1 series over `index_keys`, plus one
/// property column per observed property (values filled inside capsule
/// boundaries, last capsule wins on overlap).
pub fn capsules_to_samples(
    capsules: &CapsuleTable,
    index_keys: &[i64],
    column: &str,
) -> Vec<(String, Series)> {
    struct Span {
        start: i64,
        end: i64,
        row: usize,
    }

    let spans: Vec<Span> = (0..capsules.num_rows())
        .map(|row| {
            let start = match capsules.cell("Capsule Start", row) {
                Some(Value::Timestamp(ns)) => *ns,
                _ => 0,
            };
            let end = match capsules.cell("Capsule End", row) {
                Some(Value::Timestamp(ns)) => *ns,
                _ => OPEN_END_SENTINEL_NS,
            };
            Span { start, end, row }
        })
        .collect();

    let mut primary = Series::with_capacity(index_keys.len());
    for &key in index_keys {
        let inside = spans.iter().any(|s| s.start <= key && key <= s.end);
        primary.push(key, Value::Int(i64::from(inside)));
    }

    let mut results = vec![(column.to_string(), primary)];

    let property_names: Vec<&String> = capsules
        .column_names()
        .iter()
        .filter(|name| !CAPSULE_FRONT_COLUMNS.contains(&name.as_str()))
        .collect();

    for name in property_names {
        let mut cells: Vec<Value> = vec![Value::Null; index_keys.len()];
        for span in &spans {
            let Some(value) = capsules.cell(name, span.row) else {
                continue;
            };
            if value.is_null() {
                continue;
            }
            for (pos, &key) in index_keys.iter().enumerate() {
                if span.start <= key && key <= span.end {
                    cells[pos] = value.clone();
                }
            }
        }
        let mut series = Series::with_capacity(index_keys.len());
        for (pos, &key) in index_keys.iter().enumerate() {
            series.push(key, cells[pos].clone());
        }
        results.push((format!("{column} {name}"), series));
    }

    results
}
