//! Capsule writer
//!
//! Buffers one condition's capsules in start order and flushes a page at a
//! time, with the same overwrite-interval discipline as the sample writer.

use super::types::{CapsuleRecord, ReplaceInterval, WriteSummary};
use crate::api::{CapsuleInput, CapsulesInput, Interval, PropertyOutput};
use crate::error::{Error, Result};
use crate::session::Session;
use crate::status::Status;
use crate::table::Value;
use serde_json::json;
use std::collections::BTreeMap;
use tracing::debug;

/// Parameters for one condition's data write
#[derive(Debug, Clone)]
pub struct CapsuleWrite<'a> {
    pub condition_id: &'a str,
    /// Condition name, for error messages
    pub condition_name: &'a str,
    pub capsules: &'a [CapsuleRecord],
    pub replace: Option<ReplaceInterval>,
    /// Units applied to outgoing properties, by property name
    pub property_units: &'a BTreeMap<String, String>,
}

fn property_value(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => json!(b),
        Value::Int(i) | Value::Timestamp(i) => json!(i),
        Value::Float(f) => json!(f),
        Value::Str(s) => json!(s),
        Value::Enum(..) => json!(value.render()),
    }
}

fn capsule_input(record: &CapsuleRecord, units: &BTreeMap<String, String>) -> CapsuleInput {
    CapsuleInput {
        start: record.start,
        end: record.end,
        properties: record
            .properties
            .iter()
            .map(|(name, value)| PropertyOutput {
                name: name.clone(),
                value: property_value(value),
                unit_of_measure: units.get(name).cloned(),
            })
            .collect(),
    }
}

async fn flush(
    session: &Session,
    status: &Status,
    row_index: usize,
    write: &CapsuleWrite<'_>,
    buffer: &mut Vec<CapsuleInput>,
    interval_start: &mut i64,
) -> Result<()> {
    status.check_interrupt()?;

    let capsules = std::mem::take(buffer);
    let count = capsules.len() as u64;
    let last_start = capsules.last().map(|c| c.start);
    let input = CapsulesInput {
        capsules,
        interval: write.replace.map(|replace| Interval {
            start: *interval_start,
            end: replace.end(),
        }),
        ..CapsulesInput::default()
    };

    let bytes = if write.replace.is_some() {
        session
            .client()
            .overwrite_capsules(write.condition_id, &input)
            .await?
    } else {
        session
            .client()
            .add_capsules(write.condition_id, &input)
            .await?
    };

    status.update_row(row_index, |row| {
        row.pages += 1;
        row.count += count;
        row.data_processed += bytes;
    });

    if let Some(last) = last_start {
        *interval_start = last + 1;
    }
    Ok(())
}

/// Write one condition's capsules, a page at a time.
pub async fn push_condition_capsules(
    session: &Session,
    status: &Status,
    row_index: usize,
    write: &CapsuleWrite<'_>,
) -> Result<WriteSummary> {
    let page_size = session.options().push_page_size;

    for record in write.capsules {
        if record.end < record.start {
            return Err(Error::invalid_argument(
                "data",
                format!(
                    "condition '{}' has a capsule ending ({}) before it starts ({})",
                    write.condition_name, record.end, record.start
                ),
            ));
        }
    }

    let mut order: Vec<usize> = (0..write.capsules.len()).collect();
    order.sort_by_key(|&i| write.capsules[i].start);

    let mut summary = WriteSummary::default();
    let mut buffer: Vec<CapsuleInput> = Vec::new();
    let mut interval_start = write.replace.map_or(0, ReplaceInterval::start);

    for &i in &order {
        let record = &write.capsules[i];
        buffer.push(capsule_input(record, write.property_units));

        summary.count += 1;
        summary.earliest = Some(summary.earliest.map_or(record.start, |e| e.min(record.start)));
        summary.latest = Some(summary.latest.map_or(record.end, |l| l.max(record.end)));

        if buffer.len() >= page_size {
            flush(session, status, row_index, write, &mut buffer, &mut interval_start).await?;
        }
    }

    if !buffer.is_empty() || (summary.count == 0 && write.replace.is_some()) {
        flush(session, status, row_index, write, &mut buffer, &mut interval_start).await?;
    }

    debug!(
        row_index,
        capsules = summary.count,
        "capsule write complete"
    );
    Ok(summary)
}
