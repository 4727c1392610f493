//! Signal sample writer
//!
//! Buffers one column's samples in timestamp order and flushes a page at a
//! time. String-vs-numeric typing is inferred once per column; the
//! type-mismatch policy decides what happens to samples that don't fit.

use super::types::{ReplaceInterval, WriteSummary};
use crate::api::{Interval, SampleOutput, SamplesInput};
use crate::error::{Error, Result};
use crate::session::Session;
use crate::status::Status;
use crate::table::{Series, Value};
use crate::types::TypeMismatchPolicy;
use serde_json::json;
use tracing::debug;

/// Parameters for one signal's data write
#[derive(Debug, Clone)]
pub struct SampleWrite<'a> {
    pub signal_id: &'a str,
    /// Column name, for error messages
    pub column: &'a str,
    pub series: &'a Series,
    pub replace: Option<ReplaceInterval>,
    /// `Some(true)` when the declared value unit of measure is "string"
    pub declared_string: Option<bool>,
    pub policy: TypeMismatchPolicy,
}

/// String-vs-numeric typing: the declared unit wins, otherwise the first
/// non-null value decides. An all-null column writes as numeric.
fn infer_is_string(write: &SampleWrite<'_>) -> bool {
    if let Some(declared) = write.declared_string {
        return declared;
    }
    write
        .series
        .values
        .iter()
        .find_map(|value| match value {
            Value::Null => None,
            Value::Str(_) => Some(true),
            _ => Some(false),
        })
        .unwrap_or(false)
}

fn coerce(value: &Value, is_string: bool) -> std::result::Result<serde_json::Value, String> {
    match (value, is_string) {
        (Value::Null, _) => Ok(serde_json::Value::Null),
        (Value::Str(s), true) => Ok(json!(s)),
        (Value::Str(s), false) => s
            .trim()
            .parse::<f64>()
            .map(|f| json!(f))
            .map_err(|_| format!("'{s}' is not numeric")),
        (Value::Int(i), false) => Ok(json!(i)),
        (Value::Float(f), false) => Ok(json!(f)),
        (Value::Bool(b), false) => Ok(json!(i64::from(*b))),
        (Value::Timestamp(ns), false) => Ok(json!(ns)),
        (other, true) => Err(format!("expected a string, got '{}'", other.render())),
        (other, false) => Err(format!("expected a number, got '{}'", other.render())),
    }
}

async fn flush(
    session: &Session,
    status: &Status,
    row_index: usize,
    write: &SampleWrite<'_>,
    buffer: &mut Vec<SampleOutput>,
    interval_start: &mut i64,
) -> Result<()> {
    status.check_interrupt()?;

    let samples = std::mem::take(buffer);
    let count = samples.len() as u64;
    let last_key = samples.last().and_then(|s| s.key);
    let input = SamplesInput {
        samples,
        interval: write.replace.map(|replace| Interval {
            start: *interval_start,
            end: replace.end(),
        }),
    };

    let bytes = if write.replace.is_some() {
        session
            .client()
            .overwrite_samples(write.signal_id, &input)
            .await?
    } else {
        session.client().add_samples(write.signal_id, &input).await?
    };

    status.update_row(row_index, |row| {
        row.pages += 1;
        row.count += count;
        row.data_processed += bytes;
    });

    // A later flush must not re-clear what this one just wrote
    if let Some(last) = last_key {
        *interval_start = last + 1;
    }
    Ok(())
}

/// Write one signal's samples, a page at a time.
///
/// In replace mode every flush overwrites `[interval_start, replace.end]`,
/// with the start advanced past the last flushed key each time. A replace
/// with no samples still issues one empty overwrite to clear the interval.
pub async fn push_signal_samples(
    session: &Session,
    status: &Status,
    row_index: usize,
    write: &SampleWrite<'_>,
) -> Result<WriteSummary> {
    let page_size = session.options().push_page_size;
    let is_string = infer_is_string(write);

    let mut order: Vec<usize> = (0..write.series.len()).collect();
    order.sort_by_key(|&i| write.series.keys[i]);

    let mut summary = WriteSummary::default();
    let mut buffer: Vec<SampleOutput> = Vec::new();
    let mut interval_start = write.replace.map_or(0, ReplaceInterval::start);

    for &i in &order {
        let key = write.series.keys[i];
        let value = &write.series.values[i];
        let cell = match coerce(value, is_string) {
            Ok(cell) => cell,
            Err(message) => match write.policy {
                TypeMismatchPolicy::Raise => {
                    return Err(Error::type_mismatch(
                        write.column,
                        format!("{message} at key {key}"),
                    ));
                }
                TypeMismatchPolicy::Drop => continue,
                TypeMismatchPolicy::Invalid => serde_json::Value::Null,
            },
        };

        buffer.push(SampleOutput {
            key: Some(key),
            value: Some(cell),
        });
        summary.record(key);

        if buffer.len() >= page_size {
            flush(session, status, row_index, write, &mut buffer, &mut interval_start).await?;
        }
    }

    if !buffer.is_empty() || (summary.count == 0 && write.replace.is_some()) {
        flush(session, status, row_index, write, &mut buffer, &mut interval_start).await?;
    }

    debug!(
        row_index,
        samples = summary.count,
        is_string,
        "signal write complete"
    );
    Ok(summary)
}
