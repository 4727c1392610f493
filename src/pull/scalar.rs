//! Scalar fetcher
//!
//! Single request, no pagination. Constant-scalar calculations have no data
//! underneath them, so no bytes are accounted to the ledger.

use crate::api::FormulaRunInput;
use crate::error::{Error, Result};
use crate::session::Session;
use crate::status::Status;
use crate::table::Value;
use crate::types::InvalidValuesAs;

/// Parameters for one scalar fetch
#[derive(Debug, Clone)]
pub struct ScalarFetch {
    pub formula: String,
    pub parameters: Vec<String>,
    pub start: i64,
    pub end: i64,
    pub invalid_values_as: InvalidValuesAs,
}

/// Fetch one scalar value
pub async fn fetch_scalar(
    session: &Session,
    status: &Status,
    row_index: usize,
    fetch: &ScalarFetch,
) -> Result<Value> {
    status.check_interrupt()?;

    let input = FormulaRunInput {
        formula: fetch.formula.clone(),
        parameters: fetch.parameters.clone(),
        start: Some(fetch.start),
        end: Some(fetch.end),
        ..Default::default()
    };

    let (output, _) = session.client().run_formula(&input).await?;
    let scalar = output.scalar.ok_or_else(|| {
        Error::decode(format!(
            "formula '{}' did not return a scalar",
            fetch.formula
        ))
    })?;

    status.update_row(row_index, |row| {
        row.pages += 1;
        row.count += 1;
    });

    let value = match scalar.value {
        Some(json) if !json.is_null() => Value::from_json(&json),
        _ => match &fetch.invalid_values_as {
            InvalidValuesAs::Null => Value::Null,
            InvalidValuesAs::Number(n) => Value::Float(*n),
            InvalidValuesAs::Text(s) => Value::Str(s.clone()),
        },
    };
    Ok(value)
}
