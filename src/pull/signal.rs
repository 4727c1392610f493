//! Time-series paginator
//!
//! Fetches signal samples page by page, filters page seams and range
//! boundaries, decodes enum-encoded values, substitutes invalid values, and
//! concatenates pages into one ordered series.

use crate::api::FormulaRunInput;
use crate::error::{Error, Result};
use crate::session::{PaginationProtocol, Session};
use crate::status::Status;
use crate::table::{Series, Value};
use crate::types::{EnumsAs, InvalidValuesAs};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

/// `ENUM{{42|ON}}` wire encoding of enumerated sample values
static ENUM_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^ENUM\{\{(\d+)\|(.+?)\}\}$").expect("invalid enum pattern"));

/// Parameters for one signal fetch
#[derive(Debug, Clone)]
pub struct SignalFetch {
    pub formula: String,
    /// Parameter bindings of the form `name=ITEM_ID`
    pub parameters: Vec<String>,
    /// Range start, ns since epoch UTC
    pub start: i64,
    pub end: i64,
    pub bounding_values: bool,
    pub invalid_values_as: InvalidValuesAs,
    pub enums_as: Option<EnumsAs>,
}

/// Decode one enum-encoded string per policy. Returns `None` when the string
/// does not match the wire pattern; malformed enum-like strings pass through
/// to the caller unchanged.
pub fn sanitize_enum(raw: &str, enums_as: EnumsAs) -> Option<Value> {
    let captures = ENUM_PATTERN.captures(raw)?;
    let code: i64 = captures.get(1)?.as_str().parse().ok()?;
    let name = captures.get(2)?.as_str().to_string();
    Some(match enums_as {
        EnumsAs::String => Value::Str(name),
        EnumsAs::Numeric => Value::Int(code),
        EnumsAs::Tuple => Value::Enum(code, name),
    })
}

/// The sentinel for an invalid/missing value
fn invalid_sentinel(policy: &InvalidValuesAs) -> Value {
    match policy {
        InvalidValuesAs::Null => Value::Null,
        InvalidValuesAs::Number(n) => Value::Float(*n),
        InvalidValuesAs::Text(s) => Value::Str(s.clone()),
    }
}

/// Decode one wire sample value per the fetch's policies
fn decode_value(raw: Option<&serde_json::Value>, fetch: &SignalFetch) -> Value {
    let Some(raw) = raw else {
        return invalid_sentinel(&fetch.invalid_values_as);
    };
    if raw.is_null() {
        return invalid_sentinel(&fetch.invalid_values_as);
    }
    let value = Value::from_json(raw);
    if let (Value::Str(s), Some(enums_as)) = (&value, fetch.enums_as) {
        if let Some(decoded) = sanitize_enum(s, enums_as) {
            return decoded;
        }
    }
    value
}

/// Fetch all pages of one signal into a time-ordered series.
///
/// Ledger accounting (pages, bytes, count) is written under `row_index` as
/// pages arrive. Cancellation is honored at every page boundary.
pub async fn fetch_signal(
    session: &Session,
    status: &Status,
    row_index: usize,
    fetch: &SignalFetch,
) -> Result<Series> {
    let page_size = session.options().pull_page_size;
    let token_mode = session.options().pagination == PaginationProtocol::ContinuationToken;

    let mut series = Series::new();
    let mut current_start = fetch.start;
    let mut last_key_seen: Option<i64> = None;
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
        let page = output.samples.ok_or_else(|| {
            Error::decode(format!(
                "formula '{}' did not return samples",
                fetch.formula
            ))
        })?;

        status.update_row(row_index, |row| {
            row.pages += 1;
            row.data_processed += bytes;
        });

        let raw_keys: Vec<i64> = page.samples.iter().filter_map(|s| s.key).collect();
        let next_token = page.continuation_token.clone().filter(|t| !t.is_empty());
        let more_expected = if token_mode {
            next_token.is_some()
        } else {
            page.samples.len() >= page_size
        };

        if raw_keys.is_empty() && more_expected {
            return Err(Error::EmptyPage {
                formula: fetch.formula.clone(),
                parameters: fetch.parameters.clone(),
                start: current_start,
                end: fetch.end,
            });
        }

        let mut kept = 0_u64;
        for sample in &page.samples {
            let Some(key) = sample.key else { continue };

            // Exclusive page boundary: never re-emit a key from an earlier page
            if matches!(last_key_seen, Some(last) if key <= last) {
                continue;
            }
            // Range filter; bounding samples are the only out-of-range keepers
            if (key < fetch.start || key > fetch.end) && !fetch.bounding_values {
                continue;
            }

            series.push(key, decode_value(sample.value.as_ref(), fetch));
            kept += 1;
        }

        status.update_row(row_index, |row| row.count += kept);

        if let Some(&last_raw) = raw_keys.last() {
            last_key_seen = Some(last_key_seen.map_or(last_raw, |l| l.max(last_raw)));
            current_start = last_raw;
        }

        if token_mode {
            match next_token {
                Some(t) => token = Some(t),
                None => break,
            }
        } else if page.samples.len() < page_size {
            break;
        }
    }

    debug!(
        row_index,
        samples = series.len(),
        "signal fetch complete"
    );
    Ok(series)
}
