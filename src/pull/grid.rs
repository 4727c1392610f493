//! Grid resolution
//!
//! Parses period strings and resolves `grid=auto` to the median of the
//! queried signals' estimated sample periods, rounded to milliseconds.

use crate::api::FormulaRunInput;
use crate::error::{Error, Result};
use crate::pull::types::QueryRow;
use crate::session::Session;
use crate::types::ItemKind;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

static PERIOD_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+(?:\.\d+)?)\s*([a-zA-Z]+)$").expect("invalid period pattern"));

/// Parse a period string like "15min" or "500ms" into nanoseconds
pub fn parse_period_ns(period: &str) -> Result<i64> {
    let captures = PERIOD_PATTERN.captures(period.trim()).ok_or_else(|| {
        Error::invalid_argument("grid", format!("unrecognized period '{period}'"))
    })?;
    let magnitude: f64 = captures[1]
        .parse()
        .map_err(|_| Error::invalid_argument("grid", format!("unrecognized period '{period}'")))?;
    let per_unit: f64 = match captures[2].to_lowercase().as_str() {
        "ns" => 1.0,
        "us" => 1e3,
        "ms" => 1e6,
        "s" | "sec" => 1e9,
        "min" => 60.0 * 1e9,
        "h" | "hr" => 3_600.0 * 1e9,
        "d" | "day" => 86_400.0 * 1e9,
        "wk" => 7.0 * 86_400.0 * 1e9,
        unit => {
            return Err(Error::invalid_argument(
                "grid",
                format!("unrecognized period unit '{unit}'"),
            ));
        }
    };
    #[allow(clippy::cast_possible_truncation)]
    Ok((magnitude * per_unit) as i64)
}

fn uom_to_ns(value: f64, uom: Option<&str>) -> Option<i64> {
    let per_unit: f64 = match uom.unwrap_or("ns") {
        "ns" => 1.0,
        "us" => 1e3,
        "ms" => 1e6,
        "s" => 1e9,
        "min" => 60.0 * 1e9,
        "h" => 3_600.0 * 1e9,
        _ => return None,
    };
    #[allow(clippy::cast_possible_truncation)]
    Some((value * per_unit) as i64)
}

/// Resolve `grid=auto` to a concrete period string.
///
/// Reads each signal row's `Estimated Sample Period` metadata when present,
/// otherwise issues one `estimateSamplePeriod` request per signal. The
/// result is the median of all estimates in ns, rounded to milliseconds.
pub async fn estimate_auto_grid(
    session: &Session,
    rows: &[QueryRow],
    start: i64,
    end: i64,
) -> Result<String> {
    let mut estimates_ns: Vec<i64> = Vec::new();

    for row in rows {
        if row.return_type.kind != ItemKind::Signal {
            continue;
        }

        if let Some(period) = row.item.field("Estimated Sample Period") {
            if let Ok(ns) = parse_period_ns(period) {
                estimates_ns.push(ns);
                continue;
            }
        }

        let input = FormulaRunInput {
            formula: "$signal.estimateSamplePeriod()".to_string(),
            parameters: vec![format!("signal={}", row.effective_id)],
            start: Some(start),
            end: Some(end),
            ..Default::default()
        };
        let (output, _) = session.client().run_formula(&input).await?;
        if let Some(scalar) = output.scalar {
            if let Some(value) = scalar.value.as_ref().and_then(serde_json::Value::as_f64) {
                if let Some(ns) = uom_to_ns(value, scalar.uom.as_deref()) {
                    estimates_ns.push(ns);
                }
            }
        }
    }

    if estimates_ns.is_empty() {
        return Err(Error::api(
            "Grid could not be estimated: no signal yielded a sample period estimate. \
             Supply an explicit grid instead of 'auto'.",
        ));
    }

    estimates_ns.sort_unstable();
    let median_ns = estimates_ns[estimates_ns.len() / 2];
    let millis = (median_ns + 500_000) / 1_000_000;
    let grid = format!("{}ms", millis.max(1));
    debug!(estimates = estimates_ns.len(), %grid, "auto grid resolved");
    Ok(grid)
}

#[cfg(test)]
mod grid_tests {
    use super::*;
    use test_case::test_case;

    #[test_case("15min", 900_000_000_000; "minutes")]
    #[test_case("500ms", 500_000_000; "milliseconds")]
    #[test_case("2s", 2_000_000_000; "seconds")]
    #[test_case("1h", 3_600_000_000_000; "hours")]
    #[test_case("1d", 86_400_000_000_000; "days")]
    fn test_parse_period(period: &str, expected_ns: i64) {
        assert_eq!(parse_period_ns(period).unwrap(), expected_ns);
    }

    #[test]
    fn test_parse_period_rejects_garbage() {
        assert!(parse_period_ns("fifteen minutes").is_err());
        assert!(parse_period_ns("15 parsecs").is_err());
        assert!(parse_period_ns("").is_err());
    }
}
