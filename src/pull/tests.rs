//! Pull engine tests: formula assembly, reshaping, and end-to-end pulls
//! against a mock server.

use super::*;
use crate::http::HttpClientConfig;
use crate::session::{PaginationProtocol, SessionOptions};
use crate::types::ErrorHandling;
use arrow::array::{
    Array, BooleanArray, Float64Array, Int64Array, StringArray, TimestampNanosecondArray,
};
use arrow::datatypes::{DataType, TimeUnit};
use arrow::record_batch::RecordBatch;
use pretty_assertions::assert_eq;
use serde_json::json;
use test_case::test_case;
use wiremock::matchers::{body_partial_json, body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_session(server: &MockServer, page_size: usize, pagination: PaginationProtocol) -> Session {
    let config = HttpClientConfig::builder()
        .base_url(server.uri())
        .no_rate_limit()
        .build();
    Session::with_options(
        config,
        SessionOptions {
            pull_page_size: page_size,
            pagination,
            ..SessionOptions::default()
        },
    )
}

fn column_names(batch: &RecordBatch) -> Vec<String> {
    batch
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect()
}

fn float_column(batch: &RecordBatch, name: &str) -> Vec<Option<f64>> {
    let array = batch
        .column_by_name(name)
        .unwrap()
        .as_any()
        .downcast_ref::<Float64Array>()
        .unwrap();
    (0..array.len())
        .map(|i| array.is_valid(i).then(|| array.value(i)))
        .collect()
}

fn int_column(batch: &RecordBatch, name: &str) -> Vec<Option<i64>> {
    let array = batch
        .column_by_name(name)
        .unwrap()
        .as_any()
        .downcast_ref::<Int64Array>()
        .unwrap();
    (0..array.len())
        .map(|i| array.is_valid(i).then(|| array.value(i)))
        .collect()
}

fn string_column(batch: &RecordBatch, name: &str) -> Vec<Option<String>> {
    let array = batch
        .column_by_name(name)
        .unwrap()
        .as_any()
        .downcast_ref::<StringArray>()
        .unwrap();
    (0..array.len())
        .map(|i| array.is_valid(i).then(|| array.value(i).to_string()))
        .collect()
}

fn timestamps(batch: &RecordBatch, name: &str) -> Vec<i64> {
    let array = batch
        .column_by_name(name)
        .unwrap()
        .as_any()
        .downcast_ref::<TimestampNanosecondArray>()
        .unwrap();
    (0..array.len()).map(|i| array.value(i)).collect()
}

// ============================================================================
// Unit: enum decoding
// ============================================================================

#[test]
fn test_sanitize_enum_policies() {
    assert_eq!(
        sanitize_enum("ENUM{{42|ON}}", crate::types::EnumsAs::String),
        Some(Value::Str("ON".to_string()))
    );
    assert_eq!(
        sanitize_enum("ENUM{{42|ON}}", crate::types::EnumsAs::Numeric),
        Some(Value::Int(42))
    );
    assert_eq!(
        sanitize_enum("ENUM{{42|ON}}", crate::types::EnumsAs::Tuple),
        Some(Value::Enum(42, "ON".to_string()))
    );
}

#[test]
fn test_sanitize_enum_malformed_passes_through() {
    // Missing code, wrong braces, trailing text: none decode
    assert_eq!(sanitize_enum("ENUM{{|ON}}", crate::types::EnumsAs::String), None);
    assert_eq!(sanitize_enum("ENUM{42|ON}", crate::types::EnumsAs::String), None);
    assert_eq!(
        sanitize_enum("ENUM{{42|ON}} extra", crate::types::EnumsAs::String),
        None
    );
    assert_eq!(sanitize_enum("just text", crate::types::EnumsAs::String), None);
}

// ============================================================================
// Unit: capsule table formula assembly
// ============================================================================

#[test_case("Average", "average()"; "single word")]
#[test_case("Value At Start", "valueAtStart()"; "camel cased")]
#[test_case("Standard Deviation", "stdDev()"; "std dev special case")]
#[test_case("Total Duration", "totalDuration()"; "total duration special case")]
#[test_case("Rate", "rate('s')"; "rate special case")]
fn test_statistic_aggregation(statistic: &str, expected: &str) {
    assert_eq!(statistic_to_aggregation_function(statistic), expected);
}

#[test]
fn test_build_capsule_table_formula() {
    let fetch = CapsuleTableFetch {
        start: 1_000,
        end: 2_000,
        condition_name: "Maintenance".to_string(),
        condition_param: "c0".to_string(),
        parameters: vec!["c0=COND-1".to_string(), "s0=SIG-1".to_string()],
        properties: vec!["Batch".to_string()],
        stat_columns: vec![StatColumn {
            param: "s0".to_string(),
            header: "Temp (Average)".to_string(),
            statistic: "Average".to_string(),
        }],
    };

    let formula = build_capsule_table_formula(&fetch, 0, 100);
    assert!(formula.starts_with(
        "capsuleTable(capsule(1000ns, 2000ns), CapsuleBoundary.Overlap, group($c0), \
         'Capsule ID', 'Original Uncertainty', 'Condition ID', 'Start', 'End', 'Batch', \
         'Capsule SortKey')"
    ));
    assert!(formula.contains(".addStatColumn('s0', $s0, average())"));
    assert!(formula
        .contains(".sort('Capsule ID', 'inv, asc', 'Condition Id', 'asc', 'Capsule SortKey', 'asc')"));
    assert!(formula.ends_with(".limit(1, 101)"));

    let second_page = build_capsule_table_formula(&fetch, 100, 100);
    assert!(second_page.ends_with(".limit(101, 201)"));
}

// ============================================================================
// Unit: capsule reshaping
// ============================================================================

fn capsule_fixture() -> CapsuleTable {
    let mut table = CapsuleTable::with_columns(
        CAPSULE_FRONT_COLUMNS.iter().map(ToString::to_string).collect(),
    );
    let mut row = table.row();
    row.set("Condition", Value::Str("Maint".to_string()));
    row.set("Capsule Start", Value::Timestamp(1_000));
    row.set("Capsule End", Value::Timestamp(2_000));
    row.set("Capsule Is Uncertain", Value::Bool(false));
    row.set("Batch", Value::Str("B-1".to_string()));
    row.finish();
    table
}

#[test]
fn test_capsules_to_samples_membership() {
    let table = capsule_fixture();
    let keys = vec![500, 1_000, 1_500, 2_000, 2_500];

    let columns = capsules_to_samples(&table, &keys, "Maint");
    assert_eq!(columns.len(), 2);
    assert_eq!(columns[0].0, "Maint");
    assert_eq!(columns[1].0, "Maint Batch");

    let membership: Vec<Value> = columns[0].1.iter().map(|(_, v)| v.clone()).collect();
    assert_eq!(
        membership,
        vec![
            Value::Int(0),
            Value::Int(1),
            Value::Int(1),
            Value::Int(1),
            Value::Int(0)
        ]
    );

    let batches: Vec<Value> = columns[1].1.iter().map(|(_, v)| v.clone()).collect();
    assert_eq!(batches[0], Value::Null);
    assert_eq!(batches[1], Value::Str("B-1".to_string()));
    assert_eq!(batches[4], Value::Null);
}

#[test]
fn test_capsules_to_samples_open_ended_uses_sentinel() {
    let mut table = CapsuleTable::with_columns(
        CAPSULE_FRONT_COLUMNS.iter().map(ToString::to_string).collect(),
    );
    let mut row = table.row();
    row.set("Condition", Value::Str("Open".to_string()));
    row.set("Capsule Start", Value::Timestamp(5_000));
    // End stays null: still-open capsule
    row.finish();

    let keys = vec![4_000, 5_000, OPEN_END_SENTINEL_NS, OPEN_END_SENTINEL_NS + 1];
    let columns = capsules_to_samples(&table, &keys, "Open");
    let membership: Vec<Value> = columns[0].1.iter().map(|(_, v)| v.clone()).collect();
    assert_eq!(
        membership,
        vec![Value::Int(0), Value::Int(1), Value::Int(1), Value::Int(0)]
    );
}

#[test]
fn test_capsules_to_samples_overlap_last_capsule_wins() {
    let mut table = capsule_fixture();
    let mut row = table.row();
    row.set("Condition", Value::Str("Maint".to_string()));
    row.set("Capsule Start", Value::Timestamp(1_500));
    row.set("Capsule End", Value::Timestamp(3_000));
    row.set("Batch", Value::Str("B-2".to_string()));
    row.finish();

    let keys = vec![1_000, 1_500, 2_000];
    let columns = capsules_to_samples(&table, &keys, "Maint");
    let batches: Vec<Value> = columns[1].1.iter().map(|(_, v)| v.clone()).collect();
    assert_eq!(batches[0], Value::Str("B-1".to_string()));
    // Overlapping keys take the later capsule's property
    assert_eq!(batches[1], Value::Str("B-2".to_string()));
    assert_eq!(batches[2], Value::Str("B-2".to_string()));
}

// ============================================================================
// End-to-end: signals
// ============================================================================

#[tokio::test]
async fn test_pull_signal_across_page_seam() {
    let server = MockServer::start().await;

    // Second page repeats the seam key 1000; it must not be re-emitted
    Mock::given(method("POST"))
        .and(path("/formulas/run"))
        .and(body_partial_json(json!({"continuationToken": "t1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "samples": {
                "samples": [
                    {"key": 1_000, "value": 2.0},
                    {"key": 2_000, "value": 3.0}
                ]
            }
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/formulas/run"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "samples": {
                "samples": [
                    {"key": 0, "value": 1.0},
                    {"key": 1_000, "value": 2.0}
                ],
                "continuationToken": "t1"
            }
        })))
        .mount(&server)
        .await;

    let session = test_session(&server, 100, PaginationProtocol::ContinuationToken);
    let status = Status::new(ErrorHandling::Raise);
    let items = vec![ItemRef::new("SIG-1", "StoredSignal")];
    let options = PullOptions {
        start: 0,
        end: 10_000,
        header: HeaderMode::Id,
        ..PullOptions::default()
    };

    let result = pull(&session, &items, &options, &status).await.unwrap();
    let batch = result.table.unwrap();

    assert_eq!(column_names(&batch), vec!["Timestamp", "SIG-1"]);
    assert_eq!(timestamps(&batch, "Timestamp"), vec![0, 1_000, 2_000]);
    assert_eq!(
        float_column(&batch, "SIG-1"),
        vec![Some(1.0), Some(2.0), Some(3.0)]
    );

    let ledger = status.row(0).unwrap();
    assert_eq!(ledger.result, "Success");
    assert_eq!(ledger.pages, 2);
    assert_eq!(ledger.count, 3);
    assert!(ledger.data_processed > 0);
}

#[tokio::test]
async fn test_pull_group_by_merges_same_header() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/formulas/run"))
        .and(body_partial_json(json!({"parameters": ["signal=SIG-A"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "samples": {"samples": [{"key": 0, "value": 1.0}]}
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/formulas/run"))
        .and(body_partial_json(json!({"parameters": ["signal=SIG-B"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "samples": {"samples": [{"key": 0, "value": 2.0}]}
        })))
        .mount(&server)
        .await;

    let mut item_a = ItemRef::new("SIG-A", "StoredSignal").with_name("Temp");
    item_a.properties.insert("Site".to_string(), "A".to_string());
    let mut item_b = ItemRef::new("SIG-B", "StoredSignal").with_name("Temp");
    item_b.properties.insert("Site".to_string(), "B".to_string());

    let session = test_session(&server, 100, PaginationProtocol::ContinuationToken);
    let status = Status::new(ErrorHandling::Raise);
    let options = PullOptions {
        start: 0,
        end: 10_000,
        group_by: vec!["Site".to_string()],
        ..PullOptions::default()
    };

    let result = pull(&session, &[item_a, item_b], &options, &status)
        .await
        .unwrap();
    let batch = result.table.unwrap();

    assert_eq!(column_names(&batch), vec!["Timestamp", "Site", "Temp"]);
    assert_eq!(batch.num_rows(), 2);
    assert_eq!(
        string_column(&batch, "Site"),
        vec![Some("A".to_string()), Some("B".to_string())]
    );
    assert_eq!(float_column(&batch, "Temp"), vec![Some(1.0), Some(2.0)]);
}

#[tokio::test]
async fn test_pull_duplicate_headers_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/formulas/run"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "samples": {"samples": [{"key": 0, "value": 1.0}]}
        })))
        .mount(&server)
        .await;

    let session = test_session(&server, 100, PaginationProtocol::ContinuationToken);
    let status = Status::new(ErrorHandling::Raise);
    let items = vec![
        ItemRef::new("SIG-A", "StoredSignal").with_name("Temp"),
        ItemRef::new("SIG-B", "StoredSignal").with_name("Temp"),
    ];
    let options = PullOptions {
        start: 0,
        end: 10_000,
        ..PullOptions::default()
    };

    let err = pull(&session, &items, &options, &status).await.unwrap_err();
    assert!(err.is_config());
    assert!(err.to_string().contains("Temp"));
}

// ============================================================================
// End-to-end: conditions
// ============================================================================

#[tokio::test]
async fn test_pull_condition_capsules_shape() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/formulas/run"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "capsules": {
                "capsules": [{
                    "start": 1_000,
                    "end": 2_000,
                    "isUncertain": true,
                    "properties": [
                        {"name": "Batch", "value": "B-17", "unitOfMeasure": "string"}
                    ]
                }]
            }
        })))
        .mount(&server)
        .await;

    let session = test_session(&server, 100, PaginationProtocol::ContinuationToken);
    let status = Status::new(ErrorHandling::Raise);
    let items = vec![ItemRef::new("COND-1", "StoredCondition")];
    let options = PullOptions {
        start: 0,
        end: 10_000,
        header: HeaderMode::Id,
        ..PullOptions::default()
    };

    let result = pull(&session, &items, &options, &status).await.unwrap();
    let batch = result.table.unwrap();

    assert_eq!(
        column_names(&batch),
        vec![
            "Condition",
            "Capsule Start",
            "Capsule End",
            "Capsule Is Uncertain",
            "Batch"
        ]
    );
    assert_eq!(batch.num_rows(), 1);
    assert_eq!(
        string_column(&batch, "Condition"),
        vec![Some("COND-1".to_string())]
    );
    assert_eq!(timestamps(&batch, "Capsule Start"), vec![1_000]);
    assert_eq!(timestamps(&batch, "Capsule End"), vec![2_000]);
    let uncertain = batch
        .column_by_name("Capsule Is Uncertain")
        .unwrap()
        .as_any()
        .downcast_ref::<BooleanArray>()
        .unwrap();
    assert!(uncertain.value(0));
}

#[tokio::test]
async fn test_pull_empty_condition_keeps_typed_columns() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/formulas/run"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"capsules": {"capsules": []}})),
        )
        .mount(&server)
        .await;

    let session = test_session(&server, 100, PaginationProtocol::ContinuationToken);
    let status = Status::new(ErrorHandling::Raise);
    let items = vec![ItemRef::new("COND-1", "StoredCondition")];
    let options = PullOptions {
        start: 0,
        end: 10_000,
        header: HeaderMode::Id,
        ..PullOptions::default()
    };

    let result = pull(&session, &items, &options, &status).await.unwrap();
    let batch = result.table.unwrap();

    assert_eq!(batch.num_rows(), 0);
    assert_eq!(
        column_names(&batch),
        vec![
            "Condition",
            "Capsule Start",
            "Capsule End",
            "Capsule Is Uncertain"
        ]
    );
    // Forced dtypes hold even with no rows
    let schema = batch.schema();
    assert_eq!(
        schema.field_with_name("Capsule Start").unwrap().data_type(),
        &DataType::Timestamp(TimeUnit::Nanosecond, Some("UTC".into()))
    );
    assert_eq!(
        schema
            .field_with_name("Capsule Is Uncertain")
            .unwrap()
            .data_type(),
        &DataType::Boolean
    );
}

#[tokio::test]
async fn test_pull_condition_with_signal_uses_capsule_table() {
    let server = MockServer::start().await;

    // Required columns, no properties, sort key, then the stat column
    Mock::given(method("POST"))
        .and(path("/formulas/run"))
        .and(body_string_contains("capsuleTable("))
        .and(body_string_contains(".addStatColumn('s0', $s0, average())"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "table": {
                "headers": [
                    "Capsule ID", "Original Uncertainty", "Condition ID",
                    "Start", "End", "Capsule SortKey", "s0"
                ],
                "data": [
                    ["CAP-1", 0, "COND-1", 1_000, 2_000, "CAP-1", 21.5]
                ]
            }
        })))
        .mount(&server)
        .await;

    let session = test_session(&server, 100, PaginationProtocol::ContinuationToken);
    let status = Status::new(ErrorHandling::Raise);
    let items = vec![
        ItemRef::new("SIG-1", "StoredSignal").with_name("Temp"),
        ItemRef::new("COND-1", "StoredCondition").with_name("Maint"),
    ];
    let options = PullOptions {
        start: 0,
        end: 10_000,
        shape: Shape::Capsules,
        ..PullOptions::default()
    };

    let result = pull(&session, &items, &options, &status).await.unwrap();
    let batch = result.table.unwrap();

    assert_eq!(
        column_names(&batch),
        vec![
            "Condition",
            "Capsule Start",
            "Capsule End",
            "Capsule Is Uncertain",
            "Temp (Average)"
        ]
    );
    assert_eq!(
        string_column(&batch, "Condition"),
        vec![Some("Maint".to_string())]
    );
    assert_eq!(timestamps(&batch, "Capsule Start"), vec![1_000]);
    assert_eq!(float_column(&batch, "Temp (Average)"), vec![Some(21.5)]);

    // Both rows succeeded even though only one request was issued
    assert_eq!(status.row(0).unwrap().result, "Success");
    assert_eq!(status.row(1).unwrap().result, "Success");
}

#[tokio::test]
async fn test_pull_condition_as_samples() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/formulas/run"))
        .and(body_string_contains("0.toSignal(1s)"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "samples": {
                "samples": [
                    {"key": 0, "value": 0},
                    {"key": 1_000_000_000i64, "value": 0},
                    {"key": 2_000_000_000i64, "value": 0}
                ]
            }
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/formulas/run"))
        .and(body_string_contains("$condition"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "capsules": {
                "capsules": [{
                    "start": 1_000_000_000i64,
                    "end": 2_000_000_000i64,
                    "properties": [{"name": "Batch", "value": "B-1"}]
                }]
            }
        })))
        .mount(&server)
        .await;

    let session = test_session(&server, 100, PaginationProtocol::ContinuationToken);
    let status = Status::new(ErrorHandling::Raise);
    let items = vec![ItemRef::new("COND-1", "StoredCondition")];
    let options = PullOptions {
        start: 0,
        end: 3_000_000_000,
        grid: Grid::Period("1s".to_string()),
        header: HeaderMode::Id,
        shape: Shape::Samples,
        ..PullOptions::default()
    };

    let result = pull(&session, &items, &options, &status).await.unwrap();
    let batch = result.table.unwrap();

    // Placeholder timestamps survive; the placeholder column does not
    assert_eq!(
        column_names(&batch),
        vec!["Timestamp", "COND-1", "COND-1 Batch"]
    );
    assert_eq!(
        timestamps(&batch, "Timestamp"),
        vec![0, 1_000_000_000, 2_000_000_000]
    );
    assert_eq!(
        int_column(&batch, "COND-1"),
        vec![Some(0), Some(1), Some(1)]
    );
    assert_eq!(
        string_column(&batch, "COND-1 Batch"),
        vec![None, Some("B-1".to_string()), Some("B-1".to_string())]
    );
}

#[tokio::test]
async fn test_pull_condition_as_samples_requires_grid() {
    let server = MockServer::start().await;
    let session = test_session(&server, 100, PaginationProtocol::ContinuationToken);
    let status = Status::new(ErrorHandling::Raise);
    let items = vec![ItemRef::new("COND-1", "StoredCondition")];
    let options = PullOptions {
        start: 0,
        end: 10_000,
        grid: Grid::None,
        header: HeaderMode::Id,
        shape: Shape::Samples,
        ..PullOptions::default()
    };

    let err = pull(&session, &items, &options, &status).await.unwrap_err();
    assert!(err.is_config());
}

// ============================================================================
// End-to-end: scalars
// ============================================================================

#[tokio::test]
async fn test_pull_scalar_broadcast_over_signal_index() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/formulas/run"))
        .and(body_partial_json(json!({"parameters": ["signal=SIG-1"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "samples": {
                "samples": [
                    {"key": 0, "value": 1.0},
                    {"key": 1_000, "value": 2.0}
                ]
            }
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/formulas/run"))
        .and(body_partial_json(json!({"parameters": ["scalar=SCAL-1"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "scalar": {"value": 42.0, "uom": "kg"}
        })))
        .mount(&server)
        .await;

    let session = test_session(&server, 100, PaginationProtocol::ContinuationToken);
    let status = Status::new(ErrorHandling::Raise);
    let items = vec![
        ItemRef::new("SIG-1", "StoredSignal"),
        ItemRef::new("SCAL-1", "CalculatedScalar"),
    ];
    let options = PullOptions {
        start: 0,
        end: 10_000,
        header: HeaderMode::Id,
        ..PullOptions::default()
    };

    let result = pull(&session, &items, &options, &status).await.unwrap();
    let batch = result.table.unwrap();

    assert_eq!(column_names(&batch), vec!["Timestamp", "SIG-1", "SCAL-1"]);
    assert_eq!(
        float_column(&batch, "SCAL-1"),
        vec![Some(42.0), Some(42.0)]
    );
    // Scalars never account bytes
    assert_eq!(status.row(1).unwrap().data_processed, 0);
}

#[tokio::test]
async fn test_pull_scalar_only_yields_single_row() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/formulas/run"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "scalar": {"value": 42.0}
        })))
        .mount(&server)
        .await;

    let session = test_session(&server, 100, PaginationProtocol::ContinuationToken);
    let status = Status::new(ErrorHandling::Raise);
    let items = vec![ItemRef::new("SCAL-1", "CalculatedScalar")];
    let options = PullOptions {
        start: 5_000,
        end: 10_000,
        header: HeaderMode::Id,
        ..PullOptions::default()
    };

    let result = pull(&session, &items, &options, &status).await.unwrap();
    let batch = result.table.unwrap();

    assert_eq!(column_names(&batch), vec!["Timestamp", "SCAL-1"]);
    assert_eq!(batch.num_rows(), 1);
    assert_eq!(timestamps(&batch, "Timestamp"), vec![5_000]);
    assert_eq!(float_column(&batch, "SCAL-1"), vec![Some(42.0)]);
}

// ============================================================================
// End-to-end: error policy and cancellation
// ============================================================================

#[tokio::test]
async fn test_pull_rejects_inverted_range() {
    let server = MockServer::start().await;
    let session = test_session(&server, 100, PaginationProtocol::ContinuationToken);
    let status = Status::new(ErrorHandling::Raise);
    let items = vec![ItemRef::new("SIG-1", "StoredSignal")];
    let options = PullOptions {
        start: 10_000,
        end: 10_000,
        ..PullOptions::default()
    };

    let err = pull(&session, &items, &options, &status).await.unwrap_err();
    assert!(err.is_config());
}

#[tokio::test]
async fn test_pull_interrupt_propagates() {
    let server = MockServer::start().await;
    let session = test_session(&server, 100, PaginationProtocol::ContinuationToken);
    let status = Status::new(ErrorHandling::Raise);
    status.interrupt();

    let items = vec![ItemRef::new("SIG-1", "StoredSignal")];
    let options = PullOptions {
        start: 0,
        end: 10_000,
        header: HeaderMode::Id,
        ..PullOptions::default()
    };

    let err = pull(&session, &items, &options, &status).await.unwrap_err();
    assert!(matches!(err, crate::error::Error::Interrupted));
}

#[tokio::test]
async fn test_pull_catalog_policy_keeps_healthy_rows() {
    let server = MockServer::start().await;

    // SIG-BAD answers with the wrong payload kind; SIG-OK is healthy
    Mock::given(method("POST"))
        .and(path("/formulas/run"))
        .and(body_partial_json(json!({"parameters": ["signal=SIG-BAD"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "scalar": {"value": 1.0}
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/formulas/run"))
        .and(body_partial_json(json!({"parameters": ["signal=SIG-OK"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "samples": {"samples": [{"key": 0, "value": 1.0}]}
        })))
        .mount(&server)
        .await;

    let session = test_session(&server, 100, PaginationProtocol::ContinuationToken);
    let status = Status::new(ErrorHandling::Catalog);
    let items = vec![
        ItemRef::new("SIG-BAD", "StoredSignal"),
        ItemRef::new("SIG-OK", "StoredSignal"),
    ];
    let options = PullOptions {
        start: 0,
        end: 10_000,
        header: HeaderMode::Id,
        errors: ErrorHandling::Catalog,
        ..PullOptions::default()
    };

    let result = pull(&session, &items, &options, &status).await.unwrap();
    let batch = result.table.unwrap();

    assert_eq!(column_names(&batch), vec!["Timestamp", "SIG-OK"]);
    assert!(status.row(0).unwrap().result.starts_with("[Error]"));
    assert_eq!(status.row(1).unwrap().result, "Success");
}

// ============================================================================
// End-to-end: callback mode
// ============================================================================

#[tokio::test]
async fn test_pull_with_callback_skips_merge() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/formulas/run"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "samples": {"samples": [{"key": 0, "value": 1.0}]}
        })))
        .mount(&server)
        .await;

    let session = test_session(&server, 100, PaginationProtocol::ContinuationToken);
    let status = Status::new(ErrorHandling::Raise);
    let items = vec![ItemRef::new("SIG-1", "StoredSignal")];
    let options = PullOptions {
        start: 0,
        end: 10_000,
        header: HeaderMode::Id,
        ..PullOptions::default()
    };

    let mut seen: Vec<(usize, Vec<String>)> = Vec::new();
    let mut callback = |row: RowResult| {
        seen.push((row.row_index, row.column_names.clone()));
    };
    let result = pull_with_callback(&session, &items, &options, &status, &mut callback)
        .await
        .unwrap();

    assert!(result.table.is_none());
    assert_eq!(seen, vec![(0, vec!["SIG-1".to_string()])]);
}
