//! Push engine tests against a mock server

use super::*;
use crate::http::HttpClientConfig;
use crate::session::SessionOptions;
use crate::table::{Series, Value};
use crate::types::{ErrorHandling, TypeMismatchPolicy};
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_partial_json, body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_session(server: &MockServer, push_page_size: usize) -> Session {
    let config = HttpClientConfig::builder()
        .base_url(server.uri())
        .no_rate_limit()
        .build();
    Session::with_options(
        config,
        SessionOptions {
            push_page_size,
            ..SessionOptions::default()
        },
    )
}

fn numeric_series(pairs: &[(i64, f64)]) -> Series {
    let mut series = Series::new();
    for &(key, value) in pairs {
        series.push(key, Value::Float(value));
    }
    series
}

#[test]
fn test_scoped_data_id() {
    assert_eq!(scoped_data_id(Some("WB-1"), "Temp"), "[WB-1] Temp");
    assert_eq!(scoped_data_id(None, "Temp"), "[] Temp");
}

// ============================================================================
// Signals
// ============================================================================

#[tokio::test]
async fn test_push_signal_metadata_and_samples() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/signals"))
        .and(body_partial_json(json!({
            "name": "Temp",
            "datasourceClass": "quarry",
            "datasourceId": "quarry",
            "dataId": "[] Temp"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "SIG-NEW", "name": "Temp", "type": "StoredSignal"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/signals/SIG-NEW/samples"))
        .and(body_partial_json(json!({
            "samples": [
                {"key": 0, "value": 1.0},
                {"key": 1_000, "value": 2.0},
                {"key": 2_000, "value": 3.0}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let session = test_session(&server, 100);
    let status = Status::new(ErrorHandling::Raise);
    let request = PushRequest {
        rows: vec![PushRow::with_samples(
            PushItem::signal("Temp"),
            numeric_series(&[(0, 1.0), (1_000, 2.0), (2_000, 3.0)]),
        )],
        ..PushRequest::default()
    };

    let result = push(&session, &request, &status).await.unwrap();
    assert_eq!(result.rows.len(), 1);
    assert_eq!(result.rows[0].id.as_deref(), Some("SIG-NEW"));
    assert_eq!(result.rows[0].push_count, 3);
    assert_eq!(result.rows[0].push_result, "Success");
    assert_eq!(result.earliest, Some(0));
    assert_eq!(result.latest, Some(2_000));
}

#[tokio::test]
async fn test_push_overwrite_interval_advances() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/signals"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"id": "SIG-NEW"})),
        )
        .mount(&server)
        .await;
    // First page clears the whole replace range
    Mock::given(method("PUT"))
        .and(path("/signals/SIG-NEW/samples"))
        .and(body_partial_json(json!({
            "interval": {"start": 0, "end": 10_000}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;
    // Second page must start strictly after the last key page 1 wrote
    Mock::given(method("PUT"))
        .and(path("/signals/SIG-NEW/samples"))
        .and(body_partial_json(json!({
            "interval": {"start": 1_001, "end": 10_000}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let session = test_session(&server, 2);
    let status = Status::new(ErrorHandling::Raise);
    let request = PushRequest {
        rows: vec![PushRow::with_samples(
            PushItem::signal("Temp"),
            numeric_series(&[(0, 1.0), (1_000, 2.0), (2_000, 3.0), (3_000, 4.0)]),
        )],
        replace: Some(ReplaceInterval::new(0, 10_000).unwrap()),
        ..PushRequest::default()
    };

    let result = push(&session, &request, &status).await.unwrap();
    assert_eq!(result.rows[0].push_count, 4);
    let ledger = status.row(0).unwrap();
    assert_eq!(ledger.pages, 2);
}

#[tokio::test]
async fn test_push_replace_with_no_data_clears_interval() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/signals"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"id": "SIG-NEW"})),
        )
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/signals/SIG-NEW/samples"))
        .and(body_partial_json(json!({
            "samples": [],
            "interval": {"start": 0, "end": 10_000}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let session = test_session(&server, 100);
    let status = Status::new(ErrorHandling::Raise);
    let request = PushRequest {
        rows: vec![PushRow::with_samples(PushItem::signal("Temp"), Series::new())],
        replace: Some(ReplaceInterval::new(0, 10_000).unwrap()),
        ..PushRequest::default()
    };

    let result = push(&session, &request, &status).await.unwrap();
    assert_eq!(result.rows[0].push_count, 0);
    assert_eq!(result.earliest, None);
}

#[tokio::test]
async fn test_push_type_mismatch_raise() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/signals"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"id": "SIG-NEW"})),
        )
        .mount(&server)
        .await;

    let mut series = Series::new();
    series.push(0, Value::Float(1.0));
    series.push(1_000, Value::Str("oops".to_string()));

    let session = test_session(&server, 100);
    let status = Status::new(ErrorHandling::Raise);
    let request = PushRequest {
        rows: vec![PushRow::with_samples(
            // Declared numeric, so the string sample cannot retype the column
            PushItem::signal("Temp").with_value_uom("m"),
            series,
        )],
        type_mismatches: TypeMismatchPolicy::Raise,
        ..PushRequest::default()
    };

    let err = push(&session, &request, &status).await.unwrap_err();
    assert!(matches!(err, Error::TypeMismatch { .. }));
    assert!(err.to_string().contains("Temp"));
}

#[tokio::test]
async fn test_push_type_mismatch_drop_and_invalid() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/signals"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"id": "SIG-NEW"})),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/signals/SIG-NEW/samples"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let mut series = Series::new();
    series.push(0, Value::Float(1.0));
    series.push(1_000, Value::Str("oops".to_string()));
    series.push(2_000, Value::Float(3.0));

    let session = test_session(&server, 100);

    let status = Status::new(ErrorHandling::Raise);
    let request = PushRequest {
        rows: vec![PushRow::with_samples(
            PushItem::signal("Temp").with_value_uom("m"),
            series.clone(),
        )],
        type_mismatches: TypeMismatchPolicy::Drop,
        ..PushRequest::default()
    };
    let result = push(&session, &request, &status).await.unwrap();
    assert_eq!(result.rows[0].push_count, 2);

    let status = Status::new(ErrorHandling::Raise);
    let request = PushRequest {
        rows: vec![PushRow::with_samples(
            PushItem::signal("Temp").with_value_uom("m"),
            series,
        )],
        type_mismatches: TypeMismatchPolicy::Invalid,
        ..PushRequest::default()
    };
    let result = push(&session, &request, &status).await.unwrap();
    // The mismatched sample is written as an invalid (null) sample
    assert_eq!(result.rows[0].push_count, 3);
}

#[tokio::test]
async fn test_push_scope_error_retried_without_scope() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/signals"))
        .and(body_string_contains("scopedTo"))
        .respond_with(
            ResponseTemplate::new(400).set_body_string("The item is globally scoped"),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/signals"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"id": "SIG-NEW"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let session = test_session(&server, 100);
    let status = Status::new(ErrorHandling::Raise);
    let request = PushRequest {
        rows: vec![PushRow::new(PushItem::signal("Temp").with_scope("WB-1"))],
        ..PushRequest::default()
    };

    let result = push(&session, &request, &status).await.unwrap();
    assert_eq!(result.rows[0].id.as_deref(), Some("SIG-NEW"));
    assert_eq!(result.rows[0].push_result, "Success");
}

// ============================================================================
// Conditions
// ============================================================================

#[tokio::test]
async fn test_push_condition_capsules_with_property_units() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/conditions/batch"))
        .and(body_partial_json(json!({
            "conditions": [{"name": "Maint", "maximumDuration": "2d"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "itemUpdates": [
                {"item": {"id": "COND-NEW", "name": "Maint", "type": "StoredCondition"}}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/conditions/COND-NEW/capsules"))
        .and(body_partial_json(json!({
            "keyUnitOfMeasure": "ns",
            "capsules": [
                {
                    "start": 1_000,
                    "end": 2_000,
                    "properties": [
                        {"name": "Batch", "value": "B-1", "unitOfMeasure": "string"}
                    ]
                },
                {"start": 3_000, "end": 4_000}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let mut item = PushItem::condition("Maint", "2d");
    item.capsule_property_units
        .insert("Batch".to_string(), "string".to_string());
    let mut first = CapsuleRecord {
        start: 1_000,
        end: 2_000,
        ..CapsuleRecord::default()
    };
    first
        .properties
        .insert("Batch".to_string(), Value::Str("B-1".to_string()));
    let second = CapsuleRecord {
        start: 3_000,
        end: 4_000,
        ..CapsuleRecord::default()
    };

    let session = test_session(&server, 100);
    let status = Status::new(ErrorHandling::Raise);
    let request = PushRequest {
        rows: vec![PushRow::with_capsules(item, vec![first, second])],
        ..PushRequest::default()
    };

    let result = push(&session, &request, &status).await.unwrap();
    assert_eq!(result.rows[0].push_count, 2);
    assert_eq!(result.earliest, Some(1_000));
    assert_eq!(result.latest, Some(4_000));
}

#[tokio::test]
async fn test_push_condition_batch_error_catalogued() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/conditions/batch"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "itemUpdates": [{"errorMessage": "Maximum duration is invalid"}]
        })))
        .mount(&server)
        .await;

    let session = test_session(&server, 100);
    let status = Status::new(ErrorHandling::Catalog);
    let request = PushRequest {
        rows: vec![PushRow::new(PushItem::condition("Maint", "bogus"))],
        ..PushRequest::default()
    };

    let result = push(&session, &request, &status).await.unwrap();
    assert!(result.rows[0].push_result.starts_with("[Error]"));
    assert!(result.rows[0].id.is_none());
}

// ============================================================================
// Deferred metadata pass
// ============================================================================

#[tokio::test]
async fn test_push_deferred_row_resolves_scope_by_name() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/signals"))
        .and(body_partial_json(json!({"name": "Parent"})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"id": "PARENT-ID"})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/signals"))
        .and(body_partial_json(json!({
            "name": "Child",
            "scopedTo": "PARENT-ID"
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"id": "CHILD-ID"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let session = test_session(&server, 100);
    let status = Status::new(ErrorHandling::Raise);
    let request = PushRequest {
        rows: vec![
            PushRow::new(PushItem::signal("Parent")),
            PushRow::new(PushItem::signal("Child").with_scope("Parent").deferred()),
        ],
        ..PushRequest::default()
    };

    let result = push(&session, &request, &status).await.unwrap();
    assert_eq!(result.rows[1].id.as_deref(), Some("CHILD-ID"));
    assert_eq!(result.rows[1].push_result, "Success");
}

// ============================================================================
// Archival
// ============================================================================

#[tokio::test]
async fn test_push_archive_small_datasource_uses_bulk_cleanup() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/datasources/DS-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "DS-1", "itemCount": 100
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/datasources/DS-1/cleanup"))
        .and(body_partial_json(json!({"syncToken": "tok-1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let session = test_session(&server, 100);
    let status = Status::new(ErrorHandling::Raise);
    let request = PushRequest {
        archive: Some(ArchiveScope {
            datasource_id: "DS-1".to_string(),
            root_asset_id: "ROOT".to_string(),
        }),
        sync_token: Some("tok-1".to_string()),
        ..PushRequest::default()
    };

    let result = push(&session, &request, &status).await.unwrap();
    assert_eq!(result.archived, None);
}

#[tokio::test]
async fn test_push_archive_large_datasource_walks_tree() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/datasources/DS-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "DS-1", "itemCount": 20_000
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/trees/ROOT/children"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "children": [
                {"id": "A", "syncToken": "tok-1", "hasChildren": false},
                {"id": "B", "syncToken": "tok-0", "hasChildren": false}
            ]
        })))
        .mount(&server)
        .await;
    // Only the stale child gets archived
    Mock::given(method("POST"))
        .and(path("/items/B/archive"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let session = test_session(&server, 100);
    let status = Status::new(ErrorHandling::Raise);
    let request = PushRequest {
        archive: Some(ArchiveScope {
            datasource_id: "DS-1".to_string(),
            root_asset_id: "ROOT".to_string(),
        }),
        sync_token: Some("tok-1".to_string()),
        ..PushRequest::default()
    };

    let result = push(&session, &request, &status).await.unwrap();
    assert_eq!(result.archived, Some(1));
}

#[tokio::test]
async fn test_push_archive_without_sync_token_rejected() {
    let server = MockServer::start().await;
    let session = test_session(&server, 100);
    let status = Status::new(ErrorHandling::Raise);
    let request = PushRequest {
        archive: Some(ArchiveScope::default()),
        ..PushRequest::default()
    };

    let err = push(&session, &request, &status).await.unwrap_err();
    assert!(err.is_config());
}
