//! Tests for the typed API client

use super::*;
use crate::http::{HttpClient, HttpClientConfig};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> ApiClient {
    let config = HttpClientConfig::builder()
        .base_url(server.uri())
        .no_rate_limit()
        .build();
    ApiClient::new(HttpClient::with_config(config))
}

#[tokio::test]
async fn test_run_formula_reports_body_size() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/formulas/run"))
        .and(body_partial_json(json!({
            "formula": "$signal",
            "parameters": ["signal=ABC-123"]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "samples": {
                "samples": [{"key": 1000, "value": 1.0}]
            }
        })))
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let input = FormulaRunInput {
        formula: "$signal".to_string(),
        parameters: vec!["signal=ABC-123".to_string()],
        start: Some(0),
        end: Some(10_000),
        limit: Some(1000),
        ..Default::default()
    };

    let (output, size) = client.run_formula(&input).await.unwrap();
    assert_eq!(output.samples.unwrap().samples.len(), 1);
    assert!(size > 0);
}

#[tokio::test]
async fn test_compile_formula() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/formulas/compile"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "returnType": "CalculatedSignal"
        })))
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let output = client
        .compile_formula("$condition.setMaximumDuration(1d)", &["condition=DEF-456".to_string()])
        .await
        .unwrap();

    assert_eq!(output.return_type.as_deref(), Some("CalculatedSignal"));
    assert!(output.error_message.is_none());
}

#[tokio::test]
async fn test_get_item_maps_404_to_not_found() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/items/MISSING"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such item"))
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let err = client.get_item("MISSING").await.unwrap_err();
    assert!(matches!(err, crate::error::Error::ItemNotFound { .. }));
}

#[tokio::test]
async fn test_put_signal() {
    let mock_server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/signals"))
        .and(body_partial_json(json!({
            "name": "Temperature",
            "datasourceClass": "CSV",
            "datasourceId": "csv-1",
            "dataId": "[Push] Temperature"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "SIG-1",
            "name": "Temperature",
            "type": "StoredSignal"
        })))
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let input = SignalInput {
        name: "Temperature".to_string(),
        datasource_class: "CSV".to_string(),
        datasource_id: "csv-1".to_string(),
        data_id: "[Push] Temperature".to_string(),
        ..Default::default()
    };

    let output = client.put_signal(&input).await.unwrap();
    assert_eq!(output.id, "SIG-1");
}

#[tokio::test]
async fn test_overwrite_samples_sends_interval() {
    let mock_server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/signals/SIG-1/samples"))
        .and(body_partial_json(json!({
            "interval": {"start": 0, "end": 5000}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let input = SamplesInput {
        samples: vec![SampleOutput {
            key: Some(1000),
            value: Some(json!(3.5)),
        }],
        interval: Some(Interval {
            start: 0,
            end: 5000,
        }),
    };

    client.overwrite_samples("SIG-1", &input).await.unwrap();
}

#[tokio::test]
async fn test_batch_conditions_reports_row_errors() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/conditions/batch"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "itemUpdates": [
                {"item": {"id": "COND-1", "name": "High Temp", "type": "StoredCondition"}},
                {"errorMessage": "Maximum Duration is required"}
            ]
        })))
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let input = ConditionBatchInput {
        conditions: vec![ConditionInput {
            name: "High Temp".to_string(),
            datasource_class: "CSV".to_string(),
            datasource_id: "csv-1".to_string(),
            data_id: "[Push] High Temp".to_string(),
            maximum_duration: "2d".to_string(),
            ..Default::default()
        }],
    };

    let output = client.batch_conditions(&input).await.unwrap();
    assert_eq!(output.item_updates.len(), 2);
    assert_eq!(output.item_updates[0].item.as_ref().unwrap().id, "COND-1");
    assert!(output.item_updates[1].error_message.is_some());
}

#[tokio::test]
async fn test_get_tree_children_paging_params() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/trees/ROOT-1/children"))
        .and(query_param("offset", "40"))
        .and(query_param("limit", "40"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "children": [
                {"id": "CHILD-1", "name": "Area A", "type": "Asset", "hasChildren": true}
            ]
        })))
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let output = client
        .get_tree_children("ROOT-1", 40, 40, None)
        .await
        .unwrap();

    assert_eq!(output.children.len(), 1);
    assert!(output.children[0].has_children);
}

#[tokio::test]
async fn test_cleanup_datasource() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/datasources/DS-1/cleanup"))
        .and(body_partial_json(json!({"syncToken": "2026-08-30T00:00:00Z"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "statusMessage": "Cleanup queued"
        })))
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    client
        .cleanup_datasource("DS-1", "2026-08-30T00:00:00Z")
        .await
        .unwrap();
}
