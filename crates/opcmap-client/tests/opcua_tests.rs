//! Gateway round trips against an in-process mock

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode as HttpStatus;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use opcmap_client::testing::{RequestCounter, TestServer};
use opcmap_client::{
    ClientError, HistoricalWriteRequest, HistoryPoint, IdType, NodeId, OpcUaClient, OpcUaConfig,
    OutputForm, PerformInsertReplace, ReadOutput, Variant, WriteVariable,
};

#[derive(Default)]
struct Gateway {
    hits: RequestCounter,
    bodies: Mutex<Vec<Value>>,
    response: Mutex<Value>,
}

impl Gateway {
    fn answering(response: Value) -> Arc<Self> {
        let gateway = Self::default();
        *gateway.response.lock() = response;
        Arc::new(gateway)
    }

    fn last_body(&self) -> Value {
        self.bodies.lock().last().cloned().unwrap_or(Value::Null)
    }
}

async fn canned(State(gw): State<Arc<Gateway>>, Json(body): Json<Value>) -> Json<Value> {
    gw.hits.hit();
    gw.bodies.lock().push(body);
    Json(gw.response.lock().clone())
}

async fn start(gw: Arc<Gateway>) -> (TestServer, OpcUaClient) {
    let router = Router::new()
        .route("/values/get", post(canned))
        .route("/values/historicalaggregated", post(canned))
        .route("/values/historicalraw", post(canned))
        .route("/values/set", post(canned))
        .route("/values/historicalwrite", post(canned))
        .with_state(gw);
    let server = TestServer::start(router).await.unwrap();
    let client = OpcUaClient::new(OpcUaConfig::new(
        server.base_url(),
        "opc.tcp://plc.local:4840",
    ))
    .unwrap();
    (server, client)
}

fn utc(raw: &str) -> DateTime<Utc> {
    raw.parse().unwrap()
}

// =============================================================================
// Realtime reads
// =============================================================================

#[tokio::test]
async fn test_get_values_single_node() {
    let gw = Gateway::answering(json!([{
        "Success": true,
        "Values": [{
            "ServerTimestamp": "2022-01-01T12:00:00Z",
            "Value": {"Type": 10, "Body": 1.2},
            "StatusCode": {"Code": 0, "Symbol": "Good"}
        }]
    }]));
    let (_server, client) = start(gw.clone()).await;

    let input = NodeId::new("SOMEID", 1, IdType::Guid);
    let values = client.get_values(&[input]).await.unwrap();

    assert_eq!(
        serde_json::to_value(&values).unwrap(),
        json!([{
            "Id": "SOMEID",
            "Namespace": 1,
            "IdType": 2,
            "Timestamp": "2022-01-01T12:00:00Z",
            "Value": 1.2,
            "ValueType": "Float",
            "StatusCode": 0,
            "StatusSymbol": "Good"
        }])
    );

    let body = gw.last_body();
    assert_eq!(
        body["Connection"],
        json!({"Url": "opc.tcp://plc.local:4840", "AuthenticationType": 1})
    );
    assert_eq!(body["NodeIds"], json!([{"Id": "SOMEID", "Namespace": 1, "IdType": 2}]));
}

#[tokio::test]
async fn test_get_values_bare_object_envelope() {
    let gw = Gateway::answering(json!({
        "Success": true,
        "Values": [{"Value": {"Type": 1, "Body": true}}]
    }));
    let (_server, client) = start(gw).await;

    let values = client.get_values(&[NodeId::string("Pump.On", 2)]).await.unwrap();
    assert_eq!(values[0].value, Some(json!(true)));
    assert_eq!(values[0].value_type.as_deref(), Some("Boolean"));
    assert_eq!(values[0].timestamp, None);
    assert_eq!(values[0].status_code, None);
}

#[tokio::test]
async fn test_get_values_keeps_positions_when_values_missing() {
    let gw = Gateway::answering(json!([{"Success": true}]));
    let (_server, client) = start(gw).await;

    let inputs = vec![NodeId::string("a", 1), NodeId::numeric(7, 3)];
    let values = client.get_values(&inputs).await.unwrap();

    assert_eq!(values.len(), 2);
    for (value, input) in values.iter().zip(&inputs) {
        assert_eq!(&value.node_id, input);
        assert!(value.value.is_none());
        assert!(value.value_type.is_none());
    }
}

#[tokio::test]
async fn test_get_values_unsuccessful() {
    let gw = Gateway::answering(json!([{"Success": false, "ErrorMessage": "Gateway offline"}]));
    let (_server, client) = start(gw).await;

    match client.get_values(&[NodeId::string("a", 1)]).await {
        Err(ClientError::Protocol(msg)) => assert_eq!(msg, "Gateway offline"),
        other => panic!("Expected Protocol error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_get_values_empty_input_still_requests() {
    let gw = Gateway::answering(json!([{"Success": true, "Values": []}]));
    let (_server, client) = start(gw.clone()).await;

    let values = client.get_values(&[]).await.unwrap();
    assert!(values.is_empty());
    assert_eq!(gw.hits.count(), 1);
    assert_eq!(gw.last_body()["NodeIds"], json!([]));
}

// =============================================================================
// Historical reads
// =============================================================================

#[tokio::test]
async fn test_historical_aggregated_table() {
    let gw = Gateway::answering(json!({
        "Success": true,
        "HistoryReadResults": [{
            "NodeId": {"IdType": 1, "Id": "Site.Power", "Namespace": 2},
            "StatusCode": {"Code": 0, "Symbol": "Good"},
            "DataValues": [
                {"Value": {"Type": 11, "Body": 34.28}, "StatusCode": {"Code": 0, "Symbol": "Good"}, "SourceTimestamp": "2022-09-13T13:00:00Z"},
                {"Value": {"Type": 11, "Body": 6.48}, "StatusCode": {"Code": 0, "Symbol": "Good"}, "SourceTimestamp": "2022-09-13T14:00:00Z"}
            ]
        }]
    }));
    let (_server, client) = start(gw.clone()).await;

    let node = NodeId::string("Site.Power", 2);
    let out = client
        .get_historical_aggregated_values(
            utc("2022-09-13T13:00:00Z"),
            utc("2022-09-13T14:00:00Z"),
            3_600_000,
            "Average",
            std::slice::from_ref(&node),
            OutputForm::Table,
        )
        .await
        .unwrap();

    let table = out.into_table();
    assert_eq!(
        table.columns,
        vec![
            "NodeId.IdType",
            "NodeId.Id",
            "NodeId.Namespace",
            "Timestamp",
            "Value",
            "ValueType",
            "StatusCode",
            "StatusSymbol"
        ]
    );
    assert_eq!(table.len(), 2);
    assert_eq!(table.column("ValueType").unwrap(), vec![&json!("Double"), &json!("Double")]);
    assert_eq!(table.column("Value").unwrap(), vec![&json!(34.28), &json!(6.48)]);

    let body = gw.last_body();
    assert_eq!(body["StartTime"], json!("2022-09-13T13:00:00Z"));
    assert_eq!(body["EndTime"], json!("2022-09-13T14:00:00Z"));
    assert_eq!(body["ProcessingInterval"], json!(3_600_000));
    assert_eq!(body["AggregateName"], json!("Average"));
    assert_eq!(
        body["ReadValueIds"],
        json!([{"NodeId": {"Id": "Site.Power", "Namespace": 2, "IdType": 1}, "AggregateName": "Average"}])
    );
}

#[tokio::test]
async fn test_historical_aggregated_timestamps_non_decreasing() {
    let gw = Gateway::answering(json!({
        "Success": true,
        "HistoryReadResults": [
            {
                "NodeId": {"IdType": 1, "Id": "a", "Namespace": 1},
                "DataValues": [
                    {"Value": {"Type": 11, "Body": 2.0}, "SourceTimestamp": "2022-09-13T14:00:00Z"},
                    {"Value": {"Type": 11, "Body": 1.0}, "SourceTimestamp": "2022-09-13T13:00:00Z"}
                ]
            },
            {
                "NodeId": {"IdType": 1, "Id": "b", "Namespace": 1},
                "DataValues": [
                    {"Value": {"Type": 11, "Body": 3.0}, "SourceTimestamp": "2022-09-13T13:00:00Z"}
                ]
            }
        ]
    }));
    let (_server, client) = start(gw).await;

    let rows = client
        .get_historical_aggregated_values(
            utc("2022-09-13T13:00:00Z"),
            utc("2022-09-13T15:00:00Z"),
            3_600_000,
            "Average",
            &[NodeId::string("a", 1), NodeId::string("b", 1)],
            OutputForm::Rows,
        )
        .await
        .unwrap()
        .into_rows()
        .unwrap();

    let a: Vec<_> = rows
        .iter()
        .filter(|r| r.node_id.id == "a")
        .map(|r| r.timestamp.clone().unwrap())
        .collect();
    assert_eq!(a, vec!["2022-09-13T13:00:00Z", "2022-09-13T14:00:00Z"]);
    assert_eq!(rows[2].node_id.id, "b");
}

#[tokio::test]
async fn test_empty_history_results_give_empty_table() {
    let gw = Gateway::answering(json!({"Success": true, "HistoryReadResults": []}));
    let (_server, client) = start(gw).await;

    let out = client
        .get_raw_historical_values(
            utc("2022-09-13T13:00:00Z"),
            utc("2022-09-13T14:00:00Z"),
            &[],
            None,
            None,
            OutputForm::Table,
        )
        .await
        .unwrap();
    match out {
        ReadOutput::Table(table) => {
            assert!(table.is_empty());
            assert_eq!(table.columns.len(), 8);
        }
        ReadOutput::Rows(_) => panic!("Expected table output"),
    }
}

#[tokio::test]
async fn test_historical_non_object_response() {
    let gw = Gateway::answering(json!("unexpected"));
    let (_server, client) = start(gw).await;

    let result = client
        .get_raw_historical_values(
            utc("2022-09-13T13:00:00Z"),
            utc("2022-09-13T14:00:00Z"),
            &[NodeId::string("a", 1)],
            None,
            None,
            OutputForm::Rows,
        )
        .await;
    match result {
        Err(ClientError::Protocol(msg)) => assert_eq!(msg, "No content returned from the server"),
        other => panic!("Expected Protocol error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_raw_history_paging_keys() {
    let gw = Gateway::answering(json!({"Success": true, "HistoryReadResults": []}));
    let (_server, client) = start(gw.clone()).await;

    client
        .get_raw_historical_values(
            utc("2022-09-13T13:00:00Z"),
            utc("2022-09-13T14:00:00Z"),
            &[NodeId::string("a", 1)],
            Some(100),
            Some(50),
            OutputForm::Rows,
        )
        .await
        .unwrap();

    let body = gw.last_body();
    assert_eq!(body["Limit"], json!({"StartIndex": 100, "NumRecords": 50}));
    assert_eq!(body["ReadValueIds"], json!([{"NodeId": {"Id": "a", "Namespace": 1, "IdType": 1}}]));
    assert!(body.get("AggregateName").is_none());
}

#[tokio::test]
async fn test_raw_history_half_limit_rejected() {
    let gw = Gateway::answering(json!({"Success": true, "HistoryReadResults": []}));
    let (_server, client) = start(gw.clone()).await;

    let result = client
        .get_raw_historical_values(
            utc("2022-09-13T13:00:00Z"),
            utc("2022-09-13T14:00:00Z"),
            &[NodeId::string("a", 1)],
            Some(100),
            None,
            OutputForm::Rows,
        )
        .await;
    assert!(matches!(result, Err(ClientError::Validation(_))));
    assert_eq!(gw.hits.count(), 0);
}

#[tokio::test]
async fn test_historical_aggregated_unsuccessful() {
    let gw = Gateway::answering(json!({"Success": false, "ErrorMessage": "Aggregate not supported"}));
    let (_server, client) = start(gw).await;

    let result = client
        .get_historical_aggregated_values(
            utc("2022-09-13T13:00:00Z"),
            utc("2022-09-13T14:00:00Z"),
            3_600_000,
            "Median",
            &[NodeId::string("a", 1)],
            OutputForm::Rows,
        )
        .await;
    match result {
        Err(ClientError::Protocol(msg)) => assert_eq!(msg, "Aggregate not supported"),
        other => panic!("Expected Protocol error, got {:?}", other),
    }
}

/// Answers each window with one point per requested node, stamped at the
/// window start; the first request fails with 503.
async fn windowed(State(gw): State<Arc<Gateway>>, Json(body): Json<Value>) -> Response {
    if gw.hits.hit() == 0 {
        return (HttpStatus::SERVICE_UNAVAILABLE, "busy").into_response();
    }
    gw.bodies.lock().push(body.clone());

    let start = body["StartTime"].clone();
    let results: Vec<Value> = body["ReadValueIds"]
        .as_array()
        .cloned()
        .unwrap_or_default()
        .into_iter()
        .rev()
        .map(|rv| {
            json!({
                "NodeId": rv["NodeId"],
                "DataValues": [{"Value": {"Type": 11, "Body": 1.0}, "SourceTimestamp": start}]
            })
        })
        .collect();
    Json(json!({"Success": true, "HistoryReadResults": results})).into_response()
}

#[tokio::test]
async fn test_windowed_raw_history_order_and_retry() {
    let gw = Arc::new(Gateway::default());
    let router = Router::new()
        .route("/values/historicalraw", post(windowed))
        .with_state(gw.clone());
    let server = TestServer::start(router).await.unwrap();
    let client = OpcUaClient::new(OpcUaConfig::new(server.base_url(), "opc.tcp://plc:4840")).unwrap();

    let vars = vec![NodeId::string("first", 1), NodeId::string("second", 1)];
    let start = Utc.with_ymd_and_hms(2022, 1, 1, 0, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2022, 1, 1, 3, 0, 0).unwrap();

    let rows = client
        .get_raw_historical_values_windowed(
            start,
            end,
            &vars,
            Some(chrono::Duration::hours(1)),
            OutputForm::Rows,
        )
        .await
        .unwrap()
        .into_rows()
        .unwrap();

    // three windows plus one retried 503
    assert_eq!(gw.hits.count(), 4);
    assert_eq!(rows.len(), 6);

    let order: Vec<(String, String)> = rows
        .iter()
        .map(|r| (r.node_id.id.clone(), r.timestamp.clone().unwrap()))
        .collect();
    assert_eq!(
        order,
        vec![
            ("first".to_string(), "2022-01-01T00:00:00Z".to_string()),
            ("first".to_string(), "2022-01-01T01:00:00Z".to_string()),
            ("first".to_string(), "2022-01-01T02:00:00Z".to_string()),
            ("second".to_string(), "2022-01-01T00:00:00Z".to_string()),
            ("second".to_string(), "2022-01-01T01:00:00Z".to_string()),
            ("second".to_string(), "2022-01-01T02:00:00Z".to_string()),
        ]
    );
}

// =============================================================================
// Writes
// =============================================================================

fn write_variable() -> WriteVariable {
    WriteVariable {
        node_id: NodeId::string("Setpoint", 2),
        value: HistoryPoint::new(Variant::double(3.0), utc("2022-09-13T13:00:00Z")),
    }
}

#[tokio::test]
async fn test_write_values_ok() {
    let gw = Gateway::answering(json!({"Success": true, "StatusCodes": [{"Code": 0, "Symbol": "Good"}]}));
    let (_server, client) = start(gw.clone()).await;

    let results = client.write_values(&[write_variable()]).await.unwrap().unwrap();
    assert_eq!(results.len(), 1);
    assert!(results[0].write_success);
    assert_eq!(results[0].status_code.as_ref().and_then(|s| s.symbol.clone()).as_deref(), Some("Good"));

    let body = gw.last_body();
    assert_eq!(
        body["NodeIdValues"],
        json!([{
            "NodeId": {"Id": "Setpoint", "Namespace": 2, "IdType": 1},
            "Value": {
                "Value": {"Type": 11, "Body": 3.0},
                "SourceTimestamp": "2022-09-13T13:00:00Z",
                "StatusCode": {"Code": 0}
            }
        }])
    );
}

#[tokio::test]
async fn test_write_values_missing_status_codes() {
    let gw = Gateway::answering(json!({"Success": true}));
    let (_server, client) = start(gw).await;

    assert!(matches!(
        client.write_values(&[write_variable()]).await,
        Err(ClientError::Protocol(_))
    ));
}

#[tokio::test]
async fn test_write_values_empty_body() {
    let gw = Gateway::answering(Value::Null);
    let (_server, client) = start(gw).await;

    assert!(client.write_values(&[write_variable()]).await.unwrap().is_none());
}

#[tokio::test]
async fn test_write_values_rejects_mismatched_variant() {
    let gw = Gateway::answering(json!({"Success": true, "StatusCodes": []}));
    let (_server, client) = start(gw.clone()).await;

    let mut bad = write_variable();
    bad.value.value = Variant::new(opcmap_client::VariantType::Boolean, "yes");
    assert!(matches!(
        client.write_values(&[bad]).await,
        Err(ClientError::Validation(_))
    ));
    assert_eq!(gw.hits.count(), 0);
}

fn historical_request(stamps: &[&str]) -> HistoricalWriteRequest {
    HistoricalWriteRequest {
        node_id: NodeId::string("Site.Power", 2),
        perform_insert_replace: PerformInsertReplace::Replace,
        update_values: stamps
            .iter()
            .map(|s| HistoryPoint::new(Variant::double(1.5), utc(s)))
            .collect(),
    }
}

#[tokio::test]
async fn test_historical_write_wrong_order_sends_nothing() {
    let gw = Gateway::answering(json!({"Success": true, "HistoryUpdateResults": [{}]}));
    let (_server, client) = start(gw.clone()).await;

    let request = historical_request(&["2022-09-13T14:00:00Z", "2022-09-13T13:00:00Z"]);
    match client.write_historical_values(&[request]).await {
        Err(ClientError::Validation(msg)) => {
            assert_eq!(msg, opcmap_client::opcua::OUT_OF_ORDER_MESSAGE)
        }
        other => panic!("Expected Validation error, got {:?}", other),
    }
    assert_eq!(gw.hits.count(), 0);
}

#[tokio::test]
async fn test_historical_write_results() {
    let gw = Gateway::answering(json!({
        "Success": true,
        "HistoryUpdateResults": [
            {"StatusCode": {"Code": 0, "Symbol": "Good"}},
            {},
            {"StatusCode": {"Code": 2158690304u64, "Symbol": "BadNodeIdUnknown"}}
        ]
    }));
    let (_server, client) = start(gw.clone()).await;

    let stamps = ["2022-09-13T13:00:00Z", "2022-09-13T14:00:00Z"];
    let requests = vec![
        historical_request(&stamps),
        historical_request(&stamps),
        historical_request(&stamps),
    ];
    let results = client
        .write_historical_values(&requests)
        .await
        .unwrap()
        .unwrap();

    assert!(results[0].write_success);
    assert!(results[1].write_success);
    assert!(!results[2].write_success);
    assert_eq!(
        results[2].write_error.as_ref().map(|e| e.code),
        Some(2_158_690_304)
    );

    let body = gw.last_body();
    let details = body["HistoryUpdateDataDetails"].as_array().unwrap();
    assert_eq!(details.len(), 3);
    assert_eq!(details[0]["PerformInsertReplace"], json!(2));
    assert_eq!(details[0]["UpdateValues"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_historical_write_missing_results() {
    let gw = Gateway::answering(json!({"Success": true}));
    let (_server, client) = start(gw).await;

    let request = historical_request(&["2022-09-13T13:00:00Z"]);
    assert!(matches!(
        client.write_historical_values(&[request]).await,
        Err(ClientError::Protocol(_))
    ));
}

#[tokio::test]
async fn test_historical_write_short_results_mark_rest_failed() {
    let gw = Gateway::answering(json!({
        "Success": true,
        "HistoryUpdateResults": [{"StatusCode": {"Code": 0, "Symbol": "Good"}}]
    }));
    let (_server, client) = start(gw).await;

    let stamps = ["2022-09-13T13:00:00Z"];
    let requests = vec![historical_request(&stamps), historical_request(&stamps)];
    let results = client
        .write_historical_values(&requests)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(results.len(), 2);
    assert!(results[0].write_success);
    assert!(!results[1].write_success);
    assert!(results[1].write_error.is_none());
}

#[tokio::test]
async fn test_write_values_unsuccessful() {
    let gw = Gateway::answering(json!({"Success": false, "ErrorMessage": "Node is read-only"}));
    let (_server, client) = start(gw).await;

    match client.write_values(&[write_variable()]).await {
        Err(ClientError::Protocol(msg)) => assert_eq!(msg, "Node is read-only"),
        other => panic!("Expected Protocol error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_historical_write_unsuccessful() {
    let gw = Gateway::answering(json!({"Success": false, "ErrorMessage": "History not writable"}));
    let (_server, client) = start(gw).await;

    let request = historical_request(&["2022-09-13T13:00:00Z"]);
    match client.write_historical_values(&[request]).await {
        Err(ClientError::Protocol(msg)) => assert_eq!(msg, "History not writable"),
        other => panic!("Expected Protocol error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_transport_error_carries_status() {
    let router = Router::new().route(
        "/values/get",
        post(|| async { (HttpStatus::BAD_REQUEST, "bad request").into_response() }),
    );
    let server = TestServer::start(router).await.unwrap();
    let client = OpcUaClient::new(OpcUaConfig::new(server.base_url(), "opc.tcp://plc:4840")).unwrap();

    match client.get_values(&[NodeId::string("a", 1)]).await {
        Err(ClientError::Transport { status, body }) => {
            assert_eq!(status, 400);
            assert_eq!(body, "bad request");
        }
        other => panic!("Expected Transport error, got {:?}", other),
    }
}
