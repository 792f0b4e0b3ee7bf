use serde_json::json;
use tokio_test::assert_ok;
use wiremock::matchers::{body_partial_json, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

use referenda_tester::chain::RpcClient;
use referenda_tester::error::SimulationError;
use referenda_tester::fork::{ChopsticksFork, Fork, StorageBatch};

fn rpc_result(result: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({"jsonrpc": "2.0", "id": 1, "result": result}))
}

/// The websocket form of the mock server's address.
fn ws_endpoint(server: &MockServer) -> String {
    server.uri().replacen("http://", "ws://", 1)
}

#[tokio::test]
async fn test_spec_name_over_websocket_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "state_getRuntimeVersion"})))
        .respond_with(rpc_result(json!({"specName": "asset-hub-kusama", "specVersion": 1_006_000})))
        .expect(1)
        .mount(&server)
        .await;

    let client = RpcClient::new(&ws_endpoint(&server));
    assert_eq!(client.url(), server.uri());
    assert_eq!(client.spec_name().await.unwrap(), "asset-hub-kusama");
}

#[tokio::test]
async fn test_head_number_parses_hex() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "chain_getHeader"})))
        .respond_with(rpc_result(json!({"number": "0x16f30", "parentHash": "0x00"})))
        .mount(&server)
        .await;

    let client = RpcClient::new(&server.uri());
    assert_eq!(client.head_number().await.unwrap(), 94_000);
}

#[tokio::test]
async fn test_rpc_error_member_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": {"code": -32601, "message": "Method not found"}
        })))
        .mount(&server)
        .await;

    let err = RpcClient::new(&server.uri())
        .request("dev_newBlock", json!([]))
        .await
        .unwrap_err();
    match err {
        SimulationError::Rpc(message) => assert_eq!(message, "dev_newBlock failed: Method not found"),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_http_failure_is_an_rpc_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = RpcClient::new(&server.uri()).spec_name().await.unwrap_err();
    assert!(matches!(err, SimulationError::Rpc(_)));
    assert!(err.is_fork_failure());
}

#[tokio::test]
async fn test_fork_builds_blocks_and_sets_storage() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "dev_newBlock", "params": [{"count": 1}]})))
        .respond_with(rpc_result(json!("0xblockhash")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "method": "dev_setStorage",
            "params": [{"Scheduler": {"Agenda": [[[501], [null]]]}}]
        })))
        .respond_with(rpc_result(json!("0xblockhash")))
        .expect(1)
        .mount(&server)
        .await;

    let fork = ChopsticksFork::connect(ws_endpoint(&server));
    assert_ok!(fork.new_block().await);

    let mut batch = StorageBatch::new();
    batch.set_entry("Scheduler", "Agenda", vec![json!(501)], json!([null]));
    assert_ok!(fork.set_storage(&batch).await);
}

#[tokio::test]
async fn test_rejected_storage_write_is_a_storage_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": {"code": 1, "message": "Cannot find storage item"}
        })))
        .mount(&server)
        .await;

    let fork = ChopsticksFork::connect(server.uri());
    let mut batch = StorageBatch::new();
    batch.set_value("Balances", "TotalIssuance", json!("1"));
    let err = fork.set_storage(&batch).await.unwrap_err();
    assert!(matches!(err, SimulationError::Storage(_)));
    assert!(err.to_string().contains("Cannot find storage item"));
}
