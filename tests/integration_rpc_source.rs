use address_graph::config::{SourceConfig, TraversalConfig};
use address_graph::error::SourceError;
use address_graph::policy::ExpansionPolicy;
use address_graph::source::{RpcSource, TransactionSource};
use address_graph::store::GraphStore;
use address_graph::traversal::{SkipReason, TraversalDriver};
use serde_json::{json, Value};
use std::sync::Arc;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn source_for(server: &MockServer, detect_contracts: bool) -> RpcSource {
    let config = SourceConfig {
        endpoint: server.uri(),
        api_key: None,
        timeout_seconds: 5,
        max_transfers: 100,
        detect_contracts,
        index_path: None,
    };
    RpcSource::new(&config).expect("Failed to create RPC source")
}

fn transfers_response(transfers: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "jsonrpc": "2.0",
        "id": 1,
        "result": { "transfers": transfers }
    }))
}

fn transfer(hash: &str, block: &str, from: &str, to: &str, value: f64) -> Value {
    json!({
        "blockNum": block,
        "hash": hash,
        "from": from,
        "to": to,
        "value": value,
        "asset": "ETH",
        "category": "external",
        "metadata": { "blockTimestamp": "2023-05-01T00:00:00.000Z" }
    })
}

async fn mount_transfers(server: &MockServer, direction: &str, address: &str, transfers: Value) {
    Mock::given(method("POST"))
        .and(path("/"))
        .and(body_partial_json(json!({
            "method": "alchemy_getAssetTransfers",
            "params": [{ direction: address }]
        })))
        .respond_with(transfers_response(transfers))
        .mount(server)
        .await;
}

async fn mount_empty_fallback(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/"))
        .respond_with(transfers_response(json!([])))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_fetch_merges_both_directions() {
    let server = MockServer::start().await;
    mount_transfers(
        &server,
        "fromAddress",
        "0xaaaa",
        json!([transfer("0x01", "0x64", "0xAAAA", "0xbbbb", 2.5)]),
    )
    .await;
    mount_transfers(
        &server,
        "toAddress",
        "0xaaaa",
        json!([
            transfer("0x02", "0x65", "0xcccc", "0xaaaa", 1.0),
            // the same record reported twice collapses
            transfer("0x02", "0x65", "0xcccc", "0xaaaa", 1.0)
        ]),
    )
    .await;

    let source = source_for(&server, false);
    let transactions = source.fetch_transactions("0xAAAA").await.unwrap();

    assert_eq!(transactions.len(), 2);
    assert_eq!(transactions[0].inputs[0].address, "0xaaaa");
    assert_eq!(transactions[0].outputs[0].address, "0xbbbb");
    assert_eq!(transactions[0].block_height, 100);
    assert_eq!(transactions[1].inputs[0].address, "0xcccc");
    assert_eq!(transactions[1].timestamp, Some(1_682_899_200));
}

#[tokio::test]
async fn test_empty_history_is_not_found() {
    let server = MockServer::start().await;
    mount_empty_fallback(&server).await;

    let source = source_for(&server, false);
    let result = source.fetch_transactions("0xdead").await;
    assert_eq!(result, Err(SourceError::NotFound("0xdead".to_string())));
}

#[tokio::test]
async fn test_http_error_mapping() {
    let server = MockServer::start().await;
    let source = source_for(&server, false);

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    let result = source.fetch_transactions("0xaaaa").await;
    assert!(matches!(result, Err(SourceError::Unavailable(_))));

    server.reset().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "7"))
        .mount(&server)
        .await;
    let result = source.fetch_transactions("0xaaaa").await;
    assert_eq!(result, Err(SourceError::RateLimited { seconds: 7 }));

    server.reset().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;
    let result = source.fetch_transactions("0xaaaa").await;
    assert!(matches!(result, Err(SourceError::InvalidResponse(_))));
}

#[tokio::test]
async fn test_rpc_error_mapping() {
    let server = MockServer::start().await;
    let source = source_for(&server, false);

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": { "code": -32005, "message": "limit exceeded" }
        })))
        .mount(&server)
        .await;
    let result = source.fetch_transactions("0xaaaa").await;
    assert_eq!(result, Err(SourceError::RateLimited { seconds: 60 }));

    server.reset().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": { "code": -32602, "message": "invalid params" }
        })))
        .mount(&server)
        .await;
    let result = source.fetch_transactions("0xaaaa").await;
    assert!(matches!(result, Err(SourceError::InvalidResponse(_))));
}

#[tokio::test]
async fn test_contract_detection() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": "eth_getCode", "params": ["0xc0de"] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0", "id": 1, "result": "0x6080604052"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": "eth_getCode" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0", "id": 1, "result": "0x"
        })))
        .mount(&server)
        .await;

    let source = source_for(&server, true);
    assert!(source.is_contract("0xc0de").await.unwrap());
    assert!(!source.is_contract("0xbeef").await.unwrap());

    let info = source
        .lookup_labels(&["0xC0DE".to_string(), "0xbeef".to_string()])
        .await
        .unwrap();
    assert_eq!(info.len(), 1);
    assert!(info["0xc0de"].is_contract);

    // detection off never touches the endpoint
    let quiet = source_for(&server, false);
    assert!(quiet.lookup_labels(&["0xc0de".to_string()]).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_contract_lookup_failure_skips_only_that_address() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": "eth_getCode", "params": ["0xc0de"] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0", "id": 1, "result": "0x6080"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": "eth_getCode", "params": ["0xbad"] })))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let source = source_for(&server, true);
    assert!(source.is_contract("0xbad").await.is_err());

    let info = source
        .lookup_labels(&["0xc0de".to_string(), "0xbad".to_string()])
        .await
        .unwrap();
    assert_eq!(info.len(), 1);
    assert!(info["0xc0de"].is_contract);
    assert!(!info.contains_key("0xbad"));
}

#[tokio::test]
async fn test_traversal_over_rpc_source() {
    let server = MockServer::start().await;
    mount_transfers(
        &server,
        "fromAddress",
        "0xaaaa",
        json!([
            transfer("0x01", "0x64", "0xaaaa", "0xbbbb", 5.0),
            transfer("0x03", "0x66", "0xaaaa", "0xdddd", 0.1)
        ]),
    )
    .await;
    mount_transfers(
        &server,
        "toAddress",
        "0xbbbb",
        json!([transfer("0x01", "0x64", "0xaaaa", "0xbbbb", 5.0)]),
    )
    .await;
    Mock::given(method("POST"))
        .and(path("/"))
        .and(body_partial_json(json!({
            "method": "alchemy_getAssetTransfers",
            "params": [{ "fromAddress": "0xbbbb" }]
        })))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    mount_empty_fallback(&server).await;

    let traversal = TraversalConfig {
        concurrency: 2,
        max_retries: 2,
        retry_delay_seconds: 0,
        max_retry_delay_seconds: 0,
    };
    let report = TraversalDriver::new(
        Arc::new(source_for(&server, false)),
        ExpansionPolicy::with_limits(2, 100, 1.0),
        GraphStore::new(),
        &traversal,
    )
    .run(&["0xaaaa".to_string()])
    .await
    .unwrap();

    assert_eq!(report.graph.node_count(), 2);
    assert_eq!(report.graph.edge_count(), 1);
    assert!(!report.graph.contains_node("0xdddd"));
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].address, "0xbbbb");
    assert_eq!(report.skipped[0].reason, SkipReason::SourceUnavailable);
}
