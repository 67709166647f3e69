use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use address_graph::api::{router, AppState};
use address_graph::config::{ExpansionConfig, TraversalConfig};
use address_graph::database::Database;
use address_graph::models::{LabelBook, Transaction};
use address_graph::policy::ExpansionPolicy;
use address_graph::source::MemorySource;
use address_graph::store::GraphStore;
use address_graph::traversal::TraversalDriver;
use serde_json::Value;
use std::sync::Arc;
use tower::util::ServiceExt;

const BINANCE: &str = "0xf977814e90da44bfa03b6295a0616a897441acec";

/// Database holding one explored session around 0xseed
async fn setup_test_database() -> (Arc<Database>, i64) {
    let db = Database::new_in_memory().expect("Failed to create test database");

    let source = MemorySource::new()
        .with_transaction(Transaction::transfer("0x01", 100, "0xseed", BINANCE, 1000.5).with_asset("ETH"))
        .with_transaction(Transaction::transfer("0x02", 101, BINANCE, "0xseed", 200.25).with_asset("ETH"))
        .with_transaction(Transaction::transfer("0x03", 102, "0xfriend", "0xseed", 50.0).with_asset("ETH"));
    let expansion = ExpansionConfig {
        max_depth: 1,
        ..ExpansionConfig::default()
    };
    let traversal = TraversalConfig {
        retry_delay_seconds: 0,
        max_retry_delay_seconds: 0,
        ..TraversalConfig::default()
    };
    let seeds = vec!["0xseed".to_string()];

    let report = TraversalDriver::new(
        Arc::new(source),
        ExpansionPolicy::new(&expansion),
        GraphStore::new(),
        &traversal,
    )
    .with_labels(LabelBook::with_builtin())
    .run(&seeds)
    .await
    .expect("Traversal failed");

    let id = db
        .save_session(Some("exchange trail"), &seeds, &expansion, &report)
        .expect("Failed to save session");

    (Arc::new(db), id)
}

fn create_test_router(database: Arc<Database>) -> Router {
    router(AppState { database })
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn test_health_endpoint() {
    let (db, _) = setup_test_database().await;
    let (status, json) = get_json(create_test_router(db), "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["database_status"], "connected");
    assert_eq!(json["session_count"], 1);
}

#[tokio::test]
async fn test_sessions_endpoint() {
    let (db, id) = setup_test_database().await;
    let (status, json) = get_json(create_test_router(db), "/sessions").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total_count"], 1);
    let session = &json["sessions"][0];
    assert_eq!(session["id"], id);
    assert_eq!(session["name"], "exchange trail");
    assert_eq!(session["seeds"][0], "0xseed");
    assert_eq!(session["node_count"], 3);
    assert_eq!(session["edge_count"], 3);
}

#[tokio::test]
async fn test_session_detail_endpoint() {
    let (db, id) = setup_test_database().await;
    let (status, json) = get_json(create_test_router(db), &format!("/sessions/{}", id)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["id"], id);
    assert_eq!(json["state"], "Done");
    assert_eq!(json["stopped"], false);
    assert_eq!(json["skipped"].as_array().unwrap().len(), 0);
    assert_eq!(json["label_groups"]["Binance"][0], BINANCE);
    assert_eq!(json["stats"]["addresses_expanded"], 1);
}

#[tokio::test]
async fn test_session_graph_endpoint() {
    let (db, id) = setup_test_database().await;
    let (status, json) = get_json(create_test_router(db), &format!("/sessions/{}/graph", id)).await;

    assert_eq!(status, StatusCode::OK);
    let nodes = json["nodes"].as_array().unwrap();
    let edges = json["edges"].as_array().unwrap();
    assert_eq!(nodes.len(), 3);
    assert_eq!(edges.len(), 3);

    let seed = nodes.iter().find(|node| node["id"] == "0xseed").unwrap();
    assert_eq!(seed["expanded"], true);
    assert_eq!(seed["depth"], 0);
    assert_eq!(seed["total_out"], 1000.5);
}

#[tokio::test]
async fn test_session_flows_endpoint() {
    let (db, id) = setup_test_database().await;
    let (status, json) = get_json(create_test_router(db), &format!("/sessions/{}/flows", id)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["session_id"], id);

    // largest pair first: seed -> Binance, net of the return transfer
    let top = &json["flows"][0];
    assert_eq!(top["to_label"], "Binance");
    assert_eq!(top["volume"], 1200.75);
    assert_eq!(top["net_volume"], 800.25);
    assert_eq!(top["transaction_count"], 2);

    assert_eq!(json["net_flows"][BINANCE], 800.25);
}

#[tokio::test]
async fn test_unknown_session_returns_not_found() {
    let (db, _) = setup_test_database().await;

    for uri in ["/sessions/999", "/sessions/999/graph", "/sessions/999/flows"] {
        let (status, json) = get_json(create_test_router(db.clone()), uri).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{}", uri);
        assert_eq!(json["error"], "not_found");
    }
}

#[tokio::test]
async fn test_cors_headers() {
    let (db, _) = setup_test_database().await;
    let response = create_test_router(db)
        .oneshot(
            Request::builder()
                .uri("/health")
                .header("Origin", "http://localhost:3000")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("access-control-allow-origin"));
}
