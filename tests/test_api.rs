//! Integration tests for the HTTP API

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use common::{address, make_jobs, MockChain, TestDb};
use pointsflow::api::{create_router, AppState};
use pointsflow::query::QueryService;
use pointsflow::sync::{ProgressStore, RecordStore, SqliteStore};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

struct TestServer {
    router: Router,
    store: Arc<SqliteStore>,
    chain: Arc<MockChain>,
    _db: TestDb,
}

impl TestServer {
    fn new() -> Self {
        let db = TestDb::new();
        let store = db.open();
        let chain = Arc::new(MockChain::new());
        let (token_job, points_job) = make_jobs(chain.clone(), store.clone());
        let query = Arc::new(QueryService::new(store.clone(), store.clone()));
        let router = create_router(AppState::new(query, token_job, points_job));
        Self {
            router,
            store,
            chain,
            _db: db,
        }
    }
}

/// GET `uri`, returning status and raw body
async fn get(router: &Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

async fn get_json(router: &Router, uri: &str) -> (StatusCode, Value) {
    let (status, body) = get(router, uri).await;
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test]
async fn test_leaderboard_sorted_descending() {
    let server = TestServer::new();
    server.store.upsert_points(&address(0xa), 50.0).await.unwrap();
    server.store.upsert_points(&address(0xb), 10.0).await.unwrap();
    server.store.upsert_points(&address(0xc), 100.0).await.unwrap();

    let (status, body) = get_json(&server.router, "/points-leaderboard").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "leaderboard": [
                { "address": address(0xc), "points": 100.0 },
                { "address": address(0xa), "points": 50.0 },
                { "address": address(0xb), "points": 10.0 },
            ]
        })
    );
}

#[tokio::test]
async fn test_points_for_unknown_address_is_zero() {
    let server = TestServer::new();

    let (status, body) = get_json(&server.router, &format!("/points/{}", address(0xdead))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["address"], json!(address(0xdead)));
    assert_eq!(body["points"], json!(0.0));
}

#[tokio::test]
async fn test_routes_also_served_under_api_prefix() {
    let server = TestServer::new();
    server.store.upsert_points(&address(0xa), 3.5).await.unwrap();

    let (status, body) = get_json(&server.router, &format!("/api/points/{}", address(0xa))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["points"], json!(3.5));
}

#[tokio::test]
async fn test_tokens_filter_by_address() {
    let server = TestServer::new();
    server.store.upsert_token(1, &address(0xa)).await.unwrap();
    server.store.upsert_token(2, &address(0xb)).await.unwrap();
    server.store.upsert_token(3, &address(0xa)).await.unwrap();

    let (status, body) = get_json(&server.router, &format!("/tokens?address={}", address(0xa))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalTokens"], json!(2));
    assert_eq!(body["tokens"][0], json!({ "tokenId": 1, "owner": address(0xa) }));
    assert_eq!(body["tokens"][1]["tokenId"], json!(3));

    let (_, body) = get_json(&server.router, "/tokens").await;
    assert_eq!(body["totalTokens"], json!(3));
}

#[tokio::test]
async fn test_database_status() {
    let server = TestServer::new();
    server.store.upsert_token(1, &address(0xa)).await.unwrap();
    server.store.set_token_cursor(1).await.unwrap();

    let (status, body) = get_json(&server.router, "/database-status").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "totalTokens": 1,
            "lastProcessedTokenId": 1,
            "lastProcessedAddressIndex": 0,
            "pointsLock": false,
        })
    );
}

#[tokio::test]
async fn test_points_update_status_404_before_first_cycle() {
    let server = TestServer::new();

    let (status, body) = get_json(&server.router, "/points-update-status").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_trigger_cache_runs_token_pass_in_background() {
    let server = TestServer::new();
    server.chain.mint(&address(0xa));
    server.chain.mint(&address(0xb));

    let (status, body) = get(&server.router, "/trigger-cache").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"Cache build process triggered.");

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(server.store.token_count().await.unwrap(), 2);
}

#[tokio::test]
async fn test_trigger_recovery_fills_gaps_without_moving_cursor() {
    let server = TestServer::new();
    for tail in [0xa, 0xb, 0xc] {
        server.chain.mint(&address(tail));
    }
    server.store.upsert_token(1, &address(0xa)).await.unwrap();
    server.store.upsert_token(3, &address(0xc)).await.unwrap();

    let (status, body) = get(&server.router, "/api/trigger-recovery").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"Recovery process triggered.");

    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(server.store.token_count().await.unwrap(), 3);
    assert!(server.store.token_exists(2).await.unwrap());
    assert_eq!(server.chain.owner_calls(), vec![2]);
    assert_eq!(server.store.token_cursor().await.unwrap(), 0);
}

#[tokio::test]
async fn test_trigger_points_update_then_status() {
    let server = TestServer::new();
    server.store.upsert_token(1, &address(0xa)).await.unwrap();
    server.chain.set_points(&address(0xa), 9.0);

    let (status, body) = get(&server.router, "/trigger-points-update").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"Points update process triggered.");

    tokio::time::sleep(Duration::from_millis(200)).await;

    let (status, body) = get_json(&server.router, "/points-update-status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], json!("completed"));
    assert_eq!(body["totalAddresses"], json!(1));
    assert_eq!(server.store.points_for(&address(0xa)).await.unwrap(), Some(9.0));
}
