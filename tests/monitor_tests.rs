use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use combinator::gateway::{reload_channel, spawn_reload_worker};
use combinator::{Gateway, GatewayConfig};

fn base_config() -> GatewayConfig {
    serde_json::from_value(serde_json::json!({
        "rdb": [
            {"id": "zeta", "url": "sqlite://:memory:"},
            {"id": "alpha", "url": "sqlite://:memory:"}
        ],
        "kv": [{"id": "mem", "url": "memory://"}]
    }))
    .expect("config")
}

async fn monitor_router() -> Router {
    Gateway::new(&base_config(), false)
        .start_router(None, true)
        .await
        .expect("gateway start")
}

fn rpc_request(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/monitor")
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.clone().oneshot(request).await.expect("oneshot");
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let value = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, value)
}

#[tokio::test]
async fn ping_returns_pong() {
    let app = monitor_router().await;

    let (status, body) = send(
        &app,
        rpc_request(r#"{"jsonrpc": "2.0", "method": "ping", "id": 1}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["jsonrpc"], "2.0");
    assert_eq!(body["result"], "pong");
    assert_eq!(body["id"], 1);
}

#[tokio::test]
async fn service_list_enumerates_live_backends_sorted_by_id() {
    let app = monitor_router().await;

    let (status, body) = send(
        &app,
        rpc_request(r#"{"jsonrpc": "2.0", "method": "service.list", "id": "ls"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let rdb = body["result"]["rdb"].as_array().expect("rdb list");
    let ids: Vec<&str> = rdb.iter().filter_map(|s| s["id"].as_str()).collect();
    assert_eq!(ids, vec!["alpha", "zeta"]);
    assert!(rdb.iter().all(|s| s["type"] == "sqlite"));

    let kv = body["result"]["kv"].as_array().expect("kv list");
    assert_eq!(kv.len(), 1);
    assert_eq!(kv[0]["id"], "mem");
    assert_eq!(kv[0]["type"], "memory");
}

#[tokio::test]
async fn unknown_method_is_a_method_not_found_error() {
    let app = monitor_router().await;

    let (status, body) = send(
        &app,
        rpc_request(r#"{"jsonrpc": "2.0", "method": "service.destroy", "id": 2}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["error"]["code"], -32601);
    assert_eq!(body["error"]["message"], "Method not found");
    assert_eq!(body["id"], 2);
}

#[tokio::test]
async fn wrong_jsonrpc_version_is_an_invalid_request() {
    let app = monitor_router().await;

    let (status, body) = send(
        &app,
        rpc_request(r#"{"jsonrpc": "1.0", "method": "ping", "id": 3}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["error"]["code"], -32600);
    assert_eq!(body["error"]["message"], "Invalid Request");

    let (_, body) = send(&app, rpc_request(r#"{"method": "ping", "id": 4}"#)).await;
    assert_eq!(body["error"]["code"], -32600);
}

#[tokio::test]
async fn malformed_json_is_a_parse_error() {
    let app = monitor_router().await;

    let (status, body) = send(&app, rpc_request("{nope")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["error"]["code"], -32700);
    assert_eq!(body["error"]["message"], "Parse error");
    assert_eq!(body["id"], serde_json::Value::Null);
}

#[tokio::test]
async fn health_and_banner_respond() {
    let app = monitor_router().await;

    let (status, body) = send(
        &app,
        Request::builder()
            .uri("/health")
            .body(Body::empty())
            .expect("request"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/").body(Body::empty()).expect("request"))
        .await
        .expect("oneshot");
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn reload_endpoint_replies_then_applies_the_new_configuration() {
    let gateway = Arc::new(Gateway::new(&base_config(), false));
    let (tx, rx) = reload_channel();
    spawn_reload_worker(gateway.clone(), rx);
    let app = gateway
        .start_router(Some(tx), true)
        .await
        .expect("gateway start");

    let new_config = serde_json::json!({
        "rdb": [{"id": "fresh", "url": "sqlite://:memory:"}],
        "kv": [{"id": "mem", "url": "memory://"}]
    });
    let request = Request::builder()
        .method("POST")
        .uri("/reload")
        .header("Content-Type", "application/json")
        .body(Body::from(new_config.to_string()))
        .expect("request");
    let response = app.clone().oneshot(request).await.expect("oneshot");
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    assert_eq!(&body[..], b"Config Reloaded");

    // The reply is advisory; poll until the worker has applied the config.
    let mut applied = false;
    for _ in 0..100 {
        let (_, body) = send(
            &app,
            rpc_request(r#"{"jsonrpc": "2.0", "method": "service.list", "id": 9}"#),
        )
        .await;
        let ids: Vec<String> = body["result"]["rdb"]
            .as_array()
            .map(|list| {
                list.iter()
                    .filter_map(|s| s["id"].as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        if ids == vec!["fresh".to_string()] {
            applied = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(applied, "reload was never applied");
}
