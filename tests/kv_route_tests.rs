use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use combinator::{Gateway, GatewayConfig};

async fn memory_router() -> Router {
    let config: GatewayConfig = serde_json::from_value(serde_json::json!({
        "kv": [{"id": "m", "url": "memory://"}]
    }))
    .expect("config");
    Gateway::new(&config, false)
        .start_router(None, false)
        .await
        .expect("gateway start")
}

fn kv_request(method: &str, path: &str, id: &str, key: &str, body: Body) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(path)
        .header("X-Combinator-KV-ID", id)
        .header("X-Combinator-KV-Key", key)
        .body(body)
        .expect("request")
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(request).await.expect("oneshot");
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    (status, body.to_vec())
}

#[tokio::test]
async fn set_then_get_roundtrips_bytes() {
    let app = memory_router().await;

    let (status, body) = send(
        &app,
        kv_request("POST", "/kv/set", "m", "greeting", Body::from("hello")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"OK");

    let response = app
        .clone()
        .oneshot(kv_request("GET", "/kv/get", "m", "greeting", Body::empty()))
        .await
        .expect("oneshot");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok()),
        Some("application/octet-stream")
    );
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    assert_eq!(&body[..], b"hello");
}

#[tokio::test]
async fn binary_values_survive_unchanged() {
    let app = memory_router().await;

    let payload = vec![0x00, 0x01, 0xFF, 0xFE, 0x7F];
    let (status, _) = send(
        &app,
        kv_request("POST", "/kv/set", "m", "bin", Body::from(payload.clone())),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &app,
        kv_request("GET", "/kv/get", "m", "bin", Body::empty()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, payload);
}

#[tokio::test]
async fn missing_key_is_an_internal_error() {
    let app = memory_router().await;

    let (status, body) = send(
        &app,
        kv_request("GET", "/kv/get", "m", "absent", Body::empty()),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(
        String::from_utf8_lossy(&body).contains("key not found: absent"),
        "{}",
        String::from_utf8_lossy(&body)
    );
}

#[tokio::test]
async fn both_headers_are_required() {
    let app = memory_router().await;

    let request = Request::builder()
        .method("GET")
        .uri("/kv/get")
        .header("X-Combinator-KV-Key", "k")
        .body(Body::empty())
        .expect("request");
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(
        String::from_utf8_lossy(&body).contains("X-Combinator-KV-ID"),
        "{}",
        String::from_utf8_lossy(&body)
    );

    let request = Request::builder()
        .method("GET")
        .uri("/kv/get")
        .header("X-Combinator-KV-ID", "m")
        .body(Body::empty())
        .expect("request");
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(
        String::from_utf8_lossy(&body).contains("X-Combinator-KV-Key"),
        "{}",
        String::from_utf8_lossy(&body)
    );
}

#[tokio::test]
async fn unknown_backend_id_is_a_bad_request() {
    let app = memory_router().await;

    let (status, body) = send(
        &app,
        kv_request("GET", "/kv/get", "nope", "k", Body::empty()),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(
        String::from_utf8_lossy(&body).contains("not found for id: nope"),
        "{}",
        String::from_utf8_lossy(&body)
    );
}
