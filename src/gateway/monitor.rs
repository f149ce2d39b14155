//! Monitor plane: a JSON-RPC 2.0 subset on `POST /monitor`.
//!
//! RPC errors live in the response body; the HTTP status is 200 for every
//! envelope, well-formed or not.

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    routing::post,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::kv::KvGateway;
use crate::rdb::RdbGateway;

const JSONRPC_VERSION: &str = "2.0";

#[derive(Debug, Deserialize)]
struct RpcRequest {
    #[serde(default)]
    jsonrpc: String,
    #[serde(default)]
    method: String,
    #[serde(default)]
    id: Value,
}

#[derive(Debug, Serialize)]
struct RpcResponse {
    jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<RpcError>,
    id: Value,
}

#[derive(Debug, Serialize)]
struct RpcError {
    code: i32,
    message: &'static str,
}

impl RpcResponse {
    fn result(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            result: Some(result),
            error: None,
            id,
        }
    }

    fn error(id: Value, code: i32, message: &'static str) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            result: None,
            error: Some(RpcError { code, message }),
            id,
        }
    }
}

#[derive(Debug, Serialize)]
struct ServiceInfo {
    id: String,
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Clone)]
struct MonitorState {
    rdb: RdbGateway,
    kv: KvGateway,
}

pub(crate) fn monitor_router(rdb: RdbGateway, kv: KvGateway) -> Router {
    Router::new()
        .route("/monitor", post(handle_monitor))
        .with_state(MonitorState { rdb, kv })
}

async fn handle_monitor(State(state): State<MonitorState>, body: Bytes) -> Json<RpcResponse> {
    let Ok(request) = serde_json::from_slice::<RpcRequest>(&body) else {
        return Json(RpcResponse::error(Value::Null, -32700, "Parse error"));
    };

    if request.jsonrpc != JSONRPC_VERSION {
        return Json(RpcResponse::error(request.id, -32600, "Invalid Request"));
    }

    match request.method.as_str() {
        "ping" => Json(RpcResponse::result(request.id, Value::from("pong"))),
        "service.list" => {
            let rdb: Vec<ServiceInfo> = state
                .rdb
                .services()
                .await
                .into_iter()
                .map(|(id, kind)| ServiceInfo { id, kind })
                .collect();
            let kv: Vec<ServiceInfo> = state
                .kv
                .services()
                .await
                .into_iter()
                .map(|(id, kind)| ServiceInfo { id, kind })
                .collect();
            let result = serde_json::json!({ "rdb": rdb, "kv": kv });
            Json(RpcResponse::result(request.id, result))
        }
        _ => Json(RpcResponse::error(request.id, -32601, "Method not found")),
    }
}
