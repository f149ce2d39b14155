//! Root gateway: composes the three family gateways behind a single HTTP
//! server, applies cross-cutting middleware, and fans configuration
//! reloads out to each family.
//!
//! Layout:
//! - `monitor.rs`: JSON-RPC monitor plane
//! - `reload.rs`: reload channel endpoint and worker

mod monitor;
mod reload;

pub use reload::{ReloadSender, reload_channel, spawn_reload_worker};

use axum::{
    Router,
    http::{HeaderName, HeaderValue, Request as HttpRequest, StatusCode, Version,
        header::USER_AGENT},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
};
use base64::Engine as _;
use rand::RngCore;
use serde_json::json;
use std::time::Instant;
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer};
use tracing::{error, info, warn};

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::kv::KvGateway;
use crate::rdb::RdbGateway;
use crate::s3::S3Gateway;

const MAX_REQUEST_ID_LEN: usize = 128;
const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

pub struct Gateway {
    rdb: RdbGateway,
    kv: KvGateway,
    s3: S3Gateway,
    cors_enabled: bool,
}

impl Gateway {
    /// Constructs the family gateways without starting anything. Disabled
    /// entries are filtered here and never reach the families.
    pub fn new(config: &GatewayConfig, cors_enabled: bool) -> Self {
        Self {
            rdb: RdbGateway::new(&config.enabled_rdb()),
            kv: KvGateway::new(&config.enabled_kv()),
            s3: S3Gateway::new(&config.enabled_s3()),
            cors_enabled,
        }
    }

    /// Starts each family gateway (routes plus initial reload) and
    /// assembles the application router. Fails if any family fails to
    /// start.
    pub async fn start_router(
        &self,
        reload: Option<ReloadSender>,
        monitor: bool,
    ) -> Result<Router, GatewayError> {
        let rdb_routes = self.rdb.start().await?;
        let kv_routes = self.kv.start().await?;
        let s3_routes = self.s3.start().await?;

        let mut app = Router::new()
            .route("/", get(banner))
            .route("/health", get(health))
            .nest("/rdb", rdb_routes)
            .nest("/kv", kv_routes)
            .nest("/s3", s3_routes);

        if monitor {
            app = app.merge(monitor::monitor_router(self.rdb.clone(), self.kv.clone()));
        }
        if let Some(tx) = reload {
            app = app.merge(reload::reload_router(tx));
        }

        let mut app = app
            .fallback(not_found_handler)
            .layer(CatchPanicLayer::new());
        if self.cors_enabled {
            app = app.layer(CorsLayer::permissive());
        }
        Ok(app.layer(middleware::from_fn(access_log)))
    }

    /// Starts every family gateway, binds the listener, and serves until
    /// the shutdown future resolves.
    pub async fn serve(
        &self,
        addr: std::net::SocketAddr,
        reload: Option<ReloadSender>,
        monitor: bool,
        shutdown: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> Result<(), GatewayError> {
        let app = self.start_router(reload, monitor).await?;
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("HTTP server listening on {}", addr);
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;
        Ok(())
    }

    /// Forwards the new configuration to each family in order RDB, KV, S3.
    /// On partial failure, already-reloaded families keep their new state;
    /// there is no two-phase rollback.
    pub async fn reload(&self, config: &GatewayConfig) -> Result<(), GatewayError> {
        self.rdb.reload(&config.enabled_rdb()).await?;
        self.kv.reload(&config.enabled_kv()).await?;
        self.s3.reload(&config.enabled_s3()).await?;
        info!("configuration reloaded");
        Ok(())
    }
}

async fn banner() -> &'static str {
    concat!("combinator gateway ", env!("CARGO_PKG_VERSION"))
}

async fn health() -> impl IntoResponse {
    axum::Json(json!({ "status": "ok" }))
}

fn generate_request_id() -> String {
    // 96 bits => 16 chars base64url (no padding).
    let mut bytes = [0u8; 12];
    rand::rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

fn format_http_version(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "HTTP/0.9",
        Version::HTTP_10 => "HTTP/1.0",
        Version::HTTP_11 => "HTTP/1.1",
        Version::HTTP_2 => "HTTP/2",
        Version::HTTP_3 => "HTTP/3",
        _ => "HTTP/?",
    }
}

async fn access_log(req: HttpRequest<axum::body::Body>, next: Next) -> Response {
    // Capture request metadata before moving `req` into the handler stack.
    let method = req.method().clone();
    let uri = req.uri().clone();
    let version = req.version();

    let request_id = req
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty() && v.len() <= MAX_REQUEST_ID_LEN)
        .map(str::to_string)
        .unwrap_or_else(generate_request_id);

    let user_agent = req
        .headers()
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();

    let start = Instant::now();
    let mut resp = next.run(req).await;

    // Always reflect `x-request-id` for easier correlation, even if the
    // client didn't send one.
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        resp.headers_mut().insert(X_REQUEST_ID, value);
    }

    let status = resp.status();
    let latency_ms = start.elapsed().as_millis() as u64;
    let path = uri.path();
    let protocol = format_http_version(version);

    if status.is_server_error() {
        error!(
            "| {:>3} | {} | {:^7} | {:<8} | {} | {}ms | {}",
            status.as_u16(),
            request_id,
            method.as_str(),
            protocol,
            path,
            latency_ms,
            user_agent
        );
    } else if status.is_client_error() {
        warn!(
            "| {:>3} | {} | {:^7} | {:<8} | {} | {}ms | {}",
            status.as_u16(),
            request_id,
            method.as_str(),
            protocol,
            path,
            latency_ms,
            user_agent
        );
    } else {
        info!(
            "| {:>3} | {} | {:^7} | {:<8} | {} | {}ms | {}",
            status.as_u16(),
            request_id,
            method.as_str(),
            protocol,
            path,
            latency_ms,
            user_agent
        );
    }

    resp
}

async fn not_found_handler() -> StatusCode {
    StatusCode::NOT_FOUND
}
