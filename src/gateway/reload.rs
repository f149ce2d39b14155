//! Reload plumbing: `POST /reload` enqueues a configuration into a
//! single-slot channel; a worker task applies it. The handler replies
//! before the reload runs, so the response is advisory.

use axum::{Router, body::Bytes, extract::State, routing::post};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, warn};

use super::Gateway;
use crate::config::GatewayConfig;
use crate::error::GatewayError;

pub type ReloadSender = mpsc::Sender<GatewayConfig>;

/// A capacity-one channel: at most one reload can be pending. A dropped
/// reload is acceptable; the operator retries.
pub fn reload_channel() -> (ReloadSender, mpsc::Receiver<GatewayConfig>) {
    mpsc::channel(1)
}

/// Drains the reload channel, applying each configuration in turn.
pub fn spawn_reload_worker(
    gateway: Arc<Gateway>,
    mut rx: mpsc::Receiver<GatewayConfig>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(config) = rx.recv().await {
            if let Err(err) = gateway.reload(&config).await {
                error!(%err, "configuration reload failed");
            }
        }
    })
}

pub(crate) fn reload_router(tx: ReloadSender) -> Router {
    Router::new()
        .route("/reload", post(handle_reload))
        .with_state(tx)
}

async fn handle_reload(
    State(tx): State<ReloadSender>,
    body: Bytes,
) -> Result<&'static str, GatewayError> {
    let config: GatewayConfig =
        serde_json::from_slice(&body).map_err(|_| GatewayError::InvalidBody)?;
    if tx.try_send(config).is_err() {
        warn!("a reload is already pending, dropping this request");
    }
    Ok("Config Reloaded")
}
