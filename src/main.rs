use mimalloc::MiMalloc;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use combinator::gateway::{reload_channel, spawn_reload_worker};
use combinator::{Gateway, GatewayConfig};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let config = GatewayConfig::from_optional_json();

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.server.loglevel.clone()));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_level(true)
                .with_target(false),
        )
        .init();

    info!(
        host = %config.server.host,
        port = config.server.port,
        loglevel = %config.server.loglevel,
        cors = config.server.cors,
        rdb_backends = config.enabled_rdb().len(),
        kv_backends = config.enabled_kv().len(),
        s3_backends = config.enabled_s3().len(),
        "starting combinator gateway"
    );

    let gateway = Arc::new(Gateway::new(&config, config.server.cors));

    let reload = if config.server.reload_api {
        let (tx, rx) = reload_channel();
        spawn_reload_worker(gateway.clone(), rx);
        Some(tx)
    } else {
        None
    };

    let addr = SocketAddr::from((config.server.host, config.server.port));
    gateway
        .serve(addr, reload, config.server.monitor_api, shutdown_signal())
        .await?;
    info!("Server has shut down gracefully.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
