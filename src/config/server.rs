use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};

/// Server configuration managed by Figment.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// HTTP server listen address (e.g., "0.0.0.0", "127.0.0.1").
    /// JSON: `server.host`. Default: `127.0.0.1`.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// HTTP server listen port.
    /// JSON: `server.port`. Default: `8899`.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Log level for tracing subscriber initialization
    /// (e.g., "error", "warn", "info", "debug", "trace").
    /// JSON: `server.loglevel`. Default: `info`.
    #[serde(default = "default_loglevel")]
    pub loglevel: String,

    /// Whether to attach a permissive CORS layer.
    /// JSON: `server.cors`. Default: `true`.
    #[serde(default = "default_true")]
    pub cors: bool,

    /// Whether to expose `POST /reload`.
    /// JSON: `server.reload_api`. Default: `true`.
    #[serde(default = "default_true")]
    pub reload_api: bool,

    /// Whether to expose the `POST /monitor` JSON-RPC plane.
    /// JSON: `server.monitor_api`. Default: `true`.
    #[serde(default = "default_true")]
    pub monitor_api: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            loglevel: default_loglevel(),
            cors: true,
            reload_api: true,
            monitor_api: true,
        }
    }
}

fn default_host() -> IpAddr {
    Ipv4Addr::new(127, 0, 0, 1).into()
}

fn default_port() -> u16 {
    8899
}

fn default_loglevel() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}
