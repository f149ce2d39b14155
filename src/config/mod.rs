mod backends;
mod server;

pub use backends::BackendEntry;
pub use server::ServerConfig;

use figment::{
    Figment,
    providers::{Format, Json, Serialized},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Full gateway configuration managed by Figment.
///
/// The same shape is accepted on the wire by `POST /reload`, so backend
/// entries tolerate unknown fields (deployed configs carry free-form
/// `metadata` blobs next to each entry).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct GatewayConfig {
    /// Server settings (see `server` table in config.json).
    #[serde(default)]
    pub server: ServerConfig,

    /// Relational database backends.
    #[serde(default)]
    pub rdb: Vec<BackendEntry>,

    /// Key-value backends.
    #[serde(default)]
    pub kv: Vec<BackendEntry>,

    /// Object storage backends.
    #[serde(default)]
    pub s3: Vec<BackendEntry>,
}

const DEFAULT_CONFIG_FILE: &str = "config.json";

impl GatewayConfig {
    /// Builds a Figment merging serde defaults with a JSON config file.
    pub fn figment(path: &str) -> Figment {
        let figment = Figment::new().merge(Serialized::defaults(GatewayConfig::default()));
        if PathBuf::from(path).is_file() {
            figment.merge(Json::file(path))
        } else {
            figment
        }
    }

    /// Loads configuration from `config.json` in the working directory
    /// (overridable via `COMBINATOR_CONFIG`), falling back to defaults when
    /// the file is absent.
    pub fn from_optional_json() -> Self {
        let path =
            std::env::var("COMBINATOR_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::figment(&path).extract().unwrap_or_else(|err| {
            panic!("failed to extract configuration (defaults + optional {path}): {err}")
        })
    }

    /// Enabled RDB entries. Disabled entries never reach the core.
    pub fn enabled_rdb(&self) -> Vec<BackendEntry> {
        Self::enabled(&self.rdb)
    }

    /// Enabled KV entries.
    pub fn enabled_kv(&self) -> Vec<BackendEntry> {
        Self::enabled(&self.kv)
    }

    /// Enabled S3 entries.
    pub fn enabled_s3(&self) -> Vec<BackendEntry> {
        Self::enabled(&self.s3)
    }

    fn enabled(entries: &[BackendEntry]) -> Vec<BackendEntry> {
        entries.iter().filter(|e| e.enabled).cloned().collect()
    }
}
