//! RDB family: ID-addressed relational backends behind a uniform
//! query/exec/batch protocol, with SQLite-dialect statements translated to
//! whatever the backend speaks.
//!
//! Layout:
//! - `translate.rs` / `shim.rs`: the statement translation core (pure)
//! - `sqlite.rs` / `postgres.rs`: driver adapters over sqlx pools
//! - `factory.rs` / `url.rs`: scheme registry and URL parsing
//! - `gateway.rs`: routes, header middleware, live map
//! - `retry.rs`: reconnect-aware retry loop

mod factory;
mod gateway;
mod postgres;
mod retry;
mod shim;
mod sqlite;
mod translate;
mod url;

pub use gateway::{RdbGateway, ResolvedRdb};
pub use translate::{SqlDialect, StatementClass, Translated, classify, parse_single, translate};
pub use url::{ParsedRdbUrl, parse_rdb_url};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::backend::Backend;
use crate::error::GatewayError;

/// One parameterized statement as carried on the wire.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StatementRequest {
    pub stmt: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

/// Capability set of a relational backend.
#[async_trait]
pub trait RdbBackend: Backend {
    /// Executes a single DQL statement and returns the result set as CSV.
    async fn query(&self, stmt: &str, args: &[Value]) -> Result<Vec<u8>, GatewayError>;

    /// Executes a single DML or DDL statement.
    async fn exec(&self, stmt: &str, args: &[Value]) -> Result<(), GatewayError>;

    /// Executes a sequence of statements inside one transaction. Any
    /// failure rolls the whole batch back.
    async fn batch(&self, statements: &[StatementRequest]) -> Result<(), GatewayError>;
}
