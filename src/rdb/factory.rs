//! Scheme-to-constructor registry for RDB backends. Initialized once,
//! immutable afterwards; lookups happen at construction time only.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use super::postgres::PostgresBackend;
use super::sqlite::SqliteBackend;
use super::url::ParsedRdbUrl;
use super::RdbBackend;
use crate::error::GatewayError;

type RdbConstructor = fn(&ParsedRdbUrl) -> Result<Arc<dyn RdbBackend>, GatewayError>;

static FACTORIES: LazyLock<HashMap<&'static str, RdbConstructor>> = LazyLock::new(|| {
    HashMap::from([
        ("postgres", PostgresBackend::from_parsed as RdbConstructor),
        ("sqlite", SqliteBackend::from_parsed as RdbConstructor),
    ])
});

/// Constructs an unstarted backend for the parsed URL.
pub fn create_backend(parsed: &ParsedRdbUrl) -> Result<Arc<dyn RdbBackend>, GatewayError> {
    let constructor =
        FACTORIES
            .get(parsed.scheme())
            .ok_or_else(|| GatewayError::UnsupportedScheme {
                family: "RDB",
                scheme: parsed.scheme().to_string(),
            })?;
    constructor(parsed)
}
