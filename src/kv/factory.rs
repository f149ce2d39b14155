//! Scheme-to-constructor registry for KV backends.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use super::KvBackend;
use super::memory::MemoryKv;
use super::redis::RedisKv;
use super::url::ParsedKvUrl;
use crate::error::GatewayError;

type KvConstructor = fn(&ParsedKvUrl) -> Result<Arc<dyn KvBackend>, GatewayError>;

static FACTORIES: LazyLock<HashMap<&'static str, KvConstructor>> = LazyLock::new(|| {
    #[allow(unused_mut)]
    let mut factories = HashMap::from([
        ("memory", (|_: &ParsedKvUrl| Ok(MemoryKv::create())) as KvConstructor),
        ("redis", RedisKv::from_parsed as KvConstructor),
    ]);
    #[cfg(feature = "rocksdb")]
    factories.insert("rocksdb", super::rocksdb::RocksDbKv::from_parsed as KvConstructor);
    factories
});

/// Constructs an unstarted backend for the parsed URL.
pub fn create_backend(parsed: &ParsedKvUrl) -> Result<Arc<dyn KvBackend>, GatewayError> {
    let constructor =
        FACTORIES
            .get(parsed.scheme())
            .ok_or_else(|| GatewayError::UnsupportedScheme {
                family: "KV",
                scheme: parsed.scheme().to_string(),
            })?;
    constructor(parsed)
}
