//! KV family: ID-addressed key-value backends with key-in-header
//! transport.

mod factory;
mod gateway;
mod memory;
mod redis;
#[cfg(feature = "rocksdb")]
mod rocksdb;
mod url;

pub use gateway::{KvGateway, ResolvedKv};
pub use memory::MemoryKv;
pub use url::{ParsedKvUrl, parse_kv_url};

use async_trait::async_trait;

use crate::backend::Backend;
use crate::error::GatewayError;

/// Capability set of a key-value backend. Implementations must return
/// buffers the caller can mutate freely without corrupting storage.
#[async_trait]
pub trait KvBackend: Backend {
    async fn get(&self, key: &str) -> Result<Vec<u8>, GatewayError>;

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), GatewayError>;
}
