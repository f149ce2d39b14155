//! Process-local KV backend.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::KvBackend;
use crate::backend::Backend;
use crate::error::GatewayError;

/// In-memory store. Both `get` and `set` copy the value so callers can
/// mutate returned or supplied buffers without corrupting storage.
#[derive(Default)]
pub struct MemoryKv {
    store: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn create() -> Arc<dyn KvBackend> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl Backend for MemoryKv {
    async fn start(&self) -> Result<(), GatewayError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), GatewayError> {
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "memory"
    }
}

#[async_trait]
impl KvBackend for MemoryKv {
    async fn get(&self, key: &str) -> Result<Vec<u8>, GatewayError> {
        let store = self
            .store
            .read()
            .map_err(|_| GatewayError::Backend("memory store poisoned".to_string()))?;
        store
            .get(key)
            .cloned()
            .ok_or_else(|| GatewayError::KeyNotFound(key.to_string()))
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), GatewayError> {
        let mut store = self
            .store
            .write()
            .map_err(|_| GatewayError::Backend("memory store poisoned".to_string()))?;
        store.insert(key.to_string(), value.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::KvBackend;

    #[tokio::test]
    async fn get_returns_a_defensive_copy() {
        let kv = MemoryKv::new();
        kv.set("k", &[0x01, 0x02]).await.unwrap();

        let mut first = kv.get("k").await.unwrap();
        first[0] = 0xFF;
        first[1] = 0xFF;

        assert_eq!(kv.get("k").await.unwrap(), vec![0x01, 0x02]);
    }

    #[tokio::test]
    async fn set_copies_the_supplied_buffer() {
        let kv = MemoryKv::new();
        let mut buffer = vec![0x01, 0x02];
        kv.set("k", &buffer).await.unwrap();
        buffer[0] = 0xFF;

        assert_eq!(kv.get("k").await.unwrap(), vec![0x01, 0x02]);
    }

    #[tokio::test]
    async fn missing_key_is_an_error() {
        let kv = MemoryKv::new();
        let err = kv.get("absent").await.unwrap_err();
        assert_eq!(err.to_string(), "key not found: absent");
    }
}
