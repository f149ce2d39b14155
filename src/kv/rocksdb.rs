//! RocksDB KV backend (compile-time optional).

use async_trait::async_trait;
use std::sync::{Arc, RwLock};

use super::KvBackend;
use super::url::ParsedKvUrl;
use crate::backend::Backend;
use crate::error::GatewayError;

pub struct RocksDbKv {
    path: String,
    db: RwLock<Option<rocksdb::DB>>,
}

impl RocksDbKv {
    pub(crate) fn from_parsed(parsed: &ParsedKvUrl) -> Result<Arc<dyn KvBackend>, GatewayError> {
        let ParsedKvUrl::RocksDb { path } = parsed else {
            return Err(GatewayError::Backend(
                "rocksdb constructor received a non-rocksdb URL".to_string(),
            ));
        };
        Ok(Arc::new(Self {
            path: path.clone(),
            db: RwLock::new(None),
        }))
    }

    fn with_db<T>(
        &self,
        f: impl FnOnce(&rocksdb::DB) -> Result<T, GatewayError>,
    ) -> Result<T, GatewayError> {
        let guard = self
            .db
            .read()
            .map_err(|_| GatewayError::Backend("rocksdb lock poisoned".to_string()))?;
        let db = guard
            .as_ref()
            .ok_or_else(|| GatewayError::Backend("rocksdb backend is not started".to_string()))?;
        f(db)
    }
}

#[async_trait]
impl Backend for RocksDbKv {
    async fn start(&self) -> Result<(), GatewayError> {
        let db = rocksdb::DB::open_default(&self.path)
            .map_err(|e| GatewayError::Backend(e.to_string()))?;
        *self
            .db
            .write()
            .map_err(|_| GatewayError::Backend("rocksdb lock poisoned".to_string()))? = Some(db);
        Ok(())
    }

    async fn close(&self) -> Result<(), GatewayError> {
        self.db
            .write()
            .map_err(|_| GatewayError::Backend("rocksdb lock poisoned".to_string()))?
            .take();
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "rocksdb"
    }
}

#[async_trait]
impl KvBackend for RocksDbKv {
    async fn get(&self, key: &str) -> Result<Vec<u8>, GatewayError> {
        self.with_db(|db| {
            db.get(key)
                .map_err(|e| GatewayError::Backend(e.to_string()))?
                .ok_or_else(|| GatewayError::KeyNotFound(key.to_string()))
        })
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), GatewayError> {
        self.with_db(|db| db.put(key, value).map_err(|e| GatewayError::Backend(e.to_string())))
    }
}
