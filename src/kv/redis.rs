//! Redis KV backend over a multiplexed connection manager.

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::KvBackend;
use super::url::ParsedKvUrl;
use crate::backend::Backend;
use crate::error::GatewayError;

pub struct RedisKv {
    url: String,
    manager: RwLock<Option<ConnectionManager>>,
}

impl RedisKv {
    pub(crate) fn from_parsed(parsed: &ParsedKvUrl) -> Result<Arc<dyn KvBackend>, GatewayError> {
        let ParsedKvUrl::Redis {
            host,
            port,
            password,
            db,
        } = parsed
        else {
            return Err(GatewayError::Backend(
                "redis constructor received a non-redis URL".to_string(),
            ));
        };
        let auth = password
            .as_deref()
            .map(|p| format!(":{p}@"))
            .unwrap_or_default();
        Ok(Arc::new(Self {
            url: format!("redis://{auth}{host}:{port}/{db}"),
            manager: RwLock::new(None),
        }))
    }

    async fn connection(&self) -> Result<ConnectionManager, GatewayError> {
        self.manager
            .read()
            .await
            .clone()
            .ok_or_else(|| GatewayError::Backend("redis backend is not started".to_string()))
    }
}

#[async_trait]
impl Backend for RedisKv {
    async fn start(&self) -> Result<(), GatewayError> {
        let client = redis::Client::open(self.url.as_str())?;
        let mut manager = client.get_connection_manager().await?;
        let _: String = redis::cmd("PING").query_async(&mut manager).await?;
        *self.manager.write().await = Some(manager);
        Ok(())
    }

    async fn close(&self) -> Result<(), GatewayError> {
        // The manager has no explicit shutdown; dropping the last clone
        // tears the connection down.
        self.manager.write().await.take();
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "redis"
    }
}

#[async_trait]
impl KvBackend for RedisKv {
    async fn get(&self, key: &str) -> Result<Vec<u8>, GatewayError> {
        let mut connection = self.connection().await?;
        let value: Option<Vec<u8>> = connection.get(key).await?;
        value.ok_or_else(|| GatewayError::KeyNotFound(key.to_string()))
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), GatewayError> {
        let mut connection = self.connection().await?;
        connection.set::<_, _, ()>(key, value).await?;
        Ok(())
    }
}
