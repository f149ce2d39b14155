//! KV family gateway: routes, header middleware, live map, reload.

use axum::{
    Router,
    body::Bytes,
    extract::FromRequestParts,
    http::{header, request::Parts},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use std::sync::Arc;

use super::{KvBackend, factory, url};
use crate::backend::{BackendSet, required_header};
use crate::config::BackendEntry;
use crate::error::GatewayError;

pub(crate) const KV_ID_HEADER: &str = "X-Combinator-KV-ID";
pub(crate) const KV_KEY_HEADER: &str = "X-Combinator-KV-Key";

#[derive(Clone)]
pub struct KvGateway {
    inner: Arc<Inner>,
}

struct Inner {
    initial: Vec<BackendEntry>,
    set: BackendSet<dyn KvBackend>,
}

impl KvGateway {
    pub fn new(entries: &[BackendEntry]) -> Self {
        Self {
            inner: Arc::new(Inner {
                initial: entries.to_vec(),
                set: BackendSet::new("KV"),
            }),
        }
    }

    pub async fn start(&self) -> Result<Router, GatewayError> {
        let initial = self.inner.initial.clone();
        self.reload(&initial).await?;
        Ok(self.router())
    }

    fn router(&self) -> Router {
        Router::new()
            .route("/get", get(handle_get))
            .route("/set", post(handle_set))
            .with_state(self.clone())
    }

    pub async fn reload(&self, entries: &[BackendEntry]) -> Result<(), GatewayError> {
        self.inner
            .set
            .reload(entries, |raw| {
                let parsed = url::parse_kv_url(raw)?;
                factory::create_backend(&parsed)
            })
            .await
    }

    pub async fn lookup(&self, id: &str) -> Option<Arc<dyn KvBackend>> {
        self.inner.set.lookup(id).await
    }

    pub async fn services(&self) -> Vec<(String, &'static str)> {
        self.inner.set.services().await
    }
}

/// Extracts the backend addressed by `X-Combinator-KV-ID` together with
/// the key carried in `X-Combinator-KV-Key`. Both headers are required.
pub struct ResolvedKv {
    pub backend: Arc<dyn KvBackend>,
    pub key: String,
}

impl FromRequestParts<KvGateway> for ResolvedKv {
    type Rejection = GatewayError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &KvGateway,
    ) -> Result<Self, Self::Rejection> {
        let id = required_header(&parts.headers, KV_ID_HEADER)?;
        let key = required_header(&parts.headers, KV_KEY_HEADER)?;
        let backend = state
            .lookup(&id)
            .await
            .ok_or(GatewayError::UnknownBackend { family: "KV", id })?;
        Ok(ResolvedKv { backend, key })
    }
}

async fn handle_get(resolved: ResolvedKv) -> Result<Response, GatewayError> {
    let value = resolved.backend.get(&resolved.key).await?;
    Ok((
        [(header::CONTENT_TYPE, "application/octet-stream")],
        value,
    )
        .into_response())
}

async fn handle_set(resolved: ResolvedKv, body: Bytes) -> Result<&'static str, GatewayError> {
    resolved.backend.set(&resolved.key, &body).await?;
    Ok("OK")
}
