//! RDB family gateway: routes, header middleware, live map, reload.

use axum::{
    Router,
    body::Bytes,
    extract::FromRequestParts,
    http::{header, request::Parts},
    response::{IntoResponse, Response},
    routing::post,
};
use std::sync::Arc;

use super::{RdbBackend, StatementRequest, factory, url};
use crate::backend::{BackendSet, required_header};
use crate::config::BackendEntry;
use crate::error::GatewayError;

pub(crate) const RDB_ID_HEADER: &str = "X-Combinator-RDB-ID";

#[derive(Clone)]
pub struct RdbGateway {
    inner: Arc<Inner>,
}

struct Inner {
    initial: Vec<BackendEntry>,
    set: BackendSet<dyn RdbBackend>,
}

impl RdbGateway {
    pub fn new(entries: &[BackendEntry]) -> Self {
        Self {
            inner: Arc::new(Inner {
                initial: entries.to_vec(),
                set: BackendSet::new("RDB"),
            }),
        }
    }

    /// Installs the family routes and performs the initial reload. Reload
    /// is the sole path that populates the live map; there is no separate
    /// initial load.
    pub async fn start(&self) -> Result<Router, GatewayError> {
        let initial = self.inner.initial.clone();
        self.reload(&initial).await?;
        Ok(self.router())
    }

    fn router(&self) -> Router {
        Router::new()
            .route("/query", post(handle_query))
            .route("/exec", post(handle_exec))
            .route("/batch", post(handle_batch))
            .with_state(self.clone())
    }

    pub async fn reload(&self, entries: &[BackendEntry]) -> Result<(), GatewayError> {
        self.inner
            .set
            .reload(entries, |raw| {
                let parsed = url::parse_rdb_url(raw)?;
                factory::create_backend(&parsed)
            })
            .await
    }

    pub async fn lookup(&self, id: &str) -> Option<Arc<dyn RdbBackend>> {
        self.inner.set.lookup(id).await
    }

    pub async fn services(&self) -> Vec<(String, &'static str)> {
        self.inner.set.services().await
    }
}

/// Extracts the backend addressed by `X-Combinator-RDB-ID`, rejecting
/// requests with a missing header or unknown ID before the handler runs.
pub struct ResolvedRdb(pub Arc<dyn RdbBackend>);

impl FromRequestParts<RdbGateway> for ResolvedRdb {
    type Rejection = GatewayError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &RdbGateway,
    ) -> Result<Self, Self::Rejection> {
        let id = required_header(&parts.headers, RDB_ID_HEADER)?;
        state
            .lookup(&id)
            .await
            .map(ResolvedRdb)
            .ok_or(GatewayError::UnknownBackend { family: "RDB", id })
    }
}

async fn handle_query(
    ResolvedRdb(backend): ResolvedRdb,
    body: Bytes,
) -> Result<Response, GatewayError> {
    let request: StatementRequest =
        serde_json::from_slice(&body).map_err(|_| GatewayError::InvalidBody)?;
    let csv = backend.query(&request.stmt, &request.args).await?;
    Ok(([(header::CONTENT_TYPE, "text/csv")], csv).into_response())
}

async fn handle_exec(
    ResolvedRdb(backend): ResolvedRdb,
    body: Bytes,
) -> Result<&'static str, GatewayError> {
    let request: StatementRequest =
        serde_json::from_slice(&body).map_err(|_| GatewayError::InvalidBody)?;
    backend.exec(&request.stmt, &request.args).await?;
    Ok("OK")
}

async fn handle_batch(
    ResolvedRdb(backend): ResolvedRdb,
    body: Bytes,
) -> Result<&'static str, GatewayError> {
    let requests: Vec<StatementRequest> =
        serde_json::from_slice(&body).map_err(|_| GatewayError::InvalidBody)?;
    backend.batch(&requests).await?;
    Ok("OK")
}
