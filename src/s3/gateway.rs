//! S3 family gateway: routes, header middleware, live map, reload.

use axum::{
    Json, Router,
    body::{Body, Bytes},
    extract::{FromRequestParts, Path, State},
    http::{HeaderMap, header, request::Parts},
    response::Response,
    routing::{get, post},
};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use super::models::{ByteRange, DeleteKey, DeleteMode, ListOptions, ObjectInfo, PutOptions};
use super::{ObjectBackend, factory, url};
use crate::backend::{BackendSet, required_header};
use crate::config::BackendEntry;
use crate::error::GatewayError;

pub(crate) const S3_ID_HEADER: &str = "X-Combinator-S3-ID";
pub(crate) const S3_KEY_HEADER: &str = "X-Combinator-S3-Object-Key";

const DEFAULT_PRESIGN_EXPIRY: Duration = Duration::from_secs(60 * 60);

#[derive(Clone)]
pub struct S3Gateway {
    inner: Arc<Inner>,
}

struct Inner {
    initial: Vec<BackendEntry>,
    set: BackendSet<dyn ObjectBackend>,
}

impl S3Gateway {
    pub fn new(entries: &[BackendEntry]) -> Self {
        Self {
            inner: Arc::new(Inner {
                initial: entries.to_vec(),
                set: BackendSet::new("S3"),
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
            .route("/head", post(handle_head))
            .route("/get", post(handle_get))
            .route("/put", post(handle_put))
            .route("/delete", post(handle_delete))
            .route("/copy", post(handle_copy))
            .route("/list", post(handle_list))
            .route("/presigned-download-url", post(handle_presign_download))
            .route("/presigned-upload-url", post(handle_presign_upload))
            // Public static-resource fetch: no ID header, no middleware.
            .route("/-/{id}/{*key}", get(handle_public_get))
            .with_state(self.clone())
    }

    pub async fn reload(&self, entries: &[BackendEntry]) -> Result<(), GatewayError> {
        self.inner
            .set
            .reload(entries, |raw| {
                let parsed = url::parse_s3_url(raw)?;
                factory::create_backend(&parsed)
            })
            .await
    }

    pub async fn lookup(&self, id: &str) -> Option<Arc<dyn ObjectBackend>> {
        self.inner.set.lookup(id).await
    }

    pub async fn services(&self) -> Vec<(String, &'static str)> {
        self.inner.set.services().await
    }
}

/// Extracts the backend addressed by `X-Combinator-S3-ID`.
pub struct ResolvedS3(pub Arc<dyn ObjectBackend>);

impl FromRequestParts<S3Gateway> for ResolvedS3 {
    type Rejection = GatewayError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &S3Gateway,
    ) -> Result<Self, Self::Rejection> {
        let id = required_header(&parts.headers, S3_ID_HEADER)?;
        state
            .lookup(&id)
            .await
            .map(ResolvedS3)
            .ok_or(GatewayError::UnknownBackend { family: "S3", id })
    }
}

#[derive(Debug, Default, Deserialize)]
struct KeyRequest {
    #[serde(default)]
    key: Option<String>,
    #[serde(default)]
    expires: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CopyRequest {
    src_key: String,
    dst_key: String,
}

#[derive(Debug, Deserialize)]
struct DeleteRequest {
    keys: Vec<DeleteKey>,
}

/// Parses a JSON body, treating an empty body as the type's default.
fn parse_optional_json<T: Default + DeserializeOwned>(body: &Bytes) -> Result<T, GatewayError> {
    if body.is_empty() {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|_| GatewayError::InvalidBody)
}

/// The object key may arrive in the body or in the key header; the body
/// wins when both are present.
fn resolve_key(body_key: Option<String>, headers: &HeaderMap) -> Result<String, GatewayError> {
    if let Some(key) = body_key.filter(|k| !k.is_empty()) {
        return Ok(key);
    }
    required_header(headers, S3_KEY_HEADER)
}

fn parse_expires(raw: Option<&str>) -> Result<Duration, GatewayError> {
    match raw {
        None => Ok(DEFAULT_PRESIGN_EXPIRY),
        Some(raw) => humantime::parse_duration(raw)
            .map_err(|e| GatewayError::ObjectStore(format!("invalid expires duration: {e}"))),
    }
}

fn parse_range(headers: &HeaderMap) -> Option<ByteRange> {
    let raw = headers.get(header::RANGE)?.to_str().ok()?;
    let spec = raw.strip_prefix("bytes=").unwrap_or(raw);
    let (start, end) = spec.split_once('-')?;
    let start: u64 = start.trim().parse().ok()?;
    let end = end.trim();
    let end = if end.is_empty() {
        None
    } else {
        end.parse().ok()
    };
    Some(ByteRange { start, end })
}

fn object_response(data: Bytes, info: &ObjectInfo) -> Result<Response, GatewayError> {
    let mut builder = Response::builder()
        .header(header::CONTENT_TYPE, info.content_type.as_str())
        .header(header::CONTENT_LENGTH, data.len())
        .header(
            header::LAST_MODIFIED,
            info.last_modified
                .format("%a, %d %b %Y %H:%M:%S GMT")
                .to_string(),
        );
    if let Some(etag) = &info.etag {
        builder = builder.header(header::ETAG, etag.as_str());
    }
    builder
        .body(Body::from(data))
        .map_err(|e| GatewayError::Backend(e.to_string()))
}

async fn handle_head(
    ResolvedS3(backend): ResolvedS3,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ObjectInfo>, GatewayError> {
    let request: KeyRequest = parse_optional_json(&body)?;
    let key = resolve_key(request.key, &headers)?;
    Ok(Json(backend.head(&key).await?))
}

async fn handle_get(
    ResolvedS3(backend): ResolvedS3,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, GatewayError> {
    let request: KeyRequest = parse_optional_json(&body)?;
    let key = resolve_key(request.key, &headers)?;
    let range = parse_range(&headers);
    let (data, info) = backend.get(&key, range).await?;
    object_response(data, &info)
}

async fn handle_put(
    ResolvedS3(backend): ResolvedS3,
    headers: HeaderMap,
    body: Bytes,
) -> Result<&'static str, GatewayError> {
    let key = required_header(&headers, S3_KEY_HEADER)?;
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    backend
        .put(&key, body, PutOptions { content_type })
        .await?;
    Ok("OK")
}

async fn handle_delete(
    ResolvedS3(backend): ResolvedS3,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let keys = if body.is_empty() {
        vec![DeleteKey {
            mode: DeleteMode::Precise,
            key: required_header(&headers, S3_KEY_HEADER)?,
        }]
    } else {
        let request: DeleteRequest =
            serde_json::from_slice(&body).map_err(|_| GatewayError::InvalidBody)?;
        request.keys
    };
    let deleted = backend.delete(&keys).await?;
    Ok(Json(json!({ "deleted": deleted })))
}

async fn handle_copy(
    ResolvedS3(backend): ResolvedS3,
    body: Bytes,
) -> Result<&'static str, GatewayError> {
    let request: CopyRequest =
        serde_json::from_slice(&body).map_err(|_| GatewayError::InvalidBody)?;
    backend.copy(&request.src_key, &request.dst_key).await?;
    Ok("OK")
}

async fn handle_list(
    ResolvedS3(backend): ResolvedS3,
    body: Bytes,
) -> Result<Json<super::models::ListResult>, GatewayError> {
    let options: ListOptions = parse_optional_json(&body)?;
    Ok(Json(backend.list(options).await?))
}

async fn handle_presign_download(
    ResolvedS3(backend): ResolvedS3,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let request: KeyRequest = parse_optional_json(&body)?;
    let expires = parse_expires(request.expires.as_deref())?;
    let key = resolve_key(request.key, &headers)?;
    let url = backend.presign_download(&key, expires).await?;
    Ok(Json(json!({ "url": url })))
}

async fn handle_presign_upload(
    ResolvedS3(backend): ResolvedS3,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let request: KeyRequest = parse_optional_json(&body)?;
    let expires = parse_expires(request.expires.as_deref())?;
    let key = resolve_key(request.key, &headers)?;
    let url = backend.presign_upload(&key, expires).await?;
    Ok(Json(json!({ "url": url })))
}

/// Public static-resource fetch: the backend ID and key live in the path,
/// so no header middleware applies.
async fn handle_public_get(
    State(state): State<S3Gateway>,
    Path((id, key)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Response, GatewayError> {
    let backend = state
        .lookup(&id)
        .await
        .ok_or(GatewayError::UnknownBackend { family: "S3", id })?;
    let range = parse_range(&headers);
    let (data, info) = backend.get(&key, range).await?;
    object_response(data, &info)
}
