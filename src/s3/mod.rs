//! S3 family: ID-addressed object-storage backends behind a JSON-body
//! POST surface plus a public static-resource fetch route.

mod aws;
mod factory;
mod gateway;
mod local;
mod models;
mod url;

pub use gateway::{ResolvedS3, S3Gateway};
pub use models::{
    ByteRange, DeleteKey, DeleteMode, ListOptions, ListResult, ObjectInfo, PutOptions,
};
pub use url::{ParsedS3Url, parse_s3_url};

use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

use crate::backend::Backend;
use crate::error::GatewayError;

/// Capability set of an object-storage backend.
#[async_trait]
pub trait ObjectBackend: Backend {
    async fn head(&self, key: &str) -> Result<ObjectInfo, GatewayError>;

    /// Fetches object bytes, honoring an optional byte range.
    async fn get(
        &self,
        key: &str,
        range: Option<ByteRange>,
    ) -> Result<(Bytes, ObjectInfo), GatewayError>;

    async fn put(&self, key: &str, data: Bytes, opts: PutOptions) -> Result<(), GatewayError>;

    /// Deletes by precise key or prefix; returns the number of objects
    /// removed. Prefix deletes list then delete.
    async fn delete(&self, keys: &[DeleteKey]) -> Result<usize, GatewayError>;

    /// Server-side copy within the same bucket/root.
    async fn copy(&self, src_key: &str, dst_key: &str) -> Result<(), GatewayError>;

    async fn list(&self, opts: ListOptions) -> Result<ListResult, GatewayError>;

    async fn presign_download(&self, key: &str, expires: Duration)
    -> Result<String, GatewayError>;

    async fn presign_upload(&self, key: &str, expires: Duration) -> Result<String, GatewayError>;
}
