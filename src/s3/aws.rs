//! S3-protocol object store over the AWS SDK. Covers both `minio://`
//! (endpoint override, path-style addressing, static credentials) and
//! `s3://` (region plus the default credential chain).

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use super::models::{
    ByteRange, DEFAULT_CONTENT_TYPE, DeleteKey, DeleteMode, ListOptions, ListResult, ObjectInfo,
    PutOptions,
};
use super::url::ParsedS3Url;
use super::ObjectBackend;
use crate::backend::Backend;
use crate::error::GatewayError;

pub struct AwsS3 {
    params: ParsedS3Url,
    bucket: String,
    kind: &'static str,
    client: RwLock<Option<Client>>,
}

impl AwsS3 {
    pub(crate) fn from_parsed(parsed: &ParsedS3Url) -> Result<Arc<dyn ObjectBackend>, GatewayError> {
        let bucket = match parsed {
            ParsedS3Url::Minio { bucket, .. } | ParsedS3Url::Aws { bucket, .. } => bucket.clone(),
            ParsedS3Url::Local { .. } => {
                return Err(GatewayError::Backend(
                    "s3 constructor received a local URL".to_string(),
                ));
            }
        };
        Ok(Arc::new(Self {
            bucket,
            kind: parsed.scheme(),
            params: parsed.clone(),
            client: RwLock::new(None),
        }))
    }

    async fn build_client(&self) -> Result<Client, GatewayError> {
        match &self.params {
            ParsedS3Url::Minio {
                host,
                port,
                access_key,
                secret_key,
                use_ssl,
                ..
            } => {
                let scheme = if *use_ssl { "https" } else { "http" };
                let endpoint = match port {
                    Some(port) => format!("{scheme}://{host}:{port}"),
                    None => format!("{scheme}://{host}"),
                };
                let credentials =
                    Credentials::new(access_key.clone(), secret_key.clone(), None, None, "combinator");
                let config = aws_sdk_s3::config::Builder::new()
                    .behavior_version(BehaviorVersion::latest())
                    .region(Region::new("us-east-1"))
                    .endpoint_url(endpoint)
                    .credentials_provider(credentials)
                    .force_path_style(true)
                    .build();
                Ok(Client::from_conf(config))
            }
            ParsedS3Url::Aws { region, .. } => {
                let shared = aws_config::defaults(BehaviorVersion::latest())
                    .region(Region::new(region.clone()))
                    .load()
                    .await;
                Ok(Client::new(&shared))
            }
            ParsedS3Url::Local { .. } => Err(GatewayError::Backend(
                "s3 backend constructed from a local URL".to_string(),
            )),
        }
    }

    async fn client(&self) -> Result<Client, GatewayError> {
        self.client
            .read()
            .await
            .clone()
            .ok_or_else(|| GatewayError::Backend("s3 backend is not started".to_string()))
    }

    async fn keys_with_prefix(
        &self,
        client: &Client,
        prefix: &str,
    ) -> Result<Vec<String>, GatewayError> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;
        loop {
            let mut request = client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix);
            if let Some(token) = &continuation {
                request = request.continuation_token(token);
            }
            let response = request.send().await.map_err(object_store_error)?;
            keys.extend(
                response
                    .contents()
                    .iter()
                    .filter_map(|o| o.key().map(str::to_string)),
            );
            match response.next_continuation_token() {
                Some(token) if response.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }
        Ok(keys)
    }
}

fn object_store_error<E>(err: E) -> GatewayError
where
    E: std::error::Error + Send + Sync + 'static,
{
    GatewayError::ObjectStore(DisplayErrorContext(&err).to_string())
}

fn convert_timestamp(ts: Option<&aws_sdk_s3::primitives::DateTime>) -> DateTime<Utc> {
    ts.and_then(|t| DateTime::<Utc>::from_timestamp(t.secs(), t.subsec_nanos()))
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

fn range_header(range: ByteRange) -> String {
    match range.end {
        Some(end) => format!("bytes={}-{}", range.start, end),
        None => format!("bytes={}-", range.start),
    }
}

#[async_trait]
impl Backend for AwsS3 {
    async fn start(&self) -> Result<(), GatewayError> {
        let client = self.build_client().await?;

        // Validate reachability; MinIO deployments also get their bucket
        // created on first use, matching how operators provision them.
        let head = client.head_bucket().bucket(&self.bucket).send().await;
        if head.is_err() {
            if matches!(self.params, ParsedS3Url::Minio { .. }) {
                client
                    .create_bucket()
                    .bucket(&self.bucket)
                    .send()
                    .await
                    .map_err(object_store_error)?;
            } else {
                head.map_err(object_store_error)?;
            }
        }

        *self.client.write().await = Some(client);
        Ok(())
    }

    async fn close(&self) -> Result<(), GatewayError> {
        self.client.write().await.take();
        Ok(())
    }

    fn kind(&self) -> &'static str {
        self.kind
    }
}

#[async_trait]
impl ObjectBackend for AwsS3 {
    async fn head(&self, key: &str) -> Result<ObjectInfo, GatewayError> {
        let client = self.client().await?;
        let response = client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(object_store_error)?;

        Ok(ObjectInfo {
            key: key.to_string(),
            size: response.content_length().unwrap_or_default().max(0) as u64,
            last_modified: convert_timestamp(response.last_modified()),
            etag: response.e_tag().map(str::to_string),
            content_type: response
                .content_type()
                .unwrap_or(DEFAULT_CONTENT_TYPE)
                .to_string(),
            metadata: response.metadata().cloned().unwrap_or_default(),
        })
    }

    async fn get(
        &self,
        key: &str,
        range: Option<ByteRange>,
    ) -> Result<(Bytes, ObjectInfo), GatewayError> {
        let client = self.client().await?;
        let mut request = client.get_object().bucket(&self.bucket).key(key);
        if let Some(range) = range {
            request = request.range(range_header(range));
        }
        let response = request.send().await.map_err(object_store_error)?;

        let info = ObjectInfo {
            key: key.to_string(),
            size: response.content_length().unwrap_or_default().max(0) as u64,
            last_modified: convert_timestamp(response.last_modified()),
            etag: response.e_tag().map(str::to_string),
            content_type: response
                .content_type()
                .unwrap_or(DEFAULT_CONTENT_TYPE)
                .to_string(),
            metadata: response.metadata().cloned().unwrap_or_default(),
        };
        let data = response
            .body
            .collect()
            .await
            .map_err(|e| GatewayError::ObjectStore(e.to_string()))?
            .into_bytes();
        Ok((data, info))
    }

    async fn put(&self, key: &str, data: Bytes, opts: PutOptions) -> Result<(), GatewayError> {
        let client = self.client().await?;
        client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(opts.content_type.as_deref().unwrap_or(DEFAULT_CONTENT_TYPE))
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(object_store_error)?;
        Ok(())
    }

    async fn delete(&self, keys: &[DeleteKey]) -> Result<usize, GatewayError> {
        let client = self.client().await?;

        let mut to_delete = Vec::new();
        for delete_key in keys {
            match delete_key.mode {
                DeleteMode::Precise => to_delete.push(delete_key.key.clone()),
                DeleteMode::Prefix => {
                    to_delete.extend(self.keys_with_prefix(&client, &delete_key.key).await?);
                }
            }
        }

        let mut deleted = 0usize;
        for key in to_delete {
            client
                .delete_object()
                .bucket(&self.bucket)
                .key(&key)
                .send()
                .await
                .map_err(object_store_error)?;
            deleted += 1;
        }
        Ok(deleted)
    }

    async fn copy(&self, src_key: &str, dst_key: &str) -> Result<(), GatewayError> {
        let client = self.client().await?;
        client
            .copy_object()
            .bucket(&self.bucket)
            .copy_source(format!("{}/{}", self.bucket, src_key))
            .key(dst_key)
            .send()
            .await
            .map_err(object_store_error)?;
        Ok(())
    }

    async fn list(&self, opts: ListOptions) -> Result<ListResult, GatewayError> {
        let client = self.client().await?;
        let mut request = client.list_objects_v2().bucket(&self.bucket);
        if let Some(prefix) = &opts.prefix {
            request = request.prefix(prefix);
        }
        if let Some(max_keys) = opts.max_keys {
            request = request.max_keys(max_keys.min(i32::MAX as usize) as i32);
        }
        if let Some(start_after) = &opts.start_after {
            request = request.start_after(start_after);
        }
        let response = request.send().await.map_err(object_store_error)?;

        let objects: Vec<ObjectInfo> = response
            .contents()
            .iter()
            .filter_map(|object| {
                let key = object.key()?.to_string();
                Some(ObjectInfo {
                    key,
                    size: object.size().unwrap_or_default().max(0) as u64,
                    last_modified: convert_timestamp(object.last_modified()),
                    etag: object.e_tag().map(str::to_string),
                    content_type: DEFAULT_CONTENT_TYPE.to_string(),
                    metadata: HashMap::new(),
                })
            })
            .collect();
        let prefixes = response
            .common_prefixes()
            .iter()
            .filter_map(|p| p.prefix().map(str::to_string))
            .collect();
        let is_truncated = response.is_truncated().unwrap_or(false);
        let next_marker = is_truncated
            .then(|| objects.last().map(|o| o.key.clone()))
            .flatten();

        Ok(ListResult {
            objects,
            prefixes,
            is_truncated,
            next_marker,
        })
    }

    async fn presign_download(
        &self,
        key: &str,
        expires: Duration,
    ) -> Result<String, GatewayError> {
        let client = self.client().await?;
        let config = PresigningConfig::expires_in(expires)
            .map_err(|e| GatewayError::ObjectStore(e.to_string()))?;
        let request = client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(config)
            .await
            .map_err(object_store_error)?;
        Ok(request.uri().to_string())
    }

    async fn presign_upload(&self, key: &str, expires: Duration) -> Result<String, GatewayError> {
        let client = self.client().await?;
        let config = PresigningConfig::expires_in(expires)
            .map_err(|e| GatewayError::ObjectStore(e.to_string()))?;
        let request = client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(config)
            .await
            .map_err(object_store_error)?;
        Ok(request.uri().to_string())
    }
}
