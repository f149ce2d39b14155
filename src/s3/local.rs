//! Local-filesystem object store rooted at a base directory. Keys map to
//! relative paths under the root; presigned URLs are unsupported.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use super::models::{
    ByteRange, DEFAULT_CONTENT_TYPE, DeleteKey, DeleteMode, ListOptions, ListResult, ObjectInfo,
    PutOptions,
};
use super::url::ParsedS3Url;
use super::ObjectBackend;
use crate::backend::Backend;
use crate::error::GatewayError;

pub struct LocalS3 {
    base: PathBuf,
}

impl LocalS3 {
    pub(crate) fn from_parsed(parsed: &ParsedS3Url) -> Result<Arc<dyn ObjectBackend>, GatewayError> {
        let ParsedS3Url::Local { path } = parsed else {
            return Err(GatewayError::Backend(
                "local constructor received a non-local URL".to_string(),
            ));
        };
        Ok(Arc::new(Self {
            base: PathBuf::from(path),
        }))
    }

    /// Maps a key to its path under the root, rejecting traversal
    /// segments so a crafted key cannot escape the store.
    fn full_path(&self, key: &str) -> Result<PathBuf, GatewayError> {
        let relative = Path::new(key);
        if relative
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)))
        {
            return Err(GatewayError::ObjectStore(format!("invalid object key: {key}")));
        }
        Ok(self.base.join(relative))
    }

    async fn stat(&self, key: &str) -> Result<ObjectInfo, GatewayError> {
        let path = self.full_path(key)?;
        let meta = tokio::fs::metadata(&path)
            .await
            .map_err(|e| GatewayError::ObjectStore(format!("failed to stat {key}: {e}")))?;
        if meta.is_dir() {
            return Err(GatewayError::ObjectStore(format!("not an object: {key}")));
        }
        let modified = meta
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        Ok(ObjectInfo {
            key: key.to_string(),
            size: meta.len(),
            last_modified: modified,
            etag: None,
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
            metadata: HashMap::new(),
        })
    }

    /// Walks the root and returns every object key, sorted for
    /// deterministic listings.
    async fn all_keys(&self) -> Result<Vec<String>, GatewayError> {
        let mut keys = Vec::new();
        let mut pending = vec![self.base.clone()];
        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                    continue;
                }
                let relative = path
                    .strip_prefix(&self.base)
                    .map_err(|e| GatewayError::ObjectStore(e.to_string()))?;
                keys.push(relative.to_string_lossy().replace('\\', "/"));
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[async_trait]
impl Backend for LocalS3 {
    async fn start(&self) -> Result<(), GatewayError> {
        tokio::fs::create_dir_all(&self.base).await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), GatewayError> {
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "local"
    }
}

#[async_trait]
impl ObjectBackend for LocalS3 {
    async fn head(&self, key: &str) -> Result<ObjectInfo, GatewayError> {
        self.stat(key).await
    }

    async fn get(
        &self,
        key: &str,
        range: Option<ByteRange>,
    ) -> Result<(Bytes, ObjectInfo), GatewayError> {
        let info = self.stat(key).await?;
        let path = self.full_path(key)?;
        let data = tokio::fs::read(&path)
            .await
            .map_err(|e| GatewayError::ObjectStore(format!("failed to read {key}: {e}")))?;

        let data = match range {
            None => Bytes::from(data),
            Some(range) => {
                let start = range.start.min(data.len() as u64) as usize;
                let end = range
                    .end
                    .map(|e| e.saturating_add(1).min(data.len() as u64) as usize)
                    .unwrap_or(data.len());
                Bytes::from(data[start..end.max(start)].to_vec())
            }
        };
        Ok((data, info))
    }

    async fn put(&self, key: &str, data: Bytes, _opts: PutOptions) -> Result<(), GatewayError> {
        let path = self.full_path(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &data)
            .await
            .map_err(|e| GatewayError::ObjectStore(format!("failed to write {key}: {e}")))?;
        Ok(())
    }

    async fn delete(&self, keys: &[DeleteKey]) -> Result<usize, GatewayError> {
        let mut to_delete = Vec::new();
        for delete_key in keys {
            match delete_key.mode {
                DeleteMode::Precise => to_delete.push(delete_key.key.clone()),
                DeleteMode::Prefix => {
                    let matching = self
                        .all_keys()
                        .await?
                        .into_iter()
                        .filter(|k| k.starts_with(&delete_key.key));
                    to_delete.extend(matching);
                }
            }
        }

        let mut deleted = 0usize;
        for key in to_delete {
            let path = self.full_path(&key)?;
            match tokio::fs::remove_file(&path).await {
                Ok(()) => deleted += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(GatewayError::ObjectStore(format!(
                        "failed to delete {key}: {e}"
                    )));
                }
            }
        }
        Ok(deleted)
    }

    async fn copy(&self, src_key: &str, dst_key: &str) -> Result<(), GatewayError> {
        let src = self.full_path(src_key)?;
        let dst = self.full_path(dst_key)?;
        if let Some(parent) = dst.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(&src, &dst)
            .await
            .map_err(|e| GatewayError::ObjectStore(format!("failed to copy {src_key}: {e}")))?;
        Ok(())
    }

    async fn list(&self, opts: ListOptions) -> Result<ListResult, GatewayError> {
        let prefix = opts.prefix.unwrap_or_default();
        let mut keys: Vec<String> = self
            .all_keys()
            .await?
            .into_iter()
            .filter(|k| k.starts_with(&prefix))
            .collect();
        if let Some(start_after) = &opts.start_after {
            keys.retain(|k| k.as_str() > start_after.as_str());
        }

        let max_keys = opts.max_keys.unwrap_or(usize::MAX).max(1);
        let is_truncated = keys.len() > max_keys;
        keys.truncate(max_keys);

        let mut objects = Vec::with_capacity(keys.len());
        for key in &keys {
            objects.push(self.stat(key).await?);
        }
        let next_marker = is_truncated.then(|| keys.last().cloned()).flatten();

        Ok(ListResult {
            objects,
            prefixes: Vec::new(),
            is_truncated,
            next_marker,
        })
    }

    async fn presign_download(
        &self,
        _key: &str,
        _expires: Duration,
    ) -> Result<String, GatewayError> {
        Err(GatewayError::PresignedUnsupported)
    }

    async fn presign_upload(&self, _key: &str, _expires: Duration) -> Result<String, GatewayError> {
        Err(GatewayError::PresignedUnsupported)
    }
}
