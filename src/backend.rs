//! Shared family-gateway skeleton: the live backend set and its reload
//! diff protocol. Each family (RDB, KV, S3) wraps a [`BackendSet`] over its
//! own capability trait and contributes URL parsing + construction.

use async_trait::async_trait;
use axum::http::HeaderMap;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::config::BackendEntry;
use crate::error::GatewayError;

/// Reads a required request header, rejecting absent or empty values.
pub(crate) fn required_header(
    headers: &HeaderMap,
    name: &'static str,
) -> Result<String, GatewayError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or(GatewayError::MissingHeader(name))
}

/// Lifecycle surface every backend handle implements, regardless of family.
///
/// A handle is constructed unstarted, transitions to started on a successful
/// `start`, and is closed exactly once by the reload that removes it (or by
/// process teardown). Only started handles are ever installed in a live set.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn start(&self) -> Result<(), GatewayError>;

    async fn close(&self) -> Result<(), GatewayError>;

    /// The scheme tag this handle was constructed from ("sqlite",
    /// "postgres", "redis", ...).
    fn kind(&self) -> &'static str;
}

#[derive(Default)]
struct SetState<B: ?Sized> {
    live: HashMap<String, Arc<B>>,
    urls: HashMap<String, String>,
}

/// The `id -> handle` live map of one family, plus the `id -> URL` map used
/// as the reload identity key. Both sit behind a single writer lock so no
/// request can observe a half-swapped pair.
pub struct BackendSet<B: ?Sized> {
    family: &'static str,
    state: RwLock<SetState<B>>,
}

impl<B: Backend + ?Sized> BackendSet<B> {
    pub fn new(family: &'static str) -> Self {
        Self {
            family,
            state: RwLock::new(SetState {
                live: HashMap::new(),
                urls: HashMap::new(),
            }),
        }
    }

    /// Resolves an ID to its started handle. Callers clone the `Arc` out
    /// and use it unlocked; a handle removed by a concurrent reload stays
    /// usable until the last in-flight reference drops.
    pub async fn lookup(&self, id: &str) -> Option<Arc<B>> {
        self.state.read().await.live.get(id).cloned()
    }

    /// Lists `(id, kind)` for every live handle, sorted by id.
    pub async fn services(&self) -> Vec<(String, &'static str)> {
        let state = self.state.read().await;
        let mut services: Vec<(String, &'static str)> = state
            .live
            .iter()
            .map(|(id, handle)| (id.clone(), handle.kind()))
            .collect();
        services.sort_by(|a, b| a.0.cmp(&b.0));
        services
    }

    /// Applies the reload diff protocol under the writer lock.
    ///
    /// Handles whose URL is character-identical to the incumbent move into
    /// the fresh maps without reconnecting. Removed or changed handles are
    /// closed (close failures are logged and skipped). Remaining entries are
    /// constructed and started; the first failure aborts the reload and the
    /// family keeps serving from its previous maps. Only a fully successful
    /// pass swaps the maps.
    pub async fn reload<F>(
        &self,
        entries: &[BackendEntry],
        construct: F,
    ) -> Result<(), GatewayError>
    where
        F: Fn(&str) -> Result<Arc<B>, GatewayError>,
    {
        let mut state = self.state.write().await;

        let mut want: HashMap<String, String> = entries
            .iter()
            .map(|e| (e.id.clone(), e.url.clone()))
            .collect();

        let mut fresh = SetState {
            live: HashMap::new(),
            urls: HashMap::new(),
        };

        for (id, handle) in &state.live {
            let current_url = state.urls.get(id);
            if want.get(id) == current_url {
                info!(family = self.family, %id, "backend unchanged, keeping connection");
                fresh.live.insert(id.clone(), handle.clone());
                fresh
                    .urls
                    .insert(id.clone(), current_url.cloned().unwrap_or_default());
                want.remove(id);
                continue;
            }

            if let Err(err) = handle.close().await {
                warn!(family = self.family, %id, %err, "failed to close backend");
            }
            info!(family = self.family, %id, "closed backend");
        }

        for (id, url) in want {
            let handle = construct(&url).inspect_err(
                |err| warn!(family = self.family, %id, %err, "failed to create backend"),
            )?;
            handle.start().await.inspect_err(
                |err| warn!(family = self.family, %id, %err, "failed to start backend"),
            )?;
            info!(family = self.family, %id, kind = handle.kind(), "loaded backend");
            fresh.urls.insert(id.clone(), url);
            fresh.live.insert(id, handle);
        }

        *state = fresh;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeBackend {
        url: String,
        closes: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Backend for FakeBackend {
        async fn start(&self) -> Result<(), GatewayError> {
            if self.url.contains("broken") {
                return Err(GatewayError::Backend("refused to start".to_string()));
            }
            Ok(())
        }

        async fn close(&self) -> Result<(), GatewayError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn kind(&self) -> &'static str {
            "fake"
        }
    }

    fn entry(id: &str, url: &str) -> BackendEntry {
        BackendEntry {
            id: id.to_string(),
            enabled: true,
            url: url.to_string(),
        }
    }

    fn constructor(closes: Arc<AtomicUsize>) -> impl Fn(&str) -> Result<Arc<FakeBackend>, GatewayError>
    {
        move |url| {
            Ok(Arc::new(FakeBackend {
                url: url.to_string(),
                closes: closes.clone(),
            }))
        }
    }

    #[tokio::test]
    async fn reload_populates_live_map() {
        let closes = Arc::new(AtomicUsize::new(0));
        let set: BackendSet<FakeBackend> = BackendSet::new("fake");

        set.reload(
            &[entry("a", "fake://1"), entry("b", "fake://2")],
            constructor(closes.clone()),
        )
        .await
        .unwrap();

        assert!(set.lookup("a").await.is_some());
        assert!(set.lookup("b").await.is_some());
        assert!(set.lookup("c").await.is_none());
    }

    #[tokio::test]
    async fn identical_url_keeps_handle_identity() {
        let closes = Arc::new(AtomicUsize::new(0));
        let set: BackendSet<FakeBackend> = BackendSet::new("fake");
        let entries = [entry("a", "fake://1")];

        set.reload(&entries, constructor(closes.clone())).await.unwrap();
        let before = set.lookup("a").await.unwrap();

        set.reload(&entries, constructor(closes.clone())).await.unwrap();
        let after = set.lookup("a").await.unwrap();

        assert!(Arc::ptr_eq(&before, &after));
        assert_eq!(closes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn changed_url_closes_and_replaces() {
        let closes = Arc::new(AtomicUsize::new(0));
        let set: BackendSet<FakeBackend> = BackendSet::new("fake");

        set.reload(&[entry("a", "fake://1")], constructor(closes.clone()))
            .await
            .unwrap();
        let before = set.lookup("a").await.unwrap();

        set.reload(&[entry("a", "fake://2")], constructor(closes.clone()))
            .await
            .unwrap();
        let after = set.lookup("a").await.unwrap();

        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn removed_id_is_closed_and_dropped() {
        let closes = Arc::new(AtomicUsize::new(0));
        let set: BackendSet<FakeBackend> = BackendSet::new("fake");

        set.reload(
            &[entry("a", "fake://1"), entry("b", "fake://2")],
            constructor(closes.clone()),
        )
        .await
        .unwrap();

        set.reload(&[entry("a", "fake://1")], constructor(closes.clone()))
            .await
            .unwrap();

        assert!(set.lookup("a").await.is_some());
        assert!(set.lookup("b").await.is_none());
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_start_keeps_previous_maps() {
        let closes = Arc::new(AtomicUsize::new(0));
        let set: BackendSet<FakeBackend> = BackendSet::new("fake");

        set.reload(&[entry("a", "fake://1")], constructor(closes.clone()))
            .await
            .unwrap();

        let err = set
            .reload(
                &[entry("a", "fake://1"), entry("b", "fake://broken")],
                constructor(closes.clone()),
            )
            .await;
        assert!(err.is_err());

        // The incumbent map is still installed.
        assert!(set.lookup("a").await.is_some());
        assert!(set.lookup("b").await.is_none());
    }

    #[tokio::test]
    async fn services_are_sorted_by_id() {
        let closes = Arc::new(AtomicUsize::new(0));
        let set: BackendSet<FakeBackend> = BackendSet::new("fake");

        set.reload(
            &[entry("z", "fake://1"), entry("a", "fake://2"), entry("m", "fake://3")],
            constructor(closes.clone()),
        )
        .await
        .unwrap();

        let ids: Vec<String> = set.services().await.into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["a", "m", "z"]);
    }
}
