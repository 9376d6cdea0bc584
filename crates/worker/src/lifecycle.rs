//! Install and activate handling.
//!
//! Install fills the versioned precache store from the manifest as one
//! all-or-nothing batch. Activate deletes every store that does not belong
//! to the current version and then claims open clients.

use std::sync::Arc;

use async_trait::async_trait;
use sitecache_client::Fetcher;
use sitecache_core::{Cache, CacheStorage, Destination, Error, Request, WorkerConfig};
use tokio::task::JoinSet;

use crate::host::{ExtendableEvent, HostControl, LifecycleHandler};

/// Store registry operations the lifecycle needs.
#[async_trait]
pub trait CacheRegistry: Send + Sync {
    async fn open(&self, name: &str) -> Result<Cache, Error>;
    async fn keys(&self) -> Result<Vec<String>, Error>;
    async fn delete(&self, name: &str) -> Result<bool, Error>;
}

#[async_trait]
impl CacheRegistry for CacheStorage {
    async fn open(&self, name: &str) -> Result<Cache, Error> {
        CacheStorage::open(self, name).await
    }

    async fn keys(&self) -> Result<Vec<String>, Error> {
        CacheStorage::keys(self).await
    }

    async fn delete(&self, name: &str) -> Result<bool, Error> {
        CacheStorage::delete(self, name).await
    }
}

pub struct LifecycleManager {
    config: Arc<WorkerConfig>,
    caches: Arc<dyn CacheRegistry>,
    network: Arc<dyn Fetcher>,
    host: Arc<dyn HostControl>,
}

impl LifecycleManager {
    pub fn new(
        config: Arc<WorkerConfig>, caches: Arc<dyn CacheRegistry>, network: Arc<dyn Fetcher>,
        host: Arc<dyn HostControl>,
    ) -> Self {
        Self { config, caches, network, host }
    }

    /// Fetch every manifest asset and store them together.
    ///
    /// A transport failure or a non-2xx status on any asset aborts the batch
    /// before anything is written. Returns the number of stored entries.
    pub async fn precache(&self) -> Result<usize, Error> {
        let urls = self.config.precache_urls()?;
        let total = urls.len();

        let mut join_set = JoinSet::new();
        for (index, url) in urls.into_iter().enumerate() {
            let network = Arc::clone(&self.network);
            join_set.spawn(async move {
                let request = Request::get(url, Destination::Other);
                let result = network.fetch(&request).await;
                (index, request, result)
            });
        }

        let mut fetched = Vec::with_capacity(total);
        while let Some(joined) = join_set.join_next().await {
            let (index, request, result) =
                joined.map_err(|e| Error::Host(format!("precache task failed: {e}")))?;
            let response = result.map_err(|e| Error::PrecacheFailed {
                url: request.url().to_string(),
                reason: e.to_string(),
            })?;
            if !response.ok() {
                return Err(Error::PrecacheFailed {
                    url: request.url().to_string(),
                    reason: format!("status {}", response.status().as_u16()),
                });
            }
            fetched.push((index, request, response));
        }

        fetched.sort_by_key(|(index, _, _)| *index);
        let cache = self.caches.open(&self.config.precache_cache()).await?;
        cache
            .put_all(fetched.into_iter().map(|(_, request, response)| (request, response)).collect())
            .await?;

        Ok(total)
    }

    /// Delete every store not used by the current version.
    ///
    /// Failures are logged and skipped. Returns the names actually deleted.
    pub async fn purge_stale_caches(&self) -> Vec<String> {
        let names = match self.caches.keys().await {
            Ok(names) => names,
            Err(e) => {
                tracing::warn!(error = %e, "could not list caches; skipping cleanup");
                return Vec::new();
            }
        };

        let mut deleted = Vec::new();
        for name in names.into_iter().filter(|name| !self.config.is_current_cache(name)) {
            match self.caches.delete(&name).await {
                Ok(_) => {
                    tracing::info!(cache = %name, "deleted old cache");
                    deleted.push(name);
                }
                Err(e) => tracing::warn!(cache = %name, error = %e, "failed to delete old cache"),
            }
        }
        deleted
    }
}

#[async_trait]
impl LifecycleHandler for LifecycleManager {
    async fn install(&self, _event: &ExtendableEvent) -> Result<(), Error> {
        let cache = self.config.precache_cache();
        tracing::info!(cache = %cache, "installing");

        let stored = self.precache().await?;
        tracing::info!(cache = %cache, assets = stored, "precached assets");

        self.host.skip_waiting().await
    }

    async fn activate(&self, _event: &ExtendableEvent) -> Result<(), Error> {
        tracing::info!(version = %self.config.cache_version, "activating");

        let deleted = self.purge_stale_caches().await;
        tracing::debug!(deleted = deleted.len(), "cache cleanup complete");

        self.host.claim_clients().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{RecordingHost, ScriptedNetwork, get, memory_storage, site, test_config};
    use http::StatusCode;
    use std::sync::atomic::Ordering;

    fn manager(
        config: WorkerConfig, caches: &CacheStorage, network: &Arc<ScriptedNetwork>, host: &Arc<RecordingHost>,
    ) -> LifecycleManager {
        LifecycleManager::new(Arc::new(config), Arc::new(caches.clone()), network.clone(), host.clone())
    }

    /// Real storage whose listing or deletion of selected stores fails.
    struct FaultyRegistry {
        inner: CacheStorage,
        fail_keys: bool,
        locked: &'static str,
    }

    #[async_trait]
    impl CacheRegistry for FaultyRegistry {
        async fn open(&self, name: &str) -> Result<Cache, Error> {
            self.inner.open(name).await
        }

        async fn keys(&self) -> Result<Vec<String>, Error> {
            if self.fail_keys {
                return Err(Error::MigrationFailed("database unavailable".into()));
            }
            self.inner.keys().await
        }

        async fn delete(&self, name: &str) -> Result<bool, Error> {
            if name == self.locked {
                return Err(Error::InvalidInput(format!("{name} is locked")));
            }
            self.inner.delete(name).await
        }
    }

    fn serve_manifest(network: &ScriptedNetwork) {
        network.serve(&site("/"), "text/html", "<h1>home</h1>");
        network.serve(&site("/index.html"), "text/html", "<h1>index</h1>");
        network.serve(&site("/images/logo.png"), "image/png", "PNG");
    }

    #[tokio::test]
    async fn test_install_precaches_manifest() {
        let caches = memory_storage().await;
        let network = ScriptedNetwork::new();
        let host = RecordingHost::new();
        serve_manifest(&network);
        let manager = manager(test_config(), &caches, &network, &host);

        manager.install(&ExtendableEvent::new()).await.unwrap();

        let precache = caches.open("precache-v1").await.unwrap();
        assert_eq!(
            precache.urls().await.unwrap(),
            vec![site("/"), site("/images/logo.png"), site("/index.html")]
        );
        let mut logo = precache
            .match_request(&get(&site("/images/logo.png"), Destination::Image))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(logo.text().unwrap(), "PNG");
        assert!(host.skipped_waiting.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_install_fails_when_any_asset_fails() {
        let caches = memory_storage().await;
        let network = ScriptedNetwork::new();
        let host = RecordingHost::new();
        network.serve(&site("/"), "text/html", "home");
        network.serve(&site("/index.html"), "text/html", "index");
        let manager = manager(test_config(), &caches, &network, &host);

        let result = manager.install(&ExtendableEvent::new()).await;
        assert!(matches!(result, Err(Error::PrecacheFailed { url, .. }) if url == site("/images/logo.png")));

        let precache = caches.open("precache-v1").await.unwrap();
        assert!(precache.is_empty().await.unwrap());
        assert!(!host.skipped_waiting.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_install_fails_on_non_success_status() {
        let caches = memory_storage().await;
        let network = ScriptedNetwork::new();
        let host = RecordingHost::new();
        serve_manifest(&network);
        network.serve_status(&site("/index.html"), StatusCode::NOT_FOUND);
        let manager = manager(test_config(), &caches, &network, &host);

        let result = manager.install(&ExtendableEvent::new()).await;
        assert!(matches!(result, Err(Error::PrecacheFailed { reason, .. }) if reason == "status 404"));
        assert!(caches.match_any(&get(&site("/"), Destination::Document)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_activate_rolls_over_version() {
        let caches = memory_storage().await;
        let network = ScriptedNetwork::new();
        let host = RecordingHost::new();
        caches.open("precache-v1").await.unwrap();
        caches.open("runtime").await.unwrap();
        caches.open("precache-v2").await.unwrap();

        let config = WorkerConfig { cache_version: "v2".into(), ..test_config() };
        let manager = manager(config, &caches, &network, &host);

        manager.activate(&ExtendableEvent::new()).await.unwrap();

        assert!(!caches.has("precache-v1").await.unwrap());
        assert!(caches.has("runtime").await.unwrap());
        assert!(caches.has("precache-v2").await.unwrap());
        assert_eq!(host.claims.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_purge_removes_unrelated_caches() {
        let caches = memory_storage().await;
        let network = ScriptedNetwork::new();
        let host = RecordingHost::new();
        caches.open("legacy-images").await.unwrap();
        caches.open("precache-v1").await.unwrap();
        let manager = manager(test_config(), &caches, &network, &host);

        let deleted = manager.purge_stale_caches().await;
        assert_eq!(deleted, vec!["legacy-images".to_string()]);
        assert_eq!(caches.keys().await.unwrap(), vec!["precache-v1".to_string()]);
    }

    #[tokio::test]
    async fn test_empty_manifest_installs() {
        let caches = memory_storage().await;
        let network = ScriptedNetwork::new();
        let host = RecordingHost::new();
        let config = WorkerConfig { precache_manifest: Vec::new(), ..test_config() };
        let manager = manager(config, &caches, &network, &host);

        assert_eq!(manager.precache().await.unwrap(), 0);
        assert!(caches.has("precache-v1").await.unwrap());
        assert_eq!(network.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_activate_skips_failed_deletion() {
        let caches = memory_storage().await;
        let network = ScriptedNetwork::new();
        let host = RecordingHost::new();
        caches.open("precache-v0").await.unwrap();
        caches.open("legacy-images").await.unwrap();
        caches.open("precache-v1").await.unwrap();

        let registry = FaultyRegistry { inner: caches.clone(), fail_keys: false, locked: "precache-v0" };
        let manager = LifecycleManager::new(Arc::new(test_config()), Arc::new(registry), network, host.clone());

        assert_eq!(manager.purge_stale_caches().await, vec!["legacy-images".to_string()]);

        manager.activate(&ExtendableEvent::new()).await.unwrap();
        assert!(caches.has("precache-v0").await.unwrap());
        assert!(!caches.has("legacy-images").await.unwrap());
        assert_eq!(host.claims.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_activate_claims_when_listing_fails() {
        let caches = memory_storage().await;
        let network = ScriptedNetwork::new();
        let host = RecordingHost::new();
        caches.open("precache-v0").await.unwrap();

        let registry = FaultyRegistry { inner: caches.clone(), fail_keys: true, locked: "" };
        let manager = LifecycleManager::new(Arc::new(test_config()), Arc::new(registry), network, host.clone());

        manager.activate(&ExtendableEvent::new()).await.unwrap();
        assert!(caches.has("precache-v0").await.unwrap());
        assert_eq!(host.claims.load(Ordering::SeqCst), 1);
    }
}
