//! Wiring of the worker components onto a dispatcher.

use std::sync::Arc;

use sitecache_client::Fetcher;
use sitecache_core::{CacheDb, CacheStorage, Error, WorkerConfig};

use crate::host::{Dispatcher, HostControl, Notifier};
use crate::lifecycle::LifecycleManager;
use crate::push::NotificationPresenter;
use crate::router::RequestRouter;
use crate::sync::DeferredSubmissions;

/// Build a dispatcher with every worker handler registered.
///
/// # Errors
///
/// Returns `Error::Config` if the configured origin is unusable.
pub fn build_dispatcher<H>(
    config: Arc<WorkerConfig>, db: CacheDb, network: Arc<dyn Fetcher>, host: Arc<H>,
) -> Result<Dispatcher, Error>
where
    H: HostControl + Notifier + 'static,
{
    let caches = CacheStorage::new(db).with_max_entry_bytes(config.max_entry_bytes);

    let lifecycle =
        LifecycleManager::new(Arc::clone(&config), Arc::new(caches.clone()), Arc::clone(&network), host.clone());
    let router = RequestRouter::new(Arc::clone(&config), caches, network)?;
    let sync = DeferredSubmissions::new(config.sync_tag.clone());
    let push = NotificationPresenter::new(config.notification.clone(), host);

    Ok(Dispatcher::new(Arc::new(lifecycle), Arc::new(router))
        .with_sync(Arc::new(sync))
        .with_push(Arc::new(push)))
}
