//! Request classification and routing.
//!
//! Every intercepted request is classified into a [`Route`] by a pure,
//! ordered rule list; the first matching rule wins. Each route maps to one of
//! the caching strategies in [`strategy`].

mod strategy;

use std::sync::Arc;

use async_trait::async_trait;
use sitecache_client::{Fetcher, host_matches, is_same_origin};
use sitecache_core::{CacheStorage, Destination, Error, Request, WorkerConfig};
use url::Url;

use crate::host::{ExtendableEvent, FetchOutcome, RequestInterceptor};

pub use strategy::{OFFLINE_IMAGE_SVG, offline_image};

/// Routing decision for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Not intercepted.
    Passthrough,
    /// Cross-origin asset from an allow-listed host; cache-first.
    ThirdPartyAsset,
    /// Same-origin image; cache-first with an offline placeholder.
    Image,
    /// Same-origin document; network-first.
    Document,
    /// Any other same-origin request; stale-while-revalidate.
    Asset,
}

pub struct RequestRouter {
    config: Arc<WorkerConfig>,
    origin: Url,
    caches: CacheStorage,
    network: Arc<dyn Fetcher>,
}

impl RequestRouter {
    /// # Errors
    ///
    /// Returns `Error::Config` if the configured origin is not an http(s) URL.
    pub fn new(config: Arc<WorkerConfig>, caches: CacheStorage, network: Arc<dyn Fetcher>) -> Result<Self, Error> {
        let origin = config.origin_url()?;
        Ok(Self { config, origin, caches, network })
    }

    /// Pick the route for a request without touching the cache or network.
    pub fn classify(&self, request: &Request) -> Route {
        if !request.is_get() {
            return Route::Passthrough;
        }

        if !is_same_origin(request.url(), &self.origin) {
            return if host_matches(request.url(), &self.config.cdn_hosts) {
                Route::ThirdPartyAsset
            } else {
                Route::Passthrough
            };
        }

        match request.destination() {
            Destination::Image => Route::Image,
            Destination::Document => Route::Document,
            _ => Route::Asset,
        }
    }

    /// Answer a request with the strategy its route selects.
    pub async fn route(&self, request: &Request, event: &ExtendableEvent) -> Result<FetchOutcome, Error> {
        let route = self.classify(request);
        tracing::debug!(url = %request.url(), ?route, "routing request");

        match route {
            Route::Passthrough => Ok(FetchOutcome::Passthrough),
            Route::ThirdPartyAsset => self.cache_first(request, event).await.map(FetchOutcome::Respond),
            Route::Image => match self.cache_first(request, event).await {
                Ok(response) => Ok(FetchOutcome::Respond(response)),
                Err(e) => {
                    tracing::debug!(url = %request.url(), error = %e, "serving offline image");
                    Ok(FetchOutcome::Respond(offline_image()))
                }
            },
            Route::Document => Ok(self.network_first(request, event).await.into()),
            Route::Asset => Ok(self.stale_while_revalidate(request, event).await.into()),
        }
    }
}

#[async_trait]
impl RequestInterceptor for RequestRouter {
    async fn intercept(&self, request: &Request, event: &ExtendableEvent) -> Result<FetchOutcome, Error> {
        self.route(request, event).await
    }
}
