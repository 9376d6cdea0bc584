//! Caching strategies.
//!
//! Reads search every store, oldest first, so precached assets are served
//! for any route. Writes go to the runtime store only and always happen in
//! the background, registered on the event so the host can wait for them.

use std::sync::Arc;

use sitecache_client::Fetcher;
use sitecache_core::{CacheStorage, Error, Request, Response};

use super::RequestRouter;
use crate::host::ExtendableEvent;

/// Placeholder served for images that are neither cached nor reachable.
pub const OFFLINE_IMAGE_SVG: &str = concat!(
    r##"<svg width="400" height="400" xmlns="http://www.w3.org/2000/svg">"##,
    r##"<rect width="400" height="400" fill="#0077b3"/>"##,
    r##"<text x="50%" y="50%" text-anchor="middle" fill="white" font-size="20">Image Offline</text>"##,
    "</svg>",
);

pub fn offline_image() -> Response {
    Response::with_content_type("image/svg+xml", OFFLINE_IMAGE_SVG)
}

/// Fetch a request and write the response into the runtime store.
async fn refresh(
    network: Arc<dyn Fetcher>, caches: CacheStorage, runtime: String, request: Request,
) -> Result<(), Error> {
    let response = network.fetch(&request).await?;
    caches.open(&runtime).await?.put(&request, response).await
}

impl RequestRouter {
    /// Cross-store lookup; lookup failures count as a miss.
    async fn lookup(&self, request: &Request) -> Option<Response> {
        match self.caches.match_any(request).await {
            Ok(hit) => hit,
            Err(e) => {
                tracing::warn!(url = %request.url(), error = %e, "cache lookup failed");
                None
            }
        }
    }

    fn store_in_background(&self, event: &ExtendableEvent, request: &Request, response: Response) {
        let caches = self.caches.clone();
        let runtime = self.config.runtime_cache.clone();
        let request = request.clone();
        event.wait_until("runtime-store", async move { caches.open(&runtime).await?.put(&request, response).await });
    }

    /// Fetch from the network, keep one copy for the runtime store and return the other.
    async fn fetch_and_fill(&self, request: &Request, event: &ExtendableEvent) -> Result<Response, Error> {
        let response = self.network.fetch(request).await?;
        let (served, stored) = response.duplicate()?;
        self.store_in_background(event, request, stored);
        Ok(served)
    }

    /// Serve from cache without touching the network; fetch and fill on a miss.
    pub(super) async fn cache_first(&self, request: &Request, event: &ExtendableEvent) -> Result<Response, Error> {
        if let Some(hit) = self.lookup(request).await {
            tracing::debug!(url = %request.url(), "cache hit");
            return Ok(hit);
        }
        self.fetch_and_fill(request, event).await
    }

    /// Prefer the network; fall back to any cached copy when it fails.
    pub(super) async fn network_first(&self, request: &Request, event: &ExtendableEvent) -> Option<Response> {
        match self.fetch_and_fill(request, event).await {
            Ok(response) => Some(response),
            Err(e) => {
                tracing::debug!(url = %request.url(), error = %e, "network failed; trying cache");
                self.lookup(request).await
            }
        }
    }

    /// Serve the cached copy at once and refresh it in the background.
    ///
    /// On a miss the network response is awaited and stored.
    pub(super) async fn stale_while_revalidate(
        &self, request: &Request, event: &ExtendableEvent,
    ) -> Option<Response> {
        if let Some(hit) = self.lookup(request).await {
            event.wait_until(
                "revalidate",
                refresh(
                    Arc::clone(&self.network),
                    self.caches.clone(),
                    self.config.runtime_cache.clone(),
                    request.clone(),
                ),
            );
            return Some(hit);
        }

        match self.fetch_and_fill(request, event).await {
            Ok(response) => Some(response),
            Err(e) => {
                tracing::debug!(url = %request.url(), error = %e, "asset unavailable");
                None
            }
        }
    }
}
