//! Scripted network and recording host shared by the worker tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use http::{HeaderMap, HeaderValue, StatusCode, header};
use sitecache_client::Fetcher;
use sitecache_core::{CacheDb, CacheStorage, Destination, Error, Request, Response, WorkerConfig};

use crate::host::{HostControl, NotificationOptions, Notifier};

pub(crate) const ORIGIN: &str = "https://sogin.example";

pub(crate) fn test_config() -> WorkerConfig {
    WorkerConfig {
        origin: ORIGIN.into(),
        cache_prefix: "precache".into(),
        cache_version: "v1".into(),
        runtime_cache: "runtime".into(),
        precache_manifest: vec!["/".into(), "/index.html".into(), "/images/logo.png".into()],
        ..Default::default()
    }
}

pub(crate) async fn memory_storage() -> CacheStorage {
    CacheStorage::new(CacheDb::open_in_memory().await.unwrap())
}

/// Absolute URL on the test origin.
pub(crate) fn site(path: &str) -> String {
    format!("{ORIGIN}{path}")
}

pub(crate) fn get(url: &str, destination: Destination) -> Request {
    Request::parse("GET", url, destination).unwrap()
}

struct Route {
    status: StatusCode,
    content_type: &'static str,
    body: Vec<u8>,
}

/// A network whose responses are registered up front.
///
/// Unregistered URLs and every URL while offline fail at the transport level.
#[derive(Default)]
pub(crate) struct ScriptedNetwork {
    routes: Mutex<HashMap<String, Route>>,
    offline: AtomicBool,
    calls: Mutex<Vec<String>>,
}

impl ScriptedNetwork {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn serve(&self, url: &str, content_type: &'static str, body: &str) {
        self.routes.lock().unwrap().insert(
            url.to_string(),
            Route { status: StatusCode::OK, content_type, body: body.as_bytes().to_vec() },
        );
    }

    pub(crate) fn serve_status(&self, url: &str, status: StatusCode) {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), Route { status, content_type: "text/plain", body: Vec::new() });
    }

    pub(crate) fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub(crate) fn calls_to(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|u| u.as_str() == url).count()
    }

    pub(crate) fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Fetcher for ScriptedNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, Error> {
        let url = request.url().as_str().to_string();
        self.calls.lock().unwrap().push(url.clone());

        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::Network(format!("offline: {url}")));
        }

        let routes = self.routes.lock().unwrap();
        let route = routes
            .get(&url)
            .ok_or_else(|| Error::Network(format!("connection refused: {url}")))?;
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(route.content_type));
        Ok(Response::new(route.status, headers, route.body.clone()))
    }
}

/// Host that records every control call and notification.
#[derive(Default)]
pub(crate) struct RecordingHost {
    pub(crate) skipped_waiting: AtomicBool,
    pub(crate) claims: AtomicUsize,
    pub(crate) notifications: Mutex<Vec<(String, NotificationOptions)>>,
}

impl RecordingHost {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl HostControl for RecordingHost {
    async fn skip_waiting(&self) -> Result<(), Error> {
        self.skipped_waiting.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn claim_clients(&self) -> Result<(), Error> {
        self.claims.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl Notifier for RecordingHost {
    async fn show_notification(&self, title: &str, options: NotificationOptions) -> Result<(), Error> {
        self.notifications.lock().unwrap().push((title.to_string(), options));
        Ok(())
    }
}
