//! Boundary between the worker and its host environment.
//!
//! The host delivers lifecycle, fetch, sync and push events through a
//! [`Dispatcher`]; worker components implement the handler traits and are
//! registered on it once at startup. The host, in turn, exposes the
//! [`HostControl`] and [`Notifier`] capabilities to the worker.

mod dispatcher;
mod extend;

pub use dispatcher::{Dispatcher, WorkerState};
pub use extend::ExtendableEvent;

use async_trait::async_trait;
use serde::Serialize;
use sitecache_core::{Error, Request, Response};

/// Worker-to-host control calls.
#[async_trait]
pub trait HostControl: Send + Sync {
    /// Activate as soon as install completes instead of waiting for old clients to close.
    async fn skip_waiting(&self) -> Result<(), Error>;

    /// Take control of every open client, replacing any previous worker.
    async fn claim_clients(&self) -> Result<(), Error>;
}

/// Presentation options for a system notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationOptions {
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub vibrate: Vec<u32>,
}

/// Displays system notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn show_notification(&self, title: &str, options: NotificationOptions) -> Result<(), Error>;
}

/// How the worker answered an intercepted request.
#[derive(Debug)]
pub enum FetchOutcome {
    /// Not intercepted; the host performs the request natively.
    Passthrough,
    /// Intercepted and answered.
    Respond(Response),
    /// Intercepted with nothing to serve; the host presents its own network failure.
    Unavailable,
}

impl FetchOutcome {
    pub fn into_response(self) -> Option<Response> {
        match self {
            FetchOutcome::Respond(response) => Some(response),
            FetchOutcome::Passthrough | FetchOutcome::Unavailable => None,
        }
    }
}

impl From<Option<Response>> for FetchOutcome {
    fn from(response: Option<Response>) -> Self {
        response.map_or(FetchOutcome::Unavailable, FetchOutcome::Respond)
    }
}

/// Result of a deferred-sync event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncOutcome {
    Handled,
    Ignored,
}

#[async_trait]
pub trait LifecycleHandler: Send + Sync {
    /// Prepare this worker version. An error discards the version.
    async fn install(&self, event: &ExtendableEvent) -> Result<(), Error>;

    /// Retire state left by previous versions and take over clients.
    async fn activate(&self, event: &ExtendableEvent) -> Result<(), Error>;
}

#[async_trait]
pub trait RequestInterceptor: Send + Sync {
    async fn intercept(&self, request: &Request, event: &ExtendableEvent) -> Result<FetchOutcome, Error>;
}

#[async_trait]
pub trait SyncHandler: Send + Sync {
    async fn sync(&self, tag: &str, event: &ExtendableEvent) -> Result<SyncOutcome, Error>;
}

#[async_trait]
pub trait PushHandler: Send + Sync {
    async fn push(&self, payload: Option<&str>, event: &ExtendableEvent) -> Result<(), Error>;
}
