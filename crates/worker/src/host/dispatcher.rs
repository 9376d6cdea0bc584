//! Event delivery and the worker state machine.

use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use sitecache_core::{Error, Request};

use super::{
    ExtendableEvent, FetchOutcome, LifecycleHandler, PushHandler, RequestInterceptor, SyncHandler, SyncOutcome,
};

/// Registration state of the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Parsed,
    Installing,
    Installed,
    Activating,
    Activated,
    /// Install failed; the host may retry installation.
    Redundant,
}

/// Host-side event source with the registered handlers.
pub struct Dispatcher {
    lifecycle: Arc<dyn LifecycleHandler>,
    interceptor: Arc<dyn RequestInterceptor>,
    sync: Option<Arc<dyn SyncHandler>>,
    push: Option<Arc<dyn PushHandler>>,
    state: Mutex<WorkerState>,
    /// Background work from fetch events, which answer before it finishes.
    in_flight: ExtendableEvent,
}

impl Dispatcher {
    pub fn new(lifecycle: Arc<dyn LifecycleHandler>, interceptor: Arc<dyn RequestInterceptor>) -> Self {
        Self {
            lifecycle,
            interceptor,
            sync: None,
            push: None,
            state: Mutex::new(WorkerState::Parsed),
            in_flight: ExtendableEvent::new(),
        }
    }

    pub fn with_sync(mut self, handler: Arc<dyn SyncHandler>) -> Self {
        self.sync = Some(handler);
        self
    }

    pub fn with_push(mut self, handler: Arc<dyn PushHandler>) -> Self {
        self.push = Some(handler);
        self
    }

    pub fn state(&self) -> WorkerState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, next: WorkerState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        tracing::debug!(from = ?*state, to = ?next, "worker state change");
        *state = next;
    }

    /// Move to `next` if the current state is one of `from`.
    fn transition(&self, from: &[WorkerState], next: WorkerState) -> Result<(), Error> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if !from.contains(&*state) {
            return Err(Error::InvalidState(format!("cannot enter {next:?} from {:?}", *state)));
        }
        tracing::debug!(from = ?*state, to = ?next, "worker state change");
        *state = next;
        Ok(())
    }

    /// Deliver the install event.
    ///
    /// On failure the worker becomes redundant and the error is returned to the host.
    pub async fn install(&self) -> Result<(), Error> {
        self.transition(&[WorkerState::Parsed, WorkerState::Redundant], WorkerState::Installing)?;

        let event = ExtendableEvent::new();
        let result = self.lifecycle.install(&event).await;
        event.settled().await;

        match &result {
            Ok(()) => self.set_state(WorkerState::Installed),
            Err(e) => {
                tracing::error!(error = %e, "install failed; worker is redundant");
                self.set_state(WorkerState::Redundant);
            }
        }
        result
    }

    /// Deliver the activate event.
    ///
    /// The worker is activated even when the handler reports an error.
    pub async fn activate(&self) -> Result<(), Error> {
        self.transition(&[WorkerState::Installed], WorkerState::Activating)?;

        let event = ExtendableEvent::new();
        let result = self.lifecycle.activate(&event).await;
        event.settled().await;

        if let Err(e) = &result {
            tracing::warn!(error = %e, "activate handler failed");
        }
        self.set_state(WorkerState::Activated);
        result
    }

    /// Deliver a fetch event.
    ///
    /// Requests pass through until the worker is activated. Background work
    /// started by the handler keeps running after the outcome is returned;
    /// [`Dispatcher::settle`] waits for it.
    pub async fn fetch(&self, request: &Request) -> Result<FetchOutcome, Error> {
        if self.state() != WorkerState::Activated {
            return Ok(FetchOutcome::Passthrough);
        }

        let event = ExtendableEvent::new();
        let result = self.interceptor.intercept(request, &event).await;
        self.in_flight.adopt(event);
        result
    }

    /// Deliver a deferred-sync event.
    pub async fn sync(&self, tag: &str) -> Result<SyncOutcome, Error> {
        let Some(handler) = &self.sync else {
            return Ok(SyncOutcome::Ignored);
        };
        let event = ExtendableEvent::new();
        let result = handler.sync(tag, &event).await;
        event.settled().await;
        result
    }

    /// Deliver a push event.
    pub async fn push(&self, payload: Option<&str>) -> Result<(), Error> {
        let Some(handler) = &self.push else {
            return Ok(());
        };
        let event = ExtendableEvent::new();
        let result = handler.push(payload, &event).await;
        event.settled().await;
        result
    }

    /// Wait for background work left behind by fetch events.
    pub async fn settle(&self) {
        self.in_flight.settled().await;
    }
}
