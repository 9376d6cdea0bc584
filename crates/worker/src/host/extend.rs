//! Lifetime extension for event handlers.
//!
//! Work that must finish before an event counts as done, but that the
//! response path does not wait for (background cache writes), is spawned
//! through [`ExtendableEvent::wait_until`]. The host awaits
//! [`ExtendableEvent::settled`] before it considers the event finished.

use std::future::Future;
use std::sync::{Mutex, PoisonError};

use sitecache_core::Error;
use tokio::task::JoinHandle;

/// Tracks background tasks registered while handling one event.
///
/// Dropping the event detaches its tasks rather than aborting them.
#[derive(Debug, Default)]
pub struct ExtendableEvent {
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ExtendableEvent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `task` and keep the event alive until it completes.
    ///
    /// Failures are logged under `label`; they never reach the caller.
    pub fn wait_until<F>(&self, label: &'static str, task: F)
    where
        F: Future<Output = Result<(), Error>> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            if let Err(e) = task.await {
                tracing::warn!(task = label, error = %e, "background task failed");
            }
        });
        self.lock().push(handle);
    }

    /// Number of registered tasks not yet awaited.
    pub fn pending(&self) -> usize {
        self.lock().len()
    }

    /// Move another event's pending tasks into this one.
    ///
    /// Handles of tasks that already finished are dropped, so a long-lived
    /// event only holds work that is still running.
    pub fn adopt(&self, other: ExtendableEvent) {
        let tasks = other.tasks.into_inner().unwrap_or_else(PoisonError::into_inner);
        let mut held = self.lock();
        held.retain(|task| !task.is_finished());
        held.extend(tasks.into_iter().filter(|task| !task.is_finished()));
    }

    /// Wait for every registered task, including tasks registered while waiting.
    pub async fn settled(&self) {
        loop {
            let tasks = std::mem::take(&mut *self.lock());
            if tasks.is_empty() {
                return;
            }
            for task in tasks {
                if let Err(e) = task.await {
                    tracing::error!(error = %e, "background task panicked");
                }
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
