//! Deferred newsletter submissions.

use async_trait::async_trait;
use sitecache_core::Error;

use crate::host::{ExtendableEvent, SyncHandler, SyncOutcome};

/// Runs the submission routine when the configured sync tag fires.
///
/// Submissions are not persisted, so the routine has nothing to replay and
/// only records that it ran.
pub struct DeferredSubmissions {
    tag: String,
}

impl DeferredSubmissions {
    pub fn new(tag: impl Into<String>) -> Self {
        Self { tag: tag.into() }
    }

    async fn submit_pending(&self) -> Result<(), Error> {
        tracing::info!(tag = %self.tag, "syncing deferred newsletter submissions");
        Ok(())
    }
}

#[async_trait]
impl SyncHandler for DeferredSubmissions {
    async fn sync(&self, tag: &str, _event: &ExtendableEvent) -> Result<SyncOutcome, Error> {
        if tag != self.tag {
            tracing::debug!(tag, "ignoring unknown sync tag");
            return Ok(SyncOutcome::Ignored);
        }
        self.submit_pending().await?;
        Ok(SyncOutcome::Handled)
    }
}
