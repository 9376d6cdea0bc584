//! Errors of the stdio host.
//!
//! Worker errors are reported back to the host as event reports; these cover
//! the transport itself.

use sitecache_core::Error;

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// An input line is not a valid event.
    #[error("INVALID_EVENT: {0}")]
    InvalidEvent(String),

    /// Reading stdin or writing stdout failed.
    #[error("IO_ERROR: {0}")]
    Io(#[from] std::io::Error),

    /// The report writer stopped before the host finished.
    #[error("OUTPUT_CLOSED: report channel closed")]
    OutputClosed,

    #[error(transparent)]
    Worker(#[from] Error),
}

impl From<serde_json::Error> for HostError {
    fn from(err: serde_json::Error) -> Self {
        HostError::InvalidEvent(err.to_string())
    }
}
