//! Offline caching worker for a single static site.
//!
//! The worker precaches the site's core assets at install, retires caches of
//! older versions at activation, and answers intercepted requests with a
//! per-route caching strategy. Handlers are registered on a
//! [`host::Dispatcher`], which plays the role of the hosting environment.

pub mod error;
pub mod host;
pub mod lifecycle;
pub mod push;
pub mod router;
pub mod service;
pub mod sync;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use error::HostError;
pub use host::{Dispatcher, ExtendableEvent, FetchOutcome, WorkerState};
pub use service::build_dispatcher;
