//! Network client for sitecache.
//!
//! This crate provides the `Fetcher` seam between the worker and the network,
//! its reqwest implementation, and URL/origin helpers used by the router.

pub mod fetch;

pub use fetch::{FetchClient, FetchConfig, Fetcher, UrlError, canonicalize, host_matches, is_same_origin};
