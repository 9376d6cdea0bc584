//! Core types and shared functionality for sitecache.
//!
//! This crate provides:
//! - Named cache stores with a SQLite backend
//! - Single-read request/response types
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;
pub mod message;

pub use cache::{Cache, CacheDb, CacheStorage};
pub use config::{ConfigError, NotificationConfig, WorkerConfig};
pub use error::Error;
pub use message::{Destination, Request, Response};
