//! SQLite-backed named cache stores.
//!
//! This module provides persistent request→response stores using SQLite
//! with async access via tokio-rusqlite. It supports:
//!
//! - Lazily created, named stores that survive restarts until deleted
//! - Request identity keyed by SHA-256 of method and URL
//! - Transactional batch writes for all-or-nothing population
//! - Automatic schema migrations and WAL mode

pub mod connection;
pub mod hash;
pub mod migrations;
pub mod storage;

pub use crate::Error;

pub use connection::CacheDb;
pub use storage::{Cache, CacheStorage};
