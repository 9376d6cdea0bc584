//! Configuration validation rules.
//!
//! This module provides validation logic for `WorkerConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::WorkerConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

impl WorkerConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `origin` is not an absolute http(s) URL
    /// - a store name or the version is empty, or the two store names collide
    /// - a manifest entry is not site-relative
    /// - a CDN host is empty or carries a scheme
    /// - `max_bytes`, `max_entry_bytes` or `timeout_ms` are out of range
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.origin_url()?;

        if self.cache_prefix.is_empty() {
            return Err(ConfigError::Invalid { field: "cache_prefix".into(), reason: "must not be empty".into() });
        }
        if self.cache_version.is_empty() {
            return Err(ConfigError::Invalid { field: "cache_version".into(), reason: "must not be empty".into() });
        }
        if self.runtime_cache.is_empty() {
            return Err(ConfigError::Invalid { field: "runtime_cache".into(), reason: "must not be empty".into() });
        }
        if self.runtime_cache == self.precache_cache() {
            return Err(ConfigError::Invalid {
                field: "runtime_cache".into(),
                reason: "must differ from the precache store name".into(),
            });
        }

        if let Some(path) = self.precache_manifest.iter().find(|p| !p.starts_with('/')) {
            return Err(ConfigError::Invalid {
                field: "precache_manifest".into(),
                reason: format!("{path:?} is not a site-relative path"),
            });
        }

        if let Some(host) = self.cdn_hosts.iter().find(|h| h.is_empty() || h.contains("://") || h.contains('/')) {
            return Err(ConfigError::Invalid {
                field: "cdn_hosts".into(),
                reason: format!("{host:?} must be a bare host name"),
            });
        }

        if self.max_bytes == 0 {
            return Err(ConfigError::Invalid { field: "max_bytes".into(), reason: "must be greater than 0".into() });
        }
        if self.max_bytes > 50 * 1024 * 1024 {
            return Err(ConfigError::Invalid { field: "max_bytes".into(), reason: "must not exceed 50MB".into() });
        }
        if self.max_entry_bytes == 0 {
            return Err(ConfigError::Invalid {
                field: "max_entry_bytes".into(),
                reason: "must be greater than 0".into(),
            });
        }

        if self.timeout_ms < 100 {
            return Err(ConfigError::Invalid { field: "timeout_ms".into(), reason: "must be at least 100ms".into() });
        }
        if self.timeout_ms > 300_000 {
            return Err(ConfigError::Invalid {
                field: "timeout_ms".into(),
                reason: "must not exceed 5 minutes (300000ms)".into(),
            });
        }

        if self.user_agent.is_empty() {
            return Err(ConfigError::Invalid { field: "user_agent".into(), reason: "must not be empty".into() });
        }

        if self.max_entry_bytes < self.max_bytes {
            tracing::warn!(
                max_bytes = self.max_bytes,
                max_entry_bytes = self.max_entry_bytes,
                "max_entry_bytes is below max_bytes; large fetched responses will not be cached"
            );
        }

        Ok(())
    }
}
