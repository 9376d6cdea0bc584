//! Worker configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (SITECACHE_*)
//! 2. TOML config file (if SITECACHE_CONFIG_FILE set)
//! 3. Built-in defaults
//!
//! The loaded value is immutable and handed to each component at construction.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use url::Url;

mod validation;

pub use validation::ConfigError;

/// Worker configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (SITECACHE_*)
/// 2. TOML config file (if SITECACHE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Origin of the site this worker serves (scheme, host and port).
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Name prefix of the versioned precache store.
    #[serde(default = "default_cache_prefix")]
    pub cache_prefix: String,

    /// Version identifier embedded in the precache store name.
    ///
    /// Bumping it retires the previous precache store on the next activation.
    #[serde(default = "default_cache_version")]
    pub cache_version: String,

    /// Name of the unversioned runtime store.
    #[serde(default = "default_runtime_cache")]
    pub runtime_cache: String,

    /// Site-relative paths stored at install time.
    #[serde(default = "default_precache_manifest")]
    pub precache_manifest: Vec<String>,

    /// Third-party asset hosts whose responses are cached.
    #[serde(default = "default_cdn_hosts")]
    pub cdn_hosts: Vec<String>,

    /// Path to SQLite cache database.
    ///
    /// Set via SITECACHE_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// User-Agent string for network requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Network request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum bytes to fetch per request.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// Largest body a single cache entry may hold.
    #[serde(default = "default_max_entry_bytes")]
    pub max_entry_bytes: usize,

    /// Deferred-sync tag that triggers the submission routine.
    #[serde(default = "default_sync_tag")]
    pub sync_tag: String,

    #[serde(default)]
    pub notification: NotificationConfig,
}

/// Fixed presentation of push notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationConfig {
    #[serde(default = "default_notification_title")]
    pub title: String,

    /// Body used when the push carries no payload.
    #[serde(default = "default_notification_body")]
    pub default_body: String,

    #[serde(default = "default_notification_icon")]
    pub icon: String,

    #[serde(default = "default_notification_icon")]
    pub badge: String,

    /// Vibration pattern in milliseconds (on, off, on, ...).
    #[serde(default = "default_vibrate")]
    pub vibrate: Vec<u32>,
}

fn default_origin() -> String {
    "http://localhost:8080".into()
}

fn default_cache_prefix() -> String {
    "sogin".into()
}

fn default_cache_version() -> String {
    "v1.0.0".into()
}

fn default_runtime_cache() -> String {
    "sogin-runtime".into()
}

fn default_precache_manifest() -> Vec<String> {
    ["/", "/index.html", "/images/sogin-logo.png", "/images/sogin-product.png", "/images/sgp-logo.png"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_cdn_hosts() -> Vec<String> {
    ["cdn.tailwindcss.com", "unpkg.com", "fonts.googleapis.com", "fonts.gstatic.com"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./sitecache.sqlite")
}

fn default_user_agent() -> String {
    "sitecache/0.1".into()
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_max_bytes() -> usize {
    5_242_880 // 5MB
}

fn default_max_entry_bytes() -> usize {
    5_242_880
}

fn default_sync_tag() -> String {
    "sync-newsletter".into()
}

fn default_notification_title() -> String {
    "Sogin Pain Relief".into()
}

fn default_notification_body() -> String {
    "New update from Sogin".into()
}

fn default_notification_icon() -> String {
    "/images/sogin-logo.png".into()
}

fn default_vibrate() -> Vec<u32> {
    vec![200, 100, 200]
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            title: default_notification_title(),
            default_body: default_notification_body(),
            icon: default_notification_icon(),
            badge: default_notification_icon(),
            vibrate: default_vibrate(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            origin: default_origin(),
            cache_prefix: default_cache_prefix(),
            cache_version: default_cache_version(),
            runtime_cache: default_runtime_cache(),
            precache_manifest: default_precache_manifest(),
            cdn_hosts: default_cdn_hosts(),
            db_path: default_db_path(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            max_bytes: default_max_bytes(),
            max_entry_bytes: default_max_entry_bytes(),
            sync_tag: default_sync_tag(),
            notification: NotificationConfig::default(),
        }
    }
}

impl WorkerConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Name of the precache store for the current version.
    pub fn precache_cache(&self) -> String {
        format!("{}-{}", self.cache_prefix, self.cache_version)
    }

    /// Whether a store name belongs to the current worker version.
    pub fn is_current_cache(&self, name: &str) -> bool {
        name == self.runtime_cache || name == self.precache_cache()
    }

    /// The site origin as a parsed URL.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if `origin` is not an absolute http(s) URL.
    pub fn origin_url(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.origin)
            .map_err(|e| ConfigError::Invalid { field: "origin".into(), reason: e.to_string() })?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            scheme => {
                Err(ConfigError::Invalid { field: "origin".into(), reason: format!("unsupported scheme: {scheme}") })
            }
        }
    }

    /// Absolute URLs of the precache manifest, in manifest order.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if the origin or an entry cannot be resolved.
    pub fn precache_urls(&self) -> Result<Vec<Url>, ConfigError> {
        let origin = self.origin_url()?;
        self.precache_manifest
            .iter()
            .map(|path| {
                origin.join(path).map_err(|e| ConfigError::Invalid {
                    field: "precache_manifest".into(),
                    reason: format!("{path}: {e}"),
                })
            })
            .collect()
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `SITECACHE_`
    /// 2. TOML file from `SITECACHE_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("SITECACHE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("SITECACHE_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
