use serde::Deserialize;

/// Feed cache configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    /// Whether to use Redis. When false (or Redis is unreachable at startup)
    /// the server falls back to an in-process cache. Default: true.
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
    /// Redis connection URL. Default: "redis://localhost:6379".
    #[serde(default = "default_cache_url")]
    pub url: String,
    /// Lifetime of a cached feed page. Default: 300 (5 minutes).
    #[serde(default = "default_feed_ttl_secs")]
    pub feed_ttl_secs: u64,
    /// Attempts for a feed invalidation before giving up. Default: 3.
    #[serde(default = "default_invalidate_retries")]
    pub invalidate_retries: u8,
    /// Base delay for invalidation retries. Default: 100.
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// Upper bound for invalidation retry delay. Default: 2000.
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
}

fn default_cache_enabled() -> bool {
    true
}
fn default_cache_url() -> String {
    "redis://localhost:6379".into()
}
fn default_feed_ttl_secs() -> u64 {
    300
}
fn default_invalidate_retries() -> u8 {
    3
}
fn default_retry_base_delay_ms() -> u64 {
    100
}
fn default_retry_max_delay_ms() -> u64 {
    2000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            url: default_cache_url(),
            feed_ttl_secs: default_feed_ttl_secs(),
            invalidate_retries: default_invalidate_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
        }
    }
}

/// Which remote storage implementation backs uploads.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// pCloud-compatible HTTP API.
    #[default]
    Pcloud,
    /// Content-addressed directory tree, one subdirectory per account.
    Local,
}

/// Remote storage configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// Base URL of the provider API. Default: "https://api.pcloud.com".
    #[serde(default = "default_provider_base_url")]
    pub provider_base_url: String,
    /// Root directory for the local backend. Default: "./data/videos".
    #[serde(default = "default_local_path")]
    pub local_path: String,
    /// Public URL prefix the local backend hands out as stream links.
    #[serde(default = "default_local_public_url")]
    pub local_public_url: String,
    /// Upper bound for one upload, including the transfer. Default: 300.
    #[serde(default = "default_upload_timeout_secs")]
    pub upload_timeout_secs: u64,
    /// Upper bound for one link resolution. Default: 30.
    #[serde(default = "default_link_timeout_secs")]
    pub link_timeout_secs: u64,
    /// Largest request body accepted by the upload endpoint. Default: 4 GiB.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
}

fn default_provider_base_url() -> String {
    "https://api.pcloud.com".into()
}
fn default_local_path() -> String {
    "./data/videos".into()
}
fn default_local_public_url() -> String {
    "http://127.0.0.1:3000/media".into()
}
fn default_upload_timeout_secs() -> u64 {
    300
}
fn default_link_timeout_secs() -> u64 {
    30
}
fn default_max_upload_bytes() -> u64 {
    4 * 1024 * 1024 * 1024
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            provider_base_url: default_provider_base_url(),
            local_path: default_local_path(),
            local_public_url: default_local_public_url(),
            upload_timeout_secs: default_upload_timeout_secs(),
            link_timeout_secs: default_link_timeout_secs(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

/// Background link refresh configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct LinkRefreshConfig {
    /// Run the periodic sweep in this process. Default: true.
    #[serde(default = "default_link_refresh_enabled")]
    pub enabled: bool,
    /// Time between sweeps. Default: 1800 (30 minutes).
    #[serde(default = "default_link_refresh_interval_secs")]
    pub interval_secs: u64,
    /// Links expiring within this many seconds are refreshed. Default: 3600.
    #[serde(default = "default_refresh_window_secs")]
    pub refresh_window_secs: u64,
}

fn default_link_refresh_enabled() -> bool {
    true
}
fn default_link_refresh_interval_secs() -> u64 {
    1800
}
fn default_refresh_window_secs() -> u64 {
    3600
}

impl Default for LinkRefreshConfig {
    fn default() -> Self {
        Self {
            enabled: default_link_refresh_enabled(),
            interval_secs: default_link_refresh_interval_secs(),
            refresh_window_secs: default_refresh_window_secs(),
        }
    }
}
