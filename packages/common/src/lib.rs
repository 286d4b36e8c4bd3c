pub mod config;
pub mod retry;
pub mod storage;

pub use config::{CacheConfig, LinkRefreshConfig, StorageBackend, StorageConfig};
