use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use common::retry::{RetryPolicy, retry_with_backoff};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::catalog::{CatalogError, CatalogStore};
use crate::models::video::VideoResponse;

use super::score::rank_page;

/// Every feed key starts with this prefix; invalidation clears all of them.
pub const FEED_KEY_PREFIX: &str = "feed:";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("cache entry codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("cache backend unavailable")]
    Unavailable,
}

/// Key-value store holding serialized feed pages.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Delete every key starting with `prefix`, returning how many went away.
    async fn delete_prefix(&self, prefix: &str) -> Result<u64, CacheError>;
}

/// One ranked feed page plus the total number of published videos.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedPage {
    pub videos: Vec<VideoResponse>,
    pub total: u64,
}

/// Cache-aside wrapper around the published-video listing.
///
/// Cache failures never reach the caller: reads degrade to a miss and
/// writes or invalidations are logged and dropped. The TTL bounds how long
/// a lost invalidation can leave stale pages visible.
pub struct FeedCache {
    backend: Arc<dyn CacheBackend>,
    catalog: Arc<dyn CatalogStore>,
    ttl: Duration,
    invalidate_policy: RetryPolicy,
    /// Bumped on every invalidation. A page computed across a bump is not
    /// written back, and one whose write raced a bump is deleted again, so
    /// this process never leaves behind a page it just cleared. Writers in
    /// other processes are bounded only by the TTL.
    generation: AtomicU64,
}

impl FeedCache {
    pub fn new(
        backend: Arc<dyn CacheBackend>,
        catalog: Arc<dyn CatalogStore>,
        ttl: Duration,
        invalidate_policy: RetryPolicy,
    ) -> Self {
        Self {
            backend,
            catalog,
            ttl,
            invalidate_policy,
            generation: AtomicU64::new(0),
        }
    }

    /// Format: `feed:page:{page}:limit:{per_page}`
    fn page_key(page: u64, per_page: u64) -> String {
        format!("{FEED_KEY_PREFIX}page:{page}:limit:{per_page}")
    }

    /// Fetch one ranked page, from cache when possible.
    ///
    /// Only catalog failures are returned as errors.
    pub async fn get_feed_page(&self, page: u64, per_page: u64) -> Result<FeedPage, CatalogError> {
        let key = Self::page_key(page, per_page);

        match self.backend.get(&key).await {
            Ok(Some(raw)) => match serde_json::from_str::<FeedPage>(&raw) {
                Ok(cached) => {
                    debug!(page, per_page, "Feed cache HIT");
                    return Ok(cached);
                }
                Err(e) => warn!(key = %key, error = %e, "Discarding undecodable feed cache entry"),
            },
            Ok(None) => debug!(page, per_page, "Feed cache MISS"),
            Err(e) => warn!(key = %key, error = %e, "Feed cache read failed, treating as miss"),
        }

        let generation = self.generation.load(Ordering::Acquire);

        let (videos, total) = self
            .catalog
            .list_published_videos_page(page, per_page)
            .await?;
        let fresh = FeedPage {
            videos: rank_page(videos, Utc::now())
                .into_iter()
                .map(VideoResponse::from)
                .collect(),
            total,
        };

        if page > 1 && fresh.videos.is_empty() {
            debug!(page, per_page, "Feed page past the end, not caching");
            return Ok(fresh);
        }
        if self.generation.load(Ordering::Acquire) != generation {
            debug!(page, per_page, "Feed invalidated during computation, not caching");
            return Ok(fresh);
        }

        match serde_json::to_string(&fresh) {
            Ok(raw) => {
                if let Err(e) = self.backend.set(&key, raw, self.ttl).await {
                    warn!(key = %key, error = %e, "Feed cache write failed");
                } else if self.generation.load(Ordering::Acquire) != generation {
                    debug!(page, per_page, "Feed invalidated during cache write, dropping entry");
                    if let Err(e) = self.backend.delete(&key).await {
                        warn!(key = %key, error = %e, "Failed to drop stale feed cache entry");
                    }
                }
            }
            Err(e) => warn!(key = %key, error = %e, "Failed to serialize feed page for cache"),
        }

        Ok(fresh)
    }

    /// Remove every cached feed page.
    ///
    /// Retries with backoff, then logs and gives up.
    pub async fn invalidate_feed(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);

        let backend = &self.backend;
        let result = retry_with_backoff(self.invalidate_policy, "feed invalidation", move || async move {
            backend.delete_prefix(FEED_KEY_PREFIX).await
        })
        .await;

        match result {
            Ok(deleted) => debug!(deleted, "Feed cache INVALIDATE"),
            Err(e) => error!(
                error = %e,
                ttl_secs = self.ttl.as_secs(),
                "Feed invalidation failed, cached pages stay stale until they expire"
            ),
        }
    }
}
