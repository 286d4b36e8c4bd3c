//! View attribution: turns player progress reports into view-count increments.

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use crate::catalog::CatalogStore;
use crate::entity::watch_session;
use crate::error::ServiceError;
use crate::feed::FeedCache;

/// Share of the video a session must have watched before it counts.
pub const VALID_VIEW_THRESHOLD: f64 = 30.0;

/// Percentage of the video watched, in `0..=100`.
///
/// A zero or negative video length yields `0`, never NaN.
pub fn watched_percentage(watch_duration_seconds: f64, video_duration_seconds: f64) -> f64 {
    if video_duration_seconds.is_nan()
        || video_duration_seconds <= 0.0
        || !watch_duration_seconds.is_finite()
    {
        return 0.0;
    }
    (watch_duration_seconds / video_duration_seconds * 100.0).clamp(0.0, 100.0)
}

/// A report increments the counter only when it is the first one at or
/// above the threshold for its session.
pub fn should_increment(previous: Option<f64>, current: f64) -> bool {
    let is_valid = current >= VALID_VIEW_THRESHOLD;
    let was_valid = previous.is_some_and(|p| p >= VALID_VIEW_THRESHOLD);
    is_valid && !was_valid
}

pub struct ViewAttributor {
    catalog: Arc<dyn CatalogStore>,
    feed: Arc<FeedCache>,
}

impl ViewAttributor {
    pub fn new(catalog: Arc<dyn CatalogStore>, feed: Arc<FeedCache>) -> Self {
        Self { catalog, feed }
    }

    /// Record progress for `(session_id, video_id)` and report whether the
    /// video's view counter moved.
    ///
    /// The feed is invalidated only after the increment is persisted; a
    /// failed write returns `Persistence` and leaves the cache alone.
    pub async fn track_view(
        &self,
        video_id: Uuid,
        session_id: &str,
        watch_duration_seconds: f64,
        video_duration_seconds: f64,
    ) -> Result<bool, ServiceError> {
        let percentage = watched_percentage(watch_duration_seconds, video_duration_seconds);
        let now = Utc::now();

        let session = watch_session::Model {
            id: Uuid::now_v7(),
            session_id: session_id.to_string(),
            video_id,
            watched_percentage: percentage,
            watch_duration_seconds: watch_duration_seconds.clamp(0.0, i32::MAX as f64) as i32,
            created_at: now,
            updated_at: now,
        };

        let incremented = self
            .catalog
            .commit_watch_progress(session, should_increment)
            .await?;

        if incremented {
            debug!(%video_id, session_id, percentage, "View counted");
            self.feed.invalidate_feed().await;
        }

        Ok(incremented)
    }
}
