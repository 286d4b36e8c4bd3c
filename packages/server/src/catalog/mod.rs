//! Durable store for videos, watch sessions, likes and storage accounts.

mod memory;
mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::DbErr;
use thiserror::Error;
use uuid::Uuid;

use crate::entity::{storage_account, video, watch_session};

pub use memory::{Fault, MemoryCatalog};
pub use postgres::PgCatalog;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("database error: {0}")]
    Database(#[from] DbErr),

    /// The store answered, but the data broke one of its own invariants.
    #[error("inconsistent catalog state: {0}")]
    Inconsistent(String),
}

/// Narrows a published-video listing. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VideoFilter {
    /// Case-insensitive substring of the title or description.
    pub keyword: Option<String>,
    /// Exact tag.
    pub tag: Option<String>,
    /// Exact category name.
    pub category: Option<String>,
}

/// Row offset of a 1-based page.
pub fn page_offset(page: u64, per_page: u64) -> u64 {
    page.saturating_sub(1).saturating_mul(per_page)
}

/// Decides from the previous and current watched percentage whether a
/// progress report counts as a new view.
pub type ViewDecision = fn(Option<f64>, f64) -> bool;

#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn get_video(&self, id: Uuid) -> Result<Option<video::Model>, CatalogError>;

    async fn find_video_by_wrapper_token(
        &self,
        token: &str,
    ) -> Result<Option<video::Model>, CatalogError>;

    /// Insert the video, or replace every column of the existing row.
    async fn save_video(&self, video: video::Model) -> Result<video::Model, CatalogError>;

    /// Returns `false` when no such video existed.
    async fn delete_video(&self, id: Uuid) -> Result<bool, CatalogError>;

    async fn increment_view_count(&self, id: Uuid) -> Result<(), CatalogError>;

    /// Record a like and bump the counter in one atomic step.
    ///
    /// Returns the new like count, or `None` if the user already liked the
    /// video. On error neither the like nor the counter changes.
    async fn like_video(&self, video_id: Uuid, user_id: Uuid) -> Result<Option<i64>, CatalogError>;

    /// Remove a like and lower the counter in one atomic step. The counter
    /// never goes below zero. Returns `None` if there was no like.
    async fn unlike_video(
        &self,
        video_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<i64>, CatalogError>;

    async fn is_liked(&self, video_id: Uuid, user_id: Uuid) -> Result<bool, CatalogError>;

    /// One page of published videos the user liked, newest first, plus how
    /// many there are in total.
    async fn list_liked_videos(
        &self,
        user_id: Uuid,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<video::Model>, u64), CatalogError>;

    async fn find_watch_session(
        &self,
        session_id: &str,
        video_id: Uuid,
    ) -> Result<Option<watch_session::Model>, CatalogError>;

    /// Create the row for `(session_id, video_id)` or overwrite its progress.
    async fn upsert_watch_session(&self, session: watch_session::Model) -> Result<(), CatalogError>;

    /// Store new progress for a session and, if `decide` says so, bump the
    /// video's view counter.
    ///
    /// Implementations must serialize calls for the same
    /// `(session_id, video_id)` pair, otherwise two concurrent threshold
    /// crossings can both increment. Returns whether the counter moved.
    ///
    /// The default does the read, the upsert and the increment as three
    /// separate calls and is only correct for single-writer stores.
    async fn commit_watch_progress(
        &self,
        session: watch_session::Model,
        decide: ViewDecision,
    ) -> Result<bool, CatalogError> {
        let previous = self
            .find_watch_session(&session.session_id, session.video_id)
            .await?
            .map(|s| s.watched_percentage);
        let increment = decide(previous, session.watched_percentage);
        let video_id = session.video_id;

        self.upsert_watch_session(session).await?;
        if increment {
            self.increment_view_count(video_id).await?;
        }
        Ok(increment)
    }

    /// One page (1-based) of published videos ordered by `published_at DESC,
    /// view_count DESC`, plus the total number of published videos.
    async fn list_published_videos_page(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<video::Model>, u64), CatalogError>;

    /// One page of published videos matching every set field of `filter`,
    /// most viewed first, plus the number of matches.
    async fn search_videos(
        &self,
        filter: &VideoFilter,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<video::Model>, u64), CatalogError>;

    /// Up to `limit` published videos other than `video`, most viewed first.
    ///
    /// Only videos in the same category or sharing a tag qualify. A video
    /// with neither has every other published video as a candidate.
    async fn list_related_videos(
        &self,
        video: &video::Model,
        limit: u64,
    ) -> Result<Vec<video::Model>, CatalogError>;

    async fn list_storage_accounts(
        &self,
        active_only: bool,
    ) -> Result<Vec<storage_account::Model>, CatalogError>;

    async fn get_storage_account(
        &self,
        id: Uuid,
    ) -> Result<Option<storage_account::Model>, CatalogError>;

    async fn save_storage_account(
        &self,
        account: storage_account::Model,
    ) -> Result<storage_account::Model, CatalogError>;

    /// Returns the updated account, or `None` if it does not exist.
    async fn set_storage_account_active(
        &self,
        id: Uuid,
        active: bool,
    ) -> Result<Option<storage_account::Model>, CatalogError>;

    /// Overwrite the locally tracked usage of an account.
    async fn update_storage_used(&self, id: Uuid, used_gb: f64) -> Result<(), CatalogError>;

    /// Videos whose source URL expires before `now + within`.
    async fn list_videos_with_expiring_links(
        &self,
        within: chrono::Duration,
    ) -> Result<Vec<video::Model>, CatalogError>;

    async fn update_source_url(
        &self,
        id: Uuid,
        url: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), CatalogError>;
}
