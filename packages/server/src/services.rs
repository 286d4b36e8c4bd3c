//! Entry points the HTTP layer calls. Each mutation that can change what
//! the feed shows invalidates it after the write is persisted.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::catalog::{CatalogStore, VideoFilter};
use crate::entity::{storage_account, video};
use crate::error::ServiceError;
use crate::feed::{FeedCache, FeedPage};
use crate::models::shared::truncate_chars;
use crate::models::video::UpdateVideoRequest;
use crate::refresh::{LinkRefresher, SweepReport};
use crate::storage::{ResolvedLink, StorageRotator};
use crate::views::ViewAttributor;

pub const MAX_TITLE_CHARS: usize = 500;
pub const MAX_DESCRIPTION_CHARS: usize = 10_000;
pub const MAX_TAGS: usize = 20;
pub const MAX_TAG_CHARS: usize = 50;
pub const MAX_CATEGORY_CHARS: usize = 100;
pub const MAX_KEYWORD_CHARS: usize = 200;
pub const DEFAULT_RELATED_LIMIT: u64 = 10;
pub const MAX_RELATED_LIMIT: u64 = 50;

/// Metadata supplied alongside an uploaded file.
#[derive(Debug, Clone, Default)]
pub struct NewVideo {
    pub title: String,
    pub description: Option<String>,
    pub thumbnail_url: Option<String>,
    pub category: Option<String>,
    /// Comma separated.
    pub tags: Option<String>,
    pub duration_seconds: i32,
    pub is_published: bool,
    pub published_at: Option<DateTime<Utc>>,
}

/// New storage account as entered by an administrator.
#[derive(Debug, Clone)]
pub struct NewStorageAccount {
    pub account_name: String,
    pub api_token: String,
    pub storage_limit_gb: f64,
    pub storage_used_gb: f64,
    pub is_active: bool,
}

/// Split a comma separated tag list, dropping blanks.
pub fn parse_tags(raw: &str) -> Result<Vec<String>, ServiceError> {
    validate_tags(
        raw.split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect(),
    )
}

fn validate_tags(tags: Vec<String>) -> Result<Vec<String>, ServiceError> {
    if tags.len() > MAX_TAGS {
        return Err(ServiceError::Validation(format!(
            "at most {MAX_TAGS} tags are allowed"
        )));
    }
    if let Some(tag) = tags.iter().find(|t| t.chars().count() > MAX_TAG_CHARS) {
        return Err(ServiceError::Validation(format!(
            "tag '{tag}' is longer than {MAX_TAG_CHARS} characters"
        )));
    }
    Ok(tags)
}

/// Blank means no category.
fn clean_category(raw: Option<&str>) -> Result<Option<String>, ServiceError> {
    let Some(category) = raw.map(str::trim).filter(|c| !c.is_empty()) else {
        return Ok(None);
    };
    if category.chars().count() > MAX_CATEGORY_CHARS {
        return Err(ServiceError::Validation(format!(
            "category is longer than {MAX_CATEGORY_CHARS} characters"
        )));
    }
    Ok(Some(category.to_string()))
}

/// Trim every field and drop the blank ones.
fn clean_filter(filter: VideoFilter) -> Result<VideoFilter, ServiceError> {
    fn present(value: Option<String>) -> Option<String> {
        value
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    let keyword = present(filter.keyword);
    if keyword
        .as_deref()
        .is_some_and(|k| k.chars().count() > MAX_KEYWORD_CHARS)
    {
        return Err(ServiceError::Validation(format!(
            "search keyword is longer than {MAX_KEYWORD_CHARS} characters"
        )));
    }
    Ok(VideoFilter {
        keyword,
        tag: present(filter.tag),
        category: present(filter.category),
    })
}

fn clean_title(raw: &str) -> Result<String, ServiceError> {
    let title = raw.trim();
    if title.is_empty() {
        return Err(ServiceError::Validation("title is required".into()));
    }
    Ok(truncate_chars(title, MAX_TITLE_CHARS))
}

fn validate_duration(seconds: i32) -> Result<i32, ServiceError> {
    if seconds < 0 {
        return Err(ServiceError::Validation(
            "duration_seconds must not be negative".into(),
        ));
    }
    Ok(seconds)
}

/// A published video always carries a publish time.
fn publish_time(
    is_published: bool,
    published_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    match (is_published, published_at) {
        (true, None) => Some(now),
        (_, at) => at,
    }
}

pub struct VideoService {
    catalog: Arc<dyn CatalogStore>,
    feed: Arc<FeedCache>,
    views: ViewAttributor,
    rotator: Arc<StorageRotator>,
    refresher: Arc<LinkRefresher>,
}

impl VideoService {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        feed: Arc<FeedCache>,
        rotator: Arc<StorageRotator>,
        refresher: Arc<LinkRefresher>,
    ) -> Self {
        Self {
            views: ViewAttributor::new(catalog.clone(), feed.clone()),
            catalog,
            feed,
            rotator,
            refresher,
        }
    }

    pub fn refresher(&self) -> Arc<LinkRefresher> {
        self.refresher.clone()
    }

    async fn require_video(&self, id: Uuid) -> Result<video::Model, ServiceError> {
        self.catalog
            .get_video(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("video {id}")))
    }

    async fn require_published(&self, id: Uuid) -> Result<video::Model, ServiceError> {
        let video = self.require_video(id).await?;
        if !video.is_published {
            return Err(ServiceError::NotFound(format!("video {id}")));
        }
        Ok(video)
    }

    pub async fn get_feed_page(&self, page: u64, per_page: u64) -> Result<FeedPage, ServiceError> {
        Ok(self.feed.get_feed_page(page, per_page).await?)
    }

    /// A published video. Unpublished videos are reported as missing.
    pub async fn get_video(&self, id: Uuid) -> Result<video::Model, ServiceError> {
        self.require_published(id).await
    }

    pub async fn get_video_admin(&self, id: Uuid) -> Result<video::Model, ServiceError> {
        self.require_video(id).await
    }

    pub async fn track_view(
        &self,
        video_id: Uuid,
        session_id: &str,
        watch_duration_seconds: f64,
        video_duration_seconds: f64,
    ) -> Result<bool, ServiceError> {
        if session_id.trim().is_empty() {
            return Err(ServiceError::Validation("session_id is required".into()));
        }
        self.require_published(video_id).await?;
        self.views
            .track_view(
                video_id,
                session_id,
                watch_duration_seconds,
                video_duration_seconds,
            )
            .await
    }

    /// Returns the new like count.
    pub async fn like_video(&self, video_id: Uuid, user_id: Uuid) -> Result<i64, ServiceError> {
        self.require_published(video_id).await?;
        let count = self
            .catalog
            .like_video(video_id, user_id)
            .await?
            .ok_or(ServiceError::AlreadyLiked)?;
        self.feed.invalidate_feed().await;
        Ok(count)
    }

    /// Returns the new like count.
    pub async fn unlike_video(&self, video_id: Uuid, user_id: Uuid) -> Result<i64, ServiceError> {
        self.require_video(video_id).await?;
        let count = self
            .catalog
            .unlike_video(video_id, user_id)
            .await?
            .ok_or(ServiceError::NotLiked)?;
        self.feed.invalidate_feed().await;
        Ok(count)
    }

    pub async fn is_liked(&self, video_id: Uuid, user_id: Uuid) -> Result<bool, ServiceError> {
        self.require_published(video_id).await?;
        Ok(self.catalog.is_liked(video_id, user_id).await?)
    }

    /// Published videos the user liked, newest first.
    pub async fn liked_videos(
        &self,
        user_id: Uuid,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<video::Model>, u64), ServiceError> {
        Ok(self
            .catalog
            .list_liked_videos(user_id, page, per_page)
            .await?)
    }

    /// Published videos matching a keyword, tag and category, most viewed
    /// first. Blank filter fields are ignored.
    pub async fn search_videos(
        &self,
        filter: VideoFilter,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<video::Model>, u64), ServiceError> {
        let filter = clean_filter(filter)?;
        Ok(self.catalog.search_videos(&filter, page, per_page).await?)
    }

    /// Videos sharing a category or tag with a published video.
    pub async fn related_videos(
        &self,
        id: Uuid,
        limit: Option<u64>,
    ) -> Result<Vec<video::Model>, ServiceError> {
        let video = self.require_published(id).await?;
        let limit = limit
            .unwrap_or(DEFAULT_RELATED_LIMIT)
            .clamp(1, MAX_RELATED_LIMIT);
        Ok(self.catalog.list_related_videos(&video, limit).await?)
    }

    /// Upload a file to the best storage account, resolve its first link and
    /// record the video.
    ///
    /// If the link cannot be resolved the request fails but the remote file
    /// and the account usage stay as they are.
    #[instrument(skip(self, data, meta, cancel), fields(size = data.len()))]
    pub async fn upload_video(
        &self,
        data: Vec<u8>,
        filename: &str,
        meta: NewVideo,
        cancel: &CancellationToken,
    ) -> Result<video::Model, ServiceError> {
        let title = clean_title(&meta.title)?;
        let description = truncate_chars(
            meta.description.as_deref().unwrap_or_default().trim(),
            MAX_DESCRIPTION_CHARS,
        );
        let tags = match meta.tags.as_deref() {
            Some(raw) => parse_tags(raw)?,
            None => Vec::new(),
        };
        let duration_seconds = validate_duration(meta.duration_seconds)?;
        let category = clean_category(meta.category.as_deref())?;
        if data.is_empty() {
            return Err(ServiceError::Validation("file is empty".into()));
        }

        let size_bytes = data.len() as u64;
        let receipt = self
            .rotator
            .upload(data, filename, size_bytes, cancel)
            .await?;

        let link = self
            .rotator
            .resolve_link(&receipt.remote_file_id, &receipt.account.credential(), cancel)
            .await?;

        let now = Utc::now();
        let video = video::Model {
            id: Uuid::now_v7(),
            title,
            description,
            thumbnail_url: meta.thumbnail_url.filter(|u| !u.trim().is_empty()),
            source_url: link.url,
            source_url_expires_at: Some(link.expires_at),
            duration_seconds,
            file_size_bytes: size_bytes as i64,
            remote_file_id: Some(receipt.remote_file_id),
            storage_account_id: Some(receipt.account.id),
            category,
            tags: serde_json::json!(tags),
            wrapper_token: Uuid::new_v4().simple().to_string(),
            view_count: 0,
            like_count: 0,
            is_published: meta.is_published,
            published_at: publish_time(meta.is_published, meta.published_at, now),
            created_at: now,
            updated_at: now,
        };
        let video = self.catalog.save_video(video).await?;

        info!(
            video_id = %video.id,
            account = %receipt.account.account_name,
            content_hash = %receipt.content_hash,
            "Video uploaded"
        );
        self.feed.invalidate_feed().await;
        Ok(video)
    }

    pub async fn update_video(
        &self,
        id: Uuid,
        patch: UpdateVideoRequest,
    ) -> Result<video::Model, ServiceError> {
        let mut video = self.require_video(id).await?;

        if let Some(title) = patch.title {
            video.title = clean_title(&title)?;
        }
        if let Some(description) = patch.description {
            video.description = truncate_chars(description.trim(), MAX_DESCRIPTION_CHARS);
        }
        if let Some(thumbnail_url) = patch.thumbnail_url {
            video.thumbnail_url = thumbnail_url;
        }
        if let Some(category) = patch.category {
            video.category = clean_category(category.as_deref())?;
        }
        if let Some(tags) = patch.tags {
            let tags = tags
                .into_iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect();
            video.tags = serde_json::json!(validate_tags(tags)?);
        }
        if let Some(seconds) = patch.duration_seconds {
            video.duration_seconds = validate_duration(seconds)?;
        }
        if let Some(is_published) = patch.is_published {
            video.is_published = is_published;
        }
        if patch.published_at.is_some() {
            video.published_at = patch.published_at;
        }

        let now = Utc::now();
        video.published_at = publish_time(video.is_published, video.published_at, now);
        video.updated_at = now;

        let video = self.catalog.save_video(video).await?;
        self.feed.invalidate_feed().await;
        Ok(video)
    }

    /// Remove the video with its likes and watch sessions. The remote file
    /// is left on the provider.
    pub async fn delete_video(&self, id: Uuid) -> Result<(), ServiceError> {
        if !self.catalog.delete_video(id).await? {
            return Err(ServiceError::NotFound(format!("video {id}")));
        }
        info!(video_id = %id, "Video deleted");
        self.feed.invalidate_feed().await;
        Ok(())
    }

    /// Refresh one video's link now, regardless of its expiry.
    pub async fn refresh_video_link(&self, id: Uuid) -> Result<ResolvedLink, ServiceError> {
        let video = self.require_video(id).await?;
        self.refresher.refresh_video(&video).await
    }

    /// Scheduler entry point. `None` when a sweep is already running.
    pub async fn run_link_refresh_sweep(&self) -> Option<Result<SweepReport, ServiceError>> {
        self.refresher.run_sweep().await
    }

    /// Current source URL for a wrapper token.
    ///
    /// A link that is expired or about to expire is re-resolved first. If
    /// that fails while the old link is still valid the old one is served.
    pub async fn resolve_stream(&self, token: &str) -> Result<String, ServiceError> {
        let video = self
            .catalog
            .find_video_by_wrapper_token(token)
            .await?
            .filter(|v| v.is_published)
            .ok_or_else(|| ServiceError::NotFound("stream".into()))?;

        let now = Utc::now();
        if !self.refresher.needs_refresh(&video, now) {
            return Ok(video.source_url);
        }

        match self.refresher.refresh_video(&video).await {
            Ok(link) => Ok(link.url),
            Err(e) if video.source_url_expires_at.is_some_and(|at| at > now) => {
                warn!(video_id = %video.id, error = %e, "On-demand link refresh failed, serving current link");
                Ok(video.source_url)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn list_storage_accounts(
        &self,
    ) -> Result<Vec<storage_account::Model>, ServiceError> {
        Ok(self.catalog.list_storage_accounts(false).await?)
    }

    pub async fn create_storage_account(
        &self,
        new: NewStorageAccount,
    ) -> Result<storage_account::Model, ServiceError> {
        if !(new.storage_limit_gb.is_finite() && new.storage_limit_gb > 0.0) {
            return Err(ServiceError::Validation(
                "storage_limit_gb must be positive".into(),
            ));
        }
        if !(new.storage_used_gb.is_finite() && new.storage_used_gb >= 0.0) {
            return Err(ServiceError::Validation(
                "storage_used_gb must not be negative".into(),
            ));
        }
        if new.api_token.trim().is_empty() {
            return Err(ServiceError::Validation("api_token is required".into()));
        }

        let account_name = new.account_name.trim().to_string();
        let existing = self.catalog.list_storage_accounts(false).await?;
        if existing.iter().any(|a| a.account_name == account_name) {
            return Err(ServiceError::Validation(format!(
                "storage account '{account_name}' already exists"
            )));
        }

        let now = Utc::now();
        let account = self
            .catalog
            .save_storage_account(storage_account::Model {
                id: Uuid::now_v7(),
                account_name,
                api_token: new.api_token,
                storage_used_gb: new.storage_used_gb,
                storage_limit_gb: new.storage_limit_gb,
                is_active: new.is_active,
                created_at: now,
                updated_at: now,
            })
            .await?;

        info!(account = %account.account_name, limit_gb = account.storage_limit_gb, "Storage account created");
        Ok(account)
    }

    pub async fn set_storage_account_active(
        &self,
        id: Uuid,
        active: bool,
    ) -> Result<storage_account::Model, ServiceError> {
        self.catalog
            .set_storage_account_active(id, active)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("storage account {id}")))
    }
}
