use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use sea_orm::DbErr;
use uuid::Uuid;

use crate::entity::{storage_account, video, video_like, watch_session};

use super::{CatalogError, CatalogStore, VideoFilter, ViewDecision, page_offset};

/// Write paths of [`MemoryCatalog`] that can be made to fail on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    ViewIncrement,
    LikeCount,
    StorageUsed,
    SourceUrl,
}

/// `CatalogStore` kept in process memory.
///
/// Per-key operations go through `DashMap` entries, which gives the
/// single-writer-per-session guarantee `commit_watch_progress` needs.
#[derive(Default)]
pub struct MemoryCatalog {
    videos: DashMap<Uuid, video::Model>,
    sessions: DashMap<(String, Uuid), watch_session::Model>,
    likes: DashMap<(Uuid, Uuid), video_like::Model>,
    accounts: DashMap<Uuid, storage_account::Model>,
    fail_view_increment: AtomicBool,
    fail_like_count: AtomicBool,
    fail_storage_used: AtomicBool,
    fail_source_url: AtomicBool,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fault(&self, fault: Fault, failing: bool) {
        self.flag(fault).store(failing, Ordering::SeqCst);
    }

    fn flag(&self, fault: Fault) -> &AtomicBool {
        match fault {
            Fault::ViewIncrement => &self.fail_view_increment,
            Fault::LikeCount => &self.fail_like_count,
            Fault::StorageUsed => &self.fail_storage_used,
            Fault::SourceUrl => &self.fail_source_url,
        }
    }

    fn check(&self, fault: Fault) -> Result<(), CatalogError> {
        if self.flag(fault).load(Ordering::SeqCst) {
            return Err(CatalogError::Database(DbErr::Custom(format!(
                "injected {fault:?} failure"
            ))));
        }
        Ok(())
    }

    fn missing(what: &str, id: Uuid) -> CatalogError {
        CatalogError::Inconsistent(format!("{what} {id} not found"))
    }

    fn bump_views(&self, id: Uuid) -> Result<(), CatalogError> {
        self.check(Fault::ViewIncrement)?;
        let mut video = self
            .videos
            .get_mut(&id)
            .ok_or_else(|| Self::missing("video", id))?;
        video.view_count += 1;
        Ok(())
    }

    fn published(&self, keep: impl Fn(&video::Model) -> bool) -> Vec<video::Model> {
        self.videos
            .iter()
            .filter(|v| v.is_published && keep(v.value()))
            .map(|v| v.value().clone())
            .collect()
    }
}

/// Slice one page out of an already ordered listing.
fn paginate(videos: Vec<video::Model>, page: u64, per_page: u64) -> (Vec<video::Model>, u64) {
    let total = videos.len() as u64;
    let skip = usize::try_from(page_offset(page, per_page)).unwrap_or(usize::MAX);
    let take = usize::try_from(per_page).unwrap_or(usize::MAX);
    (videos.into_iter().skip(skip).take(take).collect(), total)
}

fn most_viewed_first(videos: &mut [video::Model]) {
    videos.sort_by(|a, b| b.view_count.cmp(&a.view_count).then(a.id.cmp(&b.id)));
}

#[async_trait]
impl CatalogStore for MemoryCatalog {
    async fn get_video(&self, id: Uuid) -> Result<Option<video::Model>, CatalogError> {
        Ok(self.videos.get(&id).map(|v| v.value().clone()))
    }

    async fn find_video_by_wrapper_token(
        &self,
        token: &str,
    ) -> Result<Option<video::Model>, CatalogError> {
        Ok(self
            .videos
            .iter()
            .find(|v| v.wrapper_token == token)
            .map(|v| v.value().clone()))
    }

    async fn save_video(&self, video: video::Model) -> Result<video::Model, CatalogError> {
        let duplicate_token = self
            .videos
            .iter()
            .any(|v| v.id != video.id && v.wrapper_token == video.wrapper_token);
        if duplicate_token {
            return Err(CatalogError::Database(DbErr::Custom(
                "duplicate wrapper token".into(),
            )));
        }
        self.videos.insert(video.id, video.clone());
        Ok(video)
    }

    async fn delete_video(&self, id: Uuid) -> Result<bool, CatalogError> {
        self.likes.retain(|(video_id, _), _| *video_id != id);
        self.sessions.retain(|(_, video_id), _| *video_id != id);
        Ok(self.videos.remove(&id).is_some())
    }

    async fn increment_view_count(&self, id: Uuid) -> Result<(), CatalogError> {
        self.bump_views(id)
    }

    async fn like_video(&self, video_id: Uuid, user_id: Uuid) -> Result<Option<i64>, CatalogError> {
        // The like entry stays locked until the counter has moved.
        match self.likes.entry((video_id, user_id)) {
            Entry::Occupied(_) => Ok(None),
            Entry::Vacant(slot) => {
                self.check(Fault::LikeCount)?;
                let mut video = self
                    .videos
                    .get_mut(&video_id)
                    .ok_or_else(|| Self::missing("video", video_id))?;
                video.like_count += 1;
                slot.insert(video_like::Model {
                    id: Uuid::now_v7(),
                    video_id,
                    user_id,
                    created_at: Utc::now(),
                });
                Ok(Some(video.like_count))
            }
        }
    }

    async fn unlike_video(
        &self,
        video_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<i64>, CatalogError> {
        match self.likes.entry((video_id, user_id)) {
            Entry::Vacant(_) => Ok(None),
            Entry::Occupied(like) => {
                self.check(Fault::LikeCount)?;
                let mut video = self
                    .videos
                    .get_mut(&video_id)
                    .ok_or_else(|| Self::missing("video", video_id))?;
                video.like_count = (video.like_count - 1).max(0);
                like.remove();
                Ok(Some(video.like_count))
            }
        }
    }

    async fn is_liked(&self, video_id: Uuid, user_id: Uuid) -> Result<bool, CatalogError> {
        Ok(self.likes.contains_key(&(video_id, user_id)))
    }

    async fn list_liked_videos(
        &self,
        user_id: Uuid,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<video::Model>, u64), CatalogError> {
        let mut liked: Vec<video::Model> = self
            .likes
            .iter()
            .filter(|l| l.user_id == user_id)
            .filter_map(|l| self.videos.get(&l.video_id).map(|v| v.value().clone()))
            .filter(|v| v.is_published)
            .collect();
        liked.sort_by(|a, b| b.published_at.cmp(&a.published_at).then(b.id.cmp(&a.id)));
        Ok(paginate(liked, page, per_page))
    }

    async fn find_watch_session(
        &self,
        session_id: &str,
        video_id: Uuid,
    ) -> Result<Option<watch_session::Model>, CatalogError> {
        Ok(self
            .sessions
            .get(&(session_id.to_string(), video_id))
            .map(|s| s.value().clone()))
    }

    async fn upsert_watch_session(&self, session: watch_session::Model) -> Result<(), CatalogError> {
        let key = (session.session_id.clone(), session.video_id);
        match self.sessions.entry(key) {
            Entry::Occupied(mut existing) => {
                let row = existing.get_mut();
                row.watched_percentage = session.watched_percentage;
                row.watch_duration_seconds = session.watch_duration_seconds;
                row.updated_at = session.updated_at;
            }
            Entry::Vacant(slot) => {
                slot.insert(session);
            }
        }
        Ok(())
    }

    async fn commit_watch_progress(
        &self,
        session: watch_session::Model,
        decide: ViewDecision,
    ) -> Result<bool, CatalogError> {
        let key = (session.session_id.clone(), session.video_id);
        let video_id = session.video_id;
        let current = session.watched_percentage;

        // The entry guard holds the shard lock until the end of this block.
        match self.sessions.entry(key) {
            Entry::Occupied(mut existing) => {
                let previous = existing.get().watched_percentage;
                let increment = decide(Some(previous), current);
                if increment {
                    self.bump_views(video_id)?;
                }
                let row = existing.get_mut();
                row.watched_percentage = current;
                row.watch_duration_seconds = session.watch_duration_seconds;
                row.updated_at = session.updated_at;
                Ok(increment)
            }
            Entry::Vacant(slot) => {
                let increment = decide(None, current);
                if increment {
                    self.bump_views(video_id)?;
                }
                slot.insert(session);
                Ok(increment)
            }
        }
    }

    async fn list_published_videos_page(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<video::Model>, u64), CatalogError> {
        let mut published = self.published(|_| true);
        published.sort_by(|a, b| {
            b.published_at
                .cmp(&a.published_at)
                .then(b.view_count.cmp(&a.view_count))
        });
        Ok(paginate(published, page, per_page))
    }

    async fn search_videos(
        &self,
        filter: &VideoFilter,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<video::Model>, u64), CatalogError> {
        let keyword = filter.keyword.as_deref().map(str::to_lowercase);
        let mut matches = self.published(|v| {
            let keyword_ok = keyword.as_deref().is_none_or(|k| {
                v.title.to_lowercase().contains(k) || v.description.to_lowercase().contains(k)
            });
            let tag_ok = filter
                .tag
                .as_deref()
                .is_none_or(|t| v.tag_list().iter().any(|own| own == t));
            let category_ok = filter
                .category
                .as_deref()
                .is_none_or(|c| v.category.as_deref() == Some(c));
            keyword_ok && tag_ok && category_ok
        });
        most_viewed_first(&mut matches);
        Ok(paginate(matches, page, per_page))
    }

    async fn list_related_videos(
        &self,
        video: &video::Model,
        limit: u64,
    ) -> Result<Vec<video::Model>, CatalogError> {
        let unclassified = video.category.is_none() && video.tag_list().is_empty();
        let mut related =
            self.published(|v| v.id != video.id && (unclassified || video.is_related_to(v)));
        most_viewed_first(&mut related);
        related.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(related)
    }

    async fn list_storage_accounts(
        &self,
        active_only: bool,
    ) -> Result<Vec<storage_account::Model>, CatalogError> {
        let mut accounts: Vec<storage_account::Model> = self
            .accounts
            .iter()
            .filter(|a| !active_only || a.is_active)
            .map(|a| a.value().clone())
            .collect();
        accounts.sort_by_key(|a| a.created_at);
        Ok(accounts)
    }

    async fn get_storage_account(
        &self,
        id: Uuid,
    ) -> Result<Option<storage_account::Model>, CatalogError> {
        Ok(self.accounts.get(&id).map(|a| a.value().clone()))
    }

    async fn save_storage_account(
        &self,
        account: storage_account::Model,
    ) -> Result<storage_account::Model, CatalogError> {
        self.accounts.insert(account.id, account.clone());
        Ok(account)
    }

    async fn set_storage_account_active(
        &self,
        id: Uuid,
        active: bool,
    ) -> Result<Option<storage_account::Model>, CatalogError> {
        Ok(self.accounts.get_mut(&id).map(|mut account| {
            account.is_active = active;
            account.updated_at = Utc::now();
            account.value().clone()
        }))
    }

    async fn update_storage_used(&self, id: Uuid, used_gb: f64) -> Result<(), CatalogError> {
        self.check(Fault::StorageUsed)?;
        let mut account = self
            .accounts
            .get_mut(&id)
            .ok_or_else(|| Self::missing("storage account", id))?;
        account.storage_used_gb = used_gb;
        account.updated_at = Utc::now();
        Ok(())
    }

    async fn list_videos_with_expiring_links(
        &self,
        within: chrono::Duration,
    ) -> Result<Vec<video::Model>, CatalogError> {
        let cutoff = Utc::now() + within;
        let mut expiring: Vec<video::Model> = self
            .videos
            .iter()
            .filter(|v| v.source_url_expires_at.is_some_and(|at| at < cutoff))
            .map(|v| v.value().clone())
            .collect();
        expiring.sort_by_key(|v| v.source_url_expires_at);
        Ok(expiring)
    }

    async fn update_source_url(
        &self,
        id: Uuid,
        url: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), CatalogError> {
        self.check(Fault::SourceUrl)?;
        let mut video = self
            .videos
            .get_mut(&id)
            .ok_or_else(|| Self::missing("video", id))?;
        video.source_url = url.to_string();
        video.source_url_expires_at = Some(expires_at);
        video.updated_at = Utc::now();
        Ok(())
    }
}
