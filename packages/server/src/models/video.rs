use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entity::video;

pub use super::shared::Pagination;
use super::shared::double_option;

/// Public path that redirects a wrapper token to the current source URL.
pub fn stream_path(wrapper_token: &str) -> String {
    format!("/api/v1/stream/{wrapper_token}")
}

/// Video snapshot safe to show to any viewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct VideoResponse {
    pub id: Uuid,
    #[schema(example = "Sunset timelapse")]
    pub title: String,
    pub description: String,
    pub thumbnail_url: Option<String>,
    #[schema(example = 184)]
    pub duration_seconds: i32,
    #[schema(example = "music")]
    pub category: Option<String>,
    pub tags: Vec<String>,
    /// Relative URL of the stream redirect.
    #[schema(example = "/api/v1/stream/6f1c0a6b2e8d4c1f9a7b3d5e2c4f6a8b")]
    pub stream_url: String,
    pub view_count: i64,
    pub like_count: i64,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<video::Model> for VideoResponse {
    fn from(m: video::Model) -> Self {
        let tags = m.tag_list();
        Self {
            stream_url: stream_path(&m.wrapper_token),
            id: m.id,
            title: m.title,
            description: m.description,
            thumbnail_url: m.thumbnail_url,
            duration_seconds: m.duration_seconds,
            category: m.category,
            tags,
            view_count: m.view_count,
            like_count: m.like_count,
            published_at: m.published_at,
            created_at: m.created_at,
        }
    }
}

/// Full video record for administrators. Still omits the source URL.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct AdminVideoResponse {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub thumbnail_url: Option<String>,
    pub duration_seconds: i32,
    pub file_size_bytes: i64,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub wrapper_token: String,
    pub stream_url: String,
    pub storage_account_id: Option<Uuid>,
    pub remote_file_id: Option<String>,
    pub source_url_expires_at: Option<DateTime<Utc>>,
    pub view_count: i64,
    pub like_count: i64,
    pub is_published: bool,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<video::Model> for AdminVideoResponse {
    fn from(m: video::Model) -> Self {
        let tags = m.tag_list();
        Self {
            stream_url: stream_path(&m.wrapper_token),
            id: m.id,
            title: m.title,
            description: m.description,
            thumbnail_url: m.thumbnail_url,
            duration_seconds: m.duration_seconds,
            file_size_bytes: m.file_size_bytes,
            category: m.category,
            tags,
            wrapper_token: m.wrapper_token,
            storage_account_id: m.storage_account_id,
            remote_file_id: m.remote_file_id,
            source_url_expires_at: m.source_url_expires_at,
            view_count: m.view_count,
            like_count: m.like_count,
            is_published: m.is_published,
            published_at: m.published_at,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct FeedQuery {
    /// Page number (1-based). Default: 1.
    pub page: Option<u64>,
    /// Items per page, 1-100. Default: 20.
    pub per_page: Option<u64>,
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SearchQuery {
    /// Case-insensitive substring of the title or description.
    pub q: Option<String>,
    /// Only videos carrying this tag.
    pub tag: Option<String>,
    /// Only videos in this category.
    pub category: Option<String>,
    /// Page number (1-based). Default: 1.
    pub page: Option<u64>,
    /// Items per page, 1-100. Default: 20.
    pub per_page: Option<u64>,
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RelatedQuery {
    /// Maximum number of videos, 1-50. Default: 10.
    pub limit: Option<u64>,
}

/// A page of videos. Shared by the feed, search and liked listings.
#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct FeedResponse {
    pub data: Vec<VideoResponse>,
    pub pagination: Pagination,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct TrackViewRequest {
    /// Client-generated playback session identifier.
    #[schema(example = "b4c1e2f0-sess")]
    pub session_id: String,
    /// Seconds watched so far in this session.
    #[schema(example = 42.5)]
    pub watch_duration_seconds: f64,
    /// Length of the video as seen by the player.
    #[schema(example = 120.0)]
    pub video_duration_seconds: f64,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct TrackViewResponse {
    /// Whether this report counted as a new view.
    pub counted: bool,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct LikeResponse {
    pub like_count: i64,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct LikeStatusResponse {
    pub liked: bool,
}

#[derive(Debug, Deserialize, Default, utoipa::ToSchema)]
pub struct UpdateVideoRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub thumbnail_url: Option<Option<String>>,
    /// `null` clears the category.
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub category: Option<Option<String>>,
    pub tags: Option<Vec<String>>,
    pub duration_seconds: Option<i32>,
    pub is_published: Option<bool>,
    pub published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct RefreshLinkResponse {
    pub video_id: Uuid,
    pub source_url_expires_at: DateTime<Utc>,
}
