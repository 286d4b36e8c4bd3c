use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect};
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::catalog::VideoFilter;
use crate::entity::video;
use crate::error::{AppError, ErrorBody, ServiceError};
use crate::extractors::auth::AuthUser;
use crate::extractors::json::AppJson;
use crate::models::shared::page_params;
use crate::models::video::*;
use crate::state::AppState;

#[utoipa::path(
    get,
    path = "/feed",
    tag = "Videos",
    operation_id = "getFeed",
    summary = "Ranked feed of published videos",
    description = "Returns one page of published videos ordered by score. Videos are fetched newest first and then ranked by score within the page, so ranking never moves a video across pages. Pages are cached for a few minutes and dropped whenever a view, like or edit changes what they would show.",
    params(FeedQuery),
    responses(
        (status = 200, description = "Feed page", body = FeedResponse),
    ),
)]
#[instrument(skip(state, query))]
pub async fn get_feed(
    State(state): State<AppState>,
    Query(query): Query<FeedQuery>,
) -> Result<Json<FeedResponse>, AppError> {
    let (page, per_page) = page_params(query.page, query.per_page);
    let feed = state.service.get_feed_page(page, per_page).await?;

    Ok(Json(FeedResponse {
        data: feed.videos,
        pagination: Pagination::new(page, per_page, feed.total),
    }))
}

fn page_response(videos: Vec<video::Model>, page: u64, per_page: u64, total: u64) -> FeedResponse {
    FeedResponse {
        data: videos.into_iter().map(VideoResponse::from).collect(),
        pagination: Pagination::new(page, per_page, total),
    }
}

#[utoipa::path(
    get,
    path = "/search",
    tag = "Videos",
    operation_id = "searchVideos",
    summary = "Search published videos",
    description = "Filters published videos by keyword (title or description, case-insensitive), tag and category. Blank filters are ignored. Results are most viewed first and are not cached.",
    params(SearchQuery),
    responses(
        (status = 200, description = "Matching videos", body = FeedResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, query))]
pub async fn search_videos(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<FeedResponse>, AppError> {
    let (page, per_page) = page_params(query.page, query.per_page);
    let filter = VideoFilter {
        keyword: query.q,
        tag: query.tag,
        category: query.category,
    };
    let (videos, total) = state.service.search_videos(filter, page, per_page).await?;
    Ok(Json(page_response(videos, page, per_page, total)))
}

#[utoipa::path(
    get,
    path = "/liked",
    tag = "Videos",
    operation_id = "listLikedVideos",
    summary = "Videos the caller liked",
    params(FeedQuery),
    responses(
        (status = 200, description = "Liked videos, most recently published first", body = FeedResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, query), fields(user_id = %auth_user.user_id))]
pub async fn liked_videos(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<FeedQuery>,
) -> Result<Json<FeedResponse>, AppError> {
    let (page, per_page) = page_params(query.page, query.per_page);
    let (videos, total) = state
        .service
        .liked_videos(auth_user.user_id, page, per_page)
        .await?;
    Ok(Json(page_response(videos, page, per_page, total)))
}

#[utoipa::path(
    get,
    path = "/{id}/related",
    tag = "Videos",
    operation_id = "listRelatedVideos",
    summary = "Videos related to a published video",
    description = "Published videos sharing the category or at least one tag, most viewed first. A video with neither is related to every other published video.",
    params(("id" = Uuid, Path, description = "Video ID"), RelatedQuery),
    responses(
        (status = 200, description = "Related videos", body = Vec<VideoResponse>),
        (status = 404, description = "Video not found or unpublished (NOT_FOUND)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, query))]
pub async fn related_videos(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<RelatedQuery>,
) -> Result<Json<Vec<VideoResponse>>, AppError> {
    let videos = state.service.related_videos(id, query.limit).await?;
    Ok(Json(videos.into_iter().map(VideoResponse::from).collect()))
}

#[utoipa::path(
    get,
    path = "/{id}",
    tag = "Videos",
    operation_id = "getVideo",
    summary = "Get a published video",
    params(("id" = Uuid, Path, description = "Video ID")),
    responses(
        (status = 200, description = "Video details", body = VideoResponse),
        (status = 404, description = "Video not found or unpublished (NOT_FOUND)", body = ErrorBody),
    ),
)]
#[instrument(skip(state))]
pub async fn get_video(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<VideoResponse>, AppError> {
    let video = state.service.get_video(id).await?;
    Ok(Json(VideoResponse::from(video)))
}

#[utoipa::path(
    post,
    path = "/{id}/views",
    tag = "Videos",
    operation_id = "trackView",
    summary = "Report playback progress",
    description = "Records how far a playback session got. The first report of a session at or above 30% of the video counts as a view; later reports for the same session never count again. Tracking is best effort: storage failures are logged and reported as `counted: false`.",
    params(("id" = Uuid, Path, description = "Video ID")),
    request_body = TrackViewRequest,
    responses(
        (status = 202, description = "Progress accepted", body = TrackViewResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 404, description = "Video not found (NOT_FOUND)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, payload), fields(session_id = %payload.session_id))]
pub async fn track_view(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    AppJson(payload): AppJson<TrackViewRequest>,
) -> Result<impl IntoResponse, AppError> {
    let result = state
        .service
        .track_view(
            id,
            &payload.session_id,
            payload.watch_duration_seconds,
            payload.video_duration_seconds,
        )
        .await;

    let counted = match result {
        Ok(counted) => counted,
        Err(e @ (ServiceError::NotFound(_) | ServiceError::Validation(_))) => {
            return Err(e.into());
        }
        Err(e) => {
            warn!(video_id = %id, error = %e, "View tracking failed");
            false
        }
    };

    Ok((StatusCode::ACCEPTED, Json(TrackViewResponse { counted })))
}

#[utoipa::path(
    get,
    path = "/{id}/like",
    tag = "Videos",
    operation_id = "getLikeStatus",
    summary = "Whether the caller liked a video",
    params(("id" = Uuid, Path, description = "Video ID")),
    responses(
        (status = 200, description = "Like status", body = LikeStatusResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "Video not found or unpublished (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(user_id = %auth_user.user_id))]
pub async fn like_status(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<LikeStatusResponse>, AppError> {
    let liked = state.service.is_liked(id, auth_user.user_id).await?;
    Ok(Json(LikeStatusResponse { liked }))
}

#[utoipa::path(
    post,
    path = "/{id}/like",
    tag = "Videos",
    operation_id = "likeVideo",
    summary = "Like a video",
    params(("id" = Uuid, Path, description = "Video ID")),
    responses(
        (status = 200, description = "Liked", body = LikeResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "Video not found (NOT_FOUND)", body = ErrorBody),
        (status = 409, description = "Already liked (CONFLICT)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(user_id = %auth_user.user_id))]
pub async fn like_video(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<LikeResponse>, AppError> {
    let like_count = state.service.like_video(id, auth_user.user_id).await?;
    Ok(Json(LikeResponse { like_count }))
}

#[utoipa::path(
    delete,
    path = "/{id}/like",
    tag = "Videos",
    operation_id = "unlikeVideo",
    summary = "Remove a like",
    params(("id" = Uuid, Path, description = "Video ID")),
    responses(
        (status = 200, description = "Like removed", body = LikeResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "Video not found (NOT_FOUND)", body = ErrorBody),
        (status = 409, description = "Not liked (CONFLICT)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(user_id = %auth_user.user_id))]
pub async fn unlike_video(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<LikeResponse>, AppError> {
    let like_count = state.service.unlike_video(id, auth_user.user_id).await?;
    Ok(Json(LikeResponse { like_count }))
}

#[utoipa::path(
    get,
    path = "/{token}",
    tag = "Stream",
    operation_id = "stream",
    summary = "Redirect to the current source URL",
    description = "Resolves a wrapper token to the video's current direct URL and redirects to it. Links that have expired or expire within the refresh window are re-resolved first.",
    params(("token" = String, Path, description = "Wrapper token")),
    responses(
        (status = 307, description = "Redirect to the source URL"),
        (status = 404, description = "Unknown token (NOT_FOUND)", body = ErrorBody),
        (status = 502, description = "Storage provider failed (UPSTREAM_ERROR)", body = ErrorBody),
    ),
)]
#[instrument(skip(state))]
pub async fn stream(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Redirect, AppError> {
    let url = state.service.resolve_stream(&token).await?;
    Ok(Redirect::temporary(&url))
}
