use axum::Json;
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use tokio_util::sync::CancellationToken;
use tracing::instrument;
use uuid::Uuid;

use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::extractors::json::AppJson;
use crate::models::shared::validate_name;
use crate::models::storage::*;
use crate::models::video::*;
use crate::refresh::SweepReport;
use crate::services::{NewStorageAccount, NewVideo};
use crate::state::AppState;

pub fn upload_body_limit(max_bytes: usize) -> DefaultBodyLimit {
    DefaultBodyLimit::max(max_bytes)
}

async fn text_field(field: axum::extract::multipart::Field<'_>) -> Result<String, AppError> {
    field
        .text()
        .await
        .map_err(|e| AppError::Validation(format!("Failed to read field: {e}")))
}

fn parse_field<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T, AppError> {
    raw.trim()
        .parse()
        .map_err(|_| AppError::Validation(format!("Invalid value for '{name}'")))
}

#[utoipa::path(
    post,
    path = "/videos",
    tag = "Admin",
    operation_id = "uploadVideo",
    summary = "Upload a video",
    description = "Uploads the file to the active storage account with the most free space, resolves its first stream link and records the video. Fields: `file` (required), `title` (required, truncated to 500 chars), `description`, `thumbnail_url`, `category`, `tags` (comma separated, at most 20 of at most 50 chars), `duration_seconds`, `is_published` (default true), `published_at` (RFC 3339). A single file may not exceed 10% of the account's limit.",
    request_body(content_type = "multipart/form-data", description = "Video file and metadata"),
    responses(
        (status = 201, description = "Video created", body = AdminVideoResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 409, description = "No account can take the file (NO_CAPACITY, INSUFFICIENT_STORAGE)", body = ErrorBody),
        (status = 413, description = "File exceeds the per-file cap (FILE_TOO_LARGE)", body = ErrorBody),
        (status = 502, description = "Storage provider failed (UPSTREAM_ERROR)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, multipart))]
pub async fn upload_video(
    auth_user: AuthUser,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    auth_user.require_admin()?;

    let mut file: Option<(String, Vec<u8>)> = None;
    let mut meta = NewVideo {
        is_published: true,
        ..NewVideo::default()
    };

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Multipart error: {e}")))?
    {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("file") => {
                let filename = field
                    .file_name()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "video.mp4".to_string());
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Validation(format!("Failed to read file: {e}")))?;
                file = Some((filename, data.to_vec()));
            }
            Some("title") => meta.title = text_field(field).await?,
            Some("description") => meta.description = Some(text_field(field).await?),
            Some("thumbnail_url") => meta.thumbnail_url = Some(text_field(field).await?),
            Some("category") => meta.category = Some(text_field(field).await?),
            Some("tags") => meta.tags = Some(text_field(field).await?),
            Some("duration_seconds") => {
                meta.duration_seconds = parse_field("duration_seconds", &text_field(field).await?)?
            }
            Some("is_published") => {
                meta.is_published = parse_field("is_published", &text_field(field).await?)?
            }
            Some("published_at") => {
                meta.published_at = Some(parse_field("published_at", &text_field(field).await?)?)
            }
            _ => {}
        }
    }

    let (filename, data) = file.ok_or_else(|| AppError::Validation("Missing 'file' field".into()))?;

    let video = state
        .service
        .upload_video(data, &filename, meta, &CancellationToken::new())
        .await?;

    Ok((StatusCode::CREATED, Json(AdminVideoResponse::from(video))))
}

#[utoipa::path(
    get,
    path = "/videos/{id}",
    tag = "Admin",
    operation_id = "getVideoAdmin",
    summary = "Get any video, including unpublished ones",
    params(("id" = Uuid, Path, description = "Video ID")),
    responses(
        (status = 200, description = "Video", body = AdminVideoResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Video not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user))]
pub async fn get_video(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<AdminVideoResponse>, AppError> {
    auth_user.require_admin()?;
    let video = state.service.get_video_admin(id).await?;
    Ok(Json(AdminVideoResponse::from(video)))
}

#[utoipa::path(
    patch,
    path = "/videos/{id}",
    tag = "Admin",
    operation_id = "updateVideo",
    summary = "Update video metadata",
    description = "Partial update. Send `thumbnail_url: null` to clear the thumbnail. Publishing without `published_at` stamps the current time.",
    params(("id" = Uuid, Path, description = "Video ID")),
    request_body = UpdateVideoRequest,
    responses(
        (status = 200, description = "Video updated", body = AdminVideoResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Video not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload))]
pub async fn update_video(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    AppJson(payload): AppJson<UpdateVideoRequest>,
) -> Result<Json<AdminVideoResponse>, AppError> {
    auth_user.require_admin()?;
    let video = state.service.update_video(id, payload).await?;
    Ok(Json(AdminVideoResponse::from(video)))
}

#[utoipa::path(
    delete,
    path = "/videos/{id}",
    tag = "Admin",
    operation_id = "deleteVideo",
    summary = "Delete a video",
    description = "Deletes the video with its likes and watch sessions. The remote file is kept.",
    params(("id" = Uuid, Path, description = "Video ID")),
    responses(
        (status = 204, description = "Video deleted"),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Video not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user))]
pub async fn delete_video(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    auth_user.require_admin()?;
    state.service.delete_video(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/videos/{id}/refresh-link",
    tag = "Admin",
    operation_id = "refreshVideoLink",
    summary = "Re-resolve one video's stream link now",
    params(("id" = Uuid, Path, description = "Video ID")),
    responses(
        (status = 200, description = "Link refreshed", body = RefreshLinkResponse),
        (status = 400, description = "Video has no remote file (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Video not found (NOT_FOUND)", body = ErrorBody),
        (status = 502, description = "Storage provider failed (UPSTREAM_ERROR)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user))]
pub async fn refresh_video_link(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RefreshLinkResponse>, AppError> {
    auth_user.require_admin()?;
    let link = state.service.refresh_video_link(id).await?;
    Ok(Json(RefreshLinkResponse {
        video_id: id,
        source_url_expires_at: link.expires_at,
    }))
}

#[utoipa::path(
    post,
    path = "/link-refresh",
    tag = "Admin",
    operation_id = "runLinkRefreshSweep",
    summary = "Run the link refresh sweep now",
    description = "Refreshes every link expiring within the refresh window. Per-video failures are counted in the report and do not stop the sweep. Fails with 409 if a sweep is already running.",
    responses(
        (status = 200, description = "Sweep finished", body = SweepReport),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 409, description = "A sweep is already running (CONFLICT)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user))]
pub async fn run_link_refresh(
    auth_user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<SweepReport>, AppError> {
    auth_user.require_admin()?;
    match state.service.run_link_refresh_sweep().await {
        Some(report) => Ok(Json(report?)),
        None => Err(AppError::Conflict(
            "A link refresh sweep is already running".into(),
        )),
    }
}

#[utoipa::path(
    get,
    path = "/storage-accounts",
    tag = "Admin",
    operation_id = "listStorageAccounts",
    summary = "List storage accounts",
    description = "Lists all storage accounts with their local usage estimate. Credentials are never returned.",
    responses(
        (status = 200, description = "Storage accounts", body = Vec<StorageAccountResponse>),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user))]
pub async fn list_storage_accounts(
    auth_user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<StorageAccountResponse>>, AppError> {
    auth_user.require_admin()?;
    let accounts = state.service.list_storage_accounts().await?;
    Ok(Json(
        accounts
            .into_iter()
            .map(StorageAccountResponse::from)
            .collect(),
    ))
}

#[utoipa::path(
    post,
    path = "/storage-accounts",
    tag = "Admin",
    operation_id = "createStorageAccount",
    summary = "Add a storage account",
    request_body = CreateStorageAccountRequest,
    responses(
        (status = 201, description = "Storage account created", body = StorageAccountResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(account_name = %payload.account_name))]
pub async fn create_storage_account(
    auth_user: AuthUser,
    State(state): State<AppState>,
    AppJson(payload): AppJson<CreateStorageAccountRequest>,
) -> Result<impl IntoResponse, AppError> {
    auth_user.require_admin()?;
    validate_name(&payload.account_name, "account_name", 100)?;

    let account = state
        .service
        .create_storage_account(NewStorageAccount {
            account_name: payload.account_name,
            api_token: payload.api_token,
            storage_limit_gb: payload.storage_limit_gb,
            storage_used_gb: payload.storage_used_gb.unwrap_or(0.0),
            is_active: payload.is_active.unwrap_or(true),
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(StorageAccountResponse::from(account)),
    ))
}

#[utoipa::path(
    put,
    path = "/storage-accounts/{id}/active",
    tag = "Admin",
    operation_id = "setStorageAccountActive",
    summary = "Enable or disable a storage account",
    description = "Inactive accounts are never selected for uploads. Existing videos on them keep streaming.",
    params(("id" = Uuid, Path, description = "Storage account ID")),
    request_body = SetAccountActiveRequest,
    responses(
        (status = 200, description = "Storage account updated", body = StorageAccountResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Storage account not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload))]
pub async fn set_storage_account_active(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    AppJson(payload): AppJson<SetAccountActiveRequest>,
) -> Result<Json<StorageAccountResponse>, AppError> {
    auth_user.require_admin()?;
    let account = state
        .service
        .set_storage_account_active(id, payload.is_active)
        .await?;
    Ok(Json(StorageAccountResponse::from(account)))
}
