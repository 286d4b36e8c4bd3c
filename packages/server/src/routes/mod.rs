use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

use crate::handlers::{admin, videos};
use crate::state::AppState;

pub fn api_routes(max_upload_bytes: usize) -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest("/v1", v1_routes(max_upload_bytes))
}

fn v1_routes(max_upload_bytes: usize) -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .nest("/videos", video_routes())
        .nest("/stream", OpenApiRouter::new().routes(routes!(videos::stream)))
        .nest("/admin", admin_routes(max_upload_bytes))
}

fn video_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(videos::get_feed))
        .routes(routes!(videos::search_videos))
        .routes(routes!(videos::liked_videos))
        .routes(routes!(videos::get_video))
        .routes(routes!(videos::related_videos))
        .routes(routes!(videos::track_view))
        .routes(routes!(
            videos::like_status,
            videos::like_video,
            videos::unlike_video
        ))
}

fn admin_routes(max_upload_bytes: usize) -> OpenApiRouter<AppState> {
    let upload = OpenApiRouter::new()
        .routes(routes!(admin::upload_video))
        .layer(admin::upload_body_limit(max_upload_bytes));

    OpenApiRouter::new()
        .routes(routes!(
            admin::get_video,
            admin::update_video,
            admin::delete_video
        ))
        .routes(routes!(admin::refresh_video_link))
        .routes(routes!(admin::run_link_refresh))
        .routes(routes!(
            admin::list_storage_accounts,
            admin::create_storage_account
        ))
        .routes(routes!(admin::set_storage_account_active))
        .merge(upload)
}
