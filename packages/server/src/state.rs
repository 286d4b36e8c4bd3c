use std::sync::Arc;

use crate::services::VideoService;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<VideoService>,
    /// HS256 key for verifying bearer tokens.
    pub jwt_secret: Arc<str>,
    /// Largest accepted upload body.
    pub max_upload_bytes: usize,
}
