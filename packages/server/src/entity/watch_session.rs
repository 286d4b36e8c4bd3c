use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Last known progress of one playback session on one video.
///
/// Unique per `(session_id, video_id)`, see `seed::ensure_indexes`.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "watch_session")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub session_id: String,
    pub video_id: Uuid,

    pub watched_percentage: f64, // 0-100
    pub watch_duration_seconds: i32,

    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
