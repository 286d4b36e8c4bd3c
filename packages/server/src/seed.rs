use sea_orm::sea_query::{Index, IndexCreateStatement, PostgresQueryBuilder};
use sea_orm::{ConnectionTrait, DatabaseConnection, DbErr};
use tracing::{info, warn};

use crate::entity::{video, video_like, watch_session};

/// Run one `CREATE INDEX IF NOT EXISTS`.
///
/// Unique indexes back `ON CONFLICT` clauses in the catalog, so failing to
/// create one is fatal. Plain indexes only cost performance.
async fn create_index(
    db: &DatabaseConnection,
    name: &str,
    stmt: &mut IndexCreateStatement,
    required: bool,
) -> Result<(), DbErr> {
    let sql = stmt.if_not_exists().name(name).to_string(PostgresQueryBuilder);

    match db.execute_unprepared(&sql).await {
        Ok(_) => {
            info!("Ensured index {} exists", name);
            Ok(())
        }
        Err(e) if required => Err(e),
        Err(e) => {
            warn!("Failed to create index {}: {}", name, e);
            Ok(())
        }
    }
}

/// SeaORM's schema-sync doesn't create composite indexes, so we create them
/// manually on startup.
pub async fn ensure_indexes(db: &DatabaseConnection) -> Result<(), DbErr> {
    // One progress row per playback session and video. Serializes view
    // attribution for the pair.
    create_index(
        db,
        "idx_watch_session_session_video",
        Index::create()
            .unique()
            .table(watch_session::Entity)
            .col(watch_session::Column::SessionId)
            .col(watch_session::Column::VideoId),
        true,
    )
    .await?;

    create_index(
        db,
        "idx_video_like_video_user",
        Index::create()
            .unique()
            .table(video_like::Entity)
            .col(video_like::Column::VideoId)
            .col(video_like::Column::UserId),
        true,
    )
    .await?;

    // Feed listing:
    // SELECT ... FROM video WHERE is_published ORDER BY published_at DESC
    create_index(
        db,
        "idx_video_published",
        Index::create()
            .table(video::Entity)
            .col(video::Column::IsPublished)
            .col(video::Column::PublishedAt),
        false,
    )
    .await?;

    // Search and related listings: WHERE category = ?
    create_index(
        db,
        "idx_video_category",
        Index::create()
            .table(video::Entity)
            .col(video::Column::Category),
        false,
    )
    .await?;

    // Link refresh sweep: WHERE source_url_expires_at < ?
    create_index(
        db,
        "idx_video_source_url_expires_at",
        Index::create()
            .table(video::Entity)
            .col(video::Column::SourceUrlExpiresAt),
        false,
    )
    .await?;

    Ok(())
}
