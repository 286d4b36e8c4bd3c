use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, LockType, OnConflict, Query};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, DbErr,
    EntityTrait, IntoActiveModel, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Select,
    Set, TransactionTrait,
};
use uuid::Uuid;

use crate::entity::{storage_account, video, video_like, watch_session};

use super::{CatalogError, CatalogStore, VideoFilter, ViewDecision, page_offset};

/// `CatalogStore` over Postgres.
#[derive(Clone)]
pub struct PgCatalog {
    db: DatabaseConnection,
}

impl PgCatalog {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

/// `exec_without_returning` reports a skipped `ON CONFLICT DO NOTHING`
/// either as zero rows or as `RecordNotInserted`, depending on the driver.
fn inserted(result: Result<u64, DbErr>) -> Result<bool, CatalogError> {
    match result {
        Ok(rows) => Ok(rows > 0),
        Err(DbErr::RecordNotInserted) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

fn expect_row(rows_affected: u64, what: &str, id: Uuid) -> Result<(), CatalogError> {
    if rows_affected == 0 {
        return Err(CatalogError::Inconsistent(format!("{what} {id} not found")));
    }
    Ok(())
}

/// Escape `LIKE` wildcards so a keyword only matches literally.
fn like_pattern(keyword: &str) -> String {
    let escaped = keyword
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

/// Containment on the `jsonb` tag array.
fn has_tag(tag: &str) -> Condition {
    Condition::all().add(Expr::cust_with_values(
        "tags @> $1",
        [serde_json::json!([tag])],
    ))
}

fn published() -> Select<video::Entity> {
    video::Entity::find().filter(video::Column::IsPublished.eq(true))
}

async fn like_count<C: ConnectionTrait>(conn: &C, video_id: Uuid) -> Result<i64, CatalogError> {
    video::Entity::find_by_id(video_id)
        .one(conn)
        .await?
        .map(|v| v.like_count)
        .ok_or_else(|| CatalogError::Inconsistent(format!("video {video_id} not found")))
}

/// Count the matches of `select`, then fetch one page in its order.
async fn fetch_page(
    db: &DatabaseConnection,
    select: Select<video::Entity>,
    page: u64,
    per_page: u64,
) -> Result<(Vec<video::Model>, u64), CatalogError> {
    let total = select.clone().paginate(db, per_page).num_items().await?;
    let videos = select
        .offset(Some(page_offset(page, per_page)))
        .limit(Some(per_page))
        .all(db)
        .await?;
    Ok((videos, total))
}

#[async_trait]
impl CatalogStore for PgCatalog {
    async fn get_video(&self, id: Uuid) -> Result<Option<video::Model>, CatalogError> {
        Ok(video::Entity::find_by_id(id).one(&self.db).await?)
    }

    async fn find_video_by_wrapper_token(
        &self,
        token: &str,
    ) -> Result<Option<video::Model>, CatalogError> {
        Ok(video::Entity::find()
            .filter(video::Column::WrapperToken.eq(token))
            .one(&self.db)
            .await?)
    }

    async fn save_video(&self, video: video::Model) -> Result<video::Model, CatalogError> {
        let exists = video::Entity::find_by_id(video.id)
            .one(&self.db)
            .await?
            .is_some();

        let active = video.into_active_model().reset_all();
        let saved = if exists {
            active.update(&self.db).await?
        } else {
            active.insert(&self.db).await?
        };
        Ok(saved)
    }

    async fn delete_video(&self, id: Uuid) -> Result<bool, CatalogError> {
        let txn = self.db.begin().await?;

        video_like::Entity::delete_many()
            .filter(video_like::Column::VideoId.eq(id))
            .exec(&txn)
            .await?;
        watch_session::Entity::delete_many()
            .filter(watch_session::Column::VideoId.eq(id))
            .exec(&txn)
            .await?;
        let result = video::Entity::delete_by_id(id).exec(&txn).await?;

        txn.commit().await?;
        Ok(result.rows_affected > 0)
    }

    async fn increment_view_count(&self, id: Uuid) -> Result<(), CatalogError> {
        let result = video::Entity::update_many()
            .col_expr(video::Column::ViewCount, Expr::cust("view_count + 1"))
            .filter(video::Column::Id.eq(id))
            .exec(&self.db)
            .await?;
        expect_row(result.rows_affected, "video", id)
    }

    /// Inserts with `ON CONFLICT DO NOTHING` and bumps the counter in the
    /// same transaction.
    async fn like_video(&self, video_id: Uuid, user_id: Uuid) -> Result<Option<i64>, CatalogError> {
        let txn = self.db.begin().await?;

        let like = video_like::ActiveModel {
            id: Set(Uuid::now_v7()),
            video_id: Set(video_id),
            user_id: Set(user_id),
            created_at: Set(Utc::now()),
        };
        let result = video_like::Entity::insert(like)
            .on_conflict(
                OnConflict::columns([video_like::Column::VideoId, video_like::Column::UserId])
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&txn)
            .await;
        if !inserted(result)? {
            return Ok(None);
        }

        let result = video::Entity::update_many()
            .col_expr(video::Column::LikeCount, Expr::cust("like_count + 1"))
            .filter(video::Column::Id.eq(video_id))
            .exec(&txn)
            .await?;
        expect_row(result.rows_affected, "video", video_id)?;
        let count = like_count(&txn, video_id).await?;

        txn.commit().await?;
        Ok(Some(count))
    }

    async fn unlike_video(
        &self,
        video_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<i64>, CatalogError> {
        let txn = self.db.begin().await?;

        let removed = video_like::Entity::delete_many()
            .filter(video_like::Column::VideoId.eq(video_id))
            .filter(video_like::Column::UserId.eq(user_id))
            .exec(&txn)
            .await?;
        if removed.rows_affected == 0 {
            return Ok(None);
        }

        let result = video::Entity::update_many()
            .col_expr(
                video::Column::LikeCount,
                Expr::cust("GREATEST(like_count - 1, 0)"),
            )
            .filter(video::Column::Id.eq(video_id))
            .exec(&txn)
            .await?;
        expect_row(result.rows_affected, "video", video_id)?;
        let count = like_count(&txn, video_id).await?;

        txn.commit().await?;
        Ok(Some(count))
    }

    async fn is_liked(&self, video_id: Uuid, user_id: Uuid) -> Result<bool, CatalogError> {
        let count = video_like::Entity::find()
            .filter(video_like::Column::VideoId.eq(video_id))
            .filter(video_like::Column::UserId.eq(user_id))
            .count(&self.db)
            .await?;
        Ok(count > 0)
    }

    async fn list_liked_videos(
        &self,
        user_id: Uuid,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<video::Model>, u64), CatalogError> {
        let liked = Query::select()
            .column(video_like::Column::VideoId)
            .from(video_like::Entity)
            .and_where(video_like::Column::UserId.eq(user_id))
            .to_owned();

        let select = published()
            .filter(video::Column::Id.in_subquery(liked))
            .order_by_desc(video::Column::PublishedAt)
            .order_by_desc(video::Column::Id);
        fetch_page(&self.db, select, page, per_page).await
    }

    async fn find_watch_session(
        &self,
        session_id: &str,
        video_id: Uuid,
    ) -> Result<Option<watch_session::Model>, CatalogError> {
        Ok(watch_session::Entity::find()
            .filter(watch_session::Column::SessionId.eq(session_id))
            .filter(watch_session::Column::VideoId.eq(video_id))
            .one(&self.db)
            .await?)
    }

    async fn upsert_watch_session(&self, session: watch_session::Model) -> Result<(), CatalogError> {
        watch_session::Entity::insert(session.into_active_model().reset_all())
            .on_conflict(
                OnConflict::columns([
                    watch_session::Column::SessionId,
                    watch_session::Column::VideoId,
                ])
                .update_columns([
                    watch_session::Column::WatchedPercentage,
                    watch_session::Column::WatchDurationSeconds,
                    watch_session::Column::UpdatedAt,
                ])
                .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;
        Ok(())
    }

    /// Runs in one transaction. A fresh pair is claimed with
    /// `INSERT ... ON CONFLICT DO NOTHING`; an existing one is read with
    /// `FOR UPDATE`, so concurrent reports for the same pair queue up.
    async fn commit_watch_progress(
        &self,
        session: watch_session::Model,
        decide: ViewDecision,
    ) -> Result<bool, CatalogError> {
        let txn = self.db.begin().await?;

        let claimed = watch_session::Entity::insert(session.clone().into_active_model().reset_all())
            .on_conflict(
                OnConflict::columns([
                    watch_session::Column::SessionId,
                    watch_session::Column::VideoId,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec_without_returning(&txn)
            .await;

        let previous = if inserted(claimed)? {
            None
        } else {
            let existing = watch_session::Entity::find()
                .filter(watch_session::Column::SessionId.eq(session.session_id.as_str()))
                .filter(watch_session::Column::VideoId.eq(session.video_id))
                .lock(LockType::Update)
                .one(&txn)
                .await?
                .ok_or_else(|| {
                    CatalogError::Inconsistent(format!(
                        "watch session {} vanished during update",
                        session.session_id
                    ))
                })?;

            let previous = existing.watched_percentage;
            let mut active = existing.into_active_model();
            active.watched_percentage = Set(session.watched_percentage);
            active.watch_duration_seconds = Set(session.watch_duration_seconds);
            active.updated_at = Set(session.updated_at);
            active.update(&txn).await?;
            Some(previous)
        };

        let increment = decide(previous, session.watched_percentage);
        if increment {
            let result = video::Entity::update_many()
                .col_expr(video::Column::ViewCount, Expr::cust("view_count + 1"))
                .filter(video::Column::Id.eq(session.video_id))
                .exec(&txn)
                .await?;
            expect_row(result.rows_affected, "video", session.video_id)?;
        }

        txn.commit().await?;
        Ok(increment)
    }

    async fn list_published_videos_page(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<video::Model>, u64), CatalogError> {
        let select = published()
            .order_by_desc(video::Column::PublishedAt)
            .order_by_desc(video::Column::ViewCount);
        fetch_page(&self.db, select, page, per_page).await
    }

    async fn search_videos(
        &self,
        filter: &VideoFilter,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<video::Model>, u64), CatalogError> {
        let mut select = published();
        if let Some(keyword) = filter.keyword.as_deref() {
            select = select.filter(Expr::cust_with_values(
                "(title ILIKE $1 OR description ILIKE $1)",
                [like_pattern(keyword)],
            ));
        }
        if let Some(tag) = filter.tag.as_deref() {
            select = select.filter(has_tag(tag));
        }
        if let Some(category) = filter.category.as_deref() {
            select = select.filter(video::Column::Category.eq(category));
        }

        let select = select
            .order_by_desc(video::Column::ViewCount)
            .order_by_asc(video::Column::Id);
        fetch_page(&self.db, select, page, per_page).await
    }

    async fn list_related_videos(
        &self,
        video: &video::Model,
        limit: u64,
    ) -> Result<Vec<video::Model>, CatalogError> {
        let mut related = Condition::any();
        if let Some(category) = video.category.as_deref() {
            related = related.add(video::Column::Category.eq(category));
        }
        for tag in video.tag_list() {
            related = related.add(has_tag(&tag));
        }

        let mut select = published().filter(video::Column::Id.ne(video.id));
        if !related.is_empty() {
            select = select.filter(related);
        }

        Ok(select
            .order_by_desc(video::Column::ViewCount)
            .order_by_asc(video::Column::Id)
            .limit(Some(limit))
            .all(&self.db)
            .await?)
    }

    async fn list_storage_accounts(
        &self,
        active_only: bool,
    ) -> Result<Vec<storage_account::Model>, CatalogError> {
        let mut select = storage_account::Entity::find();
        if active_only {
            select = select.filter(storage_account::Column::IsActive.eq(true));
        }
        Ok(select
            .order_by_asc(storage_account::Column::CreatedAt)
            .all(&self.db)
            .await?)
    }

    async fn get_storage_account(
        &self,
        id: Uuid,
    ) -> Result<Option<storage_account::Model>, CatalogError> {
        Ok(storage_account::Entity::find_by_id(id).one(&self.db).await?)
    }

    async fn save_storage_account(
        &self,
        account: storage_account::Model,
    ) -> Result<storage_account::Model, CatalogError> {
        let exists = storage_account::Entity::find_by_id(account.id)
            .one(&self.db)
            .await?
            .is_some();

        let active = account.into_active_model().reset_all();
        let saved = if exists {
            active.update(&self.db).await?
        } else {
            active.insert(&self.db).await?
        };
        Ok(saved)
    }

    async fn set_storage_account_active(
        &self,
        id: Uuid,
        active: bool,
    ) -> Result<Option<storage_account::Model>, CatalogError> {
        let Some(account) = storage_account::Entity::find_by_id(id).one(&self.db).await? else {
            return Ok(None);
        };

        let mut model = account.into_active_model();
        model.is_active = Set(active);
        model.updated_at = Set(Utc::now());
        Ok(Some(model.update(&self.db).await?))
    }

    async fn update_storage_used(&self, id: Uuid, used_gb: f64) -> Result<(), CatalogError> {
        let result = storage_account::Entity::update_many()
            .col_expr(storage_account::Column::StorageUsedGb, Expr::value(used_gb))
            .col_expr(storage_account::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(storage_account::Column::Id.eq(id))
            .exec(&self.db)
            .await?;
        expect_row(result.rows_affected, "storage account", id)
    }

    async fn list_videos_with_expiring_links(
        &self,
        within: chrono::Duration,
    ) -> Result<Vec<video::Model>, CatalogError> {
        Ok(video::Entity::find()
            .filter(video::Column::SourceUrlExpiresAt.lt(Utc::now() + within))
            .order_by_asc(video::Column::SourceUrlExpiresAt)
            .all(&self.db)
            .await?)
    }

    async fn update_source_url(
        &self,
        id: Uuid,
        url: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), CatalogError> {
        let result = video::Entity::update_many()
            .col_expr(video::Column::SourceUrl, Expr::value(url))
            .col_expr(video::Column::SourceUrlExpiresAt, Expr::value(expires_at))
            .col_expr(video::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(video::Column::Id.eq(id))
            .exec(&self.db)
            .await?;
        expect_row(result.rows_affected, "video", id)
    }
}
