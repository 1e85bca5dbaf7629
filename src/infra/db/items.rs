use async_trait::async_trait;
use time::OffsetDateTime;

use crate::{
    application::repos::{CreateItemParams, ItemsRepo, LikesRepo, RepoError, UpdateItemParams},
    domain::entities::{ItemId, ItemRecord, UserId},
};

use super::{PostgresRepositories, map_sqlx_error};

const ITEM_COLUMNS: &str = "id, owner_id, title, completed, like_count, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct ItemRow {
    id: i64,
    owner_id: i64,
    title: String,
    completed: bool,
    like_count: i64,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<ItemRow> for ItemRecord {
    fn from(row: ItemRow) -> Self {
        Self {
            id: row.id,
            owner_id: row.owner_id,
            title: row.title,
            completed: row.completed,
            like_count: row.like_count,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl ItemsRepo for PostgresRepositories {
    async fn create_item(&self, params: CreateItemParams) -> Result<ItemRecord, RepoError> {
        let sql = format!(
            "INSERT INTO items (owner_id, title, completed) VALUES ($1, $2, $3) RETURNING {ITEM_COLUMNS}"
        );
        let row = sqlx::query_as::<_, ItemRow>(&sql)
            .bind(params.owner_id)
            .bind(params.title)
            .bind(params.completed)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.into())
    }

    async fn update_item(&self, params: UpdateItemParams) -> Result<ItemRecord, RepoError> {
        let sql = format!(
            "UPDATE items SET title = $2, completed = $3, updated_at = now() \
             WHERE id = $1 RETURNING {ITEM_COLUMNS}"
        );
        let row = sqlx::query_as::<_, ItemRow>(&sql)
            .bind(params.id)
            .bind(params.title)
            .bind(params.completed)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?
            .ok_or(RepoError::NotFound)?;
        Ok(row.into())
    }

    async fn delete_item(&self, id: ItemId) -> Result<(), RepoError> {
        let result = sqlx::query("DELETE FROM items WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn find_item(&self, id: ItemId) -> Result<Option<ItemRecord>, RepoError> {
        let sql = format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = $1");
        let row = sqlx::query_as::<_, ItemRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(Into::into))
    }

    async fn list_items(&self) -> Result<Vec<ItemRecord>, RepoError> {
        let sql = format!("SELECT {ITEM_COLUMNS} FROM items ORDER BY id ASC");
        let rows = sqlx::query_as::<_, ItemRow>(&sql)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn ping(&self) -> Result<(), RepoError> {
        self.health_check().await.map_err(map_sqlx_error)
    }
}

#[async_trait]
impl LikesRepo for PostgresRepositories {
    async fn has_liked(&self, item_id: ItemId, user_id: UserId) -> Result<bool, RepoError> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM item_likes WHERE item_id = $1 AND user_id = $2)",
        )
        .bind(item_id)
        .bind(user_id)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)
    }

    async fn add_like(&self, item_id: ItemId, user_id: UserId) -> Result<i64, RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        sqlx::query("INSERT INTO item_likes (item_id, user_id) VALUES ($1, $2)")
            .bind(item_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        let like_count = sqlx::query_scalar::<_, i64>(
            "UPDATE items SET like_count = like_count + 1 \
             WHERE id = $1 RETURNING like_count",
        )
        .bind(item_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_error)?
        .ok_or(RepoError::NotFound)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(like_count)
    }

    async fn remove_like(&self, item_id: ItemId, user_id: UserId) -> Result<i64, RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        let removed = sqlx::query("DELETE FROM item_likes WHERE item_id = $1 AND user_id = $2")
            .bind(item_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        if removed.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }

        let like_count = sqlx::query_scalar::<_, i64>(
            "UPDATE items SET like_count = GREATEST(like_count - 1, 0) \
             WHERE id = $1 RETURNING like_count",
        )
        .bind(item_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_error)?
        .ok_or(RepoError::NotFound)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(like_count)
    }
}
