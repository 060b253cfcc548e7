use serde::Serialize;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Comment {
    pub id: Uuid,
    pub post_id: Uuid,
    pub user_id: Uuid,
    /// Author username, joined in so clients need no second lookup.
    pub username: String,
    pub content: String,
    pub likes_count: i64,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

const COMMENT_SELECT: &str = "SELECT c.id, c.post_id, c.user_id, u.username, c.content, \
     (SELECT count(*) FROM comment_likes l WHERE l.comment_id = c.id) AS likes_count, \
     c.created_at, c.updated_at \
     FROM comments c JOIN users u ON u.id = c.user_id";

impl Comment {
    pub async fn find_by_id(db: &PgPool, id: Uuid) -> Result<Option<Comment>, AppError> {
        let comment = sqlx::query_as::<_, Comment>(&format!("{COMMENT_SELECT} WHERE c.id = $1"))
            .bind(id)
            .fetch_optional(db)
            .await?;
        Ok(comment)
    }

    pub async fn list_for_post(db: &PgPool, post_id: Uuid) -> Result<Vec<Comment>, AppError> {
        let comments = sqlx::query_as::<_, Comment>(&format!(
            "{COMMENT_SELECT} WHERE c.post_id = $1 ORDER BY c.created_at ASC"
        ))
        .bind(post_id)
        .fetch_all(db)
        .await?;
        Ok(comments)
    }

    pub async fn create(
        db: &PgPool,
        post_id: Uuid,
        user_id: Uuid,
        content: &str,
    ) -> Result<Comment, AppError> {
        let id: Uuid = sqlx::query_scalar(
            "INSERT INTO comments (post_id, user_id, content) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(post_id)
        .bind(user_id)
        .bind(content)
        .fetch_one(db)
        .await?;
        let comment = Self::find_by_id(db, id)
            .await?
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("comment vanished after insert")))?;
        Ok(comment)
    }

    pub async fn update(db: &PgPool, id: Uuid, content: &str) -> Result<Option<Comment>, AppError> {
        sqlx::query("UPDATE comments SET content = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(content)
            .execute(db)
            .await?;
        Self::find_by_id(db, id).await
    }

    pub async fn delete(db: &PgPool, id: Uuid) -> Result<(), AppError> {
        sqlx::query("DELETE FROM comments WHERE id = $1")
            .bind(id)
            .execute(db)
            .await?;
        Ok(())
    }

    pub async fn toggle_like(db: &PgPool, comment_id: Uuid, user_id: Uuid) -> Result<bool, AppError> {
        let inserted = sqlx::query(
            "INSERT INTO comment_likes (comment_id, user_id) VALUES ($1, $2) \
             ON CONFLICT DO NOTHING",
        )
        .bind(comment_id)
        .bind(user_id)
        .execute(db)
        .await?
        .rows_affected();

        if inserted == 0 {
            sqlx::query("DELETE FROM comment_likes WHERE comment_id = $1 AND user_id = $2")
                .bind(comment_id)
                .bind(user_id)
                .execute(db)
                .await?;
            return Ok(false);
        }
        Ok(true)
    }
}
