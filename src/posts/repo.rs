use serde::Serialize;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Post {
    pub id: Uuid,
    pub user_id: Uuid,
    pub caption: String,
    pub image: String,
    pub likes_count: i64,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

const POST_SELECT: &str = "SELECT p.id, p.user_id, p.caption, p.image, \
     (SELECT count(*) FROM post_likes l WHERE l.post_id = p.id) AS likes_count, \
     p.created_at, p.updated_at \
     FROM posts p";

impl Post {
    pub async fn find_by_id(db: &PgPool, id: Uuid) -> Result<Option<Post>, AppError> {
        let post = sqlx::query_as::<_, Post>(&format!("{POST_SELECT} WHERE p.id = $1"))
            .bind(id)
            .fetch_optional(db)
            .await?;
        Ok(post)
    }

    pub async fn list(db: &PgPool, limit: i64, offset: i64) -> Result<Vec<Post>, AppError> {
        let posts = sqlx::query_as::<_, Post>(&format!(
            "{POST_SELECT} ORDER BY p.created_at DESC LIMIT $1 OFFSET $2"
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(db)
        .await?;
        Ok(posts)
    }

    pub async fn list_by_user(db: &PgPool, user_id: Uuid) -> Result<Vec<Post>, AppError> {
        let posts = sqlx::query_as::<_, Post>(&format!(
            "{POST_SELECT} WHERE p.user_id = $1 ORDER BY p.created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(db)
        .await?;
        Ok(posts)
    }

    pub async fn create(
        db: &PgPool,
        user_id: Uuid,
        caption: &str,
        image: &str,
    ) -> Result<Post, AppError> {
        let post = sqlx::query_as::<_, Post>(
            "INSERT INTO posts (user_id, caption, image) VALUES ($1, $2, $3) \
             RETURNING id, user_id, caption, image, 0::bigint AS likes_count, \
                       created_at, updated_at",
        )
        .bind(user_id)
        .bind(caption)
        .bind(image)
        .fetch_one(db)
        .await?;
        Ok(post)
    }

    pub async fn update(
        db: &PgPool,
        id: Uuid,
        caption: Option<String>,
        image: Option<String>,
    ) -> Result<Option<Post>, AppError> {
        sqlx::query(
            "UPDATE posts \
             SET caption = COALESCE($2, caption), \
                 image = COALESCE($3, image), \
                 updated_at = now() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(caption)
        .bind(image)
        .execute(db)
        .await?;
        Self::find_by_id(db, id).await
    }

    pub async fn delete(db: &PgPool, id: Uuid) -> Result<(), AppError> {
        sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id)
            .execute(db)
            .await?;
        Ok(())
    }

    /// Like if not yet liked, unlike otherwise. Returns whether the post is
    /// liked by the user after the call.
    pub async fn toggle_like(db: &PgPool, post_id: Uuid, user_id: Uuid) -> Result<bool, AppError> {
        let inserted = sqlx::query(
            "INSERT INTO post_likes (post_id, user_id) VALUES ($1, $2) \
             ON CONFLICT DO NOTHING",
        )
        .bind(post_id)
        .bind(user_id)
        .execute(db)
        .await?
        .rows_affected();

        if inserted == 0 {
            sqlx::query("DELETE FROM post_likes WHERE post_id = $1 AND user_id = $2")
                .bind(post_id)
                .bind(user_id)
                .execute(db)
                .await?;
            return Ok(false);
        }
        Ok(true)
    }
}
