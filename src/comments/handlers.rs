use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, patch},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    auth::extractors::CurrentUser,
    comments::repo::Comment,
    error::AppError,
    policy::can_mutate,
    posts::repo::Post,
    state::AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/comments/:id",
            get(get_comment).patch(update_comment).delete(delete_comment),
        )
        .route("/comments/:id/like", patch(toggle_like))
}

const MAX_CONTENT_LEN: usize = 255;

#[derive(Debug, Deserialize)]
pub struct CommentBody {
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct CommentLikeResponse {
    pub comment_id: Uuid,
    pub liked: bool,
}

fn validate_content(content: &str) -> Result<(), AppError> {
    if content.trim().is_empty() {
        return Err(AppError::validation("please enter a comment"));
    }
    if content.len() > MAX_CONTENT_LEN {
        return Err(AppError::validation(
            "a comment must have 255 characters or less",
        ));
    }
    Ok(())
}

/// GET /posts/:id/comments
#[instrument(skip(state))]
pub async fn list_for_post(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
) -> Result<Json<Vec<Comment>>, AppError> {
    let comments = Comment::list_for_post(&state.db, post_id).await?;
    Ok(Json(comments))
}

/// POST /posts/:id/comments
#[instrument(skip(state, current_user, payload))]
pub async fn create(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(post_id): Path<Uuid>,
    Json(payload): Json<CommentBody>,
) -> Result<(StatusCode, Json<Comment>), AppError> {
    validate_content(&payload.content)?;

    // Comments attach to an existing post only.
    let post = Post::find_by_id(&state.db, post_id)
        .await?
        .ok_or_else(|| AppError::not_found("no post found with that ID"))?;

    let comment = Comment::create(&state.db, post.id, current_user.0.id, &payload.content).await?;
    info!(comment_id = %comment.id, post_id = %post.id, "comment created");
    Ok((StatusCode::CREATED, Json(comment)))
}

#[instrument(skip(state))]
pub async fn get_comment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Comment>, AppError> {
    let comment = Comment::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| AppError::not_found("no comment found with that ID"))?;
    Ok(Json(comment))
}

#[instrument(skip(state, current_user, payload))]
pub async fn update_comment(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<CommentBody>,
) -> Result<Json<Comment>, AppError> {
    let comment = Comment::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| AppError::not_found("no comment found with that ID"))?;

    if !can_mutate(comment.user_id, &current_user.0) {
        return Err(AppError::Forbidden);
    }
    validate_content(&payload.content)?;

    let updated = Comment::update(&state.db, id, &payload.content)
        .await?
        .ok_or_else(|| AppError::not_found("no comment found with that ID"))?;
    info!(comment_id = %updated.id, "comment updated");
    Ok(Json(updated))
}

#[instrument(skip(state, current_user))]
pub async fn delete_comment(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let comment = Comment::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| AppError::not_found("no comment found with that ID"))?;

    if !can_mutate(comment.user_id, &current_user.0) {
        return Err(AppError::Forbidden);
    }

    Comment::delete(&state.db, id).await?;
    info!(comment_id = %id, user_id = %current_user.0.id, "comment deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, current_user))]
pub async fn toggle_like(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<CommentLikeResponse>, AppError> {
    let comment = Comment::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| AppError::not_found("no comment found with that ID"))?;

    let liked = Comment::toggle_like(&state.db, comment.id, current_user.0.id).await?;
    Ok(Json(CommentLikeResponse {
        comment_id: comment.id,
        liked,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_validation_bounds() {
        assert!(validate_content("nice post").is_ok());
        assert!(validate_content("").is_err());
        assert!(validate_content(&"y".repeat(MAX_CONTENT_LEN + 1)).is_err());
    }
}
