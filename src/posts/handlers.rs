use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch},
    Json, Router,
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    auth::extractors::CurrentUser,
    error::AppError,
    policy::can_mutate,
    posts::dto::{CreatePostRequest, LikeResponse, UpdatePostRequest},
    posts::repo::Post,
    state::AppState,
    users::dto::Pagination,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/posts", get(list_posts).post(create_post))
        .route("/posts/me", get(get_my_posts))
        .route("/posts/user/:id", get(get_posts_by_user))
        .route("/posts/:id", get(get_post).patch(update_post).delete(delete_post))
        .route("/posts/:id/like", patch(toggle_like))
        .merge(comment_routes())
}

fn comment_routes() -> Router<AppState> {
    Router::new().route(
        "/posts/:id/comments",
        get(crate::comments::handlers::list_for_post).post(crate::comments::handlers::create),
    )
}

const MAX_CAPTION_LEN: usize = 255;

fn validate_caption(caption: &str) -> Result<(), AppError> {
    if caption.trim().is_empty() {
        return Err(AppError::validation("please enter a caption"));
    }
    if caption.len() > MAX_CAPTION_LEN {
        return Err(AppError::validation(
            "a caption must have 255 characters or less",
        ));
    }
    Ok(())
}

#[instrument(skip(state))]
pub async fn list_posts(
    State(state): State<AppState>,
    Query(p): Query<Pagination>,
) -> Result<Json<Vec<Post>>, AppError> {
    let posts = Post::list(&state.db, p.limit.clamp(1, 100), p.offset.max(0)).await?;
    Ok(Json(posts))
}

#[instrument(skip(state))]
pub async fn get_post(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Post>, AppError> {
    let post = Post::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| AppError::not_found("no post found with that ID"))?;
    Ok(Json(post))
}

#[instrument(skip(state, current_user))]
pub async fn get_my_posts(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> Result<Json<Vec<Post>>, AppError> {
    let posts = Post::list_by_user(&state.db, current_user.0.id).await?;
    Ok(Json(posts))
}

#[instrument(skip(state))]
pub async fn get_posts_by_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Post>>, AppError> {
    let posts = Post::list_by_user(&state.db, id).await?;
    Ok(Json(posts))
}

#[instrument(skip(state, current_user, payload))]
pub async fn create_post(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(payload): Json<CreatePostRequest>,
) -> Result<(StatusCode, Json<Post>), AppError> {
    validate_caption(&payload.caption)?;
    if payload.image.trim().is_empty() {
        return Err(AppError::validation("please enter an image"));
    }

    let post = Post::create(&state.db, current_user.0.id, &payload.caption, &payload.image).await?;
    info!(post_id = %post.id, user_id = %current_user.0.id, "post created");
    Ok((StatusCode::CREATED, Json(post)))
}

#[instrument(skip(state, current_user, payload))]
pub async fn update_post(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdatePostRequest>,
) -> Result<Json<Post>, AppError> {
    let post = Post::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| AppError::not_found("no post found with that ID"))?;

    if !can_mutate(post.user_id, &current_user.0) {
        return Err(AppError::Forbidden);
    }
    if let Some(caption) = &payload.caption {
        validate_caption(caption)?;
    }

    let updated = Post::update(&state.db, id, payload.caption, payload.image)
        .await?
        .ok_or_else(|| AppError::not_found("no post found with that ID"))?;
    info!(post_id = %updated.id, "post updated");
    Ok(Json(updated))
}

#[instrument(skip(state, current_user))]
pub async fn delete_post(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let post = Post::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| AppError::not_found("no post found with that ID"))?;

    if !can_mutate(post.user_id, &current_user.0) {
        return Err(AppError::Forbidden);
    }

    Post::delete(&state.db, id).await?;
    info!(post_id = %id, user_id = %current_user.0.id, "post deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, current_user))]
pub async fn toggle_like(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<LikeResponse>, AppError> {
    let post = Post::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| AppError::not_found("no post found with that ID"))?;

    let liked = Post::toggle_like(&state.db, post.id, current_user.0.id).await?;
    Ok(Json(LikeResponse { post_id: post.id, liked }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caption_validation_bounds() {
        assert!(validate_caption("hello").is_ok());
        assert!(validate_caption("  ").is_err());
        assert!(validate_caption(&"x".repeat(MAX_CAPTION_LEN)).is_ok());
        assert!(validate_caption(&"x".repeat(MAX_CAPTION_LEN + 1)).is_err());
    }
}
