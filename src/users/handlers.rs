use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, patch},
    Json, Router,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::dto::PublicUser,
    auth::extractors::CurrentUser,
    error::AppError,
    policy::restrict_to,
    state::AppState,
    users::dto::{AdminUpdateUserRequest, Pagination, SearchParams, UpdateMeRequest},
    users::repo::{self, AdminUserUpdate, ProfileUpdate, Role, User},
};

pub fn routes() -> Router<AppState> {
    Router::new()
        // current user
        .route("/users/me", get(get_me))
        .route("/users/updateMe", patch(update_me))
        .route("/users/deleteMe", delete(delete_me))
        // social graph
        .route("/users/:id/follow", patch(follow_user))
        .route("/users/:id/unfollow", patch(unfollow_user))
        .route("/users/:id/followers", get(get_followers))
        .route("/users/:id/following", get(get_following))
        // public profile and search
        .route("/users/u/:username", get(get_by_username))
        .route("/users/search", get(search_users))
        // admin
        .route("/users", get(admin_list_users))
        .route(
            "/users/:id",
            get(admin_get_user)
                .patch(admin_update_user)
                .delete(admin_delete_user),
        )
}

#[instrument(skip_all)]
pub async fn get_me(CurrentUser(user): CurrentUser) -> Json<PublicUser> {
    Json(PublicUser::from(user))
}

#[instrument(skip_all)]
pub async fn update_me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<UpdateMeRequest>,
) -> Result<Json<PublicUser>, AppError> {
    if payload.password.is_some() || payload.password_confirm.is_some() {
        return Err(AppError::validation(
            "this route is not for password updates, please use /updateMyPassword",
        ));
    }
    if let Some(name) = &payload.name {
        if name.trim().is_empty() || name.len() > 100 {
            return Err(AppError::validation("please provide a valid name"));
        }
    }
    if let Some(bio) = &payload.bio {
        if bio.len() > 255 {
            return Err(AppError::validation("a biography must have 255 characters or less"));
        }
    }

    let updated = User::update_profile(
        &state.db,
        user.id,
        ProfileUpdate {
            name: payload.name,
            photo: payload.photo,
            bio: payload.bio,
        },
    )
    .await?;

    info!(user_id = %updated.id, "profile updated");
    Ok(Json(PublicUser::from(updated)))
}

#[instrument(skip_all)]
pub async fn delete_me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<StatusCode, AppError> {
    User::deactivate(&state.db, user.id).await?;
    info!(user_id = %user.id, "account deactivated");
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, current_user))]
pub async fn follow_user(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let CurrentUser(user) = current_user;
    if user.id == id {
        return Err(AppError::validation("you cannot follow yourself"));
    }
    let target = User::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| AppError::not_found("no user found with that ID"))?;

    repo::follow(&state.db, user.id, target.id).await?;
    info!(follower = %user.id, followee = %target.id, "followed");
    Ok(StatusCode::OK)
}

#[instrument(skip(state, current_user))]
pub async fn unfollow_user(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let CurrentUser(user) = current_user;
    let target = User::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| AppError::not_found("no user found with that ID"))?;

    repo::unfollow(&state.db, user.id, target.id).await?;
    info!(follower = %user.id, followee = %target.id, "unfollowed");
    Ok(StatusCode::OK)
}

#[instrument(skip(state, _current_user))]
pub async fn get_followers(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<PublicUser>>, AppError> {
    let users = repo::followers_of(&state.db, id).await?;
    Ok(Json(users.into_iter().map(PublicUser::from).collect()))
}

#[instrument(skip(state, _current_user))]
pub async fn get_following(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<PublicUser>>, AppError> {
    let users = repo::following_of(&state.db, id).await?;
    Ok(Json(users.into_iter().map(PublicUser::from).collect()))
}

#[instrument(skip(state))]
pub async fn get_by_username(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Json<PublicUser>, AppError> {
    let user = User::find_by_username(&state.db, &username)
        .await?
        .ok_or_else(|| AppError::not_found("no user found with that username"))?;
    Ok(Json(PublicUser::from(user)))
}

#[instrument(skip(state))]
pub async fn search_users(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<PublicUser>>, AppError> {
    let q = params.q.trim();
    if q.is_empty() {
        return Err(AppError::validation("please provide a search query"));
    }
    let users = User::search(&state.db, q, 20).await?;
    Ok(Json(users.into_iter().map(PublicUser::from).collect()))
}

// --- admin ---

#[instrument(skip(state, current_user))]
pub async fn admin_list_users(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(p): Query<Pagination>,
) -> Result<Json<Vec<PublicUser>>, AppError> {
    restrict_to(&current_user.0, &[Role::Admin])?;
    let users = User::list(&state.db, p.limit.clamp(1, 100), p.offset.max(0)).await?;
    Ok(Json(users.into_iter().map(PublicUser::from).collect()))
}

#[instrument(skip(state, current_user))]
pub async fn admin_get_user(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<PublicUser>, AppError> {
    restrict_to(&current_user.0, &[Role::Admin])?;
    // Admins see deactivated accounts too.
    let user = User::find_by_id_any(&state.db, id)
        .await?
        .ok_or_else(|| AppError::not_found("no user found with that ID"))?;
    Ok(Json(PublicUser::from(user)))
}

#[instrument(skip(state, current_user, payload))]
pub async fn admin_update_user(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<AdminUpdateUserRequest>,
) -> Result<Json<PublicUser>, AppError> {
    restrict_to(&current_user.0, &[Role::Admin])?;

    if let Some(email) = &payload.email {
        if !crate::auth::handlers::is_valid_email(email) {
            return Err(AppError::validation("please provide a valid email"));
        }
    }

    let updated = User::admin_update(
        &state.db,
        id,
        AdminUserUpdate {
            name: payload.name,
            email: payload.email.map(|e| e.trim().to_lowercase()),
            role: payload.role,
            active: payload.active,
        },
    )
    .await?
    .ok_or_else(|| AppError::not_found("no user found with that ID"))?;

    warn!(admin = %current_user.0.id, user_id = %updated.id, "admin updated user");
    Ok(Json(PublicUser::from(updated)))
}

#[instrument(skip(state, current_user))]
pub async fn admin_delete_user(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    restrict_to(&current_user.0, &[Role::Admin])?;
    let user = User::find_by_id_any(&state.db, id)
        .await?
        .ok_or_else(|| AppError::not_found("no user found with that ID"))?;

    // Accounts are never physically removed; delete means deactivate.
    User::deactivate(&state.db, user.id).await?;
    warn!(admin = %current_user.0.id, user_id = %user.id, "admin deactivated user");
    Ok(StatusCode::NO_CONTENT)
}
