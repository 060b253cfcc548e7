use axum::{
    async_trait,
    extract::FromRequestParts,
    http::request::Parts,
};
use tracing::warn;

use crate::auth::jwt::{JwtKeys, TokenError};
use crate::error::AppError;
use crate::state::AppState;

/// The acting identity, resolved fresh from storage for every protected
/// request. A linear gate: each step either passes the identity through or
/// rejects the request. Existence is checked before staleness because a
/// deactivated user has no meaningful change timestamp to compare against.
pub struct CurrentUser(pub crate::users::repo::User);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        // 1) token must be present in the Authorization header
        let auth = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or_else(|| {
                AppError::unauthenticated("you are not logged in, please log in to get access")
            })?;

        let token = auth
            .strip_prefix("Bearer ")
            .or_else(|| auth.strip_prefix("bearer "))
            .ok_or_else(|| {
                AppError::unauthenticated("you are not logged in, please log in to get access")
            })?;

        // 2) signature and expiry; the distinction only matters for the log
        let keys = JwtKeys::new(&state.config.jwt);
        let claims = keys.verify(token).map_err(|e| {
            match e {
                TokenError::Expired => warn!("rejected expired token"),
                TokenError::Invalid => warn!("rejected invalid token"),
            }
            AppError::unauthenticated("invalid or expired token, please log in again")
        })?;

        // 3) the subject must still exist and be active
        let user = crate::users::repo::User::find_by_id(&state.db, claims.sub)
            .await?
            .ok_or_else(|| {
                warn!(user_id = %claims.sub, "token subject no longer exists");
                AppError::unauthenticated("the user belonging to this token does no longer exist")
            })?;

        // 4) tokens issued before a password change are permanently unusable
        if user.changed_password_after(claims.iat) {
            warn!(user_id = %user.id, "token predates password change");
            return Err(AppError::unauthenticated(
                "user recently changed password, please log in again",
            ));
        }

        // 5) bind
        Ok(CurrentUser(user))
    }
}
