use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    routing::{patch, post},
    Json, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::{
            AuthResponse, ForgotPasswordRequest, LoginRequest, PublicUser, ResetPasswordRequest,
            SignupRequest, UpdatePasswordRequest,
        },
        extractors::CurrentUser,
        jwt::JwtKeys,
        password::{hash_password, validate_password, verify_password},
        reset,
    },
    config::JwtConfig,
    error::AppError,
    state::AppState,
    users::repo::{NewUser, User},
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/users/signup", post(signup))
        .route("/users/login", post(login))
        .route("/users/forgotPassword", post(forgot_password))
        .route("/users/resetPassword/:token", patch(reset_password))
        .route("/users/updateMyPassword", patch(update_password))
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Renders the http-only cookie that mirrors the token in the response
/// body. The browser cannot touch it; `Secure` is flipped on by config in
/// deployments behind TLS.
fn token_cookie(token: &str, config: &JwtConfig) -> String {
    let max_age = config.cookie_expires_days * 24 * 60 * 60;
    let mut cookie = format!("jwt={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}");
    if config.cookie_secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Shared tail of every credential-issuing flow: sign, set cookie, return
/// token plus the public user view.
fn send_token(
    user: User,
    status: StatusCode,
    state: &AppState,
) -> Result<(StatusCode, HeaderMap, Json<AuthResponse>), AppError> {
    let keys = JwtKeys::new(&state.config.jwt);
    let token = keys.sign(user.id)?;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::SET_COOKIE,
        token_cookie(&token, &state.config.jwt)
            .parse()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("cookie header: {e}")))?,
    );

    Ok((
        status,
        headers,
        Json(AuthResponse {
            token,
            user: PublicUser::from(user),
        }),
    ))
}

fn check_password_pair(password: &str, confirm: &str) -> Result<(), AppError> {
    validate_password(password)?;
    if password != confirm {
        return Err(AppError::validation("passwords are not the same"));
    }
    Ok(())
}

#[instrument(skip(state, payload))]
pub async fn signup(
    State(state): State<AppState>,
    Json(mut payload): Json<SignupRequest>,
) -> Result<(StatusCode, HeaderMap, Json<AuthResponse>), AppError> {
    payload.email = payload.email.trim().to_lowercase();
    payload.username = payload.username.trim().to_string();

    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(AppError::validation("please provide a valid email"));
    }
    if payload.username.is_empty() || payload.username.len() > 100 {
        return Err(AppError::validation("please provide a username"));
    }
    if payload.name.trim().is_empty() || payload.name.len() > 100 {
        return Err(AppError::validation("please provide a name"));
    }
    check_password_pair(&payload.password, &payload.password_confirm)?;

    if User::find_by_email(&state.db, &payload.email).await?.is_some() {
        warn!(email = %payload.email, "email already registered");
        return Err(AppError::validation("email already registered"));
    }
    if User::find_by_username(&state.db, &payload.username)
        .await?
        .is_some()
    {
        return Err(AppError::validation("username already taken"));
    }

    let hash = hash_password(&payload.password)?;
    let user = User::create(
        &state.db,
        NewUser {
            username: &payload.username,
            name: &payload.name,
            email: &payload.email,
            password_hash: &hash,
        },
    )
    .await?;

    info!(user_id = %user.id, "user signed up");
    send_token(user, StatusCode::CREATED, &state)
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(mut payload): Json<LoginRequest>,
) -> Result<(StatusCode, HeaderMap, Json<AuthResponse>), AppError> {
    payload.email = payload.email.trim().to_lowercase();

    if payload.email.is_empty() || payload.password.is_empty() {
        return Err(AppError::validation("please provide email and password"));
    }

    // The unknown-email and wrong-password paths collapse into one answer
    // so the response does not reveal which one happened.
    let user = match User::find_by_email(&state.db, &payload.email).await? {
        Some(u) => u,
        None => {
            warn!(email = %payload.email, "login unknown email");
            return Err(AppError::unauthenticated("incorrect email or password"));
        }
    };

    if !verify_password(&payload.password, &user.password_hash)? {
        warn!(user_id = %user.id, "login invalid password");
        return Err(AppError::unauthenticated("incorrect email or password"));
    }

    info!(user_id = %user.id, "user logged in");
    send_token(user, StatusCode::OK, &state)
}

#[derive(Debug, serde::Serialize)]
pub struct StatusMessage {
    pub status: &'static str,
    pub message: &'static str,
}

#[instrument(skip(state, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> Result<Json<StatusMessage>, AppError> {
    let email = payload.email.trim().to_lowercase();
    let user = User::find_by_email(&state.db, &email)
        .await?
        .ok_or_else(|| AppError::not_found("there is no user with that email address"))?;

    let token = reset::generate();
    let expires_at = time::OffsetDateTime::now_utc()
        + time::Duration::minutes(state.config.reset_token_ttl_minutes);
    User::set_reset_token(&state.db, user.id, &token.hash, expires_at).await?;

    let body = format!(
        "Forgot your password? Submit a PATCH request with your new password and \
         passwordConfirm to /api/v1/users/resetPassword/{}.\n\
         If you didn't forget your password, please ignore this email!",
        token.plaintext
    );

    if let Err(e) = state
        .mailer
        .send(&user.email, "Your password reset token (valid for 10 min)", &body)
        .await
    {
        // Delivery failed: the token must not survive in a state where it
        // was generated but never reached the user. Keyed on this request's
        // hash so a token from a newer forgot-password request is untouched.
        User::clear_reset_token(&state.db, user.id, &token.hash).await?;
        return Err(AppError::EmailDelivery(e));
    }

    info!(user_id = %user.id, "password reset token sent");
    Ok(Json(StatusMessage {
        status: "success",
        message: "token sent to email",
    }))
}

#[instrument(skip(state, payload, token))]
pub async fn reset_password(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<(StatusCode, HeaderMap, Json<AuthResponse>), AppError> {
    check_password_pair(&payload.password, &payload.password_confirm)?;

    let token_hash = reset::hash_token(&token);
    let new_hash = hash_password(&payload.password)?;

    // Single conditional update: matches only while the token is pending
    // and unexpired, and clears it in the same statement. A second attempt
    // with the same token finds nothing.
    let user = User::consume_reset_token(&state.db, &token_hash, &new_hash)
        .await?
        .ok_or(AppError::InvalidOrExpiredToken)?;

    info!(user_id = %user.id, "password reset completed");
    send_token(user, StatusCode::OK, &state)
}

#[instrument(skip(state, current_user, payload))]
pub async fn update_password(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(payload): Json<UpdatePasswordRequest>,
) -> Result<(StatusCode, HeaderMap, Json<AuthResponse>), AppError> {
    let CurrentUser(user) = current_user;

    if !verify_password(&payload.password_current, &user.password_hash)? {
        warn!(user_id = %user.id, "password change with wrong current password");
        return Err(AppError::unauthenticated("your current password is wrong"));
    }
    check_password_pair(&payload.password, &payload.password_confirm)?;

    let new_hash = hash_password(&payload.password)?;
    let user = User::update_password(&state.db, user.id, &new_hash).await?;

    info!(user_id = %user.id, "password updated");
    send_token(user, StatusCode::OK, &state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_regex_accepts_and_rejects() {
        assert!(is_valid_email("a@b.co"));
        assert!(is_valid_email("first.last@sub.domain.org"));
        assert!(!is_valid_email("no-at-sign"));
        assert!(!is_valid_email("two@@at.com"));
        assert!(!is_valid_email("spaces in@mail.com"));
    }

    #[test]
    fn cookie_carries_httponly_and_max_age() {
        let config = JwtConfig {
            secret: "s".into(),
            ttl_minutes: 5,
            cookie_expires_days: 2,
            cookie_secure: false,
        };
        let cookie = token_cookie("abc.def.ghi", &config);
        assert!(cookie.starts_with("jwt=abc.def.ghi;"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("Max-Age=172800"));
        assert!(!cookie.contains("Secure"));
    }

    #[test]
    fn cookie_secure_flag_is_configurable() {
        let config = JwtConfig {
            secret: "s".into(),
            ttl_minutes: 5,
            cookie_expires_days: 1,
            cookie_secure: true,
        };
        assert!(token_cookie("t", &config).ends_with("; Secure"));
    }

    #[test]
    fn password_pair_must_match() {
        assert!(check_password_pair("Secret123", "Secret123").is_ok());
        assert!(matches!(
            check_password_pair("Secret123", "Secret124"),
            Err(AppError::Validation(_))
        ));
    }
}
