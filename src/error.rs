use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Operational errors with a client-safe message. Anything that falls
/// through to `Internal` is logged in full and surfaced as a generic 500 so
/// internals never leak.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("you do not have permission to perform this action")]
    Forbidden,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("token is invalid or has expired")]
    InvalidOrExpiredToken,

    #[error("there was an error sending the email, try again later")]
    EmailDelivery(#[source] anyhow::Error),

    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

/// Maps storage failures by discriminant instead of funneling everything
/// into a 500. A unique-index violation is a client problem (the row they
/// tried to claim already exists), so it surfaces as a 400; everything else
/// stays internal.
impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                Self::Validation("duplicate field value, please use another value".into())
            }
            _ => Self::Internal(e.into()),
        }
    }
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn unauthenticated(msg: impl Into<String>) -> Self {
        Self::Unauthenticated(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::InvalidOrExpiredToken => StatusCode::BAD_REQUEST,
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::EmailDelivery(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    status: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            Self::Internal(e) => {
                tracing::error!(error = ?e, "internal error");
                "something went wrong".to_string()
            }
            Self::EmailDelivery(e) => {
                tracing::error!(error = ?e, "email delivery failed");
                self.to_string()
            }
            other => other.to_string(),
        };
        let body = ErrorResponse {
            status: if status.is_client_error() { "fail" } else { "error" },
            message,
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_the_contract() {
        assert_eq!(
            AppError::validation("bad").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::InvalidOrExpiredToken.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::unauthenticated("nope").status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(AppError::Forbidden.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            AppError::not_found("gone").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::EmailDelivery(anyhow::anyhow!("smtp down")).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn unexpected_errors_hide_details() {
        let resp = AppError::Internal(anyhow::anyhow!("secret column missing")).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
