//! Application error types.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tally_core::auth::AuthError;
use tally_core::auth::sessions::SessionError;
use tally_core::billing::BillingError;
use thiserror::Error;
use tracing::error;

use crate::models::ErrorResponse;

/// Convenience alias for handler return types.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level errors with HTTP status mapping.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal server error")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Validation(m) => (StatusCode::BAD_REQUEST, m),
            AppError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, m),
            AppError::Forbidden(m) => (StatusCode::FORBIDDEN, m),
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            AppError::Conflict(m) => (StatusCode::CONFLICT, m),
            AppError::RateLimited(m) => (StatusCode::TOO_MANY_REQUESTS, m),
            AppError::Configuration(m) => {
                error!(error = %m, "configuration error");
                (StatusCode::INTERNAL_SERVER_ERROR, m)
            }
            AppError::Internal(cause) => {
                error!(error = %cause, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::InvalidCredentials
            | AuthError::InvalidToken
            | AuthError::InvalidRefreshToken
            | AuthError::IncorrectPassword => AppError::Unauthorized(e.to_string()),
            AuthError::Validation(msg) => AppError::Validation(msg),
            AuthError::NotFound(msg) => AppError::NotFound(msg),
            AuthError::Conflict(msg) => AppError::Conflict(msg),
            AuthError::Forbidden(msg) => AppError::Forbidden(msg),
            AuthError::Configuration(msg) => AppError::Configuration(msg),
            AuthError::Persistence(e) => AppError::Internal(e.to_string()),
            AuthError::Internal(msg) => AppError::Internal(msg),
        }
    }
}

impl From<SessionError> for AppError {
    fn from(e: SessionError) -> Self {
        AppError::from(AuthError::from(e))
    }
}

impl From<BillingError> for AppError {
    fn from(e: BillingError) -> Self {
        match e {
            BillingError::Validation(msg) => AppError::Validation(msg),
            BillingError::NoPriceConfigured(_) => AppError::Configuration(e.to_string()),
            BillingError::NotFound(msg) => AppError::NotFound(msg),
            BillingError::Conflict(msg) => AppError::Conflict(msg),
            BillingError::Forbidden(msg) => AppError::Forbidden(msg),
            BillingError::Persistence(e) => AppError::Internal(e.to_string()),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_of(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn invalid_credentials_is_401_with_message() {
        let (status, body) = body_of(AuthError::InvalidCredentials.into()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, serde_json::json!({"error": "Invalid credentials"}));
    }

    #[tokio::test]
    async fn internal_errors_hide_the_cause() {
        let (status, body) = body_of(AppError::Internal("pool timed out".into())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Internal server error");
    }

    #[tokio::test]
    async fn missing_price_is_a_server_error_with_the_date() {
        let date = chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let (status, body) = body_of(BillingError::NoPriceConfigured(date).into()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "No price configured for 2024-01-01");
    }

    #[tokio::test]
    async fn conflict_maps_to_409() {
        let (status, _) = body_of(AuthError::Conflict("User already exists".into()).into()).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }
}
