//! Authentication and session management.
//!
//! Provides password hashing, access-token signing, the refresh-token
//! session registry, login rate limiting and the login/refresh/logout flows
//! that compose them.

pub mod jwt;
pub mod password;
pub mod queries;
pub mod rate_limit;
pub mod service;
pub mod sessions;

use std::fmt;

use chrono::Duration;
use thiserror::Error;

use crate::store::StoreError;

/// Access token lifetime: 1 hour.
pub const ACCESS_TOKEN_EXPIRY_SECS: i64 = 60 * 60;

/// Refresh token lifetime: 30 days.
pub const REFRESH_TOKEN_EXPIRY_DAYS: i64 = 30;

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Invalid refresh token")]
    InvalidRefreshToken,

    #[error("Incorrect previous password")]
    IncorrectPassword,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Storage error: {0}")]
    Persistence(StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for AuthError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(msg) => AuthError::Conflict(msg),
            StoreError::NotFound(msg) => AuthError::NotFound(msg),
            other => AuthError::Persistence(other),
        }
    }
}

impl From<sessions::SessionError> for AuthError {
    fn from(e: sessions::SessionError) -> Self {
        match e {
            sessions::SessionError::NotFound | sessions::SessionError::Expired => {
                AuthError::InvalidRefreshToken
            }
            // owner deleted between lookup and reissue
            sessions::SessionError::Store(StoreError::NotFound(_)) => {
                AuthError::InvalidRefreshToken
            }
            sessions::SessionError::Store(other) => AuthError::from(other),
        }
    }
}

/// Settings for the auth subsystem, fixed at process start.
#[derive(Clone)]
pub struct AuthConfig {
    /// HS256 signing secret for access tokens.
    pub jwt_secret: String,
    /// bcrypt cost factor.
    pub bcrypt_cost: u32,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
}

impl AuthConfig {
    /// Defaults for everything but the secret.
    pub fn new(jwt_secret: impl Into<String>) -> Self {
        Self {
            jwt_secret: jwt_secret.into(),
            bcrypt_cost: password::DEFAULT_BCRYPT_COST,
            access_token_ttl: Duration::seconds(ACCESS_TOKEN_EXPIRY_SECS),
            refresh_token_ttl: Duration::days(REFRESH_TOKEN_EXPIRY_DAYS),
        }
    }

    pub fn with_bcrypt_cost(mut self, cost: u32) -> Self {
        self.bcrypt_cost = cost;
        self
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"<redacted>")
            .field("bcrypt_cost", &self.bcrypt_cost)
            .field("access_token_ttl", &self.access_token_ttl)
            .field("refresh_token_ttl", &self.refresh_token_ttl)
            .finish()
    }
}
