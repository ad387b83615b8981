//! Access-token signing and verification, plus refresh-token generation.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::RngCore;
use sha2::{Digest, Sha256};
use tracing::debug;
use uuid::Uuid;

use super::{AuthConfig, AuthError};
use crate::models::auth::{AccessClaims, Principal, Role};

/// Random bytes in a refresh token before hex encoding.
const REFRESH_TOKEN_BYTES: usize = 32;

/// Signs and verifies HS256 access tokens with the process-wide secret.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl: Duration,
}

impl TokenIssuer {
    /// Fails with `Configuration` when the secret is empty.
    pub fn new(config: &AuthConfig) -> Result<Self, AuthError> {
        if config.jwt_secret.is_empty() {
            return Err(AuthError::Configuration(
                "JWT secret must not be empty".into(),
            ));
        }
        let secret = config.jwt_secret.as_bytes();
        Ok(Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            access_ttl: config.access_token_ttl,
        })
    }

    /// Seconds an access token stays valid.
    pub fn access_ttl_secs(&self) -> i64 {
        self.access_ttl.num_seconds()
    }

    /// Sign an access token for `user_id`, valid from now.
    pub fn issue_access_token(&self, user_id: Uuid, role: Role) -> Result<String, AuthError> {
        self.issue_access_token_at(user_id, role, Utc::now())
    }

    /// Sign an access token as if issued at `issued_at`.
    pub fn issue_access_token_at(
        &self,
        user_id: Uuid,
        role: Role,
        issued_at: DateTime<Utc>,
    ) -> Result<String, AuthError> {
        let claims = AccessClaims {
            sub: user_id,
            role,
            iat: issued_at.timestamp(),
            exp: (issued_at + self.access_ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AuthError::Internal(format!("jwt encode: {e}")))
    }

    /// Verify signature and expiry. Any failure is `InvalidToken`.
    pub fn verify_access_token(&self, token: &str) -> Result<Principal, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);
        decode::<AccessClaims>(token, &self.decoding, &validation)
            .map(|data| Principal::from(data.claims))
            .map_err(|e| {
                debug!(error = %e, "access token rejected");
                AuthError::InvalidToken
            })
    }
}

/// Generate an opaque refresh token: 32 random bytes, hex encoded.
pub fn issue_refresh_token() -> String {
    let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// SHA-256 digest of a refresh token, as stored.
pub fn hash_refresh_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}
