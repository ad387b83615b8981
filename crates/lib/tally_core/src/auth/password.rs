//! Password hashing via bcrypt.
//!
//! Hashing and verification are CPU-bound; the async entry points run them
//! on tokio's blocking pool so request workers stay responsive.

use tracing::{error, warn};

use super::AuthError;

/// bcrypt cost factor used in production.
pub const DEFAULT_BCRYPT_COST: u32 = 10;

/// Lowest cost bcrypt accepts.
pub const MIN_BCRYPT_COST: u32 = 4;

/// Highest cost bcrypt accepts.
pub const MAX_BCRYPT_COST: u32 = 31;

/// Hash a password with bcrypt.
pub fn hash_password(password: &str, cost: u32) -> Result<String, AuthError> {
    bcrypt::hash(password, cost).map_err(|e| AuthError::Internal(format!("bcrypt hash: {e}")))
}

/// Verify a password against a bcrypt hash. A malformed hash verifies as
/// `false`.
pub fn verify_password(password: &str, hash: &str) -> bool {
    match bcrypt::verify(password, hash) {
        Ok(ok) => ok,
        Err(e) => {
            warn!(error = %e, "stored password hash is malformed");
            false
        }
    }
}

/// bcrypt with a fixed cost, offloaded to the blocking pool.
#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    cost: u32,
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Result<Self, AuthError> {
        if !(MIN_BCRYPT_COST..=MAX_BCRYPT_COST).contains(&cost) {
            return Err(AuthError::Configuration(format!(
                "bcrypt cost must be between {MIN_BCRYPT_COST} and {MAX_BCRYPT_COST}, got {cost}"
            )));
        }
        Ok(Self { cost })
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    pub async fn hash(&self, password: &str) -> Result<String, AuthError> {
        let password = password.to_owned();
        let cost = self.cost;
        tokio::task::spawn_blocking(move || hash_password(&password, cost))
            .await
            .map_err(|e| AuthError::Internal(format!("bcrypt task: {e}")))?
    }

    pub async fn verify(&self, password: &str, hash: &str) -> bool {
        let password = password.to_owned();
        let hash = hash.to_owned();
        match tokio::task::spawn_blocking(move || verify_password(&password, &hash)).await {
            Ok(ok) => ok,
            Err(e) => {
                error!(error = %e, "password verification task failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_COST: u32 = MIN_BCRYPT_COST;

    #[test]
    fn same_password_hashes_differently_but_verifies() {
        let a = hash_password("hunter22", TEST_COST).unwrap();
        let b = hash_password("hunter22", TEST_COST).unwrap();
        assert_ne!(a, b);
        assert!(verify_password("hunter22", &a));
        assert!(verify_password("hunter22", &b));
        assert!(!verify_password("hunter23", &a));
    }

    #[test]
    fn malformed_hash_fails_closed() {
        assert!(!verify_password("anything", "not-a-bcrypt-hash"));
        assert!(!verify_password("anything", ""));
    }

    #[test]
    fn cost_outside_bcrypt_range_is_rejected() {
        assert!(matches!(
            PasswordHasher::new(3),
            Err(AuthError::Configuration(_))
        ));
        assert!(PasswordHasher::new(DEFAULT_BCRYPT_COST).is_ok());
    }

    #[test]
    fn cost_bounds_match_bcrypt() {
        assert!(PasswordHasher::new(MIN_BCRYPT_COST).is_ok());
        assert!(PasswordHasher::new(MAX_BCRYPT_COST).is_ok());
        assert!(PasswordHasher::new(MAX_BCRYPT_COST + 1).is_err());
        assert!(hash_password("pw", MIN_BCRYPT_COST).is_ok());
        assert!(hash_password("pw", MIN_BCRYPT_COST - 1).is_err());
        assert!(hash_password("pw", MAX_BCRYPT_COST + 1).is_err());
    }

    #[tokio::test]
    async fn async_hash_and_verify_agree() {
        let hasher = PasswordHasher::new(TEST_COST).unwrap();
        let hash = hasher.hash("correct").await.unwrap();
        assert!(hasher.verify("correct", &hash).await);
        assert!(!hasher.verify("wrong", &hash).await);
    }
}
