//! Refresh-token session registry.
//!
//! Tokens are persisted as SHA-256 digests. Rotation takes the old record
//! out of the store before anything else, so a token can be exchanged at
//! most once even under concurrent presentation.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::jwt::{hash_refresh_token, issue_refresh_token};
use crate::models::auth::RefreshTokenRecord;
use crate::store::{SessionStore, StoreError};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Invalid refresh token")]
    NotFound,

    #[error("Refresh token expired")]
    Expired,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A freshly issued refresh token. `token` is the only copy of the
/// plaintext.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct SessionRegistry {
    store: Arc<dyn SessionStore>,
    ttl: Duration,
}

impl SessionRegistry {
    pub fn new(store: Arc<dyn SessionStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Persist an externally generated token for `user_id`.
    pub async fn save(
        &self,
        token: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<(), SessionError> {
        let record = RefreshTokenRecord {
            token_hash: hash_refresh_token(token),
            user_id,
            expires_at,
            created_at: Utc::now(),
        };
        self.store.insert_session(&record).await?;
        Ok(())
    }

    /// Generate, persist and return a new refresh token.
    pub async fn issue(&self, user_id: Uuid) -> Result<IssuedSession, SessionError> {
        let token = issue_refresh_token();
        let expires_at = Utc::now() + self.ttl;
        self.save(&token, user_id, expires_at).await?;
        Ok(IssuedSession {
            token,
            user_id,
            expires_at,
        })
    }

    /// Look up a token without consuming it.
    pub async fn lookup(&self, token: &str) -> Result<RefreshTokenRecord, SessionError> {
        let record = self
            .store
            .session_by_hash(&hash_refresh_token(token))
            .await?
            .ok_or(SessionError::NotFound)?;
        if record.is_expired_at(Utc::now()) {
            return Err(SessionError::Expired);
        }
        Ok(record)
    }

    /// Exchange `token` for a new one. The old token is invalid afterwards
    /// whatever the outcome; an expired token is consumed and rejected.
    pub async fn rotate(&self, token: &str) -> Result<IssuedSession, SessionError> {
        let record = self
            .store
            .take_session(&hash_refresh_token(token))
            .await?
            .ok_or(SessionError::NotFound)?;
        if record.is_expired_at(Utc::now()) {
            debug!(user_id = %record.user_id, "expired refresh token presented");
            return Err(SessionError::Expired);
        }
        self.issue(record.user_id).await
    }

    /// Remove a token. Unknown tokens are not an error.
    pub async fn revoke(&self, token: &str) -> Result<(), SessionError> {
        let removed = self.store.take_session(&hash_refresh_token(token)).await?;
        if let Some(record) = removed {
            debug!(user_id = %record.user_id, "refresh token revoked");
        }
        Ok(())
    }

    /// Remove every session of `user_id`. Returns how many were removed.
    pub async fn revoke_all(&self, user_id: Uuid) -> Result<u64, SessionError> {
        let removed = self.store.delete_sessions_for_user(user_id).await?;
        info!(%user_id, removed, "revoked all refresh tokens");
        Ok(removed)
    }

    /// Delete sessions that expired before now.
    pub async fn purge_expired(&self) -> Result<u64, SessionError> {
        Ok(self.store.delete_expired_sessions(Utc::now()).await?)
    }

    /// Spawn a background task that purges expired sessions every `period`.
    pub fn spawn_sweep_task(&self, period: StdDuration) -> tokio::task::JoinHandle<()> {
        let registry = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                match registry.purge_expired().await {
                    Ok(0) => {}
                    Ok(removed) => debug!(removed, "purged expired refresh tokens"),
                    Err(e) => warn!(error = %e, "expired session sweep failed"),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::auth::{NewCredential, Role};
    use crate::store::{CredentialStore, MemoryStore};

    async fn setup() -> (Arc<MemoryStore>, SessionRegistry, Uuid) {
        let store = Arc::new(MemoryStore::new());
        let user = store
            .insert_credential(NewCredential {
                name: "Asha".into(),
                mobile_number: "9000000001".into(),
                password_hash: "x".into(),
                role: Role::Customer,
            })
            .await
            .unwrap();
        let registry = SessionRegistry::new(store.clone(), Duration::days(30));
        (store, registry, user.id)
    }

    #[tokio::test]
    async fn issued_token_is_stored_as_digest() {
        let (store, registry, user_id) = setup().await;
        let issued = registry.issue(user_id).await.unwrap();
        assert!(store.session_by_hash(&issued.token).await.unwrap().is_none());
        let record = store
            .session_by_hash(&hash_refresh_token(&issued.token))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.user_id, user_id);
    }

    #[tokio::test]
    async fn rotation_is_single_use() {
        let (_store, registry, user_id) = setup().await;
        let first = registry.issue(user_id).await.unwrap();
        let second = registry.rotate(&first.token).await.unwrap();
        assert_ne!(first.token, second.token);
        assert_eq!(second.user_id, user_id);
        assert!(matches!(
            registry.rotate(&first.token).await,
            Err(SessionError::NotFound)
        ));
        assert!(registry.lookup(&second.token).await.is_ok());
    }

    #[tokio::test]
    async fn expired_token_is_consumed_and_rejected() {
        let (store, registry, user_id) = setup().await;
        registry
            .save("stale", user_id, Utc::now() - Duration::seconds(1))
            .await
            .unwrap();
        assert!(matches!(
            registry.rotate("stale").await,
            Err(SessionError::Expired)
        ));
        assert!(
            store
                .session_by_hash(&hash_refresh_token("stale"))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn revoke_is_idempotent() {
        let (_store, registry, user_id) = setup().await;
        let issued = registry.issue(user_id).await.unwrap();
        registry.revoke(&issued.token).await.unwrap();
        registry.revoke(&issued.token).await.unwrap();
        registry.revoke("never-issued").await.unwrap();
        assert!(matches!(
            registry.lookup(&issued.token).await,
            Err(SessionError::NotFound)
        ));
    }

    #[tokio::test]
    async fn revoke_all_clears_every_session() {
        let (_store, registry, user_id) = setup().await;
        let a = registry.issue(user_id).await.unwrap();
        let b = registry.issue(user_id).await.unwrap();
        assert_eq!(registry.revoke_all(user_id).await.unwrap(), 2);
        assert!(registry.lookup(&a.token).await.is_err());
        assert!(registry.lookup(&b.token).await.is_err());
    }

    #[tokio::test]
    async fn purge_removes_only_expired() {
        let (_store, registry, user_id) = setup().await;
        registry
            .save("old", user_id, Utc::now() - Duration::hours(1))
            .await
            .unwrap();
        let live = registry.issue(user_id).await.unwrap();
        assert_eq!(registry.purge_expired().await.unwrap(), 1);
        assert!(registry.lookup(&live.token).await.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_rotation_has_one_winner() {
        let (_store, registry, user_id) = setup().await;
        let issued = registry.issue(user_id).await.unwrap();
        let attempts = (0..8).map(|_| {
            let registry = registry.clone();
            let token = issued.token.clone();
            tokio::spawn(async move { registry.rotate(&token).await })
        });
        let results = futures::future::join_all(attempts).await;
        let winners = results
            .into_iter()
            .filter(|r| matches!(r, Ok(Ok(_))))
            .count();
        assert_eq!(winners, 1);
    }
}
