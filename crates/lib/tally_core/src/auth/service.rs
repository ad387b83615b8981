//! Authentication flows: register, login, refresh, logout and password
//! changes, composed from the hasher, token issuer and session registry.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use super::jwt::TokenIssuer;
use super::password::PasswordHasher;
use super::sessions::SessionRegistry;
use super::{AuthConfig, AuthError};
use crate::models::auth::{
    Credential, CredentialPatch, NewCredential, Principal, Role, UserProfile,
};
use crate::store::{CredentialStore, SessionStore};

/// Access/refresh pair handed to a client after login or refresh.
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
    pub user_id: Uuid,
    pub role: Role,
}

/// Fields for a new account. The password is plaintext here.
#[derive(Debug, Clone)]
pub struct Registration {
    pub name: String,
    pub mobile_number: String,
    pub password: String,
    pub role: Role,
}

#[derive(Clone)]
pub struct AuthService {
    credentials: Arc<dyn CredentialStore>,
    sessions: SessionRegistry,
    issuer: TokenIssuer,
    hasher: PasswordHasher,
}

fn require_non_empty(field: &str, value: &str) -> Result<(), AuthError> {
    if value.trim().is_empty() {
        return Err(AuthError::Validation(format!("{field} is required")));
    }
    Ok(())
}

impl AuthService {
    /// Fails with `Configuration` for an empty secret or a bad bcrypt cost.
    pub fn new(
        config: &AuthConfig,
        credentials: Arc<dyn CredentialStore>,
        sessions: Arc<dyn SessionStore>,
    ) -> Result<Self, AuthError> {
        Ok(Self {
            credentials,
            sessions: SessionRegistry::new(sessions, config.refresh_token_ttl),
            issuer: TokenIssuer::new(config)?,
            hasher: PasswordHasher::new(config.bcrypt_cost)?,
        })
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// Self-service sign-up. New accounts are customers.
    pub async fn register(
        &self,
        name: &str,
        mobile_number: &str,
        password: &str,
    ) -> Result<UserProfile, AuthError> {
        self.create_user(Registration {
            name: name.to_owned(),
            mobile_number: mobile_number.to_owned(),
            password: password.to_owned(),
            role: Role::Customer,
        })
        .await
    }

    /// Create an account with any role. `Conflict` when the mobile number
    /// is taken.
    pub async fn create_user(&self, registration: Registration) -> Result<UserProfile, AuthError> {
        require_non_empty("name", &registration.name)?;
        require_non_empty("mobile_number", &registration.mobile_number)?;
        require_non_empty("password", &registration.password)?;

        if self
            .credentials
            .credential_by_mobile(&registration.mobile_number)
            .await?
            .is_some()
        {
            return Err(AuthError::Conflict("User already exists".into()));
        }

        let password_hash = self.hasher.hash(&registration.password).await?;
        let credential = self
            .credentials
            .insert_credential(NewCredential {
                name: registration.name.trim().to_owned(),
                mobile_number: registration.mobile_number,
                password_hash,
                role: registration.role,
            })
            .await
            .map_err(|e| match AuthError::from(e) {
                // lost a race with a concurrent registration
                AuthError::Conflict(_) => AuthError::Conflict("User already exists".into()),
                other => other,
            })?;

        info!(user_id = %credential.id, role = %credential.role, "user registered");
        Ok(UserProfile::from(&credential))
    }

    /// Verify credentials and mint a token pair. Unknown mobile numbers and
    /// wrong passwords fail identically.
    pub async fn login(&self, mobile_number: &str, password: &str) -> Result<TokenPair, AuthError> {
        require_non_empty("mobile_number", mobile_number)?;
        require_non_empty("password", password)?;

        let Some(credential) = self.credentials.credential_by_mobile(mobile_number).await? else {
            warn!("login rejected: unknown account");
            return Err(AuthError::InvalidCredentials);
        };
        if !self.hasher.verify(password, &credential.password_hash).await {
            warn!(user_id = %credential.id, "login rejected: wrong password");
            return Err(AuthError::InvalidCredentials);
        }

        let pair = self.mint_pair(&credential).await?;
        info!(user_id = %credential.id, role = %credential.role, "user logged in");
        Ok(pair)
    }

    /// Exchange a refresh token for a new pair. The presented token is
    /// consumed even when the exchange fails.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let rotated = self.sessions.rotate(refresh_token).await?;
        let Some(credential) = self.credentials.credential_by_id(rotated.user_id).await? else {
            self.sessions.revoke(&rotated.token).await?;
            return Err(AuthError::InvalidRefreshToken);
        };
        let access_token = self
            .issuer
            .issue_access_token(credential.id, credential.role)?;
        info!(user_id = %credential.id, "refresh token rotated");
        Ok(TokenPair {
            access_token,
            refresh_token: rotated.token,
            expires_in: self.issuer.access_ttl_secs(),
            user_id: credential.id,
            role: credential.role,
        })
    }

    /// Revoke one refresh token. Unknown tokens succeed.
    pub async fn logout(&self, refresh_token: &str) -> Result<(), AuthError> {
        self.sessions.revoke(refresh_token).await?;
        Ok(())
    }

    /// Revoke every refresh token of `user_id`.
    pub async fn logout_all(&self, user_id: Uuid) -> Result<u64, AuthError> {
        Ok(self.sessions.revoke_all(user_id).await?)
    }

    /// Replace a password after verifying the current one. Callers may only
    /// change their own password unless they are admins. Existing sessions
    /// stay valid.
    pub async fn change_password(
        &self,
        actor: &Principal,
        user_id: Uuid,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        if actor.user_id != user_id && actor.role != Role::Admin {
            return Err(AuthError::Forbidden(
                "cannot change another user's password".into(),
            ));
        }
        require_non_empty("new_password", new_password)?;

        let credential = self
            .credentials
            .credential_by_id(user_id)
            .await?
            .ok_or_else(|| AuthError::NotFound("User not found".into()))?;
        if !self
            .hasher
            .verify(old_password, &credential.password_hash)
            .await
        {
            warn!(%user_id, "password change rejected: wrong current password");
            return Err(AuthError::IncorrectPassword);
        }

        let password_hash = self.hasher.hash(new_password).await?;
        if !self
            .credentials
            .set_password_hash(user_id, &password_hash)
            .await?
        {
            return Err(AuthError::NotFound("User not found".into()));
        }
        info!(%user_id, changed_by = %actor.user_id, "password changed");
        Ok(())
    }

    pub fn verify_access_token(&self, token: &str) -> Result<Principal, AuthError> {
        self.issuer.verify_access_token(token)
    }

    pub async fn list_users(&self) -> Result<Vec<UserProfile>, AuthError> {
        let credentials = self.credentials.list_credentials().await?;
        Ok(credentials.iter().map(UserProfile::from).collect())
    }

    pub async fn update_user(
        &self,
        user_id: Uuid,
        patch: CredentialPatch,
    ) -> Result<UserProfile, AuthError> {
        if patch.is_empty() {
            return Err(AuthError::Validation("No fields to update".into()));
        }
        if let Some(name) = &patch.name {
            require_non_empty("name", name)?;
        }
        if let Some(mobile) = &patch.mobile_number {
            require_non_empty("mobile_number", mobile)?;
        }
        let updated = self
            .credentials
            .update_credential(user_id, &patch)
            .await?
            .ok_or_else(|| AuthError::NotFound("User not found".into()))?;
        info!(%user_id, "user updated");
        Ok(UserProfile::from(&updated))
    }

    /// Remove an account with its sessions, customer profile and bills.
    pub async fn delete_user(&self, user_id: Uuid) -> Result<(), AuthError> {
        if !self.credentials.delete_credential(user_id).await? {
            return Err(AuthError::NotFound("User not found".into()));
        }
        info!(%user_id, "user deleted");
        Ok(())
    }

    async fn mint_pair(&self, credential: &Credential) -> Result<TokenPair, AuthError> {
        let access_token = self
            .issuer
            .issue_access_token(credential.id, credential.role)?;
        let session = self.sessions.issue(credential.id).await?;
        Ok(TokenPair {
            access_token,
            refresh_token: session.token,
            expires_in: self.issuer.access_ttl_secs(),
            user_id: credential.id,
            role: credential.role,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::store::MemoryStore;

    fn service_with(config: AuthConfig) -> (Arc<MemoryStore>, AuthService) {
        let store = Arc::new(MemoryStore::new());
        let service = AuthService::new(&config, store.clone(), store.clone()).unwrap();
        (store, service)
    }

    fn service() -> (Arc<MemoryStore>, AuthService) {
        service_with(AuthConfig::new("test-secret").with_bcrypt_cost(4))
    }

    async fn seed(service: &AuthService, mobile: &str, password: &str, role: Role) -> UserProfile {
        service
            .create_user(Registration {
                name: "Ravi".into(),
                mobile_number: mobile.into(),
                password: password.into(),
                role,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn login_then_verify_yields_the_user() {
        let (_store, service) = service();
        let user = seed(&service, "9999999999", "correct", Role::Labor).await;

        let pair = service.login("9999999999", "correct").await.unwrap();
        assert_eq!(pair.user_id, user.id);
        assert_eq!(pair.expires_in, 3600);

        let principal = service.verify_access_token(&pair.access_token).unwrap();
        assert_eq!(principal.user_id, user.id);
        assert_eq!(principal.role, Role::Labor);
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_mobile_fail_the_same_way() {
        let (_store, service) = service();
        seed(&service, "9999999999", "correct", Role::Customer).await;

        let wrong = service.login("9999999999", "nope").await.unwrap_err();
        let unknown = service.login("1111111111", "correct").await.unwrap_err();
        assert!(matches!(wrong, AuthError::InvalidCredentials));
        assert!(matches!(unknown, AuthError::InvalidCredentials));
        assert_eq!(wrong.to_string(), "Invalid credentials");
    }

    #[tokio::test]
    async fn register_rejects_duplicate_mobile() {
        let (_store, service) = service();
        let first = service.register("A", "9000000000", "pw").await.unwrap();
        assert_eq!(first.role, Role::Customer);
        let err = service.register("B", "9000000000", "pw").await.unwrap_err();
        assert!(matches!(err, AuthError::Conflict(_)));
    }

    #[tokio::test]
    async fn register_requires_every_field() {
        let (_store, service) = service();
        let err = service.register("A", "  ", "pw").await.unwrap_err();
        assert!(matches!(err, AuthError::Validation(_)));
    }

    #[tokio::test]
    async fn second_refresh_with_same_token_fails() {
        let (_store, service) = service();
        seed(&service, "9000000001", "pw", Role::Customer).await;
        let pair = service.login("9000000001", "pw").await.unwrap();

        let next = service.refresh(&pair.refresh_token).await.unwrap();
        assert_ne!(next.refresh_token, pair.refresh_token);
        assert!(service.verify_access_token(&next.access_token).is_ok());

        let err = service.refresh(&pair.refresh_token).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidRefreshToken));
        assert_eq!(err.to_string(), "Invalid refresh token");
    }

    #[tokio::test]
    async fn refresh_token_past_expiry_fails_without_rotation() {
        let (_store, service) = service();
        let user = seed(&service, "9000000002", "pw", Role::Customer).await;
        let issued_at = Utc::now() - Duration::days(31);
        service
            .sessions()
            .save("old-token", user.id, issued_at + Duration::days(30))
            .await
            .unwrap();
        let err = service.refresh("old-token").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidRefreshToken));
    }

    #[tokio::test]
    async fn refresh_after_user_deletion_fails() {
        let (_store, service) = service();
        let user = seed(&service, "9000000003", "pw", Role::Customer).await;
        let pair = service.login("9000000003", "pw").await.unwrap();
        service.delete_user(user.id).await.unwrap();
        let err = service.refresh(&pair.refresh_token).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidRefreshToken));
    }

    #[tokio::test]
    async fn logout_succeeds_for_unknown_and_revoked_tokens() {
        let (_store, service) = service();
        seed(&service, "9000000004", "pw", Role::Customer).await;
        let pair = service.login("9000000004", "pw").await.unwrap();
        service.logout(&pair.refresh_token).await.unwrap();
        service.logout(&pair.refresh_token).await.unwrap();
        service.logout("never-issued").await.unwrap();
        assert!(service.refresh(&pair.refresh_token).await.is_err());
    }

    #[tokio::test]
    async fn logout_all_revokes_every_session() {
        let (_store, service) = service();
        let user = seed(&service, "9000000005", "pw", Role::Customer).await;
        let a = service.login("9000000005", "pw").await.unwrap();
        let b = service.login("9000000005", "pw").await.unwrap();
        assert_eq!(service.logout_all(user.id).await.unwrap(), 2);
        assert!(service.refresh(&a.refresh_token).await.is_err());
        assert!(service.refresh(&b.refresh_token).await.is_err());
    }

    #[tokio::test]
    async fn change_password_checks_the_old_one() {
        let (_store, service) = service();
        let user = seed(&service, "9000000006", "old", Role::Customer).await;
        let me = Principal {
            user_id: user.id,
            role: Role::Customer,
        };

        let err = service
            .change_password(&me, user.id, "wrong", "new")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::IncorrectPassword));

        let pair = service.login("9000000006", "old").await.unwrap();
        service
            .change_password(&me, user.id, "old", "new")
            .await
            .unwrap();
        assert!(service.login("9000000006", "old").await.is_err());
        assert!(service.login("9000000006", "new").await.is_ok());
        // existing sessions survive
        assert!(service.refresh(&pair.refresh_token).await.is_ok());
    }

    #[tokio::test]
    async fn change_password_for_someone_else_requires_admin() {
        let (_store, service) = service();
        let target = seed(&service, "9000000007", "pw", Role::Customer).await;
        let other = Principal {
            user_id: Uuid::now_v7(),
            role: Role::Labor,
        };
        let err = service
            .change_password(&other, target.id, "pw", "x")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Forbidden(_)));

        let admin = Principal {
            user_id: Uuid::now_v7(),
            role: Role::Admin,
        };
        service
            .change_password(&admin, target.id, "pw", "x")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn change_password_for_missing_user_is_not_found() {
        let (_store, service) = service();
        let admin = Principal {
            user_id: Uuid::now_v7(),
            role: Role::Admin,
        };
        let err = service
            .change_password(&admin, Uuid::now_v7(), "a", "b")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::NotFound(_)));
    }

    #[tokio::test]
    async fn update_user_applies_patch() {
        let (_store, service) = service();
        let user = seed(&service, "9000000008", "pw", Role::Customer).await;
        let updated = service
            .update_user(
                user.id,
                CredentialPatch {
                    role: Some(Role::Labor),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.role, Role::Labor);
        assert_eq!(updated.mobile_number, "9000000008");

        let err = service
            .update_user(user.id, CredentialPatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Validation(_)));
    }

    #[tokio::test]
    async fn delete_missing_user_is_not_found() {
        let (_store, service) = service();
        let err = service.delete_user(Uuid::now_v7()).await.unwrap_err();
        assert!(matches!(err, AuthError::NotFound(_)));
    }

    #[test]
    fn empty_secret_fails_at_construction() {
        let store = Arc::new(MemoryStore::new());
        let result = AuthService::new(&AuthConfig::new(""), store.clone(), store);
        assert!(matches!(result, Err(AuthError::Configuration(_))));
    }
}
