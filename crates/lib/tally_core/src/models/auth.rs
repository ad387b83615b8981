//! Authentication domain models.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Account role. Every credential carries exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Customer,
    Labor,
}

/// What a route requires of the caller. Checked uniformly by middleware
/// before any handler runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Any authenticated principal.
    Authenticated,
    /// Create, edit and remove accounts.
    ManageUsers,
    /// Prices, customers, bills and reports.
    ManageBilling,
    /// Read the caller's own customer profile and bills.
    ViewOwnAccount,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Customer => "customer",
            Role::Labor => "labor",
        }
    }

    /// Whether this role holds `capability`.
    pub fn grants(self, capability: Capability) -> bool {
        match capability {
            Capability::Authenticated => true,
            Capability::ManageUsers | Capability::ManageBilling => self == Role::Admin,
            Capability::ViewOwnAccount => self == Role::Customer,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "customer" => Ok(Role::Customer),
            "labor" => Ok(Role::Labor),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

/// Stored account credential.
#[derive(Debug, Clone)]
pub struct Credential {
    pub id: Uuid,
    pub name: String,
    pub mobile_number: String,
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// Fields for a new credential. The password is already hashed.
#[derive(Debug, Clone)]
pub struct NewCredential {
    pub name: String,
    pub mobile_number: String,
    pub password_hash: String,
    pub role: Role,
}

/// Partial profile edit. `None` leaves the field unchanged.
#[derive(Debug, Clone, Default)]
pub struct CredentialPatch {
    pub name: Option<String>,
    pub mobile_number: Option<String>,
    pub role: Option<Role>,
}

impl CredentialPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.mobile_number.is_none() && self.role.is_none()
    }
}

/// Public view of an account (no password hash).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    pub mobile_number: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl From<&Credential> for UserProfile {
    fn from(c: &Credential) -> Self {
        Self {
            id: c.id,
            name: c.name.clone(),
            mobile_number: c.mobile_number.clone(),
            role: c.role,
            created_at: c.created_at,
        }
    }
}

/// Refresh token record stored in the database. Only the SHA-256 digest of
/// the token is kept.
#[derive(Debug, Clone)]
pub struct RefreshTokenRecord {
    pub token_hash: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl RefreshTokenRecord {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// JWT claims embedded in access tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject: user ID.
    pub sub: Uuid,
    pub role: Role,
    /// Issued at (unix timestamp).
    pub iat: i64,
    /// Expiry (unix timestamp).
    pub exp: i64,
}

/// Identity established from a verified access token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    pub user_id: Uuid,
    pub role: Role,
}

impl From<AccessClaims> for Principal {
    fn from(claims: AccessClaims) -> Self {
        Self {
            user_id: claims.sub,
            role: claims.role,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_admin_manages_billing_and_users() {
        assert!(Role::Admin.grants(Capability::ManageBilling));
        assert!(Role::Admin.grants(Capability::ManageUsers));
        assert!(!Role::Customer.grants(Capability::ManageBilling));
        assert!(!Role::Labor.grants(Capability::ManageUsers));
    }

    #[test]
    fn only_customers_view_own_account() {
        assert!(Role::Customer.grants(Capability::ViewOwnAccount));
        assert!(!Role::Labor.grants(Capability::ViewOwnAccount));
        assert!(!Role::Admin.grants(Capability::ViewOwnAccount));
    }

    #[test]
    fn every_role_is_authenticated() {
        for role in [Role::Admin, Role::Customer, Role::Labor] {
            assert!(role.grants(Capability::Authenticated));
        }
    }

    #[test]
    fn role_round_trips_through_text() {
        for role in [Role::Admin, Role::Customer, Role::Labor] {
            assert_eq!(role.as_str().parse::<Role>(), Ok(role));
        }
        assert!("root".parse::<Role>().is_err());
    }
}
