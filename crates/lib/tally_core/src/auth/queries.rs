//! Auth-related database queries.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::auth::{Credential, CredentialPatch, NewCredential, RefreshTokenRecord, Role};
use crate::store::{StoreError, new_id};

const CREDENTIAL_COLUMNS: &str = "id, name, mobile_number, password_hash, role, created_at";

#[derive(sqlx::FromRow)]
struct CredentialRow {
    id: Uuid,
    name: String,
    mobile_number: String,
    password_hash: String,
    role: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<CredentialRow> for Credential {
    type Error = StoreError;

    fn try_from(row: CredentialRow) -> Result<Self, Self::Error> {
        let role = row.role.parse::<Role>().map_err(StoreError::Corrupt)?;
        Ok(Credential {
            id: row.id,
            name: row.name,
            mobile_number: row.mobile_number,
            password_hash: row.password_hash,
            role,
            created_at: row.created_at,
        })
    }
}

/// Map a write error, turning a unique violation into `Conflict`.
fn conflict_on_unique(e: sqlx::Error, what: impl FnOnce() -> String) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Conflict(what()),
        _ => StoreError::Db(e),
    }
}

/// Create a new user.
pub async fn create_user(pool: &PgPool, new: &NewCredential) -> Result<Credential, StoreError> {
    let row = sqlx::query_as::<_, CredentialRow>(&format!(
        "INSERT INTO users (id, name, mobile_number, password_hash, role) \
         VALUES ($1, $2, $3, $4, $5) RETURNING {CREDENTIAL_COLUMNS}"
    ))
    .bind(new_id())
    .bind(&new.name)
    .bind(&new.mobile_number)
    .bind(&new.password_hash)
    .bind(new.role.as_str())
    .fetch_one(pool)
    .await
    .map_err(|e| {
        conflict_on_unique(e, || {
            format!("mobile number {} already registered", new.mobile_number)
        })
    })?;
    row.try_into()
}

/// Fetch a user by mobile number.
pub async fn find_user_by_mobile(
    pool: &PgPool,
    mobile_number: &str,
) -> Result<Option<Credential>, StoreError> {
    sqlx::query_as::<_, CredentialRow>(&format!(
        "SELECT {CREDENTIAL_COLUMNS} FROM users WHERE mobile_number = $1"
    ))
    .bind(mobile_number)
    .fetch_optional(pool)
    .await?
    .map(Credential::try_from)
    .transpose()
}

/// Fetch a user by ID.
pub async fn find_user_by_id(
    pool: &PgPool,
    user_id: Uuid,
) -> Result<Option<Credential>, StoreError> {
    sqlx::query_as::<_, CredentialRow>(&format!(
        "SELECT {CREDENTIAL_COLUMNS} FROM users WHERE id = $1"
    ))
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .map(Credential::try_from)
    .transpose()
}

/// List all users, oldest first.
pub async fn list_users(pool: &PgPool) -> Result<Vec<Credential>, StoreError> {
    sqlx::query_as::<_, CredentialRow>(&format!(
        "SELECT {CREDENTIAL_COLUMNS} FROM users ORDER BY created_at, id"
    ))
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(Credential::try_from)
    .collect()
}

/// Update profile fields, leaving `None` fields unchanged.
pub async fn update_user(
    pool: &PgPool,
    user_id: Uuid,
    patch: &CredentialPatch,
) -> Result<Option<Credential>, StoreError> {
    sqlx::query_as::<_, CredentialRow>(&format!(
        "UPDATE users SET \
           name = COALESCE($2, name), \
           mobile_number = COALESCE($3, mobile_number), \
           role = COALESCE($4, role) \
         WHERE id = $1 RETURNING {CREDENTIAL_COLUMNS}"
    ))
    .bind(user_id)
    .bind(patch.name.as_deref())
    .bind(patch.mobile_number.as_deref())
    .bind(patch.role.map(Role::as_str))
    .fetch_optional(pool)
    .await
    .map_err(|e| conflict_on_unique(e, || "mobile number already registered".to_string()))?
    .map(Credential::try_from)
    .transpose()
}

/// Replace a user's password hash.
pub async fn update_password_hash(
    pool: &PgPool,
    user_id: Uuid,
    password_hash: &str,
) -> Result<bool, StoreError> {
    let result = sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
        .bind(user_id)
        .bind(password_hash)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Delete a user. Sessions, customer profile and bills cascade.
pub async fn delete_user(pool: &PgPool, user_id: Uuid) -> Result<bool, StoreError> {
    let result = sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Store a refresh token hash.
pub async fn store_refresh_token(
    pool: &PgPool,
    record: &RefreshTokenRecord,
) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO refresh_tokens (token_hash, user_id, expires_at, created_at) \
         VALUES ($1, $2, $3, $4)",
    )
    .bind(&record.token_hash)
    .bind(record.user_id)
    .bind(record.expires_at)
    .bind(record.created_at)
    .execute(pool)
    .await
    .map_err(|e| match &e {
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
            StoreError::NotFound(format!("user {}", record.user_id))
        }
        _ => conflict_on_unique(e, || "refresh token already exists".to_string()),
    })?;
    Ok(())
}

/// Find a refresh token by hash, expired or not.
pub async fn find_refresh_token(
    pool: &PgPool,
    token_hash: &str,
) -> Result<Option<RefreshTokenRecord>, StoreError> {
    let row = sqlx::query_as::<_, (String, Uuid, DateTime<Utc>, DateTime<Utc>)>(
        "SELECT token_hash, user_id, expires_at, created_at \
         FROM refresh_tokens WHERE token_hash = $1",
    )
    .bind(token_hash)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(into_record))
}

/// Delete a refresh token and return it. Concurrent callers race on the row
/// lock; only one of them gets the record back.
pub async fn take_refresh_token(
    pool: &PgPool,
    token_hash: &str,
) -> Result<Option<RefreshTokenRecord>, StoreError> {
    let row = sqlx::query_as::<_, (String, Uuid, DateTime<Utc>, DateTime<Utc>)>(
        "DELETE FROM refresh_tokens WHERE token_hash = $1 \
         RETURNING token_hash, user_id, expires_at, created_at",
    )
    .bind(token_hash)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(into_record))
}

/// Delete all refresh tokens for a user.
pub async fn delete_refresh_tokens_for_user(
    pool: &PgPool,
    user_id: Uuid,
) -> Result<u64, StoreError> {
    let result = sqlx::query("DELETE FROM refresh_tokens WHERE user_id = $1")
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Delete refresh tokens that expired before `now`.
pub async fn delete_expired_refresh_tokens(
    pool: &PgPool,
    now: DateTime<Utc>,
) -> Result<u64, StoreError> {
    let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at < $1")
        .bind(now)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

fn into_record(
    (token_hash, user_id, expires_at, created_at): (String, Uuid, DateTime<Utc>, DateTime<Utc>),
) -> RefreshTokenRecord {
    RefreshTokenRecord {
        token_hash,
        user_id,
        expires_at,
        created_at,
    }
}
