//! Persistence seams.
//!
//! The auth and billing services only talk to storage through these traits.
//! `PgStore` is the production implementation; `MemoryStore` backs tests and
//! the `--in-memory` development mode.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::auth::{Credential, CredentialPatch, NewCredential, RefreshTokenRecord};
use crate::models::billing::{
    Bill, BillFilter, BillPatch, Customer, DailySales, NewBill, NewCustomer, PricePoint,
};
use crate::money::Money;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Storage errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    /// A balance or amount would leave the representable range.
    #[error("Out of range: {0}")]
    OutOfRange(String),

    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Generate a new UUIDv7 (timestamp-sortable) row id.
pub fn new_id() -> Uuid {
    Uuid::now_v7()
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Insert a credential. Fails with `Conflict` when the mobile number is taken.
    async fn insert_credential(&self, new: NewCredential) -> StoreResult<Credential>;

    async fn credential_by_mobile(&self, mobile_number: &str) -> StoreResult<Option<Credential>>;

    async fn credential_by_id(&self, user_id: Uuid) -> StoreResult<Option<Credential>>;

    async fn list_credentials(&self) -> StoreResult<Vec<Credential>>;

    /// Apply a profile edit. Returns `None` when the user does not exist.
    async fn update_credential(
        &self,
        user_id: Uuid,
        patch: &CredentialPatch,
    ) -> StoreResult<Option<Credential>>;

    /// Replace the password hash. Returns `false` when the user does not exist.
    async fn set_password_hash(&self, user_id: Uuid, password_hash: &str) -> StoreResult<bool>;

    /// Delete a user together with its sessions, customer profile and bills.
    async fn delete_credential(&self, user_id: Uuid) -> StoreResult<bool>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert_session(&self, record: &RefreshTokenRecord) -> StoreResult<()>;

    async fn session_by_hash(&self, token_hash: &str) -> StoreResult<Option<RefreshTokenRecord>>;

    /// Atomically delete and return a session. At most one caller ever
    /// receives a given record.
    async fn take_session(&self, token_hash: &str) -> StoreResult<Option<RefreshTokenRecord>>;

    async fn delete_sessions_for_user(&self, user_id: Uuid) -> StoreResult<u64>;

    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> StoreResult<u64>;
}

#[async_trait]
pub trait PriceStore: Send + Sync {
    async fn insert_price(
        &self,
        effective_date: NaiveDate,
        price_per_unit: Money,
    ) -> StoreResult<PricePoint>;

    /// The price point with the greatest effective date not after `date`,
    /// latest insert first on ties.
    async fn price_on(&self, date: NaiveDate) -> StoreResult<Option<PricePoint>>;

    /// All price points, newest effective date first.
    async fn list_prices(&self) -> StoreResult<Vec<PricePoint>>;
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Fails with `NotFound` for an unknown user and `Conflict` when the user
    /// already has a profile.
    async fn insert_customer(&self, new: NewCustomer) -> StoreResult<Customer>;

    async fn customer_by_id(&self, customer_id: Uuid) -> StoreResult<Option<Customer>>;

    async fn customer_by_user_id(&self, user_id: Uuid) -> StoreResult<Option<Customer>>;

    async fn list_customers(&self) -> StoreResult<Vec<Customer>>;

    /// Write the bill and add its amount to the customer's balance as one
    /// unit. Fails with `NotFound` (and writes nothing) for an unknown customer.
    async fn record_bill(&self, new: &NewBill) -> StoreResult<Bill>;

    /// Apply a patch; an amount change moves the balance by the difference.
    async fn update_bill(&self, bill_id: Uuid, patch: &BillPatch) -> StoreResult<Option<Bill>>;

    /// Remove a bill and take its amount back off the balance.
    async fn delete_bill(&self, bill_id: Uuid) -> StoreResult<bool>;

    /// Bills matching `filter`, newest bill date first.
    async fn list_bills(&self, filter: &BillFilter) -> StoreResult<Vec<Bill>>;

    /// Most recently created bills across all customers.
    async fn recent_bills(&self, limit: i64) -> StoreResult<Vec<Bill>>;

    /// Per-day totals of bills dated within `[from, to]`, oldest day first.
    /// Days without bills are omitted.
    async fn daily_sales(&self, from: NaiveDate, to: NaiveDate) -> StoreResult<Vec<DailySales>>;
}
