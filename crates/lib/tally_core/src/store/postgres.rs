//! PostgreSQL-backed store, delegating to the query modules.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{CredentialStore, LedgerStore, PriceStore, SessionStore, StoreResult};
use crate::auth::queries as auth_q;
use crate::billing::queries as billing_q;
use crate::models::auth::{Credential, CredentialPatch, NewCredential, RefreshTokenRecord};
use crate::models::billing::{
    Bill, BillFilter, BillPatch, Customer, DailySales, NewBill, NewCustomer, PricePoint,
};
use crate::money::Money;

/// Store over a PostgreSQL connection pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for PgStore {
    async fn insert_credential(&self, new: NewCredential) -> StoreResult<Credential> {
        auth_q::create_user(&self.pool, &new).await
    }

    async fn credential_by_mobile(&self, mobile_number: &str) -> StoreResult<Option<Credential>> {
        auth_q::find_user_by_mobile(&self.pool, mobile_number).await
    }

    async fn credential_by_id(&self, user_id: Uuid) -> StoreResult<Option<Credential>> {
        auth_q::find_user_by_id(&self.pool, user_id).await
    }

    async fn list_credentials(&self) -> StoreResult<Vec<Credential>> {
        auth_q::list_users(&self.pool).await
    }

    async fn update_credential(
        &self,
        user_id: Uuid,
        patch: &CredentialPatch,
    ) -> StoreResult<Option<Credential>> {
        auth_q::update_user(&self.pool, user_id, patch).await
    }

    async fn set_password_hash(&self, user_id: Uuid, password_hash: &str) -> StoreResult<bool> {
        auth_q::update_password_hash(&self.pool, user_id, password_hash).await
    }

    async fn delete_credential(&self, user_id: Uuid) -> StoreResult<bool> {
        auth_q::delete_user(&self.pool, user_id).await
    }
}

#[async_trait]
impl SessionStore for PgStore {
    async fn insert_session(&self, record: &RefreshTokenRecord) -> StoreResult<()> {
        auth_q::store_refresh_token(&self.pool, record).await
    }

    async fn session_by_hash(&self, token_hash: &str) -> StoreResult<Option<RefreshTokenRecord>> {
        auth_q::find_refresh_token(&self.pool, token_hash).await
    }

    async fn take_session(&self, token_hash: &str) -> StoreResult<Option<RefreshTokenRecord>> {
        auth_q::take_refresh_token(&self.pool, token_hash).await
    }

    async fn delete_sessions_for_user(&self, user_id: Uuid) -> StoreResult<u64> {
        auth_q::delete_refresh_tokens_for_user(&self.pool, user_id).await
    }

    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        auth_q::delete_expired_refresh_tokens(&self.pool, now).await
    }
}

#[async_trait]
impl PriceStore for PgStore {
    async fn insert_price(
        &self,
        effective_date: NaiveDate,
        price_per_unit: Money,
    ) -> StoreResult<PricePoint> {
        billing_q::insert_price(&self.pool, effective_date, price_per_unit).await
    }

    async fn price_on(&self, date: NaiveDate) -> StoreResult<Option<PricePoint>> {
        billing_q::find_price_on(&self.pool, date).await
    }

    async fn list_prices(&self) -> StoreResult<Vec<PricePoint>> {
        billing_q::list_prices(&self.pool).await
    }
}

#[async_trait]
impl LedgerStore for PgStore {
    async fn insert_customer(&self, new: NewCustomer) -> StoreResult<Customer> {
        billing_q::insert_customer(&self.pool, &new).await
    }

    async fn customer_by_id(&self, customer_id: Uuid) -> StoreResult<Option<Customer>> {
        billing_q::find_customer_by_id(&self.pool, customer_id).await
    }

    async fn customer_by_user_id(&self, user_id: Uuid) -> StoreResult<Option<Customer>> {
        billing_q::find_customer_by_user_id(&self.pool, user_id).await
    }

    async fn list_customers(&self) -> StoreResult<Vec<Customer>> {
        billing_q::list_customers(&self.pool).await
    }

    async fn record_bill(&self, new: &NewBill) -> StoreResult<Bill> {
        billing_q::record_bill(&self.pool, new).await
    }

    async fn update_bill(&self, bill_id: Uuid, patch: &BillPatch) -> StoreResult<Option<Bill>> {
        billing_q::update_bill(&self.pool, bill_id, patch).await
    }

    async fn delete_bill(&self, bill_id: Uuid) -> StoreResult<bool> {
        billing_q::delete_bill(&self.pool, bill_id).await
    }

    async fn list_bills(&self, filter: &BillFilter) -> StoreResult<Vec<Bill>> {
        billing_q::list_bills(&self.pool, filter).await
    }

    async fn recent_bills(&self, limit: i64) -> StoreResult<Vec<Bill>> {
        billing_q::recent_bills(&self.pool, limit).await
    }

    async fn daily_sales(&self, from: NaiveDate, to: NaiveDate) -> StoreResult<Vec<DailySales>> {
        billing_q::daily_sales(&self.pool, from, to).await
    }
}
