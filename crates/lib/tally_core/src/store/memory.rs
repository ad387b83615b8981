//! In-memory store.
//!
//! All state sits behind one async mutex, so every ledger write (bill row
//! plus balance increment) is applied as a single step.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    CredentialStore, LedgerStore, PriceStore, SessionStore, StoreError, StoreResult, new_id,
};
use crate::billing::prices::select_price;
use crate::models::auth::{Credential, CredentialPatch, NewCredential, RefreshTokenRecord};
use crate::models::billing::{
    Bill, BillFilter, BillPatch, Customer, DailySales, NewBill, NewCustomer, PricePoint,
};
use crate::money::Money;

#[derive(Debug, Default)]
struct State {
    credentials: HashMap<Uuid, Credential>,
    sessions: HashMap<String, RefreshTokenRecord>,
    /// Insertion order is significant for effective-date ties.
    prices: Vec<PricePoint>,
    customers: HashMap<Uuid, Customer>,
    bills: HashMap<Uuid, Bill>,
}

fn balance_out_of_range(customer_id: Uuid) -> StoreError {
    StoreError::OutOfRange(format!("balance of customer {customer_id}"))
}

/// Process-local implementation of every store trait.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn sort_bills(bills: &mut [Bill]) {
    bills.sort_by_key(|b| Reverse((b.bill_date, b.created_at, b.id)));
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn insert_credential(&self, new: NewCredential) -> StoreResult<Credential> {
        let mut state = self.state.lock().await;
        if state
            .credentials
            .values()
            .any(|c| c.mobile_number == new.mobile_number)
        {
            return Err(StoreError::Conflict(format!(
                "mobile number {} already registered",
                new.mobile_number
            )));
        }
        let credential = Credential {
            id: new_id(),
            name: new.name,
            mobile_number: new.mobile_number,
            password_hash: new.password_hash,
            role: new.role,
            created_at: Utc::now(),
        };
        state.credentials.insert(credential.id, credential.clone());
        Ok(credential)
    }

    async fn credential_by_mobile(&self, mobile_number: &str) -> StoreResult<Option<Credential>> {
        let state = self.state.lock().await;
        Ok(state
            .credentials
            .values()
            .find(|c| c.mobile_number == mobile_number)
            .cloned())
    }

    async fn credential_by_id(&self, user_id: Uuid) -> StoreResult<Option<Credential>> {
        Ok(self.state.lock().await.credentials.get(&user_id).cloned())
    }

    async fn list_credentials(&self) -> StoreResult<Vec<Credential>> {
        let state = self.state.lock().await;
        let mut all: Vec<Credential> = state.credentials.values().cloned().collect();
        all.sort_by_key(|c| (c.created_at, c.id));
        Ok(all)
    }

    async fn update_credential(
        &self,
        user_id: Uuid,
        patch: &CredentialPatch,
    ) -> StoreResult<Option<Credential>> {
        let mut state = self.state.lock().await;
        if let Some(mobile) = &patch.mobile_number
            && state
                .credentials
                .values()
                .any(|c| c.id != user_id && &c.mobile_number == mobile)
        {
            return Err(StoreError::Conflict(format!(
                "mobile number {mobile} already registered"
            )));
        }
        let Some(credential) = state.credentials.get_mut(&user_id) else {
            return Ok(None);
        };
        if let Some(name) = &patch.name {
            credential.name = name.clone();
        }
        if let Some(mobile) = &patch.mobile_number {
            credential.mobile_number = mobile.clone();
        }
        if let Some(role) = patch.role {
            credential.role = role;
        }
        Ok(Some(credential.clone()))
    }

    async fn set_password_hash(&self, user_id: Uuid, password_hash: &str) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        match state.credentials.get_mut(&user_id) {
            Some(c) => {
                c.password_hash = password_hash.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_credential(&self, user_id: Uuid) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        if state.credentials.remove(&user_id).is_none() {
            return Ok(false);
        }
        state.sessions.retain(|_, s| s.user_id != user_id);
        let owned: Vec<Uuid> = state
            .customers
            .values()
            .filter(|c| c.user_id == user_id)
            .map(|c| c.id)
            .collect();
        for customer_id in owned {
            state.customers.remove(&customer_id);
            state.bills.retain(|_, b| b.customer_id != customer_id);
        }
        Ok(true)
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn insert_session(&self, record: &RefreshTokenRecord) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        if !state.credentials.contains_key(&record.user_id) {
            return Err(StoreError::NotFound(format!("user {}", record.user_id)));
        }
        if state.sessions.contains_key(&record.token_hash) {
            return Err(StoreError::Conflict("refresh token already exists".into()));
        }
        state
            .sessions
            .insert(record.token_hash.clone(), record.clone());
        Ok(())
    }

    async fn session_by_hash(&self, token_hash: &str) -> StoreResult<Option<RefreshTokenRecord>> {
        Ok(self.state.lock().await.sessions.get(token_hash).cloned())
    }

    async fn take_session(&self, token_hash: &str) -> StoreResult<Option<RefreshTokenRecord>> {
        Ok(self.state.lock().await.sessions.remove(token_hash))
    }

    async fn delete_sessions_for_user(&self, user_id: Uuid) -> StoreResult<u64> {
        let mut state = self.state.lock().await;
        let before = state.sessions.len();
        state.sessions.retain(|_, s| s.user_id != user_id);
        Ok((before - state.sessions.len()) as u64)
    }

    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let mut state = self.state.lock().await;
        let before = state.sessions.len();
        state.sessions.retain(|_, s| !s.is_expired_at(now));
        Ok((before - state.sessions.len()) as u64)
    }
}

#[async_trait]
impl PriceStore for MemoryStore {
    async fn insert_price(
        &self,
        effective_date: NaiveDate,
        price_per_unit: Money,
    ) -> StoreResult<PricePoint> {
        let point = PricePoint {
            id: new_id(),
            effective_date,
            price_per_unit,
            created_at: Utc::now(),
        };
        self.state.lock().await.prices.push(point.clone());
        Ok(point)
    }

    async fn price_on(&self, date: NaiveDate) -> StoreResult<Option<PricePoint>> {
        let state = self.state.lock().await;
        Ok(select_price(&state.prices, date).cloned())
    }

    async fn list_prices(&self) -> StoreResult<Vec<PricePoint>> {
        let state = self.state.lock().await;
        let mut prices = state.prices.clone();
        // Stable sort keeps later inserts ahead of earlier ones on ties.
        prices.reverse();
        prices.sort_by_key(|p| Reverse(p.effective_date));
        Ok(prices)
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn insert_customer(&self, new: NewCustomer) -> StoreResult<Customer> {
        let mut state = self.state.lock().await;
        if !state.credentials.contains_key(&new.user_id) {
            return Err(StoreError::NotFound(format!("user {}", new.user_id)));
        }
        if state.customers.values().any(|c| c.user_id == new.user_id) {
            return Err(StoreError::Conflict(format!(
                "user {} already has a customer profile",
                new.user_id
            )));
        }
        let customer = Customer {
            id: new_id(),
            user_id: new.user_id,
            name: new.name,
            address: new.address,
            mobile_number: new.mobile_number,
            current_balance: Money::ZERO,
            created_at: Utc::now(),
        };
        state.customers.insert(customer.id, customer.clone());
        Ok(customer)
    }

    async fn customer_by_id(&self, customer_id: Uuid) -> StoreResult<Option<Customer>> {
        Ok(self.state.lock().await.customers.get(&customer_id).cloned())
    }

    async fn customer_by_user_id(&self, user_id: Uuid) -> StoreResult<Option<Customer>> {
        let state = self.state.lock().await;
        Ok(state
            .customers
            .values()
            .find(|c| c.user_id == user_id)
            .cloned())
    }

    async fn list_customers(&self) -> StoreResult<Vec<Customer>> {
        let state = self.state.lock().await;
        let mut all: Vec<Customer> = state.customers.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(all)
    }

    async fn record_bill(&self, new: &NewBill) -> StoreResult<Bill> {
        let mut state = self.state.lock().await;
        let Some(customer) = state.customers.get_mut(&new.customer_id) else {
            return Err(StoreError::NotFound(format!("customer {}", new.customer_id)));
        };
        customer.current_balance = customer
            .current_balance
            .checked_add(new.amount)
            .ok_or_else(|| balance_out_of_range(new.customer_id))?;
        let bill = Bill {
            id: new_id(),
            customer_id: new.customer_id,
            bill_date: new.bill_date,
            quantity: new.quantity,
            returned_quantity: new.returned_quantity,
            extra_quantity: new.extra_quantity,
            amount: new.amount,
            status: Default::default(),
            description: new.description.clone(),
            due_date: new.due_date,
            created_at: Utc::now(),
        };
        state.bills.insert(bill.id, bill.clone());
        Ok(bill)
    }

    async fn update_bill(&self, bill_id: Uuid, patch: &BillPatch) -> StoreResult<Option<Bill>> {
        let mut state = self.state.lock().await;
        let State {
            bills, customers, ..
        } = &mut *state;
        let Some(bill) = bills.get_mut(&bill_id) else {
            return Ok(None);
        };
        if let Some(amount) = patch.amount
            && amount != bill.amount
        {
            let customer_id = bill.customer_id;
            let delta = amount
                .checked_sub(bill.amount)
                .ok_or_else(|| balance_out_of_range(customer_id))?;
            if let Some(customer) = customers.get_mut(&customer_id) {
                customer.current_balance = customer
                    .current_balance
                    .checked_add(delta)
                    .ok_or_else(|| balance_out_of_range(customer_id))?;
            }
        }
        if let Some(description) = &patch.description {
            bill.description = Some(description.clone());
        }
        if let Some(amount) = patch.amount {
            bill.amount = amount;
        }
        if let Some(status) = patch.status {
            bill.status = status;
        }
        if let Some(due_date) = patch.due_date {
            bill.due_date = Some(due_date);
        }
        Ok(Some(bill.clone()))
    }

    async fn delete_bill(&self, bill_id: Uuid) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        let State {
            bills, customers, ..
        } = &mut *state;
        let Some(bill) = bills.get(&bill_id) else {
            return Ok(false);
        };
        if let Some(customer) = customers.get_mut(&bill.customer_id) {
            customer.current_balance = customer
                .current_balance
                .checked_sub(bill.amount)
                .ok_or_else(|| balance_out_of_range(bill.customer_id))?;
        }
        bills.remove(&bill_id);
        Ok(true)
    }

    async fn list_bills(&self, filter: &BillFilter) -> StoreResult<Vec<Bill>> {
        let state = self.state.lock().await;
        let mut bills: Vec<Bill> = state
            .bills
            .values()
            .filter(|b| filter.matches(b))
            .cloned()
            .collect();
        sort_bills(&mut bills);
        Ok(bills)
    }

    async fn recent_bills(&self, limit: i64) -> StoreResult<Vec<Bill>> {
        let state = self.state.lock().await;
        let mut bills: Vec<Bill> = state.bills.values().cloned().collect();
        bills.sort_by_key(|b| Reverse((b.created_at, b.id)));
        bills.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(bills)
    }

    async fn daily_sales(&self, from: NaiveDate, to: NaiveDate) -> StoreResult<Vec<DailySales>> {
        let state = self.state.lock().await;
        let mut days: BTreeMap<NaiveDate, DailySales> = BTreeMap::new();
        for bill in state
            .bills
            .values()
            .filter(|b| b.bill_date >= from && b.bill_date <= to)
        {
            let day = days.entry(bill.bill_date).or_insert(DailySales {
                date: bill.bill_date,
                total_amount: Money::ZERO,
                bill_count: 0,
            });
            day.total_amount = day.total_amount.checked_add(bill.amount).ok_or_else(|| {
                StoreError::OutOfRange(format!("daily sales on {}", bill.bill_date))
            })?;
            day.bill_count += 1;
        }
        Ok(days.into_values().collect())
    }
}
