//! Effective-dated pricing and the bill ledger.

pub mod engine;
pub mod prices;
pub mod queries;

use chrono::NaiveDate;
use thiserror::Error;

use crate::store::StoreError;

/// Rejection for amounts or balances that would overflow.
pub const AMOUNT_OUT_OF_RANGE: &str = "amount is out of range";

/// Billing errors.
#[derive(Debug, Error)]
pub enum BillingError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("No price configured for {0}")]
    NoPriceConfigured(NaiveDate),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Storage error: {0}")]
    Persistence(StoreError),
}

impl From<StoreError> for BillingError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(msg) => BillingError::NotFound(msg),
            StoreError::Conflict(msg) => BillingError::Conflict(msg),
            StoreError::OutOfRange(_) => BillingError::Validation(AMOUNT_OUT_OF_RANGE.into()),
            other => BillingError::Persistence(other),
        }
    }
}
