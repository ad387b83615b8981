//! Effective-dated price table.

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::info;

use super::BillingError;
use crate::models::billing::PricePoint;
use crate::money::Money;
use crate::store::PriceStore;

/// Pick the price applicable on `date`: the greatest effective date not
/// after it. `points` must be in insertion order; on equal effective dates
/// the later entry wins.
pub fn select_price(points: &[PricePoint], date: NaiveDate) -> Option<&PricePoint> {
    points
        .iter()
        .filter(|p| p.effective_date <= date)
        .max_by_key(|p| p.effective_date)
}

#[derive(Clone)]
pub struct PriceTable {
    store: Arc<dyn PriceStore>,
}

impl PriceTable {
    pub fn new(store: Arc<dyn PriceStore>) -> Self {
        Self { store }
    }

    /// Price per unit on `date`, or `NoPriceConfigured` when every point is
    /// later than it.
    pub async fn resolve_price(&self, date: NaiveDate) -> Result<PricePoint, BillingError> {
        self.store
            .price_on(date)
            .await?
            .ok_or(BillingError::NoPriceConfigured(date))
    }

    /// Append a price point. Existing points are never modified.
    pub async fn add_price(
        &self,
        effective_date: NaiveDate,
        price_per_unit: Money,
    ) -> Result<PricePoint, BillingError> {
        if price_per_unit.is_negative() {
            return Err(BillingError::Validation(
                "price_per_unit must not be negative".into(),
            ));
        }
        let point = self.store.insert_price(effective_date, price_per_unit).await?;
        info!(%effective_date, price = %price_per_unit, "price point added");
        Ok(point)
    }

    pub async fn list_prices(&self) -> Result<Vec<PricePoint>, BillingError> {
        Ok(self.store.list_prices().await?)
    }
}
