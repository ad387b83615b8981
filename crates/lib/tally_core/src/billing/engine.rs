//! Bill computation and the customer balance ledger.
//!
//! A bill's amount is either supplied explicitly or derived from the price
//! in effect on the bill date. Writing the bill and moving the balance is
//! delegated to [`LedgerStore::record_bill`], which applies both or neither.

use std::sync::Arc;

use chrono::{Days, NaiveDate};
use tracing::info;
use uuid::Uuid;

use super::{AMOUNT_OUT_OF_RANGE, BillingError};
use super::prices::PriceTable;
use crate::models::auth::{Principal, Role};
use crate::models::billing::{
    Bill, BillFilter, BillPatch, BillReport, Customer, DailySales, NewBill, NewCustomer,
};
use crate::money::Money;
use crate::store::{LedgerStore, PriceStore};

/// Message for a caller without a customer profile.
pub const NO_CUSTOMER_PROFILE: &str = "Customer profile not found.";

/// Length of the sales dashboard window, in days.
pub const WEEKLY_SALES_DAYS: u64 = 7;

/// A request to bill a customer.
#[derive(Debug, Clone)]
pub struct BillRequest {
    pub customer_id: Uuid,
    pub bill_date: NaiveDate,
    pub quantity: f64,
    pub returned_quantity: f64,
    pub extra_quantity: f64,
    /// Overrides price resolution when present.
    pub amount: Option<Money>,
    pub description: Option<String>,
    pub due_date: Option<NaiveDate>,
}

impl BillRequest {
    fn validate(&self) -> Result<(), BillingError> {
        if !self.quantity.is_finite() || self.quantity <= 0.0 {
            return Err(BillingError::Validation(
                "quantity must be greater than zero".into(),
            ));
        }
        if !self.returned_quantity.is_finite() || self.returned_quantity < 0.0 {
            return Err(BillingError::Validation(
                "returned_quantity must not be negative".into(),
            ));
        }
        if !self.extra_quantity.is_finite() || self.extra_quantity < 0.0 {
            return Err(BillingError::Validation(
                "extra_quantity must not be negative".into(),
            ));
        }
        if self.amount.is_some_and(Money::is_negative) {
            return Err(BillingError::Validation("amount must not be negative".into()));
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct BillingEngine {
    ledger: Arc<dyn LedgerStore>,
    prices: PriceTable,
}

impl BillingEngine {
    pub fn new(ledger: Arc<dyn LedgerStore>, prices: Arc<dyn PriceStore>) -> Self {
        Self {
            ledger,
            prices: PriceTable::new(prices),
        }
    }

    pub fn prices(&self) -> &PriceTable {
        &self.prices
    }

    /// Compute and record a bill, raising the customer's balance by its
    /// amount.
    pub async fn create_bill(&self, request: BillRequest) -> Result<Bill, BillingError> {
        request.validate()?;

        if self
            .ledger
            .customer_by_id(request.customer_id)
            .await?
            .is_none()
        {
            return Err(BillingError::NotFound("Customer not found".into()));
        }

        let amount = match request.amount {
            Some(explicit) => explicit,
            None => {
                let price = self.prices.resolve_price(request.bill_date).await?;
                price.price_per_unit.times(request.quantity).ok_or_else(|| {
                    BillingError::Validation(AMOUNT_OUT_OF_RANGE.into())
                })?
            }
        };

        let bill = self
            .ledger
            .record_bill(&NewBill {
                customer_id: request.customer_id,
                bill_date: request.bill_date,
                quantity: request.quantity,
                returned_quantity: request.returned_quantity,
                extra_quantity: request.extra_quantity,
                amount,
                description: request.description,
                due_date: request.due_date,
            })
            .await?;

        info!(
            bill_id = %bill.id,
            customer_id = %bill.customer_id,
            amount = %bill.amount,
            "bill recorded"
        );
        Ok(bill)
    }

    /// Bills visible to `viewer`. Admins see everything, optionally narrowed
    /// to one customer; everyone else sees only their own profile's bills.
    pub async fn list_bills(
        &self,
        viewer: &Principal,
        customer_id: Option<Uuid>,
    ) -> Result<Vec<Bill>, BillingError> {
        let customer_id = if viewer.role == Role::Admin {
            customer_id
        } else {
            let own = self.customer_for_user(viewer.user_id).await?;
            if customer_id.is_some_and(|requested| requested != own.id) {
                return Err(BillingError::Forbidden(
                    "cannot view another customer's bills".into(),
                ));
            }
            Some(own.id)
        };
        Ok(self
            .ledger
            .list_bills(&BillFilter {
                customer_id,
                ..Default::default()
            })
            .await?)
    }

    /// Bills dated within `[start, end]` and their total.
    pub async fn report(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        customer_id: Option<Uuid>,
    ) -> Result<BillReport, BillingError> {
        if start > end {
            return Err(BillingError::Validation(
                "start_date must not be after end_date".into(),
            ));
        }
        let bills = self
            .ledger
            .list_bills(&BillFilter {
                customer_id,
                from: Some(start),
                to: Some(end),
            })
            .await?;
        let total_amount = Money::checked_sum(bills.iter().map(|b| b.amount))
            .ok_or_else(|| BillingError::Validation(AMOUNT_OUT_OF_RANGE.into()))?;
        Ok(BillReport {
            start_date: start,
            end_date: end,
            customer_id,
            count: bills.len(),
            total_amount,
            bills,
        })
    }

    pub async fn update_bill(&self, bill_id: Uuid, patch: BillPatch) -> Result<Bill, BillingError> {
        if patch.is_empty() {
            return Err(BillingError::Validation("No fields to update".into()));
        }
        if patch.amount.is_some_and(Money::is_negative) {
            return Err(BillingError::Validation("amount must not be negative".into()));
        }
        let bill = self
            .ledger
            .update_bill(bill_id, &patch)
            .await?
            .ok_or_else(|| BillingError::NotFound("Bill not found".into()))?;
        info!(%bill_id, status = %bill.status, "bill updated");
        Ok(bill)
    }

    pub async fn delete_bill(&self, bill_id: Uuid) -> Result<(), BillingError> {
        if !self.ledger.delete_bill(bill_id).await? {
            return Err(BillingError::NotFound("Bill not found".into()));
        }
        info!(%bill_id, "bill deleted");
        Ok(())
    }

    /// The `limit` most recently created bills across all customers.
    pub async fn recent_bills(&self, limit: i64) -> Result<Vec<Bill>, BillingError> {
        if limit <= 0 {
            return Err(BillingError::Validation("limit must be positive".into()));
        }
        Ok(self.ledger.recent_bills(limit).await?)
    }

    /// Sales per day for the week ending on `end`, oldest day first. Days
    /// without bills report zero.
    pub async fn weekly_sales(&self, end: NaiveDate) -> Result<Vec<DailySales>, BillingError> {
        let start = end
            .checked_sub_days(Days::new(WEEKLY_SALES_DAYS - 1))
            .ok_or_else(|| BillingError::Validation(format!("invalid end date {end}")))?;
        let mut recorded = self
            .ledger
            .daily_sales(start, end)
            .await?
            .into_iter()
            .peekable();
        let week = start
            .iter_days()
            .take_while(|day| *day <= end)
            .map(|date| {
                recorded
                    .next_if(|sales| sales.date == date)
                    .unwrap_or(DailySales {
                        date,
                        total_amount: Money::ZERO,
                        bill_count: 0,
                    })
            })
            .collect();
        Ok(week)
    }

    pub async fn add_customer(&self, new: NewCustomer) -> Result<Customer, BillingError> {
        for (field, value) in [
            ("name", &new.name),
            ("address", &new.address),
            ("mobile_number", &new.mobile_number),
        ] {
            if value.trim().is_empty() {
                return Err(BillingError::Validation(format!("{field} is required")));
            }
        }
        let customer = self.ledger.insert_customer(new).await.map_err(|e| {
            match BillingError::from(e) {
                BillingError::NotFound(_) => BillingError::NotFound("User not found".into()),
                other => other,
            }
        })?;
        info!(customer_id = %customer.id, user_id = %customer.user_id, "customer created");
        Ok(customer)
    }

    pub async fn customers(&self) -> Result<Vec<Customer>, BillingError> {
        Ok(self.ledger.list_customers().await?)
    }

    pub async fn customer(&self, customer_id: Uuid) -> Result<Customer, BillingError> {
        self.ledger
            .customer_by_id(customer_id)
            .await?
            .ok_or_else(|| BillingError::NotFound("Customer not found".into()))
    }

    /// The profile owned by `user_id`.
    pub async fn customer_for_user(&self, user_id: Uuid) -> Result<Customer, BillingError> {
        self.ledger
            .customer_by_user_id(user_id)
            .await?
            .ok_or_else(|| BillingError::NotFound(NO_CUSTOMER_PROFILE.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::auth::NewCredential;
    use crate::models::billing::BillStatus;
    use crate::store::{CredentialStore, MemoryStore};

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn engine() -> (Arc<MemoryStore>, BillingEngine) {
        let store = Arc::new(MemoryStore::new());
        let engine = BillingEngine::new(store.clone(), store.clone());
        (store, engine)
    }

    async fn seed_customer(store: &MemoryStore, engine: &BillingEngine, mobile: &str) -> Customer {
        let user = store
            .insert_credential(NewCredential {
                name: "Meera".into(),
                mobile_number: mobile.into(),
                password_hash: "x".into(),
                role: Role::Customer,
            })
            .await
            .unwrap();
        engine
            .add_customer(NewCustomer {
                user_id: user.id,
                name: "Meera".into(),
                address: "12 Canal Road".into(),
                mobile_number: mobile.into(),
            })
            .await
            .unwrap()
    }

    fn request(customer_id: Uuid, bill_date: &str, quantity: f64) -> BillRequest {
        BillRequest {
            customer_id,
            bill_date: date(bill_date),
            quantity,
            returned_quantity: 0.0,
            extra_quantity: 0.0,
            amount: None,
            description: None,
            due_date: None,
        }
    }

    #[tokio::test]
    async fn ten_units_at_fifty_is_five_hundred() {
        let (store, engine) = engine();
        let customer = seed_customer(&store, &engine, "9100000001").await;
        engine
            .prices()
            .add_price(date("2024-01-01"), Money::from_cents(5000))
            .await
            .unwrap();

        let bill = engine
            .create_bill(request(customer.id, "2024-02-01", 10.0))
            .await
            .unwrap();
        assert_eq!(bill.amount, Money::from_cents(50_000));
        assert_eq!(bill.amount.to_string(), "500.00");

        let refreshed = engine.customer(customer.id).await.unwrap();
        assert_eq!(refreshed.current_balance, Money::from_cents(50_000));
    }

    #[tokio::test]
    async fn fractional_quantity_rounds_to_the_cent() {
        let (store, engine) = engine();
        let customer = seed_customer(&store, &engine, "9100000002").await;
        engine
            .prices()
            .add_price(date("2024-01-01"), Money::from_cents(3333))
            .await
            .unwrap();
        let bill = engine
            .create_bill(request(customer.id, "2024-01-01", 1.5))
            .await
            .unwrap();
        // 33.33 * 1.5 = 49.995
        assert_eq!(bill.amount, Money::from_cents(5000));
    }

    #[tokio::test]
    async fn explicit_amount_skips_price_resolution() {
        let (store, engine) = engine();
        let customer = seed_customer(&store, &engine, "9100000003").await;
        let mut req = request(customer.id, "2020-01-01", 3.0);
        req.amount = Some(Money::from_cents(1234));
        let bill = engine.create_bill(req).await.unwrap();
        assert_eq!(bill.amount, Money::from_cents(1234));
    }

    #[tokio::test]
    async fn missing_price_is_a_hard_stop() {
        let (store, engine) = engine();
        let customer = seed_customer(&store, &engine, "9100000004").await;
        engine
            .prices()
            .add_price(date("2024-01-01"), Money::from_cents(5000))
            .await
            .unwrap();
        let err = engine
            .create_bill(request(customer.id, "2023-12-31", 1.0))
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::NoPriceConfigured(_)));
        assert_eq!(
            engine.customer(customer.id).await.unwrap().current_balance,
            Money::ZERO
        );
    }

    #[tokio::test]
    async fn invalid_quantities_are_rejected() {
        let (store, engine) = engine();
        let customer = seed_customer(&store, &engine, "9100000005").await;
        for quantity in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let err = engine
                .create_bill(request(customer.id, "2024-01-01", quantity))
                .await
                .unwrap_err();
            assert!(matches!(err, BillingError::Validation(_)), "{quantity}");
        }
        let mut req = request(customer.id, "2024-01-01", 1.0);
        req.returned_quantity = -0.5;
        assert!(matches!(
            engine.create_bill(req).await,
            Err(BillingError::Validation(_))
        ));
        let mut req = request(customer.id, "2024-01-01", 1.0);
        req.amount = Some(Money::from_cents(-100));
        assert!(matches!(
            engine.create_bill(req).await,
            Err(BillingError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn unknown_customer_is_not_found() {
        let (_store, engine) = engine();
        let mut req = request(Uuid::now_v7(), "2024-01-01", 1.0);
        req.amount = Some(Money::from_cents(100));
        let err = engine.create_bill(req).await.unwrap_err();
        assert!(matches!(err, BillingError::NotFound(_)));
        assert!(engine.recent_bills(10).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_bills_all_reach_the_balance() {
        let (store, engine) = engine();
        let customer = seed_customer(&store, &engine, "9100000006").await;

        let tasks = (0..50).map(|_| {
            let engine = engine.clone();
            let mut req = request(customer.id, "2024-05-01", 1.0);
            req.amount = Some(Money::from_cents(1000));
            tokio::spawn(async move { engine.create_bill(req).await })
        });
        for result in futures::future::join_all(tasks).await {
            result.unwrap().unwrap();
        }

        let customer = engine.customer(customer.id).await.unwrap();
        assert_eq!(customer.current_balance, Money::from_cents(50_000));
        assert_eq!(engine.recent_bills(100).await.unwrap().len(), 50);
    }

    #[tokio::test]
    async fn customers_only_see_their_own_bills() {
        let (store, engine) = engine();
        let alice = seed_customer(&store, &engine, "9100000007").await;
        let bob = seed_customer(&store, &engine, "9100000008").await;
        for (customer, cents) in [(&alice, 100), (&bob, 200), (&alice, 300)] {
            let mut req = request(customer.id, "2024-01-01", 1.0);
            req.amount = Some(Money::from_cents(cents));
            engine.create_bill(req).await.unwrap();
        }

        let as_alice = Principal {
            user_id: alice.user_id,
            role: Role::Customer,
        };
        let mine = engine.list_bills(&as_alice, None).await.unwrap();
        assert_eq!(mine.len(), 2);
        assert!(mine.iter().all(|b| b.customer_id == alice.id));

        let err = engine
            .list_bills(&as_alice, Some(bob.id))
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::Forbidden(_)));

        let admin = Principal {
            user_id: Uuid::now_v7(),
            role: Role::Admin,
        };
        assert_eq!(engine.list_bills(&admin, None).await.unwrap().len(), 3);
        assert_eq!(engine.list_bills(&admin, Some(bob.id)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn viewer_without_profile_is_not_found() {
        let (_store, engine) = engine();
        let labor = Principal {
            user_id: Uuid::now_v7(),
            role: Role::Labor,
        };
        let err = engine.list_bills(&labor, None).await.unwrap_err();
        assert!(matches!(err, BillingError::NotFound(msg) if msg == NO_CUSTOMER_PROFILE));
    }

    #[tokio::test]
    async fn bills_are_newest_bill_date_first() {
        let (store, engine) = engine();
        let customer = seed_customer(&store, &engine, "9100000009").await;
        for d in ["2024-01-05", "2024-03-01", "2024-02-10"] {
            let mut req = request(customer.id, d, 1.0);
            req.amount = Some(Money::from_cents(100));
            engine.create_bill(req).await.unwrap();
        }
        let admin = Principal {
            user_id: Uuid::now_v7(),
            role: Role::Admin,
        };
        let dates: Vec<NaiveDate> = engine
            .list_bills(&admin, None)
            .await
            .unwrap()
            .iter()
            .map(|b| b.bill_date)
            .collect();
        assert_eq!(
            dates,
            vec![date("2024-03-01"), date("2024-02-10"), date("2024-01-05")]
        );
    }

    #[tokio::test]
    async fn report_is_inclusive_and_totals_amounts() {
        let (store, engine) = engine();
        let customer = seed_customer(&store, &engine, "9100000010").await;
        for (d, cents) in [
            ("2024-01-01", 1000),
            ("2024-01-31", 2550),
            ("2024-02-01", 9999),
        ] {
            let mut req = request(customer.id, d, 1.0);
            req.amount = Some(Money::from_cents(cents));
            engine.create_bill(req).await.unwrap();
        }
        let report = engine
            .report(date("2024-01-01"), date("2024-01-31"), None)
            .await
            .unwrap();
        assert_eq!(report.count, 2);
        assert_eq!(report.total_amount, Money::from_cents(3550));

        let err = engine
            .report(date("2024-02-01"), date("2024-01-01"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::Validation(_)));
    }

    #[tokio::test]
    async fn amount_update_and_delete_move_the_balance() {
        let (store, engine) = engine();
        let customer = seed_customer(&store, &engine, "9100000011").await;
        let mut req = request(customer.id, "2024-01-01", 1.0);
        req.amount = Some(Money::from_cents(1000));
        let bill = engine.create_bill(req).await.unwrap();

        let updated = engine
            .update_bill(
                bill.id,
                BillPatch {
                    amount: Some(Money::from_cents(1500)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.amount, Money::from_cents(1500));
        assert_eq!(
            engine.customer(customer.id).await.unwrap().current_balance,
            Money::from_cents(1500)
        );

        engine.delete_bill(bill.id).await.unwrap();
        assert_eq!(
            engine.customer(customer.id).await.unwrap().current_balance,
            Money::ZERO
        );
        assert!(matches!(
            engine.delete_bill(bill.id).await,
            Err(BillingError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn status_update_leaves_balance_alone() {
        let (store, engine) = engine();
        let customer = seed_customer(&store, &engine, "9100000012").await;
        let mut req = request(customer.id, "2024-01-01", 1.0);
        req.amount = Some(Money::from_cents(700));
        let bill = engine.create_bill(req).await.unwrap();
        let updated = engine
            .update_bill(
                bill.id,
                BillPatch {
                    status: Some(BillStatus::Paid),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.status, BillStatus::Paid);
        assert_eq!(
            engine.customer(customer.id).await.unwrap().current_balance,
            Money::from_cents(700)
        );
    }

    #[tokio::test]
    async fn balance_overflow_is_rejected_without_writing() {
        let (store, engine) = engine();
        let alice = seed_customer(&store, &engine, "9100000014").await;
        let bob = seed_customer(&store, &engine, "9100000015").await;
        let huge = Money::from_major(90_000_000_000_000_000.0).unwrap();

        let mut req = request(alice.id, "2024-01-01", 1.0);
        req.amount = Some(huge);
        let first = engine.create_bill(req.clone()).await.unwrap();

        let err = engine.create_bill(req).await.unwrap_err();
        assert!(matches!(err, BillingError::Validation(msg) if msg == AMOUNT_OUT_OF_RANGE));
        assert_eq!(engine.customer(alice.id).await.unwrap().current_balance, huge);
        assert_eq!(engine.recent_bills(10).await.unwrap().len(), 1);

        let mut req = request(bob.id, "2024-01-02", 1.0);
        req.amount = Some(huge);
        engine.create_bill(req).await.unwrap();
        let err = engine
            .report(date("2024-01-01"), date("2024-01-31"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::Validation(_)));

        engine
            .update_bill(
                first.id,
                BillPatch {
                    amount: Some(Money::from_cents(100)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(
            engine.customer(alice.id).await.unwrap().current_balance,
            Money::from_cents(100)
        );
    }

    #[tokio::test]
    async fn weekly_sales_cover_seven_days_with_gaps_as_zero() {
        let (store, engine) = engine();
        let customer = seed_customer(&store, &engine, "9100000016").await;
        for (d, cents) in [
            ("2024-03-03", 9999),
            ("2024-03-04", 1000),
            ("2024-03-04", 250),
            ("2024-03-08", 700),
            ("2024-03-10", 1),
            ("2024-03-11", 5555),
        ] {
            let mut req = request(customer.id, d, 1.0);
            req.amount = Some(Money::from_cents(cents));
            engine.create_bill(req).await.unwrap();
        }

        let week = engine.weekly_sales(date("2024-03-10")).await.unwrap();
        let days: Vec<NaiveDate> = week.iter().map(|d| d.date).collect();
        let expected_days: Vec<NaiveDate> = date("2024-03-04")
            .iter_days()
            .take(7)
            .collect();
        assert_eq!(days, expected_days);

        let totals: Vec<(i64, u64)> = week
            .iter()
            .map(|d| (d.total_amount.cents(), d.bill_count))
            .collect();
        assert_eq!(
            totals,
            vec![(1250, 2), (0, 0), (0, 0), (0, 0), (700, 1), (0, 0), (1, 1)]
        );
    }

    #[tokio::test]
    async fn second_profile_for_user_conflicts() {
        let (store, engine) = engine();
        let customer = seed_customer(&store, &engine, "9100000013").await;
        let err = engine
            .add_customer(NewCustomer {
                user_id: customer.user_id,
                name: "Again".into(),
                address: "x".into(),
                mobile_number: "9100000013".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::Conflict(_)));

        let err = engine
            .add_customer(NewCustomer {
                user_id: Uuid::now_v7(),
                name: "Ghost".into(),
                address: "x".into(),
                mobile_number: "1".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::NotFound(_)));
    }
}
