//! Billing domain models: price points, customers and bills.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::money::Money;

/// A price that applies from `effective_date` until superseded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub id: Uuid,
    pub effective_date: NaiveDate,
    pub price_per_unit: Money,
    pub created_at: DateTime<Utc>,
}

/// Customer profile linked 1:1 to a user account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub address: String,
    pub mobile_number: String,
    /// Running total owed. Only ever changed by atomic increments.
    pub current_balance: Money,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewCustomer {
    pub user_id: Uuid,
    pub name: String,
    pub address: String,
    pub mobile_number: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillStatus {
    #[default]
    Unpaid,
    Paid,
}

impl BillStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            BillStatus::Unpaid => "unpaid",
            BillStatus::Paid => "paid",
        }
    }
}

impl fmt::Display for BillStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BillStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unpaid" => Ok(BillStatus::Unpaid),
            "paid" => Ok(BillStatus::Paid),
            other => Err(format!("unknown bill status '{other}'")),
        }
    }
}

/// A persisted bill. The amount is fixed when the bill is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bill {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub bill_date: NaiveDate,
    pub quantity: f64,
    pub returned_quantity: f64,
    pub extra_quantity: f64,
    pub amount: Money,
    pub status: BillStatus,
    pub description: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

/// A bill ready to be written, amount already computed.
#[derive(Debug, Clone)]
pub struct NewBill {
    pub customer_id: Uuid,
    pub bill_date: NaiveDate,
    pub quantity: f64,
    pub returned_quantity: f64,
    pub extra_quantity: f64,
    pub amount: Money,
    pub description: Option<String>,
    pub due_date: Option<NaiveDate>,
}

/// Post-creation edit. Only these fields may change.
#[derive(Debug, Clone, Default)]
pub struct BillPatch {
    pub description: Option<String>,
    pub amount: Option<Money>,
    pub status: Option<BillStatus>,
    pub due_date: Option<NaiveDate>,
}

impl BillPatch {
    pub fn is_empty(&self) -> bool {
        self.description.is_none()
            && self.amount.is_none()
            && self.status.is_none()
            && self.due_date.is_none()
    }
}

/// Storage-level bill filter. Date bounds are inclusive.
#[derive(Debug, Clone, Copy, Default)]
pub struct BillFilter {
    pub customer_id: Option<Uuid>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl BillFilter {
    pub fn matches(&self, bill: &Bill) -> bool {
        self.customer_id.is_none_or(|id| bill.customer_id == id)
            && self.from.is_none_or(|from| bill.bill_date >= from)
            && self.to.is_none_or(|to| bill.bill_date <= to)
    }
}

/// Aggregate over a date range, computed at query time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillReport {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub customer_id: Option<Uuid>,
    pub bills: Vec<Bill>,
    pub total_amount: Money,
    pub count: usize,
}

/// Bill totals for one calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailySales {
    pub date: NaiveDate,
    pub total_amount: Money,
    pub bill_count: u64,
}
