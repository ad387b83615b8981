//! Billing database queries: price points, customers and the bill ledger.
//!
//! Every statement that touches `customers.current_balance_cents` is a
//! single-statement increment executed in the same transaction as the bill
//! write it accounts for.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::models::billing::{
    Bill, BillFilter, BillPatch, BillStatus, Customer, DailySales, NewBill, NewCustomer,
    PricePoint,
};
use crate::money::Money;
use crate::store::{StoreError, new_id};

const BILL_COLUMNS: &str = "id, customer_id, bill_date, quantity, returned_quantity, \
     extra_quantity, amount_cents, status, description, due_date, created_at";

const CUSTOMER_COLUMNS: &str =
    "id, user_id, name, address, mobile_number, current_balance_cents, created_at";

#[derive(sqlx::FromRow)]
struct BillRow {
    id: Uuid,
    customer_id: Uuid,
    bill_date: NaiveDate,
    quantity: f64,
    returned_quantity: f64,
    extra_quantity: f64,
    amount_cents: i64,
    status: String,
    description: Option<String>,
    due_date: Option<NaiveDate>,
    created_at: DateTime<Utc>,
}

impl TryFrom<BillRow> for Bill {
    type Error = StoreError;

    fn try_from(row: BillRow) -> Result<Self, Self::Error> {
        Ok(Bill {
            id: row.id,
            customer_id: row.customer_id,
            bill_date: row.bill_date,
            quantity: row.quantity,
            returned_quantity: row.returned_quantity,
            extra_quantity: row.extra_quantity,
            amount: Money::from_cents(row.amount_cents),
            status: row.status.parse::<BillStatus>().map_err(StoreError::Corrupt)?,
            description: row.description,
            due_date: row.due_date,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CustomerRow {
    id: Uuid,
    user_id: Uuid,
    name: String,
    address: String,
    mobile_number: String,
    current_balance_cents: i64,
    created_at: DateTime<Utc>,
}

impl From<CustomerRow> for Customer {
    fn from(row: CustomerRow) -> Self {
        Customer {
            id: row.id,
            user_id: row.user_id,
            name: row.name,
            address: row.address,
            mobile_number: row.mobile_number,
            current_balance: Money::from_cents(row.current_balance_cents),
            created_at: row.created_at,
        }
    }
}

fn into_price(
    (id, effective_date, cents, created_at): (Uuid, NaiveDate, i64, DateTime<Utc>),
) -> PricePoint {
    PricePoint {
        id,
        effective_date,
        price_per_unit: Money::from_cents(cents),
        created_at,
    }
}

fn collect_bills(rows: Vec<BillRow>) -> Result<Vec<Bill>, StoreError> {
    rows.into_iter().map(Bill::try_from).collect()
}

// ---------------------------------------------------------------------------
// Price points
// ---------------------------------------------------------------------------

/// Append a price point.
pub async fn insert_price(
    pool: &PgPool,
    effective_date: NaiveDate,
    price_per_unit: Money,
) -> Result<PricePoint, StoreError> {
    let row = sqlx::query_as::<_, (Uuid, NaiveDate, i64, DateTime<Utc>)>(
        "INSERT INTO price_points (id, effective_date, price_per_unit_cents) \
         VALUES ($1, $2, $3) \
         RETURNING id, effective_date, price_per_unit_cents, created_at",
    )
    .bind(new_id())
    .bind(effective_date)
    .bind(price_per_unit.cents())
    .fetch_one(pool)
    .await?;
    Ok(into_price(row))
}

/// The price in effect on `date`.
pub async fn find_price_on(
    pool: &PgPool,
    date: NaiveDate,
) -> Result<Option<PricePoint>, StoreError> {
    let row = sqlx::query_as::<_, (Uuid, NaiveDate, i64, DateTime<Utc>)>(
        "SELECT id, effective_date, price_per_unit_cents, created_at \
         FROM price_points \
         WHERE effective_date <= $1 \
         ORDER BY effective_date DESC, created_at DESC, id DESC \
         LIMIT 1",
    )
    .bind(date)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(into_price))
}

/// All price points, newest effective date first.
pub async fn list_prices(pool: &PgPool) -> Result<Vec<PricePoint>, StoreError> {
    let rows = sqlx::query_as::<_, (Uuid, NaiveDate, i64, DateTime<Utc>)>(
        "SELECT id, effective_date, price_per_unit_cents, created_at \
         FROM price_points \
         ORDER BY effective_date DESC, created_at DESC, id DESC",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(into_price).collect())
}

// ---------------------------------------------------------------------------
// Customers
// ---------------------------------------------------------------------------

/// Create a customer profile for an existing user.
pub async fn insert_customer(pool: &PgPool, new: &NewCustomer) -> Result<Customer, StoreError> {
    let row = sqlx::query_as::<_, CustomerRow>(&format!(
        "INSERT INTO customers (id, user_id, name, address, mobile_number) \
         VALUES ($1, $2, $3, $4, $5) RETURNING {CUSTOMER_COLUMNS}"
    ))
    .bind(new_id())
    .bind(new.user_id)
    .bind(&new.name)
    .bind(&new.address)
    .bind(&new.mobile_number)
    .fetch_one(pool)
    .await
    .map_err(|e| match &e {
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
            StoreError::NotFound(format!("user {}", new.user_id))
        }
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Conflict(format!(
            "user {} already has a customer profile",
            new.user_id
        )),
        _ => StoreError::Db(e),
    })?;
    Ok(row.into())
}

pub async fn find_customer_by_id(
    pool: &PgPool,
    customer_id: Uuid,
) -> Result<Option<Customer>, StoreError> {
    let row = sqlx::query_as::<_, CustomerRow>(&format!(
        "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE id = $1"
    ))
    .bind(customer_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(Customer::from))
}

pub async fn find_customer_by_user_id(
    pool: &PgPool,
    user_id: Uuid,
) -> Result<Option<Customer>, StoreError> {
    let row = sqlx::query_as::<_, CustomerRow>(&format!(
        "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE user_id = $1"
    ))
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(Customer::from))
}

pub async fn list_customers(pool: &PgPool) -> Result<Vec<Customer>, StoreError> {
    let rows = sqlx::query_as::<_, CustomerRow>(&format!(
        "SELECT {CUSTOMER_COLUMNS} FROM customers ORDER BY name, id"
    ))
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(Customer::from).collect())
}

// ---------------------------------------------------------------------------
// Bills
// ---------------------------------------------------------------------------

fn balance_out_of_range(customer_id: Uuid) -> StoreError {
    StoreError::OutOfRange(format!("balance of customer {customer_id}"))
}

/// SQLSTATE for a BIGINT overflow.
const NUMERIC_VALUE_OUT_OF_RANGE: &str = "22003";

/// Add `delta` to a customer's balance inside `tx`. Returns `false` when the
/// customer does not exist.
async fn apply_balance_delta(
    tx: &mut Transaction<'_, Postgres>,
    customer_id: Uuid,
    delta: Money,
) -> Result<bool, StoreError> {
    let result = sqlx::query(
        "UPDATE customers SET current_balance_cents = current_balance_cents + $2 WHERE id = $1",
    )
    .bind(customer_id)
    .bind(delta.cents())
    .execute(&mut **tx)
    .await
    .map_err(|e| match &e {
        sqlx::Error::Database(db)
            if db.code().as_deref() == Some(NUMERIC_VALUE_OUT_OF_RANGE) =>
        {
            balance_out_of_range(customer_id)
        }
        _ => StoreError::Db(e),
    })?;
    Ok(result.rows_affected() > 0)
}

/// Insert a bill and debit the customer in one transaction.
///
/// The balance increment runs first so the customer row lock serialises
/// concurrent bills for the same customer.
pub async fn record_bill(pool: &PgPool, new: &NewBill) -> Result<Bill, StoreError> {
    let mut tx = pool.begin().await?;

    if !apply_balance_delta(&mut tx, new.customer_id, new.amount).await? {
        // Dropping `tx` rolls back.
        return Err(StoreError::NotFound(format!("customer {}", new.customer_id)));
    }

    let row = sqlx::query_as::<_, BillRow>(&format!(
        "INSERT INTO bills (id, customer_id, bill_date, quantity, returned_quantity, \
           extra_quantity, amount_cents, status, description, due_date) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
         RETURNING {BILL_COLUMNS}"
    ))
    .bind(new_id())
    .bind(new.customer_id)
    .bind(new.bill_date)
    .bind(new.quantity)
    .bind(new.returned_quantity)
    .bind(new.extra_quantity)
    .bind(new.amount.cents())
    .bind(BillStatus::Unpaid.as_str())
    .bind(new.description.as_deref())
    .bind(new.due_date)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    row.try_into()
}

/// Patch a bill; an amount change moves the customer balance by the delta.
pub async fn update_bill(
    pool: &PgPool,
    bill_id: Uuid,
    patch: &BillPatch,
) -> Result<Option<Bill>, StoreError> {
    let mut tx = pool.begin().await?;

    let current = sqlx::query_as::<_, (Uuid, i64)>(
        "SELECT customer_id, amount_cents FROM bills WHERE id = $1 FOR UPDATE",
    )
    .bind(bill_id)
    .fetch_optional(&mut *tx)
    .await?;
    let Some((customer_id, old_cents)) = current else {
        return Ok(None);
    };

    let row = sqlx::query_as::<_, BillRow>(&format!(
        "UPDATE bills SET \
           description = COALESCE($2, description), \
           amount_cents = COALESCE($3, amount_cents), \
           status = COALESCE($4, status), \
           due_date = COALESCE($5, due_date) \
         WHERE id = $1 RETURNING {BILL_COLUMNS}"
    ))
    .bind(bill_id)
    .bind(patch.description.as_deref())
    .bind(patch.amount.map(Money::cents))
    .bind(patch.status.map(BillStatus::as_str))
    .bind(patch.due_date)
    .fetch_one(&mut *tx)
    .await?;

    if let Some(amount) = patch.amount {
        let delta = amount
            .checked_sub(Money::from_cents(old_cents))
            .ok_or_else(|| balance_out_of_range(customer_id))?;
        if delta != Money::ZERO {
            apply_balance_delta(&mut tx, customer_id, delta).await?;
        }
    }

    tx.commit().await?;
    Bill::try_from(row).map(Some)
}

/// Delete a bill and credit its amount back to the customer.
pub async fn delete_bill(pool: &PgPool, bill_id: Uuid) -> Result<bool, StoreError> {
    let mut tx = pool.begin().await?;

    let removed = sqlx::query_as::<_, (Uuid, i64)>(
        "DELETE FROM bills WHERE id = $1 RETURNING customer_id, amount_cents",
    )
    .bind(bill_id)
    .fetch_optional(&mut *tx)
    .await?;
    let Some((customer_id, cents)) = removed else {
        return Ok(false);
    };

    let credit = Money::from_cents(cents)
        .checked_neg()
        .ok_or_else(|| balance_out_of_range(customer_id))?;
    apply_balance_delta(&mut tx, customer_id, credit).await?;
    tx.commit().await?;
    Ok(true)
}

/// Bills matching the filter, newest bill date first.
pub async fn list_bills(pool: &PgPool, filter: &BillFilter) -> Result<Vec<Bill>, StoreError> {
    let rows = sqlx::query_as::<_, BillRow>(&format!(
        "SELECT {BILL_COLUMNS} FROM bills \
         WHERE ($1::uuid IS NULL OR customer_id = $1) \
           AND ($2::date IS NULL OR bill_date >= $2) \
           AND ($3::date IS NULL OR bill_date <= $3) \
         ORDER BY bill_date DESC, created_at DESC, id DESC"
    ))
    .bind(filter.customer_id)
    .bind(filter.from)
    .bind(filter.to)
    .fetch_all(pool)
    .await?;
    collect_bills(rows)
}

/// Most recently created bills.
pub async fn recent_bills(pool: &PgPool, limit: i64) -> Result<Vec<Bill>, StoreError> {
    let rows = sqlx::query_as::<_, BillRow>(&format!(
        "SELECT {BILL_COLUMNS} FROM bills ORDER BY created_at DESC, id DESC LIMIT $1"
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;
    collect_bills(rows)
}

/// Per-day bill totals within `[from, to]`, oldest day first.
pub async fn daily_sales(
    pool: &PgPool,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<DailySales>, StoreError> {
    let rows = sqlx::query_as::<_, (NaiveDate, i64, i64)>(
        "SELECT bill_date, SUM(amount_cents)::BIGINT, COUNT(*) \
         FROM bills \
         WHERE bill_date BETWEEN $1 AND $2 \
         GROUP BY bill_date \
         ORDER BY bill_date",
    )
    .bind(from)
    .bind(to)
    .fetch_all(pool)
    .await
    .map_err(|e| match &e {
        sqlx::Error::Database(db)
            if db.code().as_deref() == Some(NUMERIC_VALUE_OUT_OF_RANGE) =>
        {
            StoreError::OutOfRange(format!("daily sales between {from} and {to}"))
        }
        _ => StoreError::Db(e),
    })?;
    rows.into_iter()
        .map(|(date, cents, count)| {
            let bill_count = u64::try_from(count)
                .map_err(|_| StoreError::Corrupt(format!("bill count {count} on {date}")))?;
            Ok(DailySales {
                date,
                total_amount: Money::from_cents(cents),
                bill_count,
            })
        })
        .collect()
}
