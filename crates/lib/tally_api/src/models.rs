//! Request and response bodies, plus extractors that reject with
//! [`AppError`].

use axum::extract::{FromRequest, FromRequestParts};
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize};
use tally_core::auth::service::TokenPair;
use tally_core::models::auth::{Role, UserProfile};
use tally_core::models::billing::{
    Bill, BillReport, BillStatus, Customer, DailySales, PricePoint,
};
use tally_core::money::Money;
use uuid::Uuid;

use crate::error::AppError;

// ---------------------------------------------------------------------------
// Extractors
// ---------------------------------------------------------------------------

/// `axum::Json` with a `{"error": ...}` 400 rejection.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

impl<T: Serialize> IntoResponse for ApiJson<T> {
    fn into_response(self) -> Response {
        axum::Json(self.0).into_response()
    }
}

/// `axum::extract::Query` with a `{"error": ...}` 400 rejection.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct ApiQuery<T>(pub T);

/// `axum::extract::Path` with a `{"error": ...}` 400 rejection.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct ApiPath<T>(pub T);

// ---------------------------------------------------------------------------
// Dates
// ---------------------------------------------------------------------------

/// Parse `YYYY-MM-DD` or an RFC 3339 timestamp, keeping the date as written.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(value).ok().map(|dt| dt.date_naive()))
}

fn de_date<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_date(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid date '{raw}'")))
}

fn de_opt_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => parse_date(&raw)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid date '{raw}'"))),
    }
}

// ---------------------------------------------------------------------------
// Common
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<chrono::Utc>,
}

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default, alias = "mobileNumber")]
    pub mobile_number: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default, alias = "mobileNumber")]
    pub mobile_number: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub user_id: Uuid,
    pub role: Role,
}

impl From<TokenPair> for TokenResponse {
    fn from(pair: TokenPair) -> Self {
        Self {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            token_type: "Bearer".into(),
            expires_in: pair.expires_in,
            user_id: pair.user_id,
            role: pair.role,
        }
    }
}

/// Body of `/refresh-token` and `/logout`.
#[derive(Debug, Deserialize)]
pub struct RefreshTokenRequest {
    #[serde(default, alias = "refresh_token", rename = "refreshToken")]
    pub refresh_token: Option<String>,
}

impl RefreshTokenRequest {
    pub fn require(self) -> Result<String, AppError> {
        self.refresh_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::Validation("Refresh token is required".into()))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    #[serde(alias = "user_id")]
    pub user_id: Uuid,
    #[serde(default, alias = "old_password")]
    pub old_password: String,
    #[serde(default, alias = "new_password")]
    pub new_password: String,
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub mobile_number: String,
    #[serde(default)]
    pub password: String,
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub mobile_number: Option<String>,
    pub role: Option<Role>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserListResponse {
    pub users: Vec<UserProfile>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserResponse {
    pub message: String,
    pub user: UserProfile,
}

// ---------------------------------------------------------------------------
// Customers
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CreateCustomerRequest {
    pub user_id: Uuid,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub mobile_number: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CustomerResponse {
    pub customer: Customer,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CustomerListResponse {
    pub customers: Vec<Customer>,
}

// ---------------------------------------------------------------------------
// Prices
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CreatePriceRequest {
    #[serde(deserialize_with = "de_date")]
    pub effective_date: NaiveDate,
    pub price_per_unit: Money,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PriceResponse {
    pub price: PricePoint,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PriceListResponse {
    pub prices: Vec<PricePoint>,
}

// ---------------------------------------------------------------------------
// Bills
// ---------------------------------------------------------------------------

/// Accepts the mobile client's field names as aliases.
#[derive(Debug, Deserialize)]
pub struct CreateBillRequest {
    pub customer_id: Uuid,
    #[serde(deserialize_with = "de_date")]
    pub bill_date: NaiveDate,
    #[serde(alias = "kgs_distributed")]
    pub quantity: f64,
    #[serde(default, alias = "kgs_returned")]
    pub returned_quantity: f64,
    #[serde(default, alias = "extra_kgs")]
    pub extra_quantity: f64,
    #[serde(default, alias = "total_amount")]
    pub amount: Option<Money>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "de_opt_date")]
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateBillRequest {
    pub description: Option<String>,
    pub amount: Option<Money>,
    pub status: Option<BillStatus>,
    #[serde(default, deserialize_with = "de_opt_date")]
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Default, Deserialize)]
pub struct BillListQuery {
    pub customer_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReportQuery {
    #[serde(default, deserialize_with = "de_opt_date")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "de_opt_date")]
    pub end_date: Option<NaiveDate>,
    pub customer_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RecentQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BillResponse {
    pub bill: Bill,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BillListResponse {
    pub bills: Vec<Bill>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReportResponse {
    pub report: BillReport,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TransactionsResponse {
    pub transactions: Vec<Bill>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WeeklySalesQuery {
    /// Last day of the window; today (UTC) when absent.
    #[serde(default, deserialize_with = "de_opt_date")]
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklySalesResponse {
    pub weekly_sales: Vec<DailySales>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dates_accept_plain_and_rfc3339() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        assert_eq!(parse_date("2024-03-05"), Some(expected));
        assert_eq!(parse_date("2024-03-05T10:15:00Z"), Some(expected));
        assert_eq!(parse_date("2024-03-05T23:30:00+05:30"), Some(expected));
        assert_eq!(parse_date("05/03/2024"), None);
    }

    #[test]
    fn bill_request_takes_mobile_field_names() {
        let body = serde_json::json!({
            "customer_id": "0190f0a0-0000-7000-8000-000000000001",
            "bill_date": "2024-03-05T00:00:00.000Z",
            "kgs_distributed": 12.5,
            "kgs_returned": 1,
            "extra_kgs": 0.5,
            "total_amount": 625.0
        });
        let req: CreateBillRequest = serde_json::from_value(body).unwrap();
        assert_eq!(req.quantity, 12.5);
        assert_eq!(req.returned_quantity, 1.0);
        assert_eq!(req.amount, Some(Money::from_cents(62_500)));
        assert_eq!(req.due_date, None);
    }

    #[test]
    fn login_response_is_camel_case() {
        let response = TokenResponse {
            access_token: "a".into(),
            refresh_token: "r".into(),
            token_type: "Bearer".into(),
            expires_in: 3600,
            user_id: Uuid::nil(),
            role: Role::Customer,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["accessToken"], "a");
        assert_eq!(json["refreshToken"], "r");
        assert_eq!(json["role"], "customer");
        assert!(json.get("userId").is_some());
    }

    #[test]
    fn refresh_request_accepts_both_spellings() {
        let camel: RefreshTokenRequest =
            serde_json::from_value(serde_json::json!({"refreshToken": "x"})).unwrap();
        let snake: RefreshTokenRequest =
            serde_json::from_value(serde_json::json!({"refresh_token": "y"})).unwrap();
        assert_eq!(camel.require().unwrap(), "x");
        assert_eq!(snake.require().unwrap(), "y");
        let empty: RefreshTokenRequest = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(empty.require().is_err());
    }
}
