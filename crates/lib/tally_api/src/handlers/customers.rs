//! Customer profile handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use tally_core::models::billing::{Customer, NewCustomer};

use crate::AppState;
use crate::error::AppResult;
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{
    ApiJson, BillListResponse, CreateCustomerRequest, CustomerListResponse, CustomerResponse,
};

/// `POST /admin/customer`: attach a customer profile to a user.
pub async fn create_customer_handler(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<CreateCustomerRequest>,
) -> AppResult<(StatusCode, Json<CustomerResponse>)> {
    let customer = state
        .billing
        .add_customer(NewCustomer {
            user_id: body.user_id,
            name: body.name,
            address: body.address,
            mobile_number: body.mobile_number,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(CustomerResponse { customer })))
}

/// `GET /admin/customers`
pub async fn list_customers_handler(
    State(state): State<AppState>,
) -> AppResult<Json<CustomerListResponse>> {
    let customers = state.billing.customers().await?;
    Ok(Json(CustomerListResponse { customers }))
}

/// `GET /customer/me`
pub async fn my_details_handler(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(principal)): Extension<AuthenticatedUser>,
) -> AppResult<Json<Customer>> {
    let customer = state.billing.customer_for_user(principal.user_id).await?;
    Ok(Json(customer))
}

/// `GET /customer/my-bills`
pub async fn my_bills_handler(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(principal)): Extension<AuthenticatedUser>,
) -> AppResult<Json<BillListResponse>> {
    let bills = state.billing.list_bills(&principal, None).await?;
    Ok(Json(BillListResponse { bills }))
}
