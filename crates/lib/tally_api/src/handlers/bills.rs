//! Bill and report handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::Utc;
use tally_core::billing::engine::BillRequest;
use tally_core::models::billing::BillPatch;
use uuid::Uuid;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{
    ApiJson, ApiPath, ApiQuery, BillListQuery, BillListResponse, BillResponse, CreateBillRequest,
    MessageResponse, RecentQuery, ReportQuery, ReportResponse, TransactionsResponse,
    UpdateBillRequest, WeeklySalesQuery, WeeklySalesResponse,
};

const DEFAULT_RECENT_LIMIT: i64 = 10;
const MAX_RECENT_LIMIT: i64 = 100;

/// `POST /admin/bills`: price the bill and raise the customer's balance.
pub async fn create_bill_handler(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<CreateBillRequest>,
) -> AppResult<(StatusCode, Json<BillResponse>)> {
    let bill = state
        .billing
        .create_bill(BillRequest {
            customer_id: body.customer_id,
            bill_date: body.bill_date,
            quantity: body.quantity,
            returned_quantity: body.returned_quantity,
            extra_quantity: body.extra_quantity,
            amount: body.amount,
            description: body.description,
            due_date: body.due_date,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(BillResponse { bill })))
}

/// `GET /admin/bills?customer_id=`
pub async fn list_bills_handler(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(principal)): Extension<AuthenticatedUser>,
    ApiQuery(query): ApiQuery<BillListQuery>,
) -> AppResult<Json<BillListResponse>> {
    let bills = state
        .billing
        .list_bills(&principal, query.customer_id)
        .await?;
    Ok(Json(BillListResponse { bills }))
}

/// `PUT /admin/bills/{id}`
pub async fn update_bill_handler(
    State(state): State<AppState>,
    ApiPath(bill_id): ApiPath<Uuid>,
    ApiJson(body): ApiJson<UpdateBillRequest>,
) -> AppResult<Json<BillResponse>> {
    let bill = state
        .billing
        .update_bill(
            bill_id,
            BillPatch {
                description: body.description,
                amount: body.amount,
                status: body.status,
                due_date: body.due_date,
            },
        )
        .await?;
    Ok(Json(BillResponse { bill }))
}

/// `DELETE /admin/bills/{id}`
pub async fn delete_bill_handler(
    State(state): State<AppState>,
    ApiPath(bill_id): ApiPath<Uuid>,
) -> AppResult<Json<MessageResponse>> {
    state.billing.delete_bill(bill_id).await?;
    Ok(Json(MessageResponse::new("Bill deleted successfully")))
}

/// `GET /admin/reports/bills?start_date=&end_date=&customer_id=`
pub async fn bills_report_handler(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ReportQuery>,
) -> AppResult<Json<ReportResponse>> {
    let (Some(start), Some(end)) = (query.start_date, query.end_date) else {
        return Err(AppError::Validation(
            "start_date and end_date are required".into(),
        ));
    };
    let report = state.billing.report(start, end, query.customer_id).await?;
    Ok(Json(ReportResponse { report }))
}

/// `GET /admin/last-transactions?limit=`
pub async fn last_transactions_handler(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<RecentQuery>,
) -> AppResult<Json<TransactionsResponse>> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_RECENT_LIMIT)
        .clamp(1, MAX_RECENT_LIMIT);
    let transactions = state.billing.recent_bills(limit).await?;
    Ok(Json(TransactionsResponse { transactions }))
}

/// `GET /admin/weekly-sales?end_date=`: daily totals for the last seven days.
pub async fn weekly_sales_handler(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<WeeklySalesQuery>,
) -> AppResult<Json<WeeklySalesResponse>> {
    let end = query.end_date.unwrap_or_else(|| Utc::now().date_naive());
    let weekly_sales = state.billing.weekly_sales(end).await?;
    Ok(Json(WeeklySalesResponse { weekly_sales }))
}
