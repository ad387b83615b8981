//! Price administration handlers.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;

use crate::AppState;
use crate::error::AppResult;
use crate::models::{ApiJson, CreatePriceRequest, PriceListResponse, PriceResponse};

/// `GET /admin/prices`: newest effective date first.
pub async fn list_prices_handler(
    State(state): State<AppState>,
) -> AppResult<Json<PriceListResponse>> {
    let prices = state.billing.prices().list_prices().await?;
    Ok(Json(PriceListResponse { prices }))
}

/// `POST /admin/prices`
pub async fn create_price_handler(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<CreatePriceRequest>,
) -> AppResult<(StatusCode, Json<PriceResponse>)> {
    let price = state
        .billing
        .prices()
        .add_price(body.effective_date, body.price_per_unit)
        .await?;
    Ok((StatusCode::CREATED, Json(PriceResponse { price })))
}
