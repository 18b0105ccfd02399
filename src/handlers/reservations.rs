use axum::{
    extract::{Json, State},
    response::IntoResponse,
    routing::post,
    Router,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::common::{success_response, validate_input};
use crate::errors::ServiceError;
use crate::handlers::AppState;
use crate::services::stock_reservation::{FulfilStockInput, ReleaseStockInput, ReserveStockInput};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ReserveStockRequest {
    pub product_id: i64,
    #[validate(length(min = 1))]
    pub location: String,
    #[validate(range(min = 1))]
    pub quantity: i64,
    /// Order or picking reference the hold belongs to.
    pub reference_number: Option<String>,
    pub created_by: Uuid,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ReleaseStockRequest {
    pub product_id: i64,
    #[validate(length(min = 1))]
    pub location: String,
    #[validate(range(min = 1))]
    pub quantity: i64,
    pub created_by: Uuid,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct FulfilStockRequest {
    pub product_id: i64,
    #[validate(length(min = 1))]
    pub location: String,
    #[validate(range(min = 1))]
    pub quantity: i64,
    /// Order or shipment reference carried onto the issue movement.
    pub reference_number: Option<String>,
    pub created_by: Uuid,
}

/// Reserve available stock against an order
#[utoipa::path(
    post,
    path = "/api/v1/reservations/reserve",
    request_body = ReserveStockRequest,
    responses(
        (status = 200, description = "Stock reserved", body = crate::ApiResponse<crate::services::stock_reservation::ReservationResult>),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 422, description = "Not enough available stock", body = crate::errors::ErrorResponse)
    ),
    tag = "reservations"
)]
pub async fn reserve_stock(
    State(state): State<AppState>,
    Json(payload): Json<ReserveStockRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;

    let result = state
        .services
        .reservations
        .reserve_stock(ReserveStockInput {
            product_id: payload.product_id,
            location: payload.location,
            quantity: payload.quantity,
            reference_number: payload.reference_number,
            created_by: payload.created_by,
        })
        .await?;

    Ok(success_response(result))
}

/// Release a reservation back to available stock
#[utoipa::path(
    post,
    path = "/api/v1/reservations/release",
    request_body = ReleaseStockRequest,
    responses(
        (status = 200, description = "Reservation released", body = crate::ApiResponse<crate::services::stock_reservation::ReservationResult>),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 404, description = "No stock level for the pair", body = crate::errors::ErrorResponse)
    ),
    tag = "reservations"
)]
pub async fn release_stock(
    State(state): State<AppState>,
    Json(payload): Json<ReleaseStockRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;

    let result = state
        .services
        .reservations
        .release_stock(ReleaseStockInput {
            product_id: payload.product_id,
            location: payload.location,
            quantity: payload.quantity,
            created_by: payload.created_by,
        })
        .await?;

    Ok(success_response(result))
}

/// Ship reserved stock out of the ledger
#[utoipa::path(
    post,
    path = "/api/v1/reservations/fulfil",
    request_body = FulfilStockRequest,
    responses(
        (status = 200, description = "Reservation fulfilled", body = crate::ApiResponse<crate::services::stock_ledger::MovementResult>),
        (status = 400, description = "Fulfilment exceeds the reservation", body = crate::errors::ErrorResponse),
        (status = 404, description = "No stock level for the pair", body = crate::errors::ErrorResponse)
    ),
    tag = "reservations"
)]
pub async fn fulfil_stock(
    State(state): State<AppState>,
    Json(payload): Json<FulfilStockRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;

    let result = state
        .services
        .reservations
        .fulfil_stock(FulfilStockInput {
            product_id: payload.product_id,
            location: payload.location,
            quantity: payload.quantity,
            reference_number: payload.reference_number,
            created_by: payload.created_by,
        })
        .await?;

    Ok(success_response(result))
}

/// Creates the router for reservation endpoints
pub fn reservation_routes() -> Router<AppState> {
    Router::new()
        .route("/reserve", post(reserve_stock))
        .route("/release", post(release_stock))
        .route("/fulfil", post(fulfil_stock))
}
