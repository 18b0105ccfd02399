use axum::{
    extract::{Json, Query, State},
    response::IntoResponse,
    routing::post,
    Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use super::common::{created_response, default_limit, default_page, success_response, validate_input};
use crate::entities::stock_movement::MovementType;
use crate::errors::ServiceError;
use crate::handlers::AppState;
use crate::services::stock_ledger::NewMovement;
use crate::services::stock_queries::MovementHistoryFilter;
use crate::PaginatedResponse;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RecordMovementRequest {
    pub product_id: i64,
    #[validate(length(min = 1))]
    pub location: String,
    pub movement_type: MovementType,
    /// Positive magnitude; the movement type decides direction.
    #[validate(range(min = 1))]
    pub quantity: i64,
    pub reference_type: Option<String>,
    pub reference_number: Option<String>,
    pub notes: Option<String>,
    pub created_by: Uuid,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct MovementHistoryParams {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
    pub product_id: Option<i64>,
    pub location: Option<String>,
    pub movement_type: Option<MovementType>,
    pub reference_number: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// Record a movement directly against the ledger
#[utoipa::path(
    post,
    path = "/api/v1/movements",
    request_body = RecordMovementRequest,
    responses(
        (status = 201, description = "Movement recorded", body = crate::ApiResponse<crate::services::stock_ledger::MovementResult>),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 422, description = "Issue would cut into reserved stock", body = crate::errors::ErrorResponse)
    ),
    tag = "movements"
)]
pub async fn record_movement(
    State(state): State<AppState>,
    Json(payload): Json<RecordMovementRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;

    let result = state
        .services
        .ledger
        .record_direct_movement(NewMovement {
            product_id: payload.product_id,
            location: payload.location,
            movement_type: payload.movement_type,
            quantity: payload.quantity,
            reference_type: payload.reference_type,
            reference_number: payload.reference_number,
            notes: payload.notes,
            created_by: payload.created_by,
        })
        .await?;

    Ok(created_response(result))
}

/// List movement history with optional filters
#[utoipa::path(
    get,
    path = "/api/v1/movements",
    params(MovementHistoryParams),
    responses(
        (status = 200, description = "Movement history returned", body = crate::ApiResponse<serde_json::Value>),
        (status = 400, description = "Invalid pagination", body = crate::errors::ErrorResponse)
    ),
    tag = "movements"
)]
pub async fn list_movements(
    State(state): State<AppState>,
    Query(params): Query<MovementHistoryParams>,
) -> Result<impl IntoResponse, ServiceError> {
    let filter = MovementHistoryFilter {
        product_id: params.product_id,
        location: params.location,
        movement_type: params.movement_type,
        reference_number: params.reference_number,
        from: params.from.map(Into::into),
        to: params.to.map(Into::into),
    };

    let (items, total) = state
        .services
        .queries
        .movement_history(params.page, params.limit, filter)
        .await?;

    Ok(success_response(PaginatedResponse::new(
        items,
        total,
        params.page,
        params.limit,
    )))
}

/// Creates the router for movement endpoints
pub fn movement_routes() -> Router<AppState> {
    Router::new().route("/", post(record_movement).get(list_movements))
}
