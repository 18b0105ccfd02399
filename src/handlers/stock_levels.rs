use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::{get, post, put},
    Router,
};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use super::common::{default_limit, default_page, success_response, validate_input};
use crate::errors::ServiceError;
use crate::handlers::AppState;
use crate::services::stock_adjustment::{
    AdjustStockInput, RecordReturnInput, ReorderLevelInput, StockTakeInput,
};
use crate::services::stock_transfer::TransferStockInput;
use crate::PaginatedResponse;

// Request and response DTOs

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AdjustStockRequest {
    pub product_id: i64,
    #[validate(length(min = 1))]
    pub location: String,
    /// Positive increases on-hand stock, negative decreases it.
    pub quantity_change: i64,
    #[validate(length(min = 1, message = "Reason is required for audit"))]
    pub reason: String,
    pub created_by: Uuid,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct StockTakeRequest {
    pub product_id: i64,
    #[validate(length(min = 1))]
    pub location: String,
    #[validate(range(min = 0))]
    pub counted_quantity: i64,
    pub notes: Option<String>,
    pub created_by: Uuid,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RecordReturnRequest {
    pub product_id: i64,
    #[validate(length(min = 1))]
    pub location: String,
    #[validate(range(min = 1))]
    pub quantity: i64,
    /// RMA or credit-note number, when one exists.
    pub reference_number: Option<String>,
    pub notes: Option<String>,
    pub created_by: Uuid,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct TransferStockRequest {
    pub product_id: i64,
    #[validate(length(min = 1))]
    pub from_location: String,
    #[validate(length(min = 1))]
    pub to_location: String,
    #[validate(range(min = 1))]
    pub quantity: i64,
    pub notes: Option<String>,
    pub created_by: Uuid,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ReorderLevelRequest {
    pub product_id: i64,
    #[validate(length(min = 1))]
    pub location: String,
    #[validate(range(min = 0))]
    pub reorder_level: i64,
    #[validate(range(min = 0))]
    pub reorder_quantity: i64,
    pub updated_by: Uuid,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct StockLevelFilters {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
    pub location: Option<String>,
    pub product_id: Option<i64>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct LocationFilter {
    pub location: Option<String>,
}

// Handler functions

/// List stock levels with optional filters
#[utoipa::path(
    get,
    path = "/api/v1/stock",
    params(StockLevelFilters),
    responses(
        (status = 200, description = "Stock levels returned", body = crate::ApiResponse<serde_json::Value>),
        (status = 400, description = "Invalid pagination", body = crate::errors::ErrorResponse)
    ),
    tag = "stock"
)]
pub async fn list_stock_levels(
    State(state): State<AppState>,
    Query(filters): Query<StockLevelFilters>,
) -> Result<impl IntoResponse, ServiceError> {
    let (items, total) = state
        .services
        .queries
        .list_stock_levels(filters.page, filters.limit, filters.location, filters.product_id)
        .await?;

    Ok(success_response(PaginatedResponse::new(
        items,
        total,
        filters.page,
        filters.limit,
    )))
}

/// Get the stock level for one product at one location
#[utoipa::path(
    get,
    path = "/api/v1/stock/{product_id}/{location}",
    params(
        ("product_id" = i64, Path, description = "Product id"),
        ("location" = String, Path, description = "Location code")
    ),
    responses(
        (status = 200, description = "Stock level returned", body = crate::ApiResponse<crate::services::stock_queries::StockLevelView>),
        (status = 404, description = "Product or stock level not found", body = crate::errors::ErrorResponse)
    ),
    tag = "stock"
)]
pub async fn get_stock_level(
    State(state): State<AppState>,
    Path((product_id, location)): Path<(i64, String)>,
) -> Result<impl IntoResponse, ServiceError> {
    let view = state
        .services
        .queries
        .get_stock_level(product_id, &location)
        .await?;

    Ok(success_response(view))
}

/// List rows at or below their reorder level
#[utoipa::path(
    get,
    path = "/api/v1/stock/low",
    params(LocationFilter),
    responses(
        (status = 200, description = "Low stock rows returned", body = crate::ApiResponse<Vec<crate::services::stock_queries::StockLevelView>>)
    ),
    tag = "stock"
)]
pub async fn low_stock(
    State(state): State<AppState>,
    Query(filter): Query<LocationFilter>,
) -> Result<impl IntoResponse, ServiceError> {
    let rows = state.services.queries.low_stock(filter.location).await?;
    Ok(success_response(rows))
}

/// List rows with no available stock
#[utoipa::path(
    get,
    path = "/api/v1/stock/out-of-stock",
    params(LocationFilter),
    responses(
        (status = 200, description = "Out of stock rows returned", body = crate::ApiResponse<Vec<crate::services::stock_queries::StockLevelView>>)
    ),
    tag = "stock"
)]
pub async fn out_of_stock(
    State(state): State<AppState>,
    Query(filter): Query<LocationFilter>,
) -> Result<impl IntoResponse, ServiceError> {
    let rows = state.services.queries.out_of_stock(filter.location).await?;
    Ok(success_response(rows))
}

/// Apply a manual stock adjustment
#[utoipa::path(
    post,
    path = "/api/v1/stock/adjust",
    request_body = AdjustStockRequest,
    responses(
        (status = 200, description = "Adjustment applied", body = crate::ApiResponse<crate::services::stock_ledger::MovementResult>),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 422, description = "Decrease would cut into reserved stock", body = crate::errors::ErrorResponse)
    ),
    tag = "stock"
)]
pub async fn adjust_stock(
    State(state): State<AppState>,
    Json(payload): Json<AdjustStockRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;

    let result = state
        .services
        .adjustments
        .adjust_stock(AdjustStockInput {
            product_id: payload.product_id,
            location: payload.location,
            quantity_change: payload.quantity_change,
            reason: payload.reason,
            created_by: payload.created_by,
        })
        .await?;

    Ok(success_response(result))
}

/// Record a physical stock count
#[utoipa::path(
    post,
    path = "/api/v1/stock/stock-take",
    request_body = StockTakeRequest,
    responses(
        (status = 200, description = "Stock take recorded", body = crate::ApiResponse<crate::services::stock_adjustment::StockTakeResult>),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 422, description = "Count would cut into reserved stock", body = crate::errors::ErrorResponse)
    ),
    tag = "stock"
)]
pub async fn record_stock_take(
    State(state): State<AppState>,
    Json(payload): Json<StockTakeRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;

    let result = state
        .services
        .adjustments
        .record_stock_take(StockTakeInput {
            product_id: payload.product_id,
            location: payload.location,
            counted_quantity: payload.counted_quantity,
            notes: payload.notes,
            created_by: payload.created_by,
        })
        .await?;

    Ok(success_response(result))
}

/// Record a customer return back into stock
#[utoipa::path(
    post,
    path = "/api/v1/stock/return",
    request_body = RecordReturnRequest,
    responses(
        (status = 200, description = "Return recorded", body = crate::ApiResponse<crate::services::stock_ledger::MovementResult>),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse)
    ),
    tag = "stock"
)]
pub async fn record_return(
    State(state): State<AppState>,
    Json(payload): Json<RecordReturnRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;

    let result = state
        .services
        .adjustments
        .record_return(RecordReturnInput {
            product_id: payload.product_id,
            location: payload.location,
            quantity: payload.quantity,
            reference_number: payload.reference_number,
            notes: payload.notes,
            created_by: payload.created_by,
        })
        .await?;

    Ok(success_response(result))
}

/// Move stock between locations
#[utoipa::path(
    post,
    path = "/api/v1/stock/transfer",
    request_body = TransferStockRequest,
    responses(
        (status = 200, description = "Transfer completed", body = crate::ApiResponse<crate::services::stock_transfer::TransferResult>),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 422, description = "Source lacks unreserved stock", body = crate::errors::ErrorResponse)
    ),
    tag = "stock"
)]
pub async fn transfer_stock(
    State(state): State<AppState>,
    Json(payload): Json<TransferStockRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;

    let result = state
        .services
        .transfers
        .transfer_stock(TransferStockInput {
            product_id: payload.product_id,
            from_location: payload.from_location,
            to_location: payload.to_location,
            quantity: payload.quantity,
            notes: payload.notes,
            created_by: payload.created_by,
        })
        .await?;

    Ok(success_response(result))
}

/// Set the replenishment policy for a product-location pair
#[utoipa::path(
    put,
    path = "/api/v1/stock/reorder-levels",
    request_body = ReorderLevelRequest,
    responses(
        (status = 200, description = "Reorder levels updated", body = crate::ApiResponse<serde_json::Value>),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse)
    ),
    tag = "stock"
)]
pub async fn set_reorder_levels(
    State(state): State<AppState>,
    Json(payload): Json<ReorderLevelRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;

    let updated = state
        .services
        .adjustments
        .set_reorder_levels(ReorderLevelInput {
            product_id: payload.product_id,
            location: payload.location,
            reorder_level: payload.reorder_level,
            reorder_quantity: payload.reorder_quantity,
            updated_by: payload.updated_by,
        })
        .await?;

    Ok(success_response(updated))
}

/// Creates the router for stock level endpoints
pub fn stock_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_stock_levels))
        .route("/low", get(low_stock))
        .route("/out-of-stock", get(out_of_stock))
        .route("/adjust", post(adjust_stock))
        .route("/stock-take", post(record_stock_take))
        .route("/return", post(record_return))
        .route("/transfer", post(transfer_stock))
        .route("/reorder-levels", put(set_reorder_levels))
        .route("/:product_id/:location", get(get_stock_level))
}
