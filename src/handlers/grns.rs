use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use super::common::{
    created_response, default_limit, default_page, no_content_response, success_response,
    validate_input,
};
use crate::entities::grn_header::GrnStatus;
use crate::errors::ServiceError;
use crate::handlers::AppState;
use crate::services::goods_receipt::{GrnListFilter, NewGrn, NewGrnLine, UpdateGrn};
use crate::PaginatedResponse;

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct GrnLineRequest {
    pub product_id: i64,
    #[validate(range(min = 1))]
    pub quantity_received: i64,
    pub unit_cost: Decimal,
    /// GST rate as a fraction, e.g. 0.10 for 10%.
    pub gst_rate: Decimal,
}

impl From<GrnLineRequest> for NewGrnLine {
    fn from(line: GrnLineRequest) -> Self {
        NewGrnLine {
            product_id: line.product_id,
            quantity_received: line.quantity_received,
            unit_cost: line.unit_cost,
            gst_rate: line.gst_rate,
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateGrnRequest {
    pub vendor_id: i64,
    pub received_date: NaiveDate,
    #[validate(length(min = 1))]
    pub location: String,
    pub vendor_invoice_ref: Option<String>,
    pub notes: Option<String>,
    #[validate(length(min = 1, message = "A GRN needs at least one line"))]
    pub lines: Vec<GrnLineRequest>,
    pub created_by: Uuid,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateGrnRequest {
    pub vendor_id: Option<i64>,
    pub received_date: Option<NaiveDate>,
    #[validate(length(min = 1))]
    pub location: Option<String>,
    pub vendor_invoice_ref: Option<String>,
    pub notes: Option<String>,
    /// Replaces the whole line set when present.
    pub lines: Option<Vec<GrnLineRequest>>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ReceiveGrnRequest {
    pub received_by: Uuid,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct PostGrnRequest {
    pub posted_by: Uuid,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CancelGrnRequest {
    pub reason: Option<String>,
    pub cancelled_by: Uuid,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct DeleteGrnParams {
    pub deleted_by: Uuid,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct GrnListParams {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
    pub status: Option<GrnStatus>,
    pub vendor_id: Option<i64>,
    pub received_from: Option<NaiveDate>,
    pub received_to: Option<NaiveDate>,
}

/// Create a draft goods received note
#[utoipa::path(
    post,
    path = "/api/v1/grns",
    request_body = CreateGrnRequest,
    responses(
        (status = 201, description = "GRN created", body = crate::ApiResponse<serde_json::Value>),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 404, description = "A line references an unknown product", body = crate::errors::ErrorResponse)
    ),
    tag = "grns"
)]
pub async fn create_grn(
    State(state): State<AppState>,
    Json(payload): Json<CreateGrnRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;

    let details = state
        .services
        .receipts
        .create_grn(NewGrn {
            vendor_id: payload.vendor_id,
            received_date: payload.received_date,
            location: payload.location,
            vendor_invoice_ref: payload.vendor_invoice_ref,
            notes: payload.notes,
            lines: payload.lines.into_iter().map(Into::into).collect(),
            created_by: payload.created_by,
        })
        .await?;

    info!(
        grn_id = details.header.id,
        grn_number = %details.header.grn_number,
        "GRN created via API"
    );
    Ok(created_response(details))
}

/// List goods received notes
#[utoipa::path(
    get,
    path = "/api/v1/grns",
    params(GrnListParams),
    responses(
        (status = 200, description = "GRNs returned", body = crate::ApiResponse<serde_json::Value>),
        (status = 400, description = "Invalid pagination", body = crate::errors::ErrorResponse)
    ),
    tag = "grns"
)]
pub async fn list_grns(
    State(state): State<AppState>,
    Query(params): Query<GrnListParams>,
) -> Result<impl IntoResponse, ServiceError> {
    let filter = GrnListFilter {
        status: params.status,
        vendor_id: params.vendor_id,
        received_from: params.received_from,
        received_to: params.received_to,
    };

    let (items, total) = state
        .services
        .receipts
        .list_grns(params.page, params.limit, filter)
        .await?;

    Ok(success_response(PaginatedResponse::new(
        items,
        total,
        params.page,
        params.limit,
    )))
}

/// Get a goods received note with its lines
#[utoipa::path(
    get,
    path = "/api/v1/grns/{id}",
    params(("id" = i64, Path, description = "GRN id")),
    responses(
        (status = 200, description = "GRN returned", body = crate::ApiResponse<serde_json::Value>),
        (status = 404, description = "GRN not found", body = crate::errors::ErrorResponse)
    ),
    tag = "grns"
)]
pub async fn get_grn(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ServiceError> {
    let details = state.services.receipts.get_grn(id).await?;
    Ok(success_response(details))
}

/// Update a draft goods received note
#[utoipa::path(
    put,
    path = "/api/v1/grns/{id}",
    params(("id" = i64, Path, description = "GRN id")),
    request_body = UpdateGrnRequest,
    responses(
        (status = 200, description = "GRN updated", body = crate::ApiResponse<serde_json::Value>),
        (status = 404, description = "GRN not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "GRN is no longer editable", body = crate::errors::ErrorResponse)
    ),
    tag = "grns"
)]
pub async fn update_grn(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateGrnRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;

    let details = state
        .services
        .receipts
        .update_grn(
            id,
            UpdateGrn {
                vendor_id: payload.vendor_id,
                received_date: payload.received_date,
                location: payload.location,
                vendor_invoice_ref: payload.vendor_invoice_ref,
                notes: payload.notes,
                lines: payload
                    .lines
                    .map(|lines| lines.into_iter().map(Into::into).collect()),
            },
        )
        .await?;

    Ok(success_response(details))
}

/// Delete a draft goods received note
#[utoipa::path(
    delete,
    path = "/api/v1/grns/{id}",
    params(("id" = i64, Path, description = "GRN id"), DeleteGrnParams),
    responses(
        (status = 204, description = "GRN deleted"),
        (status = 404, description = "GRN not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "GRN is not a draft", body = crate::errors::ErrorResponse)
    ),
    tag = "grns"
)]
pub async fn delete_grn(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(params): Query<DeleteGrnParams>,
) -> Result<impl IntoResponse, ServiceError> {
    state
        .services
        .receipts
        .delete_grn(id, params.deleted_by)
        .await?;
    Ok(no_content_response())
}

/// Mark a goods received note as physically received
#[utoipa::path(
    post,
    path = "/api/v1/grns/{id}/receive",
    params(("id" = i64, Path, description = "GRN id")),
    request_body = ReceiveGrnRequest,
    responses(
        (status = 200, description = "GRN marked received", body = crate::ApiResponse<serde_json::Value>),
        (status = 404, description = "GRN not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "GRN cannot be marked received", body = crate::errors::ErrorResponse)
    ),
    tag = "grns"
)]
pub async fn mark_grn_received(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<ReceiveGrnRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;

    let header = state
        .services
        .receipts
        .mark_received(id, payload.received_by)
        .await?;
    Ok(success_response(header))
}

/// Post a goods received note to the stock ledger
#[utoipa::path(
    post,
    path = "/api/v1/grns/{id}/post",
    params(("id" = i64, Path, description = "GRN id")),
    request_body = PostGrnRequest,
    responses(
        (status = 200, description = "GRN posted", body = crate::ApiResponse<serde_json::Value>),
        (status = 404, description = "GRN not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "GRN cannot be posted", body = crate::errors::ErrorResponse)
    ),
    tag = "grns"
)]
pub async fn post_grn(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<PostGrnRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;

    let result = state
        .services
        .receipts
        .post_grn(id, payload.posted_by)
        .await?;

    info!(
        grn_id = result.header.id,
        grn_number = %result.header.grn_number,
        movements = result.movements.len(),
        "GRN posted via API"
    );
    Ok(success_response(result))
}

/// Cancel a goods received note, reversing its stock if posted
#[utoipa::path(
    post,
    path = "/api/v1/grns/{id}/cancel",
    params(("id" = i64, Path, description = "GRN id")),
    request_body = CancelGrnRequest,
    responses(
        (status = 200, description = "GRN cancelled", body = crate::ApiResponse<serde_json::Value>),
        (status = 404, description = "GRN not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "GRN is already cancelled", body = crate::errors::ErrorResponse),
        (status = 422, description = "Received stock is already reserved", body = crate::errors::ErrorResponse)
    ),
    tag = "grns"
)]
pub async fn cancel_grn(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<CancelGrnRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;

    let result = state
        .services
        .receipts
        .cancel_grn(id, payload.reason, payload.cancelled_by)
        .await?;

    info!(
        grn_id = result.header.id,
        grn_number = %result.header.grn_number,
        was_posted = result.was_posted,
        "GRN cancelled via API"
    );
    Ok(success_response(result))
}

/// Creates the router for GRN endpoints
pub fn grn_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_grn).get(list_grns))
        .route("/:id", get(get_grn).put(update_grn).delete(delete_grn))
        .route("/:id/receive", post(mark_grn_received))
        .route("/:id/post", post(post_grn))
        .route("/:id/cancel", post(cancel_grn))
}
