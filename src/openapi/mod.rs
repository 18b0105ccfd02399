use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Stock Ledger API",
        version = "1.0.0",
        description = r#"
# Stock Ledger API

An inventory stock ledger built around an append-only movement journal. Every
change to on-hand stock is a movement row; balances are maintained alongside
and always reconcile with the journal.

## Features

- **Movement Ledger**: Append-only journal of every stock change
- **Stock Adjustments**: Audited manual corrections, stock takes, and customer returns
- **Goods Receipts**: GRN workflow from draft through posting to cancellation
- **Reservations**: Hold available stock against orders and fulfil or release it
- **Transfers**: Two-legged moves between locations under one reference
- **Replenishment**: Reorder levels with low-stock and out-of-stock reporting

## Error Handling

The API uses consistent error response formats with appropriate HTTP status codes:

```json
{
  "error": "Unprocessable Entity",
  "message": "Insufficient available stock for product 42 at MAIN: requested 10, available 4",
  "timestamp": "2025-01-01T00:00:00Z"
}
```

## Pagination

List endpoints support pagination with the following query parameters:
- `page`: Page number (default: 1)
- `limit`: Items per page (default: 20, max: 1000)
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "stock", description = "Stock levels, adjustments, transfers, and replenishment"),
        (name = "movements", description = "Movement journal endpoints"),
        (name = "reservations", description = "Stock reservation endpoints"),
        (name = "grns", description = "Goods received note endpoints")
    ),
    paths(
        // Stock levels
        crate::handlers::stock_levels::list_stock_levels,
        crate::handlers::stock_levels::get_stock_level,
        crate::handlers::stock_levels::low_stock,
        crate::handlers::stock_levels::out_of_stock,
        crate::handlers::stock_levels::adjust_stock,
        crate::handlers::stock_levels::record_stock_take,
        crate::handlers::stock_levels::record_return,
        crate::handlers::stock_levels::transfer_stock,
        crate::handlers::stock_levels::set_reorder_levels,

        // Movements
        crate::handlers::movements::record_movement,
        crate::handlers::movements::list_movements,

        // Reservations
        crate::handlers::reservations::reserve_stock,
        crate::handlers::reservations::release_stock,
        crate::handlers::reservations::fulfil_stock,

        // GRNs
        crate::handlers::grns::create_grn,
        crate::handlers::grns::list_grns,
        crate::handlers::grns::get_grn,
        crate::handlers::grns::update_grn,
        crate::handlers::grns::delete_grn,
        crate::handlers::grns::mark_grn_received,
        crate::handlers::grns::post_grn,
        crate::handlers::grns::cancel_grn,
    ),
    components(
        schemas(
            // Common types
            crate::ApiResponse<serde_json::Value>,
            crate::PaginatedResponse<serde_json::Value>,

            // Stock types
            crate::handlers::stock_levels::AdjustStockRequest,
            crate::handlers::stock_levels::StockTakeRequest,
            crate::handlers::stock_levels::RecordReturnRequest,
            crate::handlers::stock_levels::TransferStockRequest,
            crate::handlers::stock_levels::ReorderLevelRequest,
            crate::services::stock_queries::StockLevelView,
            crate::services::stock_ledger::MovementResult,
            crate::services::stock_adjustment::StockTakeResult,
            crate::services::stock_transfer::TransferResult,

            // Movement types
            crate::handlers::movements::RecordMovementRequest,
            crate::entities::stock_movement::MovementType,

            // Reservation types
            crate::handlers::reservations::ReserveStockRequest,
            crate::handlers::reservations::ReleaseStockRequest,
            crate::handlers::reservations::FulfilStockRequest,
            crate::services::stock_reservation::ReservationResult,

            // GRN types
            crate::handlers::grns::CreateGrnRequest,
            crate::handlers::grns::UpdateGrnRequest,
            crate::handlers::grns::GrnLineRequest,
            crate::handlers::grns::ReceiveGrnRequest,
            crate::handlers::grns::PostGrnRequest,
            crate::handlers::grns::CancelGrnRequest,
            crate::entities::grn_header::GrnStatus,

            // Error types
            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDocV1;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}
