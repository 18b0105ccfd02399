use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Location-scoped stock queries (low stock, out of stock per warehouse)
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_stock_levels_location")
                    .table(StockLevels::Table)
                    .col(StockLevels::Location)
                    .to_owned(),
            )
            .await?;

        // Movement history filtered by type
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_stock_movements_type")
                    .table(StockMovements::Table)
                    .col(StockMovements::MovementType)
                    .to_owned(),
            )
            .await?;

        // GRN listings by status and date range
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_grn_headers_status_received_date")
                    .table(GrnHeaders::Table)
                    .col(GrnHeaders::Status)
                    .col(GrnHeaders::ReceivedDate)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_grn_headers_vendor_id")
                    .table(GrnHeaders::Table)
                    .col(GrnHeaders::VendorId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_grn_lines_product_id")
                    .table(GrnLines::Table)
                    .col(GrnLines::ProductId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_grn_lines_product_id")
                    .table(GrnLines::Table)
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("idx_grn_headers_vendor_id")
                    .table(GrnHeaders::Table)
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("idx_grn_headers_status_received_date")
                    .table(GrnHeaders::Table)
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("idx_stock_movements_type")
                    .table(StockMovements::Table)
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("idx_stock_levels_location")
                    .table(StockLevels::Table)
                    .to_owned(),
            )
            .await
    }
}

#[derive(DeriveIden)]
enum StockLevels {
    Table,
    Location,
}

#[derive(DeriveIden)]
enum StockMovements {
    Table,
    MovementType,
}

#[derive(DeriveIden)]
enum GrnHeaders {
    Table,
    Status,
    ReceivedDate,
    VendorId,
}

#[derive(DeriveIden)]
enum GrnLines {
    Table,
    ProductId,
}
