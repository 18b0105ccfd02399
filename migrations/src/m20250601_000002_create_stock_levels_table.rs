use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // One row per product x location; created lazily, never hard-deleted.
        // Available quantity is derived (on_hand - reserved), not a column.
        manager
            .create_table(
                Table::create()
                    .table(StockLevels::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(StockLevels::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(StockLevels::ProductId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(StockLevels::Location)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(StockLevels::QuantityOnHand)
                            .big_integer()
                            .not_null()
                            .default(0)
                            .check(Expr::col(StockLevels::QuantityOnHand).gte(0)),
                    )
                    .col(
                        ColumnDef::new(StockLevels::QuantityReserved)
                            .big_integer()
                            .not_null()
                            .default(0)
                            .check(Expr::col(StockLevels::QuantityReserved).gte(0)),
                    )
                    .col(
                        ColumnDef::new(StockLevels::ReorderLevel)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(StockLevels::ReorderQuantity)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(StockLevels::LastStockTakeDate)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(StockLevels::Version)
                            .integer()
                            .not_null()
                            .default(1),
                    )
                    .col(
                        ColumnDef::new(StockLevels::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(StockLevels::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // The (product, location) pair is the aggregate key
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_stock_levels_product_location")
                    .table(StockLevels::Table)
                    .col(StockLevels::ProductId)
                    .col(StockLevels::Location)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(StockLevels::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum StockLevels {
    Table,
    Id,
    ProductId,
    Location,
    QuantityOnHand,
    QuantityReserved,
    ReorderLevel,
    ReorderQuantity,
    LastStockTakeDate,
    Version,
    CreatedAt,
    UpdatedAt,
}
