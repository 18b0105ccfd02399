use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Append-only movement ledger; rows are never updated or deleted.
        // Quantity is always a positive magnitude; direction comes from the type.
        manager
            .create_table(
                Table::create()
                    .table(StockMovements::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(StockMovements::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(StockMovements::ProductId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(StockMovements::Location)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(StockMovements::MovementType)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(StockMovements::Quantity)
                            .big_integer()
                            .not_null()
                            .check(Expr::col(StockMovements::Quantity).gt(0)),
                    )
                    .col(
                        ColumnDef::new(StockMovements::QuantityBefore)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(StockMovements::QuantityAfter)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(StockMovements::ReferenceType)
                            .string_len(32)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(StockMovements::ReferenceNumber)
                            .string_len(64)
                            .null(),
                    )
                    .col(ColumnDef::new(StockMovements::Notes).text().null())
                    .col(ColumnDef::new(StockMovements::CreatedBy).uuid().not_null())
                    .col(
                        ColumnDef::new(StockMovements::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // Balance reconstruction and audit walk for one product x location
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_stock_movements_product_location_created")
                    .table(StockMovements::Table)
                    .col(StockMovements::ProductId)
                    .col(StockMovements::Location)
                    .col(StockMovements::CreatedAt)
                    .to_owned(),
            )
            .await?;

        // Document back-references (GRN number, transfer reference, job number)
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_stock_movements_reference")
                    .table(StockMovements::Table)
                    .col(StockMovements::ReferenceType)
                    .col(StockMovements::ReferenceNumber)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(StockMovements::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum StockMovements {
    Table,
    Id,
    ProductId,
    Location,
    MovementType,
    Quantity,
    QuantityBefore,
    QuantityAfter,
    ReferenceType,
    ReferenceNumber,
    Notes,
    CreatedBy,
    CreatedAt,
}
