use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Goods Received Note header: status machine draft -> received -> posted,
        // with cancellation from any pre-posted state and compensated reversal
        // from posted. Totals are recomputed from lines, never client-supplied.
        manager
            .create_table(
                Table::create()
                    .table(GrnHeaders::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(GrnHeaders::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(GrnHeaders::GrnNumber)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(ColumnDef::new(GrnHeaders::VendorId).big_integer().not_null())
                    .col(ColumnDef::new(GrnHeaders::ReceivedDate).date().not_null())
                    .col(
                        ColumnDef::new(GrnHeaders::Location)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(GrnHeaders::VendorInvoiceRef)
                            .string_len(64)
                            .null(),
                    )
                    .col(ColumnDef::new(GrnHeaders::Status).string_len(16).not_null())
                    .col(ColumnDef::new(GrnHeaders::Notes).text().null())
                    .col(
                        ColumnDef::new(GrnHeaders::TotalItems)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(GrnHeaders::Subtotal)
                            .decimal_len(16, 4)
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(GrnHeaders::GstAmount)
                            .decimal_len(16, 4)
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(GrnHeaders::TotalIncGst)
                            .decimal_len(16, 4)
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(GrnHeaders::CreatedBy).uuid().not_null())
                    .col(
                        ColumnDef::new(GrnHeaders::PostedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(GrnHeaders::CancelledAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(GrnHeaders::Version)
                            .integer()
                            .not_null()
                            .default(1),
                    )
                    .col(
                        ColumnDef::new(GrnHeaders::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(GrnHeaders::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // grn_number allocation races surface through this as retryable conflicts
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_grn_headers_grn_number")
                    .table(GrnHeaders::Table)
                    .col(GrnHeaders::GrnNumber)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(GrnLines::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(GrnLines::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(GrnLines::GrnId).big_integer().not_null())
                    .col(ColumnDef::new(GrnLines::LineNumber).integer().not_null())
                    .col(ColumnDef::new(GrnLines::ProductId).big_integer().not_null())
                    .col(
                        ColumnDef::new(GrnLines::QuantityReceived)
                            .big_integer()
                            .not_null()
                            .check(Expr::col(GrnLines::QuantityReceived).gt(0)),
                    )
                    .col(ColumnDef::new(GrnLines::Unit).string_len(16).not_null())
                    .col(
                        ColumnDef::new(GrnLines::UnitCost)
                            .decimal_len(16, 4)
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(GrnLines::GstRate)
                            .decimal_len(6, 4)
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(GrnLines::LineTotal)
                            .decimal_len(16, 4)
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(GrnLines::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_grn_lines_grn_line_number")
                    .table(GrnLines::Table)
                    .col(GrnLines::GrnId)
                    .col(GrnLines::LineNumber)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(GrnLines::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(GrnHeaders::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum GrnHeaders {
    Table,
    Id,
    GrnNumber,
    VendorId,
    ReceivedDate,
    Location,
    VendorInvoiceRef,
    Status,
    Notes,
    TotalItems,
    Subtotal,
    GstAmount,
    TotalIncGst,
    CreatedBy,
    PostedAt,
    CancelledAt,
    Version,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum GrnLines {
    Table,
    Id,
    GrnId,
    LineNumber,
    ProductId,
    QuantityReceived,
    Unit,
    UnitCost,
    GstRate,
    LineTotal,
    CreatedAt,
}
