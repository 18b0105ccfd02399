pub use sea_orm_migration::prelude::*;

mod m20250601_000001_create_products_table;
mod m20250601_000002_create_stock_levels_table;
mod m20250601_000003_create_stock_movements_table;
mod m20250601_000004_create_grn_tables;
mod m20250601_000005_add_ledger_indexes;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250601_000001_create_products_table::Migration),
            Box::new(m20250601_000002_create_stock_levels_table::Migration),
            Box::new(m20250601_000003_create_stock_movements_table::Migration),
            Box::new(m20250601_000004_create_grn_tables::Migration),
            Box::new(m20250601_000005_add_ledger_indexes::Migration),
        ]
    }
}
