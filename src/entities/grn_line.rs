use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A single product receipt on a GRN. Line totals are computed at write
/// time and never re-derived; the header totals are the sum of its lines.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "grn_lines")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub grn_id: i64,
    pub line_number: i32,
    pub product_id: i64,
    pub quantity_received: i64,
    pub unit: String,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub unit_cost: Decimal,
    #[sea_orm(column_type = "Decimal(Some((6, 4)))")]
    pub gst_rate: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub line_total: Decimal,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::grn_header::Entity",
        from = "Column::GrnId",
        to = "super::grn_header::Column::Id"
    )]
    GrnHeader,
    #[sea_orm(
        belongs_to = "super::product::Entity",
        from = "Column::ProductId",
        to = "super::product::Column::Id"
    )]
    Product,
}

impl Related<super::grn_header::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::GrnHeader.def()
    }
}

impl Related<super::product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Product.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
