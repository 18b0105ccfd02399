use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Materialized balance for one product at one location.
///
/// `quantity_on_hand` is kept transactionally consistent with the movement
/// ledger: the only writer is the apply-movement primitive, which updates
/// both in the same transaction. The available quantity is derived, never
/// stored. Rows are created lazily on first stock activity and zeroed
/// rather than deleted so movement history stays linkable.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_levels")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub product_id: i64,
    pub location: String,
    pub quantity_on_hand: i64,
    pub quantity_reserved: i64,
    pub reorder_level: i64,
    pub reorder_quantity: i64,
    pub last_stock_take_date: Option<DateTimeWithTimeZone>,
    pub version: i32,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    /// On-hand minus reserved; what may still be newly reserved.
    pub fn available(&self) -> i64 {
        self.quantity_on_hand - self.quantity_reserved
    }

    /// A zero reorder level means replenishment signalling is disabled.
    pub fn is_below_reorder_level(&self) -> bool {
        self.reorder_level > 0 && self.available() <= self.reorder_level
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::product::Entity",
        from = "Column::ProductId",
        to = "super::product::Column::Id"
    )]
    Product,
}

impl Related<super::product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Product.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn level(on_hand: i64, reserved: i64, reorder_level: i64) -> Model {
        Model {
            id: 1,
            product_id: 1,
            location: "MAIN".to_string(),
            quantity_on_hand: on_hand,
            quantity_reserved: reserved,
            reorder_level,
            reorder_quantity: 0,
            last_stock_take_date: None,
            version: 1,
            created_at: Utc::now().into(),
            updated_at: Utc::now().into(),
        }
    }

    #[test]
    fn available_is_on_hand_minus_reserved() {
        assert_eq!(level(100, 20, 0).available(), 80);
        assert_eq!(level(5, 5, 0).available(), 0);
    }

    #[test]
    fn reorder_check_ignores_disabled_threshold() {
        assert!(!level(0, 0, 0).is_below_reorder_level());
        assert!(level(10, 5, 5).is_below_reorder_level());
        assert!(!level(10, 2, 5).is_below_reorder_level());
    }
}
