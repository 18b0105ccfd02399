use async_trait::async_trait;
use chrono::Utc;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// The typed, signed vocabulary of the ledger. Quantities are stored as
/// positive magnitudes; the type alone decides the sign of the effect on
/// the on-hand balance.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MovementType {
    Receipt,
    AdjustmentIncrease,
    TransferIn,
    Return,
    Issue,
    AdjustmentDecrease,
    TransferOut,
}

impl MovementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::Receipt => "receipt",
            MovementType::AdjustmentIncrease => "adjustment_increase",
            MovementType::TransferIn => "transfer_in",
            MovementType::Return => "return",
            MovementType::Issue => "issue",
            MovementType::AdjustmentDecrease => "adjustment_decrease",
            MovementType::TransferOut => "transfer_out",
        }
    }

    /// +1 for movements that add to on-hand stock, -1 for movements that
    /// take from it.
    pub fn direction(&self) -> i64 {
        match self {
            MovementType::Receipt
            | MovementType::AdjustmentIncrease
            | MovementType::TransferIn
            | MovementType::Return => 1,
            MovementType::Issue
            | MovementType::AdjustmentDecrease
            | MovementType::TransferOut => -1,
        }
    }

    pub fn is_inbound(&self) -> bool {
        self.direction() > 0
    }

    /// Signed contribution of a stored movement row to the balance.
    pub fn signed_quantity(&self, quantity: i64) -> i64 {
        self.direction() * quantity
    }
}

/// One immutable ledger entry. There is no update or delete path for this
/// entity anywhere in the crate; corrections are new reversing movements.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_movements")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub product_id: i64,
    pub location: String,
    pub movement_type: String,
    pub quantity: i64,
    pub quantity_before: i64,
    pub quantity_after: i64,
    pub reference_type: Option<String>,
    pub reference_number: Option<String>,
    pub notes: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTimeWithTimeZone,
}

impl Model {
    pub fn movement_type(&self) -> Option<MovementType> {
        self.movement_type.parse().ok()
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

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C: ConnectionTrait>(self, _db: &C, _insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;
        if let ActiveValue::NotSet = active_model.created_at {
            active_model.created_at = Set(Utc::now().into());
        }
        Ok(active_model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use strum::IntoEnumIterator;

    #[rstest]
    #[case(MovementType::Receipt, 1)]
    #[case(MovementType::AdjustmentIncrease, 1)]
    #[case(MovementType::TransferIn, 1)]
    #[case(MovementType::Return, 1)]
    #[case(MovementType::Issue, -1)]
    #[case(MovementType::AdjustmentDecrease, -1)]
    #[case(MovementType::TransferOut, -1)]
    fn direction_per_type(#[case] movement_type: MovementType, #[case] expected: i64) {
        assert_eq!(movement_type.direction(), expected);
        assert_eq!(movement_type.signed_quantity(10), expected * 10);
    }

    #[test]
    fn storage_string_round_trips() {
        for movement_type in MovementType::iter() {
            let stored = movement_type.as_str();
            assert_eq!(stored.parse::<MovementType>().ok(), Some(movement_type));
            assert_eq!(movement_type.to_string(), stored);
        }
    }
}
