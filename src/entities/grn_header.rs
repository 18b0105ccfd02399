use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Goods Received Note document states.
///
/// Draft and received are the pre-posting phase: a draft is editable,
/// marking it received freezes the document without touching stock.
/// Posting applies the lines to the ledger and is terminal except for an
/// explicit compensated cancellation.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum GrnStatus {
    Draft,
    Received,
    Posted,
    Cancelled,
}

impl GrnStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrnStatus::Draft => "draft",
            GrnStatus::Received => "received",
            GrnStatus::Posted => "posted",
            GrnStatus::Cancelled => "cancelled",
        }
    }

    /// Header and lines may only change while the document is a draft.
    pub fn is_editable(&self) -> bool {
        matches!(self, GrnStatus::Draft)
    }

    /// Posting is allowed from either pre-posting state, never again after.
    pub fn can_post(&self) -> bool {
        matches!(self, GrnStatus::Draft | GrnStatus::Received)
    }

    pub fn can_mark_received(&self) -> bool {
        matches!(self, GrnStatus::Draft)
    }

    /// Cancellation from draft/received is a pure status change; from
    /// posted it requires the compensating reversal path.
    pub fn can_cancel(&self) -> bool {
        !matches!(self, GrnStatus::Cancelled)
    }

    pub fn can_delete(&self) -> bool {
        matches!(self, GrnStatus::Draft)
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "grn_headers")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub grn_number: String,
    pub vendor_id: i64,
    pub received_date: Date,
    pub location: String,
    pub vendor_invoice_ref: Option<String>,
    pub status: String,
    pub notes: Option<String>,
    pub total_items: i64,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub subtotal: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub gst_amount: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub total_inc_gst: Decimal,
    pub created_by: Uuid,
    pub posted_at: Option<DateTimeWithTimeZone>,
    pub cancelled_at: Option<DateTimeWithTimeZone>,
    pub version: i32,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    pub fn status(&self) -> Option<GrnStatus> {
        self.status.parse().ok()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::grn_line::Entity")]
    GrnLines,
}

impl Related<super::grn_line::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::GrnLines.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
