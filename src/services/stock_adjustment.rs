//! Manual corrections to the ledger: ad-hoc adjustments, stock-take
//! reconciliation, customer returns, and the reorder policy on a row.

use std::sync::Arc;

use chrono::Utc;
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set, TransactionTrait};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::stock_level::{self, Entity as StockLevelEntity};
use crate::entities::stock_movement::MovementType;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::metrics::LEDGER_METRICS;
use crate::middleware_helpers::{with_retry, ConflictRetryPolicy};
use crate::services::stock_ledger::{
    apply_movement, find_or_create_level, normalize_location, version_conflict, AppliedMovement,
    MovementResult, NewMovement, StockLedgerService,
};

const STOCK_TAKE_REFERENCE: &str = "STOCK_TAKE";
const RETURN_REFERENCE: &str = "RETURN";

/// Signed manual correction to an on-hand balance.
#[derive(Debug, Clone)]
pub struct AdjustStockInput {
    pub product_id: i64,
    pub location: String,
    /// Positive writes stock up, negative writes it down.
    pub quantity_change: i64,
    pub reason: String,
    pub created_by: Uuid,
}

/// Physical count for one product-location pair.
#[derive(Debug, Clone)]
pub struct StockTakeInput {
    pub product_id: i64,
    pub location: String,
    pub counted_quantity: i64,
    pub notes: Option<String>,
    pub created_by: Uuid,
}

/// Outcome of reconciling a physical count against the ledger.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StockTakeResult {
    pub product_id: i64,
    pub location: String,
    pub counted_quantity: i64,
    pub previous_on_hand: i64,
    /// Counted minus ledger quantity at the time of the count.
    pub variance: i64,
    pub new_on_hand: i64,
    /// Movement recorded for the variance; absent when the count matched.
    pub movement_id: Option<i64>,
}

/// Goods coming back into stock from a customer return.
#[derive(Debug, Clone)]
pub struct RecordReturnInput {
    pub product_id: i64,
    pub location: String,
    pub quantity: i64,
    /// RMA or credit-note number, when one exists.
    pub reference_number: Option<String>,
    pub notes: Option<String>,
    pub created_by: Uuid,
}

/// Replenishment policy for one product-location pair. A zero reorder
/// level disables low-stock signalling for the row.
#[derive(Debug, Clone)]
pub struct ReorderLevelInput {
    pub product_id: i64,
    pub location: String,
    pub reorder_level: i64,
    pub reorder_quantity: i64,
    pub updated_by: Uuid,
}

#[derive(Clone)]
pub struct StockAdjustmentService {
    ledger: Arc<StockLedgerService>,
    event_sender: Arc<EventSender>,
}

impl StockAdjustmentService {
    pub fn new(ledger: Arc<StockLedgerService>, event_sender: Arc<EventSender>) -> Self {
        Self {
            ledger,
            event_sender,
        }
    }

    /// Applies a signed manual adjustment. The reason is mandatory; it is
    /// what turns an arbitrary edit into an auditable correction.
    #[instrument(skip(self))]
    pub async fn adjust_stock(
        &self,
        input: AdjustStockInput,
    ) -> Result<MovementResult, ServiceError> {
        if input.reason.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "an adjustment requires a non-empty reason".to_string(),
            ));
        }
        if input.quantity_change == 0 {
            return Err(ServiceError::InvalidQuantity(
                "adjustment quantity change must not be zero".to_string(),
            ));
        }
        let quantity = input.quantity_change.checked_abs().ok_or_else(|| {
            ServiceError::InvalidQuantity("adjustment quantity change is out of range".to_string())
        })?;

        let movement_type = if input.quantity_change > 0 {
            MovementType::AdjustmentIncrease
        } else {
            MovementType::AdjustmentDecrease
        };

        let result = self
            .ledger
            .record_movement(NewMovement {
                product_id: input.product_id,
                location: input.location.clone(),
                movement_type,
                quantity,
                reference_type: None,
                reference_number: None,
                notes: Some(input.reason.clone()),
                created_by: input.created_by,
            })
            .await?;

        LEDGER_METRICS.adjustments_applied.inc();
        if let Err(e) = self
            .event_sender
            .send(Event::StockAdjusted {
                product_id: input.product_id,
                location: input.location.clone(),
                quantity_change: input.quantity_change,
                new_on_hand: result.new_on_hand,
                reason: input.reason.clone(),
            })
            .await
        {
            warn!(error = %e, product_id = input.product_id, "Failed to send stock adjusted event");
        }

        info!(
            "Adjusted stock for product {} at {} by {}: on hand now {}",
            input.product_id, input.location, input.quantity_change, result.new_on_hand
        );

        Ok(result)
    }

    /// Reconciles a physical count against the ledger. A variance becomes
    /// an adjustment movement; either way the count date is stamped on the
    /// row in the same transaction.
    #[instrument(skip(self))]
    pub async fn record_stock_take(
        &self,
        mut input: StockTakeInput,
    ) -> Result<StockTakeResult, ServiceError> {
        if input.counted_quantity < 0 {
            return Err(ServiceError::InvalidQuantity(format!(
                "counted quantity must not be negative, got {}",
                input.counted_quantity
            )));
        }
        input.location = normalize_location(&input.location)?;

        let _guard = self.ledger.lock(input.product_id, &input.location).await;

        let (result, applied) = with_retry(self.ledger.retry_config(), ConflictRetryPolicy, || {
            let input = input.clone();
            async move {
                let db = self.ledger.db();
                let outcome = db
                    .transaction::<_, (StockTakeResult, Option<AppliedMovement>), ServiceError>(
                        move |txn| {
                            Box::pin(async move {
                                let level =
                                    find_or_create_level(txn, input.product_id, &input.location)
                                        .await?;
                                let previous_on_hand = level.quantity_on_hand;
                                let variance = input.counted_quantity - previous_on_hand;

                                let applied = if variance == 0 {
                                    None
                                } else {
                                    let movement_type = if variance > 0 {
                                        MovementType::AdjustmentIncrease
                                    } else {
                                        MovementType::AdjustmentDecrease
                                    };
                                    let movement = NewMovement {
                                        product_id: input.product_id,
                                        location: input.location.clone(),
                                        movement_type,
                                        quantity: variance.abs(),
                                        reference_type: Some(STOCK_TAKE_REFERENCE.to_string()),
                                        reference_number: None,
                                        notes: input.notes.clone(),
                                        created_by: input.created_by,
                                    };
                                    Some(apply_movement(txn, &movement).await?)
                                };

                                let stamp: DateTimeWithTimeZone = Utc::now().into();
                                let row_id = applied.as_ref().map_or(level.id, |a| a.level.id);
                                let touch = stock_level::ActiveModel {
                                    id: Set(row_id),
                                    last_stock_take_date: Set(Some(stamp)),
                                    ..Default::default()
                                };
                                touch.update(txn).await.map_err(ServiceError::DatabaseError)?;

                                Ok((
                                    StockTakeResult {
                                        product_id: input.product_id,
                                        location: input.location.clone(),
                                        counted_quantity: input.counted_quantity,
                                        previous_on_hand,
                                        variance,
                                        new_on_hand: input.counted_quantity,
                                        movement_id: applied.as_ref().map(|a| a.movement.id),
                                    },
                                    applied,
                                ))
                            })
                        },
                    )
                    .await?;
                Ok(outcome)
            }
        })
        .await?;

        LEDGER_METRICS.stock_takes_recorded.inc();
        if let Some(applied) = &applied {
            LEDGER_METRICS.movements_recorded.inc();
            self.ledger.publish_movement(applied).await;
        }
        if let Err(e) = self
            .event_sender
            .send(Event::StockTakeRecorded {
                product_id: result.product_id,
                location: result.location.clone(),
                counted_quantity: result.counted_quantity,
                variance: result.variance,
            })
            .await
        {
            warn!(error = %e, product_id = result.product_id, "Failed to send stock take event");
        }

        info!(
            "Stock take for product {} at {}: counted {}, variance {}",
            result.product_id, result.location, result.counted_quantity, result.variance
        );

        Ok(result)
    }

    /// Books returned goods back into stock.
    #[instrument(skip(self))]
    pub async fn record_return(
        &self,
        input: RecordReturnInput,
    ) -> Result<MovementResult, ServiceError> {
        let result = self
            .ledger
            .record_movement(NewMovement {
                product_id: input.product_id,
                location: input.location.clone(),
                movement_type: MovementType::Return,
                quantity: input.quantity,
                reference_type: Some(RETURN_REFERENCE.to_string()),
                reference_number: input.reference_number.clone(),
                notes: input.notes.clone(),
                created_by: input.created_by,
            })
            .await?;

        LEDGER_METRICS.returns_recorded.inc();
        if let Err(e) = self
            .event_sender
            .send(Event::StockReturned {
                product_id: input.product_id,
                location: input.location.clone(),
                quantity: input.quantity,
                reference_number: input.reference_number.clone(),
            })
            .await
        {
            warn!(error = %e, product_id = input.product_id, "Failed to send stock returned event");
        }

        info!(
            "Return of {} units of product {} at {} recorded",
            input.quantity, input.product_id, input.location
        );

        Ok(result)
    }

    /// Sets the reorder policy on a row, creating the row when the product
    /// has no activity at the location yet.
    #[instrument(skip(self))]
    pub async fn set_reorder_levels(
        &self,
        mut input: ReorderLevelInput,
    ) -> Result<stock_level::Model, ServiceError> {
        if input.reorder_level < 0 || input.reorder_quantity < 0 {
            return Err(ServiceError::ValidationError(
                "reorder level and reorder quantity must not be negative".to_string(),
            ));
        }
        input.location = normalize_location(&input.location)?;

        let _guard = self.ledger.lock(input.product_id, &input.location).await;

        let updated = with_retry(self.ledger.retry_config(), ConflictRetryPolicy, || {
            let input = input.clone();
            async move {
                let db = self.ledger.db();
                let updated = db
                    .transaction::<_, stock_level::Model, ServiceError>(move |txn| {
                        Box::pin(async move {
                            let level =
                                find_or_create_level(txn, input.product_id, &input.location)
                                    .await?;

                            let mut active: stock_level::ActiveModel = level.clone().into();
                            active.reorder_level = Set(input.reorder_level);
                            active.reorder_quantity = Set(input.reorder_quantity);
                            active.version = Set(level.version + 1);
                            active.updated_at = Set(Utc::now().into());

                            StockLevelEntity::update(active)
                                .filter(stock_level::Column::Version.eq(level.version))
                                .exec(txn)
                                .await
                                .map_err(|e| {
                                    version_conflict(
                                        e,
                                        &format!(
                                            "stock level for product {} at {}",
                                            input.product_id, input.location
                                        ),
                                    )
                                })
                        })
                    })
                    .await?;
                Ok(updated)
            }
        })
        .await?;

        info!(
            "Reorder policy for product {} at {} set to level {}, quantity {} by {}",
            input.product_id,
            input.location,
            input.reorder_level,
            input.reorder_quantity,
            input.updated_by
        );

        // A tightened threshold can put the row under its level immediately.
        self.ledger.notify_low_stock(&updated).await;

        Ok(updated)
    }
}
