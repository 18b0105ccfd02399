//! Quantity-based reservations against available stock.
//!
//! Reservations are a soft hold on the `stock_levels` row: they never
//! write movements and never change on-hand. Only fulfilment touches the
//! ledger, issuing the held units out of stock.

use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::product::Entity as ProductEntity;
use crate::entities::stock_level::{self, Entity as StockLevelEntity};
use crate::entities::stock_movement::MovementType;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::metrics::LEDGER_METRICS;
use crate::middleware_helpers::{with_retry, ConflictRetryPolicy};
use crate::services::stock_ledger::{
    apply_movement, normalize_location, version_conflict, AppliedMovement, MovementResult,
    NewMovement, StockLedgerService,
};

const FULFILMENT_REFERENCE: &str = "FULFILMENT";

/// Request to hold stock for an order or picking run.
#[derive(Debug, Clone)]
pub struct ReserveStockInput {
    pub product_id: i64,
    pub location: String,
    pub quantity: i64,
    pub reference_number: Option<String>,
    pub created_by: Uuid,
}

/// Request to give a hold back. Quantities above what is actually
/// reserved are clamped, so callers may release generously.
#[derive(Debug, Clone)]
pub struct ReleaseStockInput {
    pub product_id: i64,
    pub location: String,
    pub quantity: i64,
    pub created_by: Uuid,
}

/// Request to ship held stock out.
#[derive(Debug, Clone)]
pub struct FulfilStockInput {
    pub product_id: i64,
    pub location: String,
    pub quantity: i64,
    pub reference_number: Option<String>,
    pub created_by: Uuid,
}

/// Balance after a reservation operation.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReservationResult {
    pub product_id: i64,
    pub location: String,
    /// Quantity actually applied; release requests are clamped to what
    /// was reserved.
    pub quantity: i64,
    pub new_on_hand: i64,
    pub new_reserved: i64,
    pub new_available: i64,
}

impl ReservationResult {
    fn from_level(level: &stock_level::Model, quantity: i64) -> Self {
        Self {
            product_id: level.product_id,
            location: level.location.clone(),
            quantity,
            new_on_hand: level.quantity_on_hand,
            new_reserved: level.quantity_reserved,
            new_available: level.available(),
        }
    }
}

#[derive(Clone)]
pub struct StockReservationService {
    ledger: Arc<StockLedgerService>,
    event_sender: Arc<EventSender>,
}

impl StockReservationService {
    pub fn new(ledger: Arc<StockLedgerService>, event_sender: Arc<EventSender>) -> Self {
        Self {
            ledger,
            event_sender,
        }
    }

    /// Holds stock against the available quantity. Fails when the request
    /// exceeds on-hand minus what is already reserved.
    #[instrument(skip(self))]
    pub async fn reserve_stock(
        &self,
        mut input: ReserveStockInput,
    ) -> Result<ReservationResult, ServiceError> {
        if input.quantity <= 0 {
            return Err(ServiceError::InvalidQuantity(format!(
                "reservation quantity must be positive, got {}",
                input.quantity
            )));
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
                            let level = match find_level(txn, input.product_id, &input.location)
                                .await?
                            {
                                Some(level) => level,
                                None => {
                                    // Distinguish an unknown product from one
                                    // that simply has no stock here yet.
                                    ProductEntity::find_by_id(input.product_id)
                                        .one(txn)
                                        .await
                                        .map_err(ServiceError::DatabaseError)?
                                        .ok_or_else(|| {
                                            ServiceError::NotFound(format!(
                                                "Product {} not found",
                                                input.product_id
                                            ))
                                        })?;
                                    return Err(ServiceError::InsufficientAvailable {
                                        product_id: input.product_id,
                                        location: input.location.clone(),
                                        available: 0,
                                        requested: input.quantity,
                                    });
                                }
                            };

                            let available = level.available();
                            if input.quantity > available {
                                return Err(ServiceError::InsufficientAvailable {
                                    product_id: input.product_id,
                                    location: input.location.clone(),
                                    available,
                                    requested: input.quantity,
                                });
                            }

                            update_reserved(txn, &level, level.quantity_reserved + input.quantity)
                                .await
                        })
                    })
                    .await?;
                Ok(updated)
            }
        })
        .await?;

        LEDGER_METRICS.reservations_created.inc();
        if let Err(e) = self
            .event_sender
            .send(Event::StockReserved {
                product_id: input.product_id,
                location: input.location.clone(),
                quantity: input.quantity,
                reference_number: input.reference_number.clone(),
            })
            .await
        {
            warn!(error = %e, product_id = input.product_id, "Failed to send stock reserved event");
        }

        // Reserving reduces availability, so the row may have crossed its
        // reorder level without any movement being written.
        self.ledger.notify_low_stock(&updated).await;

        info!(
            "Reserved {} units of product {} at {}: available now {}",
            input.quantity,
            input.product_id,
            input.location,
            updated.available()
        );

        Ok(ReservationResult::from_level(&updated, input.quantity))
    }

    /// Gives reserved stock back, clamped to what is actually held.
    /// Releasing from a row with nothing reserved is a no-op success.
    #[instrument(skip(self))]
    pub async fn release_stock(
        &self,
        mut input: ReleaseStockInput,
    ) -> Result<ReservationResult, ServiceError> {
        if input.quantity <= 0 {
            return Err(ServiceError::InvalidQuantity(format!(
                "release quantity must be positive, got {}",
                input.quantity
            )));
        }

        input.location = normalize_location(&input.location)?;

        let _guard = self.ledger.lock(input.product_id, &input.location).await;

        let (updated, released) =
            with_retry(self.ledger.retry_config(), ConflictRetryPolicy, || {
                let input = input.clone();
                async move {
                    let db = self.ledger.db();
                    let outcome = db
                        .transaction::<_, (stock_level::Model, i64), ServiceError>(move |txn| {
                            Box::pin(async move {
                                let level = find_level(txn, input.product_id, &input.location)
                                    .await?
                                    .ok_or_else(|| {
                                        ServiceError::NotFound(format!(
                                            "No stock level for product {} at {}",
                                            input.product_id, input.location
                                        ))
                                    })?;

                                let released = input.quantity.min(level.quantity_reserved);
                                if released == 0 {
                                    return Ok((level, 0));
                                }

                                let updated = update_reserved(
                                    txn,
                                    &level,
                                    level.quantity_reserved - released,
                                )
                                .await?;
                                Ok((updated, released))
                            })
                        })
                        .await?;
                    Ok(outcome)
                }
            })
            .await?;

        if released > 0 {
            LEDGER_METRICS.reservations_released.inc();
            if let Err(e) = self
                .event_sender
                .send(Event::StockReleased {
                    product_id: input.product_id,
                    location: input.location.clone(),
                    quantity: released,
                })
                .await
            {
                warn!(error = %e, product_id = input.product_id, "Failed to send stock released event");
            }
        }

        info!(
            "Released {} of {} requested units of product {} at {}",
            released, input.quantity, input.product_id, input.location
        );

        Ok(ReservationResult::from_level(&updated, released))
    }

    /// Ships held stock: the reservation and the on-hand balance both drop
    /// by the fulfilled quantity, and an issue movement records the exit.
    #[instrument(skip(self))]
    pub async fn fulfil_stock(
        &self,
        mut input: FulfilStockInput,
    ) -> Result<MovementResult, ServiceError> {
        if input.quantity <= 0 {
            return Err(ServiceError::InvalidQuantity(format!(
                "fulfilment quantity must be positive, got {}",
                input.quantity
            )));
        }

        input.location = normalize_location(&input.location)?;

        let _guard = self.ledger.lock(input.product_id, &input.location).await;

        let applied = with_retry(self.ledger.retry_config(), ConflictRetryPolicy, || {
            let input = input.clone();
            async move {
                let db = self.ledger.db();
                let applied = db
                    .transaction::<_, AppliedMovement, ServiceError>(move |txn| {
                        Box::pin(async move {
                            let level = find_level(txn, input.product_id, &input.location)
                                .await?
                                .ok_or_else(|| {
                                    ServiceError::NotFound(format!(
                                        "No stock level for product {} at {}",
                                        input.product_id, input.location
                                    ))
                                })?;

                            if input.quantity > level.quantity_reserved {
                                return Err(ServiceError::InvalidQuantity(format!(
                                    "cannot fulfil {} units for product {} at {}: only {} reserved",
                                    input.quantity,
                                    input.product_id,
                                    input.location,
                                    level.quantity_reserved
                                )));
                            }

                            // Free the hold first so the issue clears the
                            // reserved floor check.
                            update_reserved(txn, &level, level.quantity_reserved - input.quantity)
                                .await?;

                            apply_movement(
                                txn,
                                &NewMovement {
                                    product_id: input.product_id,
                                    location: input.location.clone(),
                                    movement_type: MovementType::Issue,
                                    quantity: input.quantity,
                                    reference_type: Some(FULFILMENT_REFERENCE.to_string()),
                                    reference_number: input.reference_number.clone(),
                                    notes: None,
                                    created_by: input.created_by,
                                },
                            )
                            .await
                        })
                    })
                    .await?;
                Ok(applied)
            }
        })
        .await?;

        LEDGER_METRICS.reservations_fulfilled.inc();
        LEDGER_METRICS.movements_recorded.inc();
        self.ledger.publish_movement(&applied).await;
        if let Err(e) = self
            .event_sender
            .send(Event::StockFulfilled {
                product_id: input.product_id,
                location: input.location.clone(),
                quantity: input.quantity,
            })
            .await
        {
            warn!(error = %e, product_id = input.product_id, "Failed to send stock fulfilled event");
        }

        info!(
            "Fulfilled {} reserved units of product {} at {}",
            input.quantity, input.product_id, input.location
        );

        Ok(MovementResult::from(&applied))
    }
}

async fn find_level<C: ConnectionTrait>(
    db: &C,
    product_id: i64,
    location: &str,
) -> Result<Option<stock_level::Model>, ServiceError> {
    StockLevelEntity::find()
        .filter(stock_level::Column::ProductId.eq(product_id))
        .filter(stock_level::Column::Location.eq(location))
        .one(db)
        .await
        .map_err(ServiceError::DatabaseError)
}

/// Version-guarded write of the reserved quantity.
async fn update_reserved<C: ConnectionTrait>(
    db: &C,
    level: &stock_level::Model,
    new_reserved: i64,
) -> Result<stock_level::Model, ServiceError> {
    let mut active: stock_level::ActiveModel = level.clone().into();
    active.quantity_reserved = Set(new_reserved);
    active.version = Set(level.version + 1);
    active.updated_at = Set(Utc::now().into());

    StockLevelEntity::update(active)
        .filter(stock_level::Column::Version.eq(level.version))
        .exec(db)
        .await
        .map_err(|e| {
            version_conflict(
                e,
                &format!(
                    "stock level for product {} at {}",
                    level.product_id, level.location
                ),
            )
        })
}
