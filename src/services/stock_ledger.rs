//! Core movement primitive for the stock ledger.
//!
//! Every change to an on-hand balance in this crate goes through
//! [`apply_movement`]: it writes the immutable movement row and the new
//! balance in one transaction, so the ledger and the materialized
//! `stock_levels` row can never drift apart. The service wraps that
//! primitive with per-row async locks and a bounded retry around the
//! optimistic version check.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use dashmap::DashMap;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, Set, SqlErr,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::product::Entity as ProductEntity;
use crate::entities::stock_level::{self, Entity as StockLevelEntity};
use crate::entities::stock_movement::{self, MovementType};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::metrics::LEDGER_METRICS;
use crate::middleware_helpers::{with_retry, ConflictRetryPolicy, RetryConfig};

/// Movement types that may be recorded directly through the movements API.
/// Adjustments, stock takes, returns, and transfers carry extra bookkeeping
/// and go through their own operations.
const DIRECT_MOVEMENT_TYPES: [MovementType; 2] = [MovementType::Receipt, MovementType::Issue];

/// Upper bound on location codes, matching the column width.
pub const MAX_LOCATION_LEN: usize = 64;

/// Canonical form of a location code: surrounding whitespace stripped,
/// non-empty, and within the column width. Every write path runs its
/// location through here so `"MAIN"` and `" MAIN"` land on the same
/// stock row and the same lock.
pub fn normalize_location(raw: &str) -> Result<String, ServiceError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::ValidationError(
            "location must not be empty".to_string(),
        ));
    }
    if trimmed.len() > MAX_LOCATION_LEN {
        return Err(ServiceError::ValidationError(format!(
            "location must be at most {} characters",
            MAX_LOCATION_LEN
        )));
    }
    Ok(trimmed.to_string())
}

/// Input for one ledger movement. Quantity is always a positive magnitude;
/// the movement type decides the sign of the effect.
#[derive(Debug, Clone)]
pub struct NewMovement {
    pub product_id: i64,
    pub location: String,
    pub movement_type: MovementType,
    pub quantity: i64,
    pub reference_type: Option<String>,
    pub reference_number: Option<String>,
    pub notes: Option<String>,
    pub created_by: Uuid,
}

/// A movement that has been written, together with the balance row it
/// produced. Internal currency between the write services.
#[derive(Debug, Clone)]
pub struct AppliedMovement {
    pub movement_type: MovementType,
    pub movement: stock_movement::Model,
    pub level: stock_level::Model,
}

/// Outcome of a recorded movement as returned to callers.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MovementResult {
    pub movement_id: i64,
    pub product_id: i64,
    pub location: String,
    pub movement_type: MovementType,
    pub quantity: i64,
    pub quantity_before: i64,
    pub new_on_hand: i64,
    pub new_reserved: i64,
    pub new_available: i64,
}

impl From<&AppliedMovement> for MovementResult {
    fn from(applied: &AppliedMovement) -> Self {
        Self {
            movement_id: applied.movement.id,
            product_id: applied.movement.product_id,
            location: applied.movement.location.clone(),
            movement_type: applied.movement_type,
            quantity: applied.movement.quantity,
            quantity_before: applied.movement.quantity_before,
            new_on_hand: applied.level.quantity_on_hand,
            new_reserved: applied.level.quantity_reserved,
            new_available: applied.level.available(),
        }
    }
}

/// Per product-location async mutexes that serialize in-process writers on
/// the same balance row. The optimistic version column on `stock_levels`
/// remains the actual correctness guard; these locks only keep concurrent
/// writers from burning their retry budget against each other.
#[derive(Debug, Default, Clone)]
pub struct StockLocks {
    locks: Arc<DashMap<(i64, String), Arc<Mutex<()>>>>,
}

impl StockLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, product_id: i64, location: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry((product_id, location.to_string()))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Locks one product-location row.
    pub async fn lock(&self, product_id: i64, location: &str) -> OwnedMutexGuard<()> {
        self.entry(product_id, location).lock_owned().await
    }

    /// Locks several rows, deduplicated and in sorted key order so two
    /// writers touching overlapping sets can never deadlock each other.
    pub async fn lock_many(&self, keys: &[(i64, &str)]) -> Vec<OwnedMutexGuard<()>> {
        let mut sorted: Vec<(i64, String)> = keys
            .iter()
            .map(|(product_id, location)| (*product_id, location.to_string()))
            .collect();
        sorted.sort();
        sorted.dedup();

        let mut guards = Vec::with_capacity(sorted.len());
        for (product_id, location) in sorted {
            guards.push(self.entry(product_id, &location).lock_owned().await);
        }
        guards
    }
}

/// Loads the balance row for a product-location pair, creating the zeroed
/// row on first activity. Rows are never deleted afterwards so movement
/// history stays linkable. An existing row already proves the product
/// exists, so the catalog lookup only happens on the create path.
pub async fn find_or_create_level<C: ConnectionTrait>(
    db: &C,
    product_id: i64,
    location: &str,
) -> Result<stock_level::Model, ServiceError> {
    let existing = StockLevelEntity::find()
        .filter(stock_level::Column::ProductId.eq(product_id))
        .filter(stock_level::Column::Location.eq(location))
        .one(db)
        .await
        .map_err(ServiceError::DatabaseError)?;

    if let Some(level) = existing {
        return Ok(level);
    }

    ProductEntity::find_by_id(product_id)
        .one(db)
        .await
        .map_err(ServiceError::DatabaseError)?
        .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

    let now = Utc::now();
    let created = stock_level::ActiveModel {
        product_id: Set(product_id),
        location: Set(location.to_string()),
        quantity_on_hand: Set(0),
        quantity_reserved: Set(0),
        reorder_level: Set(0),
        reorder_quantity: Set(0),
        last_stock_take_date: Set(None),
        version: Set(1),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(|e| conflict_on_unique_violation(e, "stock level row"))?;

    Ok(created)
}

/// Maps a lost insert race on a uniquely indexed row to a retryable
/// conflict instead of a hard database failure.
pub(crate) fn conflict_on_unique_violation(err: DbErr, what: &str) -> ServiceError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => {
            LEDGER_METRICS.record_version_conflict();
            ServiceError::ConcurrencyConflict(format!("{} was created concurrently", what))
        }
        _ => ServiceError::DatabaseError(err),
    }
}

/// Maps a version-filtered update that matched no row to a retryable
/// conflict. Used by every optimistic write against versioned rows.
pub(crate) fn version_conflict(err: DbErr, what: &str) -> ServiceError {
    match err {
        DbErr::RecordNotUpdated => {
            LEDGER_METRICS.record_version_conflict();
            ServiceError::ConcurrencyConflict(format!("{} changed concurrently", what))
        }
        other => ServiceError::DatabaseError(other),
    }
}

/// Writes one movement and its balance update inside the caller's
/// transaction. This is the only code path in the crate that inserts
/// `stock_movements` rows or changes `quantity_on_hand`.
///
/// Guards, in order: the quantity must be positive, the product must
/// exist, and an outbound movement may not take on-hand below the
/// reserved quantity. The balance update is filtered on the version the
/// row was read at; a lost race surfaces as a retryable conflict.
pub async fn apply_movement<C: ConnectionTrait>(
    db: &C,
    movement: &NewMovement,
) -> Result<AppliedMovement, ServiceError> {
    if movement.quantity <= 0 {
        LEDGER_METRICS.record_rejection();
        return Err(ServiceError::InvalidQuantity(format!(
            "movement quantity must be positive, got {}",
            movement.quantity
        )));
    }
    let location = normalize_location(&movement.location)?;

    let level = find_or_create_level(db, movement.product_id, &location).await?;

    let quantity_before = level.quantity_on_hand;
    let quantity_after = quantity_before
        .checked_add(movement.movement_type.signed_quantity(movement.quantity))
        .ok_or_else(|| {
            ServiceError::InvalidQuantity("movement would overflow the on-hand quantity".to_string())
        })?;

    if !movement.movement_type.is_inbound() && quantity_after < level.quantity_reserved {
        LEDGER_METRICS.record_rejection();
        return Err(ServiceError::BelowReserved {
            product_id: movement.product_id,
            location: location.clone(),
            on_hand: quantity_before,
            reserved: level.quantity_reserved,
            requested: movement.quantity,
        });
    }

    let mut active: stock_level::ActiveModel = level.clone().into();
    active.quantity_on_hand = Set(quantity_after);
    active.version = Set(level.version + 1);
    active.updated_at = Set(Utc::now().into());

    let updated_level = StockLevelEntity::update(active)
        .filter(stock_level::Column::Version.eq(level.version))
        .exec(db)
        .await
        .map_err(|e| {
            version_conflict(
                e,
                &format!(
                    "stock level for product {} at {}",
                    movement.product_id, location
                ),
            )
        })?;

    let recorded = stock_movement::ActiveModel {
        product_id: Set(movement.product_id),
        location: Set(location),
        movement_type: Set(movement.movement_type.as_str().to_string()),
        quantity: Set(movement.quantity),
        quantity_before: Set(quantity_before),
        quantity_after: Set(quantity_after),
        reference_type: Set(movement.reference_type.clone()),
        reference_number: Set(movement.reference_number.clone()),
        notes: Set(movement.notes.clone()),
        created_by: Set(movement.created_by),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(ServiceError::DatabaseError)?;

    Ok(AppliedMovement {
        movement_type: movement.movement_type,
        movement: recorded,
        level: updated_level,
    })
}

/// Service wrapping the movement primitive with locking, retry, metrics,
/// and event publication. Sibling services compose larger transactions out
/// of [`apply_movement`] and reuse the lock registry and publication
/// helpers from here.
#[derive(Clone)]
pub struct StockLedgerService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    locks: StockLocks,
    retry: RetryConfig,
}

impl StockLedgerService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self {
            db_pool,
            event_sender,
            locks: StockLocks::new(),
            retry: RetryConfig::default(),
        }
    }

    pub fn db(&self) -> &DbPool {
        &self.db_pool
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// Locks one product-location row for the duration of the guard.
    pub async fn lock(&self, product_id: i64, location: &str) -> OwnedMutexGuard<()> {
        self.locks.lock(product_id, location).await
    }

    /// Locks a set of product-location rows in deadlock-safe order.
    pub async fn lock_many(&self, keys: &[(i64, &str)]) -> Vec<OwnedMutexGuard<()>> {
        self.locks.lock_many(keys).await
    }

    /// Records a single movement end to end: row lock, retried
    /// transaction, metrics, and events.
    #[instrument(skip(self))]
    pub async fn record_movement(
        &self,
        mut movement: NewMovement,
    ) -> Result<MovementResult, ServiceError> {
        // Normalized up front so the lock key matches the stored row.
        movement.location = normalize_location(&movement.location)?;

        let started = Instant::now();
        let _guard = self.lock(movement.product_id, &movement.location).await;

        let applied = with_retry(&self.retry, ConflictRetryPolicy, || {
            let movement = movement.clone();
            async move {
                let db = &*self.db_pool;
                let applied = db
                    .transaction::<_, AppliedMovement, ServiceError>(move |txn| {
                        Box::pin(async move { apply_movement(txn, &movement).await })
                    })
                    .await?;
                Ok(applied)
            }
        })
        .await?;

        LEDGER_METRICS.record_movement(started.elapsed());
        self.publish_movement(&applied).await;

        Ok(MovementResult::from(&applied))
    }

    /// Records several movements in one transaction, locking every touched
    /// row up front. Movements are applied in input order.
    #[instrument(skip(self, movements))]
    pub async fn record_movements(
        &self,
        mut movements: Vec<NewMovement>,
    ) -> Result<Vec<MovementResult>, ServiceError> {
        if movements.is_empty() {
            return Err(ServiceError::ValidationError(
                "at least one movement is required".to_string(),
            ));
        }
        for movement in &mut movements {
            movement.location = normalize_location(&movement.location)?;
        }

        let started = Instant::now();
        let keys: Vec<(i64, &str)> = movements
            .iter()
            .map(|m| (m.product_id, m.location.as_str()))
            .collect();
        let _guards = self.lock_many(&keys).await;

        let applied = with_retry(&self.retry, ConflictRetryPolicy, || {
            let movements = movements.clone();
            async move {
                let db = &*self.db_pool;
                let applied = db
                    .transaction::<_, Vec<AppliedMovement>, ServiceError>(move |txn| {
                        Box::pin(async move {
                            let mut applied = Vec::with_capacity(movements.len());
                            for movement in &movements {
                                applied.push(apply_movement(txn, movement).await?);
                            }
                            Ok(applied)
                        })
                    })
                    .await?;
                Ok(applied)
            }
        })
        .await?;

        LEDGER_METRICS
            .movement_duration
            .observe(started.elapsed().as_secs_f64());
        for one in &applied {
            LEDGER_METRICS.movements_recorded.inc();
            self.publish_movement(one).await;
        }

        Ok(applied.iter().map(MovementResult::from).collect())
    }

    /// Records a movement submitted directly through the movements API.
    pub async fn record_direct_movement(
        &self,
        movement: NewMovement,
    ) -> Result<MovementResult, ServiceError> {
        ensure_directly_recordable(movement.movement_type)?;
        self.record_movement(movement).await
    }

    /// Post-commit bookkeeping shared by every write path: emits the
    /// ledger event and raises a replenishment alert when the write left
    /// the row at or under its reorder level. The write has already
    /// committed, so a lost event is logged and never surfaced.
    pub async fn publish_movement(&self, applied: &AppliedMovement) {
        if let Err(e) = self
            .event_sender
            .send(Event::MovementRecorded {
                movement_id: applied.movement.id,
                product_id: applied.movement.product_id,
                location: applied.movement.location.clone(),
                movement_type: applied.movement_type,
                quantity: applied.movement.quantity,
                quantity_after: applied.movement.quantity_after,
            })
            .await
        {
            warn!(
                error = %e,
                movement_id = applied.movement.id,
                "Failed to send movement recorded event"
            );
        }

        self.notify_low_stock(&applied.level).await;
    }

    /// Best-effort replenishment signal; never fails the write that
    /// triggered it.
    pub async fn notify_low_stock(&self, level: &stock_level::Model) {
        if !level.is_below_reorder_level() {
            return;
        }

        LEDGER_METRICS.low_stock_alerts.inc();
        if let Err(e) = self
            .event_sender
            .send(Event::LowStockDetected {
                product_id: level.product_id,
                location: level.location.clone(),
                available: level.available(),
                reorder_level: level.reorder_level,
                reorder_quantity: level.reorder_quantity,
            })
            .await
        {
            warn!(
                "Failed to send low stock alert for product {} at {}: {}",
                level.product_id, level.location, e
            );
        }
    }
}

fn ensure_directly_recordable(movement_type: MovementType) -> Result<(), ServiceError> {
    if DIRECT_MOVEMENT_TYPES.contains(&movement_type) {
        Ok(())
    } else {
        Err(ServiceError::ValidationError(format!(
            "movement type {} cannot be recorded directly; use its dedicated operation",
            movement_type
        )))
    }
}
