//! Goods Received Note processing.
//!
//! A GRN is a document first and a stock event second: it is drafted,
//! optionally frozen as received, and only posting turns its lines into
//! receipt movements on the ledger. Cancelling a posted GRN writes
//! compensating issue movements rather than rewriting history.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::entities::grn_header::{self, Entity as GrnHeaderEntity, GrnStatus};
use crate::entities::grn_line::{self, Entity as GrnLineEntity};
use crate::entities::product::Entity as ProductEntity;
use crate::entities::stock_movement::MovementType;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::metrics::LEDGER_METRICS;
use crate::middleware_helpers::{with_retry, ConflictRetryPolicy};
use crate::services::stock_ledger::{
    apply_movement, conflict_on_unique_violation, normalize_location, version_conflict,
    AppliedMovement, MovementResult, NewMovement, StockLedgerService,
};

const GRN_NUMBER_PREFIX: &str = "GRN-";
const GRN_REFERENCE: &str = "GRN";
const GRN_REVERSAL_REFERENCE: &str = "GRN_REVERSAL";
const MAX_LIST_LIMIT: u64 = 1000;

/// One product line on an incoming GRN. The unit of measure is
/// snapshotted from the catalog at write time.
#[derive(Debug, Clone)]
pub struct NewGrnLine {
    pub product_id: i64,
    pub quantity_received: i64,
    pub unit_cost: Decimal,
    /// GST rate as a fraction, e.g. 0.10 for 10%.
    pub gst_rate: Decimal,
}

/// A new GRN document with at least one line.
#[derive(Debug, Clone)]
pub struct NewGrn {
    pub vendor_id: i64,
    pub received_date: NaiveDate,
    pub location: String,
    pub vendor_invoice_ref: Option<String>,
    pub notes: Option<String>,
    pub lines: Vec<NewGrnLine>,
    pub created_by: Uuid,
}

/// Draft-only edits. Omitted fields keep their current value; providing
/// `lines` replaces the whole line set and recomputes the totals.
#[derive(Debug, Clone, Default)]
pub struct UpdateGrn {
    pub vendor_id: Option<i64>,
    pub received_date: Option<NaiveDate>,
    pub location: Option<String>,
    pub vendor_invoice_ref: Option<String>,
    pub notes: Option<String>,
    pub lines: Option<Vec<NewGrnLine>>,
}

/// A GRN header with its lines in line-number order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrnDetails {
    pub header: grn_header::Model,
    pub lines: Vec<grn_line::Model>,
}

/// Outcome of posting a GRN to the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostGrnResult {
    pub header: grn_header::Model,
    pub movements: Vec<MovementResult>,
}

/// Outcome of cancelling a GRN.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelGrnResult {
    pub header: grn_header::Model,
    pub was_posted: bool,
    /// Reversal movements written when a posted GRN is cancelled.
    pub reversals: Vec<MovementResult>,
}

/// GRN listing filters; unset fields match everything. The date bounds
/// apply to the received date, inclusive.
#[derive(Debug, Clone, Default)]
pub struct GrnListFilter {
    pub status: Option<GrnStatus>,
    pub vendor_id: Option<i64>,
    pub received_from: Option<NaiveDate>,
    pub received_to: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct GrnTotals {
    total_items: i64,
    subtotal: Decimal,
    gst_amount: Decimal,
    total_inc_gst: Decimal,
}

fn money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(4, RoundingStrategy::MidpointAwayFromZero)
}

fn line_total(line: &NewGrnLine) -> Decimal {
    money(Decimal::from(line.quantity_received) * line.unit_cost)
}

/// Header totals are the sum of per-line amounts, with GST rounded per
/// line the way it appears on a tax invoice.
fn compute_totals(lines: &[NewGrnLine]) -> GrnTotals {
    let mut total_items = 0i64;
    let mut subtotal = Decimal::ZERO;
    let mut gst_amount = Decimal::ZERO;

    for line in lines {
        let total = line_total(line);
        total_items += line.quantity_received;
        subtotal += total;
        gst_amount += money(total * line.gst_rate);
    }

    GrnTotals {
        total_items,
        subtotal,
        gst_amount,
        total_inc_gst: subtotal + gst_amount,
    }
}

fn next_grn_number(last: Option<&str>) -> String {
    let next = last
        .and_then(|number| number.strip_prefix(GRN_NUMBER_PREFIX))
        .and_then(|digits| digits.parse::<u64>().ok())
        .map_or(1, |n| n + 1);
    format!("{}{:06}", GRN_NUMBER_PREFIX, next)
}

fn validate_new_grn(input: &NewGrn) -> Result<(), ServiceError> {
    if input.vendor_id <= 0 {
        return Err(ServiceError::ValidationError(
            "vendor id must be positive".to_string(),
        ));
    }
    validate_lines(&input.lines)
}

fn validate_lines(lines: &[NewGrnLine]) -> Result<(), ServiceError> {
    if lines.is_empty() {
        return Err(ServiceError::ValidationError(
            "a GRN requires at least one line".to_string(),
        ));
    }
    for (index, line) in lines.iter().enumerate() {
        let line_number = index + 1;
        if line.quantity_received <= 0 {
            return Err(ServiceError::InvalidQuantity(format!(
                "line {}: received quantity must be positive, got {}",
                line_number, line.quantity_received
            )));
        }
        if line.unit_cost < Decimal::ZERO {
            return Err(ServiceError::ValidationError(format!(
                "line {}: unit cost must not be negative",
                line_number
            )));
        }
        if line.gst_rate < Decimal::ZERO || line.gst_rate > Decimal::ONE {
            return Err(ServiceError::ValidationError(format!(
                "line {}: GST rate must be a fraction between 0 and 1",
                line_number
            )));
        }
    }
    Ok(())
}

async fn load_header<C: ConnectionTrait>(
    db: &C,
    grn_id: i64,
) -> Result<grn_header::Model, ServiceError> {
    GrnHeaderEntity::find_by_id(grn_id)
        .one(db)
        .await
        .map_err(ServiceError::DatabaseError)?
        .ok_or_else(|| ServiceError::NotFound(format!("GRN {} not found", grn_id)))
}

async fn load_lines<C: ConnectionTrait>(
    db: &C,
    grn_id: i64,
) -> Result<Vec<grn_line::Model>, ServiceError> {
    GrnLineEntity::find()
        .filter(grn_line::Column::GrnId.eq(grn_id))
        .order_by_asc(grn_line::Column::LineNumber)
        .all(db)
        .await
        .map_err(ServiceError::DatabaseError)
}

/// A status string outside the enum means the row was edited by hand or a
/// migration is missing.
fn require_status(header: &grn_header::Model) -> Result<GrnStatus, ServiceError> {
    header.status().ok_or_else(|| {
        ServiceError::InternalError(format!(
            "GRN {} has unrecognized status '{}'",
            header.grn_number, header.status
        ))
    })
}

/// Validates every line's product against the catalog and snapshots its
/// unit of measure.
async fn resolve_lines<C: ConnectionTrait>(
    db: &C,
    lines: &[NewGrnLine],
) -> Result<Vec<(NewGrnLine, String)>, ServiceError> {
    let mut resolved = Vec::with_capacity(lines.len());
    for (index, line) in lines.iter().enumerate() {
        let product = ProductEntity::find_by_id(line.product_id)
            .one(db)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} not found", line.product_id))
            })?;
        if !product.active {
            return Err(ServiceError::ValidationError(format!(
                "line {}: product {} ({}) is not active",
                index + 1,
                product.id,
                product.sku
            )));
        }
        resolved.push((line.clone(), product.unit));
    }
    Ok(resolved)
}

async fn insert_lines<C: ConnectionTrait>(
    db: &C,
    grn_id: i64,
    lines: &[(NewGrnLine, String)],
) -> Result<Vec<grn_line::Model>, ServiceError> {
    let now = Utc::now();
    let mut created = Vec::with_capacity(lines.len());
    for (index, (line, unit)) in lines.iter().enumerate() {
        let model = grn_line::ActiveModel {
            grn_id: Set(grn_id),
            line_number: Set((index + 1) as i32),
            product_id: Set(line.product_id),
            quantity_received: Set(line.quantity_received),
            unit: Set(unit.clone()),
            unit_cost: Set(line.unit_cost),
            gst_rate: Set(line.gst_rate),
            line_total: Set(line_total(line)),
            created_at: Set(now.into()),
            ..Default::default()
        }
        .insert(db)
        .await
        .map_err(ServiceError::DatabaseError)?;
        created.push(model);
    }
    Ok(created)
}

/// Version-guarded status transition on a header.
async fn transition_status<C: ConnectionTrait>(
    db: &C,
    header: &grn_header::Model,
    to: GrnStatus,
    posted_at: Option<DateTimeWithTimeZone>,
    cancelled_at: Option<DateTimeWithTimeZone>,
) -> Result<grn_header::Model, ServiceError> {
    let mut active: grn_header::ActiveModel = header.clone().into();
    active.status = Set(to.as_str().to_string());
    if let Some(posted_at) = posted_at {
        active.posted_at = Set(Some(posted_at));
    }
    if let Some(cancelled_at) = cancelled_at {
        active.cancelled_at = Set(Some(cancelled_at));
    }
    active.version = Set(header.version + 1);
    active.updated_at = Set(Utc::now().into());

    GrnHeaderEntity::update(active)
        .filter(grn_header::Column::Version.eq(header.version))
        .exec(db)
        .await
        .map_err(|e| version_conflict(e, &format!("GRN {}", header.grn_number)))
}

#[derive(Clone)]
pub struct GoodsReceiptService {
    ledger: Arc<StockLedgerService>,
    event_sender: Arc<EventSender>,
}

impl GoodsReceiptService {
    pub fn new(ledger: Arc<StockLedgerService>, event_sender: Arc<EventSender>) -> Self {
        Self {
            ledger,
            event_sender,
        }
    }

    /// Creates a draft GRN, numbering it from the last issued number. The
    /// unique index on the number turns a numbering race into a retryable
    /// conflict.
    #[instrument(skip(self, input))]
    pub async fn create_grn(&self, mut input: NewGrn) -> Result<GrnDetails, ServiceError> {
        input.location = normalize_location(&input.location)?;
        validate_new_grn(&input)?;

        let details = with_retry(self.ledger.retry_config(), ConflictRetryPolicy, || {
            let input = input.clone();
            async move {
                let db = self.ledger.db();
                let details = db
                    .transaction::<_, GrnDetails, ServiceError>(move |txn| {
                        Box::pin(async move {
                            let resolved = resolve_lines(txn, &input.lines).await?;

                            let last = GrnHeaderEntity::find()
                                .order_by_desc(grn_header::Column::Id)
                                .one(txn)
                                .await
                                .map_err(ServiceError::DatabaseError)?;
                            let grn_number =
                                next_grn_number(last.as_ref().map(|h| h.grn_number.as_str()));

                            let totals = compute_totals(&input.lines);
                            let now = Utc::now();

                            let header = grn_header::ActiveModel {
                                grn_number: Set(grn_number),
                                vendor_id: Set(input.vendor_id),
                                received_date: Set(input.received_date),
                                location: Set(input.location.clone()),
                                vendor_invoice_ref: Set(input.vendor_invoice_ref.clone()),
                                status: Set(GrnStatus::Draft.as_str().to_string()),
                                notes: Set(input.notes.clone()),
                                total_items: Set(totals.total_items),
                                subtotal: Set(totals.subtotal),
                                gst_amount: Set(totals.gst_amount),
                                total_inc_gst: Set(totals.total_inc_gst),
                                created_by: Set(input.created_by),
                                posted_at: Set(None),
                                cancelled_at: Set(None),
                                version: Set(1),
                                created_at: Set(now.into()),
                                updated_at: Set(now.into()),
                                ..Default::default()
                            }
                            .insert(txn)
                            .await
                            .map_err(|e| conflict_on_unique_violation(e, "GRN number"))?;

                            let lines = insert_lines(txn, header.id, &resolved).await?;

                            Ok(GrnDetails { header, lines })
                        })
                    })
                    .await?;
                Ok(details)
            }
        })
        .await?;

        LEDGER_METRICS.grns_created.inc();
        if let Err(e) = self
            .event_sender
            .send(Event::GrnCreated {
                grn_id: details.header.id,
                grn_number: details.header.grn_number.clone(),
            })
            .await
        {
            warn!(error = %e, grn_id = details.header.id, "Failed to send GRN created event");
        }

        info!(
            "GRN {} created for vendor {} with {} lines",
            details.header.grn_number,
            details.header.vendor_id,
            details.lines.len()
        );

        Ok(details)
    }

    #[instrument(skip(self))]
    pub async fn get_grn(&self, grn_id: i64) -> Result<GrnDetails, ServiceError> {
        let db = self.ledger.db();
        let header = load_header(db, grn_id).await?;
        let lines = load_lines(db, grn_id).await?;
        Ok(GrnDetails { header, lines })
    }

    /// Lists headers newest first with optional status, vendor, and
    /// received-date filters.
    #[instrument(skip(self, filter))]
    pub async fn list_grns(
        &self,
        page: u64,
        limit: u64,
        filter: GrnListFilter,
    ) -> Result<(Vec<grn_header::Model>, u64), ServiceError> {
        if page == 0 {
            return Err(ServiceError::ValidationError(
                "Page number must be greater than 0".to_string(),
            ));
        }
        if limit == 0 || limit > MAX_LIST_LIMIT {
            return Err(ServiceError::ValidationError(format!(
                "Limit must be between 1 and {}",
                MAX_LIST_LIMIT
            )));
        }

        let db = self.ledger.db();
        let mut query = GrnHeaderEntity::find().order_by_desc(grn_header::Column::Id);
        if let Some(status) = filter.status {
            query = query.filter(grn_header::Column::Status.eq(status.as_str()));
        }
        if let Some(vendor_id) = filter.vendor_id {
            query = query.filter(grn_header::Column::VendorId.eq(vendor_id));
        }
        if let Some(received_from) = filter.received_from {
            query = query.filter(grn_header::Column::ReceivedDate.gte(received_from));
        }
        if let Some(received_to) = filter.received_to {
            query = query.filter(grn_header::Column::ReceivedDate.lte(received_to));
        }

        let paginator = query.paginate(db, limit);
        let total = paginator
            .num_items()
            .await
            .map_err(ServiceError::DatabaseError)?;
        let headers = paginator
            .fetch_page(page - 1)
            .await
            .map_err(ServiceError::DatabaseError)?;

        Ok((headers, total))
    }

    /// Edits a draft. Any non-draft status rejects the edit outright.
    #[instrument(skip(self, changes))]
    pub async fn update_grn(
        &self,
        grn_id: i64,
        mut changes: UpdateGrn,
    ) -> Result<GrnDetails, ServiceError> {
        if let Some(lines) = &changes.lines {
            validate_lines(lines)?;
        }
        if let Some(vendor_id) = changes.vendor_id {
            if vendor_id <= 0 {
                return Err(ServiceError::ValidationError(
                    "vendor id must be positive".to_string(),
                ));
            }
        }
        if let Some(location) = changes.location.take() {
            changes.location = Some(normalize_location(&location)?);
        }

        let details = with_retry(self.ledger.retry_config(), ConflictRetryPolicy, || {
            let changes = changes.clone();
            async move {
                let db = self.ledger.db();
                let details = db
                    .transaction::<_, GrnDetails, ServiceError>(move |txn| {
                        Box::pin(async move {
                            let header = load_header(txn, grn_id).await?;
                            let status = require_status(&header)?;
                            if !status.is_editable() {
                                return Err(ServiceError::InvalidState(format!(
                                    "GRN {} is {} and can no longer be edited",
                                    header.grn_number, status
                                )));
                            }

                            let (lines, totals) = match &changes.lines {
                                Some(new_lines) => {
                                    let resolved = resolve_lines(txn, new_lines).await?;
                                    GrnLineEntity::delete_many()
                                        .filter(grn_line::Column::GrnId.eq(header.id))
                                        .exec(txn)
                                        .await
                                        .map_err(ServiceError::DatabaseError)?;
                                    let inserted = insert_lines(txn, header.id, &resolved).await?;
                                    (inserted, Some(compute_totals(new_lines)))
                                }
                                None => (load_lines(txn, header.id).await?, None),
                            };

                            let mut active: grn_header::ActiveModel = header.clone().into();
                            if let Some(vendor_id) = changes.vendor_id {
                                active.vendor_id = Set(vendor_id);
                            }
                            if let Some(received_date) = changes.received_date {
                                active.received_date = Set(received_date);
                            }
                            if let Some(location) = &changes.location {
                                active.location = Set(location.clone());
                            }
                            if let Some(invoice_ref) = &changes.vendor_invoice_ref {
                                active.vendor_invoice_ref = Set(Some(invoice_ref.clone()));
                            }
                            if let Some(notes) = &changes.notes {
                                active.notes = Set(Some(notes.clone()));
                            }
                            if let Some(totals) = &totals {
                                active.total_items = Set(totals.total_items);
                                active.subtotal = Set(totals.subtotal);
                                active.gst_amount = Set(totals.gst_amount);
                                active.total_inc_gst = Set(totals.total_inc_gst);
                            }
                            active.version = Set(header.version + 1);
                            active.updated_at = Set(Utc::now().into());

                            let updated = GrnHeaderEntity::update(active)
                                .filter(grn_header::Column::Version.eq(header.version))
                                .exec(txn)
                                .await
                                .map_err(|e| {
                                    version_conflict(e, &format!("GRN {}", header.grn_number))
                                })?;

                            Ok(GrnDetails {
                                header: updated,
                                lines,
                            })
                        })
                    })
                    .await?;
                Ok(details)
            }
        })
        .await?;

        info!("GRN {} updated", details.header.grn_number);

        Ok(details)
    }

    /// Freezes a draft without touching stock. An optional step; posting
    /// is allowed straight from draft.
    #[instrument(skip(self))]
    pub async fn mark_received(
        &self,
        grn_id: i64,
        received_by: Uuid,
    ) -> Result<grn_header::Model, ServiceError> {
        let updated = with_retry(self.ledger.retry_config(), ConflictRetryPolicy, || {
            async move {
                let db = self.ledger.db();
                let updated = db
                    .transaction::<_, grn_header::Model, ServiceError>(move |txn| {
                        Box::pin(async move {
                            let header = load_header(txn, grn_id).await?;
                            let status = require_status(&header)?;
                            if !status.can_mark_received() {
                                return Err(ServiceError::InvalidState(format!(
                                    "GRN {} is {} and cannot be marked received",
                                    header.grn_number, status
                                )));
                            }
                            transition_status(txn, &header, GrnStatus::Received, None, None).await
                        })
                    })
                    .await?;
                Ok(updated)
            }
        })
        .await?;

        if let Err(e) = self
            .event_sender
            .send(Event::GrnReceived {
                grn_id: updated.id,
                grn_number: updated.grn_number.clone(),
            })
            .await
        {
            warn!(error = %e, grn_id = updated.id, "Failed to send GRN received event");
        }

        info!(
            "GRN {} marked received by {}",
            updated.grn_number, received_by
        );

        Ok(updated)
    }

    /// Posts a GRN: every line becomes a receipt movement at the header's
    /// location, in line-number order, atomically with the status change.
    #[instrument(skip(self))]
    pub async fn post_grn(
        &self,
        grn_id: i64,
        posted_by: Uuid,
    ) -> Result<PostGrnResult, ServiceError> {
        let _guards = self.lock_grn_rows(grn_id).await?;

        let (header, applied) = with_retry(self.ledger.retry_config(), ConflictRetryPolicy, || {
            async move {
                let db = self.ledger.db();
                let outcome = db
                    .transaction::<_, (grn_header::Model, Vec<AppliedMovement>), ServiceError>(
                        move |txn| {
                            Box::pin(async move {
                                let header = load_header(txn, grn_id).await?;
                                let status = require_status(&header)?;
                                if !status.can_post() {
                                    return Err(ServiceError::InvalidState(format!(
                                        "GRN {} is {} and cannot be posted",
                                        header.grn_number, status
                                    )));
                                }

                                let lines = load_lines(txn, header.id).await?;
                                if lines.is_empty() {
                                    return Err(ServiceError::InvalidState(format!(
                                        "GRN {} has no lines to post",
                                        header.grn_number
                                    )));
                                }

                                let mut applied = Vec::with_capacity(lines.len());
                                for line in &lines {
                                    let movement = NewMovement {
                                        product_id: line.product_id,
                                        location: header.location.clone(),
                                        movement_type: MovementType::Receipt,
                                        quantity: line.quantity_received,
                                        reference_type: Some(GRN_REFERENCE.to_string()),
                                        reference_number: Some(header.grn_number.clone()),
                                        notes: None,
                                        created_by: posted_by,
                                    };
                                    applied.push(apply_movement(txn, &movement).await?);
                                }

                                let now: DateTimeWithTimeZone = Utc::now().into();
                                let updated = transition_status(
                                    txn,
                                    &header,
                                    GrnStatus::Posted,
                                    Some(now),
                                    None,
                                )
                                .await?;

                                Ok((updated, applied))
                            })
                        },
                    )
                    .await?;
                Ok(outcome)
            }
        })
        .await?;

        LEDGER_METRICS.grns_posted.inc();
        let total_quantity: i64 = applied.iter().map(|a| a.movement.quantity).sum();
        for one in &applied {
            LEDGER_METRICS.movements_recorded.inc();
            self.ledger.publish_movement(one).await;
        }
        if let Err(e) = self
            .event_sender
            .send(Event::GrnPosted {
                grn_id: header.id,
                grn_number: header.grn_number.clone(),
                location: header.location.clone(),
                line_count: applied.len(),
                total_quantity,
                posted_by,
            })
            .await
        {
            warn!(error = %e, grn_id = header.id, "Failed to send GRN posted event");
        }

        info!(
            "GRN {} posted: {} lines, {} units into {}",
            header.grn_number,
            applied.len(),
            total_quantity,
            header.location
        );

        Ok(PostGrnResult {
            header,
            movements: applied.iter().map(MovementResult::from).collect(),
        })
    }

    /// Cancels a GRN. Draft and received documents just change status; a
    /// posted document gets compensating issue movements for every line,
    /// which fail if the received stock is already reserved or gone.
    #[instrument(skip(self))]
    pub async fn cancel_grn(
        &self,
        grn_id: i64,
        reason: Option<String>,
        cancelled_by: Uuid,
    ) -> Result<CancelGrnResult, ServiceError> {
        let _guards = self.lock_grn_rows(grn_id).await?;

        let (header, was_posted, applied) =
            with_retry(self.ledger.retry_config(), ConflictRetryPolicy, || {
                let reason = reason.clone();
                async move {
                    let db = self.ledger.db();
                    let outcome = db
                        .transaction::<_, (grn_header::Model, bool, Vec<AppliedMovement>), ServiceError>(
                            move |txn| {
                                Box::pin(async move {
                                    let header = load_header(txn, grn_id).await?;
                                    let status = require_status(&header)?;
                                    if !status.can_cancel() {
                                        return Err(ServiceError::InvalidState(format!(
                                            "GRN {} is already cancelled",
                                            header.grn_number
                                        )));
                                    }

                                    let was_posted = status == GrnStatus::Posted;
                                    let mut applied = Vec::new();
                                    if was_posted {
                                        let lines = load_lines(txn, header.id).await?;
                                        let notes = Some(reason.unwrap_or_else(|| {
                                            "GRN cancellation reversal".to_string()
                                        }));
                                        for line in &lines {
                                            let movement = NewMovement {
                                                product_id: line.product_id,
                                                location: header.location.clone(),
                                                movement_type: MovementType::Issue,
                                                quantity: line.quantity_received,
                                                reference_type: Some(
                                                    GRN_REVERSAL_REFERENCE.to_string(),
                                                ),
                                                reference_number: Some(header.grn_number.clone()),
                                                notes: notes.clone(),
                                                created_by: cancelled_by,
                                            };
                                            applied.push(apply_movement(txn, &movement).await?);
                                        }
                                    }

                                    let now: DateTimeWithTimeZone = Utc::now().into();
                                    let updated = transition_status(
                                        txn,
                                        &header,
                                        GrnStatus::Cancelled,
                                        None,
                                        Some(now),
                                    )
                                    .await?;

                                    Ok((updated, was_posted, applied))
                                })
                            },
                        )
                        .await?;
                    Ok(outcome)
                }
            })
            .await?;

        LEDGER_METRICS.grns_cancelled.inc();
        for one in &applied {
            LEDGER_METRICS.movements_recorded.inc();
            self.ledger.publish_movement(one).await;
        }
        if let Err(e) = self
            .event_sender
            .send(Event::GrnCancelled {
                grn_id: header.id,
                grn_number: header.grn_number.clone(),
                was_posted,
            })
            .await
        {
            warn!(error = %e, grn_id = header.id, "Failed to send GRN cancelled event");
        }

        info!(
            "GRN {} cancelled ({} reversal movements)",
            header.grn_number,
            applied.len()
        );

        Ok(CancelGrnResult {
            header,
            was_posted,
            reversals: applied.iter().map(MovementResult::from).collect(),
        })
    }

    /// Deletes a draft outright. Anything past draft must be cancelled
    /// instead so the document trail survives.
    #[instrument(skip(self))]
    pub async fn delete_grn(&self, grn_id: i64, deleted_by: Uuid) -> Result<(), ServiceError> {
        let (deleted_id, grn_number) =
            with_retry(self.ledger.retry_config(), ConflictRetryPolicy, || {
                async move {
                    let db = self.ledger.db();
                    let outcome = db
                        .transaction::<_, (i64, String), ServiceError>(move |txn| {
                            Box::pin(async move {
                                let header = load_header(txn, grn_id).await?;
                                let status = require_status(&header)?;
                                if !status.can_delete() {
                                    return Err(ServiceError::InvalidState(format!(
                                        "only draft GRNs can be deleted; GRN {} is {}",
                                        header.grn_number, status
                                    )));
                                }

                                GrnLineEntity::delete_many()
                                    .filter(grn_line::Column::GrnId.eq(header.id))
                                    .exec(txn)
                                    .await
                                    .map_err(ServiceError::DatabaseError)?;

                                let result = GrnHeaderEntity::delete_many()
                                    .filter(grn_header::Column::Id.eq(header.id))
                                    .filter(grn_header::Column::Version.eq(header.version))
                                    .exec(txn)
                                    .await
                                    .map_err(ServiceError::DatabaseError)?;
                                if result.rows_affected == 0 {
                                    LEDGER_METRICS.record_version_conflict();
                                    return Err(ServiceError::ConcurrencyConflict(format!(
                                        "GRN {} changed concurrently",
                                        header.grn_number
                                    )));
                                }

                                Ok((header.id, header.grn_number.clone()))
                            })
                        })
                        .await?;
                    Ok(outcome)
                }
            })
            .await?;

        if let Err(e) = self
            .event_sender
            .send(Event::GrnDeleted {
                grn_id: deleted_id,
                grn_number: grn_number.clone(),
            })
            .await
        {
            warn!(error = %e, grn_id = deleted_id, "Failed to send GRN deleted event");
        }

        info!("Draft GRN {} deleted by {}", grn_number, deleted_by);

        Ok(())
    }

    /// Locks the stock rows a GRN's lines touch, before the transaction
    /// opens. Guards stay held across retries.
    async fn lock_grn_rows(
        &self,
        grn_id: i64,
    ) -> Result<Vec<tokio::sync::OwnedMutexGuard<()>>, ServiceError> {
        let db = self.ledger.db();
        let header = load_header(db, grn_id).await?;
        let lines = load_lines(db, grn_id).await?;

        let keys_owned: Vec<(i64, String)> = lines
            .iter()
            .map(|line| (line.product_id, header.location.clone()))
            .collect();
        let keys: Vec<(i64, &str)> = keys_owned
            .iter()
            .map(|(product_id, location)| (*product_id, location.as_str()))
            .collect();
        Ok(self.ledger.lock_many(&keys).await)
    }
}
