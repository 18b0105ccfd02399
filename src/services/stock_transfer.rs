//! Location-to-location stock transfers.
//!
//! A transfer is a pair of movements sharing one reference number: an
//! outbound leg at the source and an inbound leg at the destination,
//! written in a single transaction so stock never exists in two places
//! or in neither.

use std::sync::Arc;

use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder, TransactionTrait};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::stock_movement::{self, Entity as StockMovementEntity, MovementType};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::metrics::LEDGER_METRICS;
use crate::middleware_helpers::{with_retry, ConflictRetryPolicy};
use crate::services::stock_ledger::{
    apply_movement, normalize_location, AppliedMovement, MovementResult, NewMovement,
    StockLedgerService,
};

const TRANSFER_REFERENCE: &str = "TRANSFER";
const TRANSFER_NUMBER_PREFIX: &str = "XFER-";

/// Movement of stock between two locations of the same product.
#[derive(Debug, Clone)]
pub struct TransferStockInput {
    pub product_id: i64,
    pub from_location: String,
    pub to_location: String,
    pub quantity: i64,
    pub notes: Option<String>,
    pub created_by: Uuid,
}

/// Both legs of a completed transfer.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TransferResult {
    pub reference_number: String,
    pub product_id: i64,
    pub from_location: String,
    pub to_location: String,
    pub quantity: i64,
    pub outbound: MovementResult,
    pub inbound: MovementResult,
}

/// Both legs of a transfer carry the same generated number, so the
/// movement table itself cannot enforce uniqueness. Numbers come from a
/// max-scan guarded by this service's mutex; a deployment with several
/// writer processes needs a database sequence instead.
fn next_transfer_number(last: Option<&str>) -> String {
    let next = last
        .and_then(|number| number.strip_prefix(TRANSFER_NUMBER_PREFIX))
        .and_then(|digits| digits.parse::<u64>().ok())
        .map_or(1, |n| n + 1);
    format!("{}{:06}", TRANSFER_NUMBER_PREFIX, next)
}

#[derive(Clone)]
pub struct StockTransferService {
    ledger: Arc<StockLedgerService>,
    event_sender: Arc<EventSender>,
    numbering: Arc<Mutex<()>>,
}

impl StockTransferService {
    pub fn new(ledger: Arc<StockLedgerService>, event_sender: Arc<EventSender>) -> Self {
        Self {
            ledger,
            event_sender,
            numbering: Arc::new(Mutex::new(())),
        }
    }

    /// Moves stock between locations. The outbound leg is applied first,
    /// so a source short of unreserved stock rejects the transfer before
    /// the destination is touched.
    #[instrument(skip(self, input))]
    pub async fn transfer_stock(
        &self,
        mut input: TransferStockInput,
    ) -> Result<TransferResult, ServiceError> {
        if input.quantity <= 0 {
            return Err(ServiceError::InvalidQuantity(format!(
                "transfer quantity must be positive, got {}",
                input.quantity
            )));
        }
        input.from_location = normalize_location(&input.from_location)?;
        input.to_location = normalize_location(&input.to_location)?;
        if input.from_location == input.to_location {
            return Err(ServiceError::ValidationError(format!(
                "cannot transfer product {} from location '{}' to itself",
                input.product_id, input.from_location
            )));
        }

        // Stock-row guards first, numbering guard second. Every caller
        // acquires in this order.
        let _row_guards = self
            .ledger
            .lock_many(&[
                (input.product_id, input.from_location.as_str()),
                (input.product_id, input.to_location.as_str()),
            ])
            .await;
        let _numbering_guard = self.numbering.lock().await;

        let (reference_number, outbound, inbound) =
            with_retry(self.ledger.retry_config(), ConflictRetryPolicy, || {
                let input = input.clone();
                async move {
                    let db = self.ledger.db();
                    let outcome = db
                        .transaction::<_, (String, AppliedMovement, AppliedMovement), ServiceError>(
                            move |txn| {
                                Box::pin(async move {
                                    let last = StockMovementEntity::find()
                                        .filter(
                                            stock_movement::Column::ReferenceType
                                                .eq(TRANSFER_REFERENCE),
                                        )
                                        .order_by_desc(stock_movement::Column::Id)
                                        .one(txn)
                                        .await
                                        .map_err(ServiceError::DatabaseError)?;
                                    let reference_number = next_transfer_number(
                                        last.as_ref().and_then(|m| m.reference_number.as_deref()),
                                    );

                                    let outbound = apply_movement(
                                        txn,
                                        &NewMovement {
                                            product_id: input.product_id,
                                            location: input.from_location.clone(),
                                            movement_type: MovementType::TransferOut,
                                            quantity: input.quantity,
                                            reference_type: Some(TRANSFER_REFERENCE.to_string()),
                                            reference_number: Some(reference_number.clone()),
                                            notes: input.notes.clone(),
                                            created_by: input.created_by,
                                        },
                                    )
                                    .await?;

                                    let inbound = apply_movement(
                                        txn,
                                        &NewMovement {
                                            product_id: input.product_id,
                                            location: input.to_location.clone(),
                                            movement_type: MovementType::TransferIn,
                                            quantity: input.quantity,
                                            reference_type: Some(TRANSFER_REFERENCE.to_string()),
                                            reference_number: Some(reference_number.clone()),
                                            notes: input.notes.clone(),
                                            created_by: input.created_by,
                                        },
                                    )
                                    .await?;

                                    Ok((reference_number, outbound, inbound))
                                })
                            },
                        )
                        .await?;
                    Ok(outcome)
                }
            })
            .await?;

        LEDGER_METRICS.transfers_completed.inc();
        for leg in [&outbound, &inbound] {
            LEDGER_METRICS.movements_recorded.inc();
            self.ledger.publish_movement(leg).await;
        }
        if let Err(e) = self
            .event_sender
            .send(Event::StockTransferred {
                product_id: input.product_id,
                from_location: input.from_location.clone(),
                to_location: input.to_location.clone(),
                quantity: input.quantity,
                reference_number: reference_number.clone(),
            })
            .await
        {
            warn!(error = %e, product_id = input.product_id, "Failed to send stock transferred event");
        }

        info!(
            "Transfer {}: {} units of product {} from {} to {}",
            reference_number, input.quantity, input.product_id, input.from_location,
            input.to_location
        );

        Ok(TransferResult {
            reference_number,
            product_id: input.product_id,
            from_location: input.from_location,
            to_location: input.to_location,
            quantity: input.quantity,
            outbound: MovementResult::from(&outbound),
            inbound: MovementResult::from(&inbound),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_numbers_increment_from_last() {
        assert_eq!(next_transfer_number(None), "XFER-000001");
        assert_eq!(next_transfer_number(Some("XFER-000007")), "XFER-000008");
        assert_eq!(next_transfer_number(Some("XFER-999999")), "XFER-1000000");
    }

    #[test]
    fn unparseable_last_number_restarts_sequence() {
        assert_eq!(next_transfer_number(Some("TR-5")), "XFER-000001");
        assert_eq!(next_transfer_number(Some("XFER-")), "XFER-000001");
    }
}
