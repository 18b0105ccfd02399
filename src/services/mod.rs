// Ledger core
pub mod stock_ledger;

// Operator workflows over the movement primitive
pub mod goods_receipt;
pub mod stock_adjustment;
pub mod stock_reservation;
pub mod stock_transfer;

// Read-only reporting facade
pub mod stock_queries;

use std::sync::Arc;

use crate::db::DbPool;
use crate::events::EventSender;

use goods_receipt::GoodsReceiptService;
use stock_adjustment::StockAdjustmentService;
use stock_ledger::StockLedgerService;
use stock_queries::StockQueryService;
use stock_reservation::StockReservationService;
use stock_transfer::StockTransferService;

/// Service container holding all service instances.
///
/// Every writing service shares the one ledger instance, so they contend
/// on the same lock registry and follow the same retry settings.
#[derive(Clone)]
pub struct AppServices {
    pub ledger: Arc<StockLedgerService>,
    pub adjustments: Arc<StockAdjustmentService>,
    pub receipts: Arc<GoodsReceiptService>,
    pub reservations: Arc<StockReservationService>,
    pub transfers: Arc<StockTransferService>,
    pub queries: Arc<StockQueryService>,
}

impl AppServices {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        let ledger = Arc::new(StockLedgerService::new(
            db_pool.clone(),
            event_sender.clone(),
        ));

        Self {
            adjustments: Arc::new(StockAdjustmentService::new(
                ledger.clone(),
                event_sender.clone(),
            )),
            receipts: Arc::new(GoodsReceiptService::new(
                ledger.clone(),
                event_sender.clone(),
            )),
            reservations: Arc::new(StockReservationService::new(
                ledger.clone(),
                event_sender.clone(),
            )),
            transfers: Arc::new(StockTransferService::new(ledger.clone(), event_sender)),
            queries: Arc::new(StockQueryService::new(db_pool)),
            ledger,
        }
    }
}
