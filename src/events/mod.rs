use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::entities::stock_movement::MovementType;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

// Define the various events that can occur in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Ledger events
    MovementRecorded {
        movement_id: i64,
        product_id: i64,
        location: String,
        movement_type: MovementType,
        quantity: i64,
        quantity_after: i64,
    },
    StockAdjusted {
        product_id: i64,
        location: String,
        quantity_change: i64,
        new_on_hand: i64,
        reason: String,
    },
    StockTakeRecorded {
        product_id: i64,
        location: String,
        counted_quantity: i64,
        variance: i64,
    },
    StockReturned {
        product_id: i64,
        location: String,
        quantity: i64,
        reference_number: Option<String>,
    },
    StockTransferred {
        product_id: i64,
        from_location: String,
        to_location: String,
        quantity: i64,
        reference_number: String,
    },

    // Reservation events
    StockReserved {
        product_id: i64,
        location: String,
        quantity: i64,
        reference_number: Option<String>,
    },
    StockReleased {
        product_id: i64,
        location: String,
        quantity: i64,
    },
    StockFulfilled {
        product_id: i64,
        location: String,
        quantity: i64,
    },

    // Goods receipt events
    GrnCreated {
        grn_id: i64,
        grn_number: String,
    },
    GrnReceived {
        grn_id: i64,
        grn_number: String,
    },
    GrnPosted {
        grn_id: i64,
        grn_number: String,
        location: String,
        line_count: usize,
        total_quantity: i64,
        posted_by: Uuid,
    },
    GrnCancelled {
        grn_id: i64,
        grn_number: String,
        was_posted: bool,
    },
    GrnDeleted {
        grn_id: i64,
        grn_number: String,
    },

    // Replenishment events
    LowStockDetected {
        product_id: i64,
        location: String,
        available: i64,
        reorder_level: i64,
        reorder_quantity: i64,
    },
}

// Function to process incoming events and log or forward them as needed.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match event {
            Event::MovementRecorded {
                movement_id,
                product_id,
                location,
                movement_type,
                quantity,
                quantity_after,
            } => {
                info!(
                    "Movement {} recorded: {} x{} for product {} at {}, on hand now {}",
                    movement_id, movement_type, quantity, product_id, location, quantity_after
                );
            }
            Event::StockAdjusted {
                product_id,
                location,
                quantity_change,
                new_on_hand,
                reason,
            } => {
                if let Err(e) = handle_stock_adjusted(
                    product_id,
                    &location,
                    quantity_change,
                    new_on_hand,
                    &reason,
                )
                .await
                {
                    error!(
                        "Failed to handle stock adjustment: product_id={}, error={}",
                        product_id, e
                    );
                }
            }
            Event::StockTakeRecorded {
                product_id,
                location,
                counted_quantity,
                variance,
            } => {
                if variance == 0 {
                    info!(
                        "Stock take for product {} at {} matched the ledger at {}",
                        product_id, location, counted_quantity
                    );
                } else {
                    warn!(
                        "Stock take variance for product {} at {}: counted {}, variance {}",
                        product_id, location, counted_quantity, variance
                    );
                }
            }
            Event::StockReturned {
                product_id,
                location,
                quantity,
                reference_number,
            } => {
                info!(
                    "Return of {} units of product {} at {} (reference {:?})",
                    quantity, product_id, location, reference_number
                );
            }
            Event::StockTransferred {
                product_id,
                from_location,
                to_location,
                quantity,
                reference_number,
            } => {
                info!(
                    "Transferred {} units of product {} from {} to {} under {}",
                    quantity, product_id, from_location, to_location, reference_number
                );
            }
            Event::StockReserved {
                product_id,
                location,
                quantity,
                reference_number,
            } => {
                info!(
                    "Reserved {} units of product {} at {} (reference {:?})",
                    quantity, product_id, location, reference_number
                );
            }
            Event::StockReleased {
                product_id,
                location,
                quantity,
            } => {
                info!(
                    "Released {} reserved units of product {} at {}",
                    quantity, product_id, location
                );
            }
            Event::StockFulfilled {
                product_id,
                location,
                quantity,
            } => {
                info!(
                    "Fulfilled {} reserved units of product {} at {}",
                    quantity, product_id, location
                );
            }
            Event::GrnCreated { grn_id, grn_number } => {
                info!("GRN {} created with id {}", grn_number, grn_id);
            }
            Event::GrnReceived { grn_id, grn_number } => {
                info!("GRN {} (id {}) marked received", grn_number, grn_id);
            }
            Event::GrnPosted {
                grn_id,
                grn_number,
                location,
                line_count,
                total_quantity,
                posted_by,
            } => {
                if let Err(e) = handle_grn_posted(
                    grn_id,
                    &grn_number,
                    &location,
                    line_count,
                    total_quantity,
                    posted_by,
                )
                .await
                {
                    error!("Failed to handle GRN posted: grn_id={}, error={}", grn_id, e);
                }
            }
            Event::GrnCancelled {
                grn_id,
                grn_number,
                was_posted,
            } => {
                if was_posted {
                    warn!(
                        "Posted GRN {} (id {}) cancelled; receipt movements were reversed",
                        grn_number, grn_id
                    );
                } else {
                    info!("GRN {} (id {}) cancelled before posting", grn_number, grn_id);
                }
            }
            Event::GrnDeleted { grn_id, grn_number } => {
                info!("Draft GRN {} (id {}) deleted", grn_number, grn_id);
            }
            Event::LowStockDetected {
                product_id,
                location,
                available,
                reorder_level,
                reorder_quantity,
            } => {
                if let Err(e) = handle_low_stock_detected(
                    product_id,
                    &location,
                    available,
                    reorder_level,
                    reorder_quantity,
                )
                .await
                {
                    error!(
                        "Failed to handle low stock alert: product_id={}, error={}",
                        product_id, e
                    );
                }
            }
        }
    }

    warn!("Event processing loop has ended");
}

// Handler functions for specific events
async fn handle_stock_adjusted(
    product_id: i64,
    location: &str,
    quantity_change: i64,
    new_on_hand: i64,
    reason: &str,
) -> Result<(), String> {
    info!(
        "Processing stock adjustment: product={}, location={}, change={}, on_hand={}, reason={}",
        product_id, location, quantity_change, new_on_hand, reason
    );

    if quantity_change < 0 {
        warn!(
            "Stock written down: {} units of product {} at {} ({})",
            quantity_change.abs(),
            product_id,
            location,
            reason
        );
    }

    Ok(())
}

async fn handle_grn_posted(
    grn_id: i64,
    grn_number: &str,
    location: &str,
    line_count: usize,
    total_quantity: i64,
    posted_by: Uuid,
) -> Result<(), String> {
    info!(
        "GRN {} (id {}) posted at {}: {} lines, {} units received, posted by {}",
        grn_number, grn_id, location, line_count, total_quantity, posted_by
    );

    Ok(())
}

async fn handle_low_stock_detected(
    product_id: i64,
    location: &str,
    available: i64,
    reorder_level: i64,
    reorder_quantity: i64,
) -> Result<(), String> {
    warn!(
        "LOW STOCK: product {} at {} has {} available (reorder level {})",
        product_id, location, available, reorder_level
    );

    if reorder_quantity > 0 {
        info!(
            "Suggested replenishment for product {} at {}: order {} units",
            product_id, location, reorder_quantity
        );
    }

    Ok(())
}
