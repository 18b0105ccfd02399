mod common;

use assert_matches::assert_matches;
use common::TestLedger;
use stock_ledger_api::{
    entities::stock_movement::MovementType,
    errors::ServiceError,
    services::{
        stock_reservation::ReserveStockInput, stock_transfer::TransferStockInput,
    },
};

fn transfer(ledger: &TestLedger, product_id: i64, quantity: i64) -> TransferStockInput {
    TransferStockInput {
        product_id,
        from_location: "MAIN".to_string(),
        to_location: "OVERFLOW".to_string(),
        quantity,
        notes: None,
        created_by: ledger.actor,
    }
}

#[tokio::test]
async fn a_transfer_moves_stock_between_locations() {
    let ledger = TestLedger::new().await;
    let product = ledger.seed_product("WID-001", "Widget").await;
    ledger.receive_stock(product.id, "MAIN", 40).await;

    let result = ledger
        .services
        .transfers
        .transfer_stock(transfer(&ledger, product.id, 15))
        .await
        .expect("transferred");

    assert_eq!(result.reference_number, "XFER-000001");
    assert_eq!(result.quantity, 15);
    assert_eq!(result.outbound.movement_type, MovementType::TransferOut);
    assert_eq!(result.outbound.new_on_hand, 25);
    assert_eq!(result.inbound.movement_type, MovementType::TransferIn);
    assert_eq!(result.inbound.new_on_hand, 15);

    let source = ledger.stock_level(product.id, "MAIN").await;
    assert_eq!(source.quantity_on_hand, 25);
    let destination = ledger.stock_level(product.id, "OVERFLOW").await;
    assert_eq!(destination.quantity_on_hand, 15);

    // Receipt plus the two legs, newest last, sharing one reference.
    let trail = ledger.movements_for(product.id).await;
    assert_eq!(trail.len(), 3);
    let outbound = &trail[1];
    let inbound = &trail[2];
    assert_eq!(outbound.movement_type, "transfer_out");
    assert_eq!(outbound.location, "MAIN");
    assert_eq!(inbound.movement_type, "transfer_in");
    assert_eq!(inbound.location, "OVERFLOW");
    for leg in [outbound, inbound] {
        assert_eq!(leg.reference_type.as_deref(), Some("TRANSFER"));
        assert_eq!(leg.reference_number.as_deref(), Some("XFER-000001"));
    }
}

#[tokio::test]
async fn transfer_numbers_increment_per_transfer() {
    let ledger = TestLedger::new().await;
    let product = ledger.seed_product("WID-001", "Widget").await;
    ledger.receive_stock(product.id, "MAIN", 40).await;

    let first = ledger
        .services
        .transfers
        .transfer_stock(transfer(&ledger, product.id, 5))
        .await
        .expect("first transfer");
    let second = ledger
        .services
        .transfers
        .transfer_stock(transfer(&ledger, product.id, 5))
        .await
        .expect("second transfer");

    assert_eq!(first.reference_number, "XFER-000001");
    assert_eq!(second.reference_number, "XFER-000002");
}

#[tokio::test]
async fn a_location_cannot_transfer_to_itself() {
    let ledger = TestLedger::new().await;
    let product = ledger.seed_product("WID-001", "Widget").await;
    ledger.receive_stock(product.id, "MAIN", 40).await;

    let mut input = transfer(&ledger, product.id, 5);
    input.to_location = "MAIN".to_string();
    let err = ledger
        .services
        .transfers
        .transfer_stock(input)
        .await
        .expect_err("self transfer");
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn reserved_stock_cannot_leave_its_location() {
    let ledger = TestLedger::new().await;
    let product = ledger.seed_product("WID-001", "Widget").await;
    ledger.receive_stock(product.id, "MAIN", 10).await;
    ledger
        .services
        .reservations
        .reserve_stock(ReserveStockInput {
            product_id: product.id,
            location: "MAIN".to_string(),
            quantity: 8,
            reference_number: Some("SO-100".to_string()),
            created_by: ledger.actor,
        })
        .await
        .expect("reserved");

    let err = ledger
        .services
        .transfers
        .transfer_stock(transfer(&ledger, product.id, 5))
        .await
        .expect_err("only 2 unreserved");
    assert_matches!(
        err,
        ServiceError::BelowReserved {
            on_hand: 10,
            reserved: 8,
            requested: 5,
            ..
        }
    );

    // The failed outbound leg aborted the whole transfer; the source is
    // unchanged and the destination row was never created.
    let source = ledger.stock_level(product.id, "MAIN").await;
    assert_eq!(source.quantity_on_hand, 10);
    assert_eq!(ledger.movements_for(product.id).await.len(), 1);
}

#[tokio::test]
async fn transferring_an_unknown_product_is_not_found() {
    let ledger = TestLedger::new().await;

    let err = ledger
        .services
        .transfers
        .transfer_stock(transfer(&ledger, 9_999, 5))
        .await
        .expect_err("no such product");
    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn transfer_quantities_must_be_positive() {
    let ledger = TestLedger::new().await;
    let product = ledger.seed_product("WID-001", "Widget").await;

    let err = ledger
        .services
        .transfers
        .transfer_stock(transfer(&ledger, product.id, 0))
        .await
        .expect_err("zero quantity");
    assert_matches!(err, ServiceError::InvalidQuantity(_));

    let err = ledger
        .services
        .transfers
        .transfer_stock(transfer(&ledger, product.id, -5))
        .await
        .expect_err("negative quantity");
    assert_matches!(err, ServiceError::InvalidQuantity(_));
}
