mod common;

use assert_matches::assert_matches;
use common::TestLedger;
use stock_ledger_api::{
    entities::stock_movement::MovementType,
    errors::ServiceError,
    services::stock_reservation::{FulfilStockInput, ReleaseStockInput, ReserveStockInput},
};

fn reserve(ledger: &TestLedger, product_id: i64, quantity: i64) -> ReserveStockInput {
    ReserveStockInput {
        product_id,
        location: "MAIN".to_string(),
        quantity,
        reference_number: Some("SO-100".to_string()),
        created_by: ledger.actor,
    }
}

#[tokio::test]
async fn reserving_holds_stock_without_moving_it() {
    let ledger = TestLedger::new().await;
    let product = ledger.seed_product("WID-001", "Widget").await;
    ledger.receive_stock(product.id, "MAIN", 50).await;

    let result = ledger
        .services
        .reservations
        .reserve_stock(reserve(&ledger, product.id, 20))
        .await
        .expect("reserved");

    assert_eq!(result.quantity, 20);
    assert_eq!(result.new_on_hand, 50);
    assert_eq!(result.new_reserved, 20);
    assert_eq!(result.new_available, 30);

    let level = ledger.stock_level(product.id, "MAIN").await;
    assert_eq!(level.quantity_on_hand, 50);
    assert_eq!(level.quantity_reserved, 20);

    // A hold is not a movement; only the seeding receipt is on the trail.
    assert_eq!(ledger.movements_for(product.id).await.len(), 1);
}

#[tokio::test]
async fn reservations_cannot_exceed_available() {
    let ledger = TestLedger::new().await;
    let product = ledger.seed_product("WID-001", "Widget").await;
    ledger.receive_stock(product.id, "MAIN", 10).await;

    ledger
        .services
        .reservations
        .reserve_stock(reserve(&ledger, product.id, 7))
        .await
        .expect("first hold");

    let err = ledger
        .services
        .reservations
        .reserve_stock(reserve(&ledger, product.id, 4))
        .await
        .expect_err("only 3 available");
    assert_matches!(
        err,
        ServiceError::InsufficientAvailable {
            available: 3,
            requested: 4,
            ..
        }
    );

    let level = ledger.stock_level(product.id, "MAIN").await;
    assert_eq!(level.quantity_reserved, 7);
}

#[tokio::test]
async fn reserving_an_unknown_product_is_not_found() {
    let ledger = TestLedger::new().await;

    let err = ledger
        .services
        .reservations
        .reserve_stock(reserve(&ledger, 9_999, 1))
        .await
        .expect_err("no such product");
    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn reserving_at_an_unstocked_location_reports_zero_available() {
    let ledger = TestLedger::new().await;
    let product = ledger.seed_product("WID-001", "Widget").await;
    ledger.receive_stock(product.id, "MAIN", 50).await;

    let mut input = reserve(&ledger, product.id, 5);
    input.location = "OVERFLOW".to_string();
    let err = ledger
        .services
        .reservations
        .reserve_stock(input)
        .await
        .expect_err("nothing stocked there");
    assert_matches!(
        err,
        ServiceError::InsufficientAvailable {
            available: 0,
            requested: 5,
            ..
        }
    );
}

#[tokio::test]
async fn release_clamps_to_what_is_held() {
    let ledger = TestLedger::new().await;
    let product = ledger.seed_product("WID-001", "Widget").await;
    ledger.receive_stock(product.id, "MAIN", 10).await;
    ledger
        .services
        .reservations
        .reserve_stock(reserve(&ledger, product.id, 6))
        .await
        .expect("reserved");

    let result = ledger
        .services
        .reservations
        .release_stock(ReleaseStockInput {
            product_id: product.id,
            location: "MAIN".to_string(),
            quantity: 10,
            created_by: ledger.actor,
        })
        .await
        .expect("released");

    // Only the 6 actually held come back.
    assert_eq!(result.quantity, 6);
    assert_eq!(result.new_reserved, 0);
    assert_eq!(result.new_available, 10);
}

#[tokio::test]
async fn releasing_from_an_unreserved_row_is_a_no_op() {
    let ledger = TestLedger::new().await;
    let product = ledger.seed_product("WID-001", "Widget").await;
    ledger.receive_stock(product.id, "MAIN", 10).await;

    let result = ledger
        .services
        .reservations
        .release_stock(ReleaseStockInput {
            product_id: product.id,
            location: "MAIN".to_string(),
            quantity: 5,
            created_by: ledger.actor,
        })
        .await
        .expect("no-op release");

    assert_eq!(result.quantity, 0);
    assert_eq!(result.new_reserved, 0);
    assert_eq!(result.new_on_hand, 10);
}

#[tokio::test]
async fn releasing_with_no_balance_row_is_not_found() {
    let ledger = TestLedger::new().await;
    let product = ledger.seed_product("WID-001", "Widget").await;

    let err = ledger
        .services
        .reservations
        .release_stock(ReleaseStockInput {
            product_id: product.id,
            location: "MAIN".to_string(),
            quantity: 5,
            created_by: ledger.actor,
        })
        .await
        .expect_err("no balance row");
    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn fulfilment_ships_reserved_stock() {
    let ledger = TestLedger::new().await;
    let product = ledger.seed_product("WID-001", "Widget").await;
    ledger.receive_stock(product.id, "MAIN", 10).await;
    ledger
        .services
        .reservations
        .reserve_stock(reserve(&ledger, product.id, 6))
        .await
        .expect("reserved");

    let result = ledger
        .services
        .reservations
        .fulfil_stock(FulfilStockInput {
            product_id: product.id,
            location: "MAIN".to_string(),
            quantity: 4,
            reference_number: Some("SO-100".to_string()),
            created_by: ledger.actor,
        })
        .await
        .expect("fulfilled");

    assert_eq!(result.movement_type, MovementType::Issue);
    assert_eq!(result.quantity, 4);
    assert_eq!(result.quantity_before, 10);
    assert_eq!(result.new_on_hand, 6);
    assert_eq!(result.new_reserved, 2);
    assert_eq!(result.new_available, 4);

    let trail = ledger.movements_for(product.id).await;
    assert_eq!(trail.len(), 2);
    let shipment = &trail[1];
    assert_eq!(shipment.movement_type, "issue");
    assert_eq!(shipment.reference_type.as_deref(), Some("FULFILMENT"));
    assert_eq!(shipment.reference_number.as_deref(), Some("SO-100"));
}

#[tokio::test]
async fn fulfilment_cannot_exceed_the_reservation() {
    let ledger = TestLedger::new().await;
    let product = ledger.seed_product("WID-001", "Widget").await;
    ledger.receive_stock(product.id, "MAIN", 10).await;
    ledger
        .services
        .reservations
        .reserve_stock(reserve(&ledger, product.id, 3))
        .await
        .expect("reserved");

    let err = ledger
        .services
        .reservations
        .fulfil_stock(FulfilStockInput {
            product_id: product.id,
            location: "MAIN".to_string(),
            quantity: 5,
            reference_number: None,
            created_by: ledger.actor,
        })
        .await
        .expect_err("only 3 reserved");
    assert_matches!(err, ServiceError::InvalidQuantity(_));

    let level = ledger.stock_level(product.id, "MAIN").await;
    assert_eq!(level.quantity_on_hand, 10);
    assert_eq!(level.quantity_reserved, 3);
}

#[tokio::test]
async fn quantities_must_be_positive() {
    let ledger = TestLedger::new().await;
    let product = ledger.seed_product("WID-001", "Widget").await;
    ledger.receive_stock(product.id, "MAIN", 10).await;

    let err = ledger
        .services
        .reservations
        .reserve_stock(reserve(&ledger, product.id, 0))
        .await
        .expect_err("zero reservation");
    assert_matches!(err, ServiceError::InvalidQuantity(_));

    let err = ledger
        .services
        .reservations
        .release_stock(ReleaseStockInput {
            product_id: product.id,
            location: "MAIN".to_string(),
            quantity: -2,
            created_by: ledger.actor,
        })
        .await
        .expect_err("negative release");
    assert_matches!(err, ServiceError::InvalidQuantity(_));

    let err = ledger
        .services
        .reservations
        .fulfil_stock(FulfilStockInput {
            product_id: product.id,
            location: "MAIN".to_string(),
            quantity: 0,
            reference_number: None,
            created_by: ledger.actor,
        })
        .await
        .expect_err("zero fulfilment");
    assert_matches!(err, ServiceError::InvalidQuantity(_));
}
