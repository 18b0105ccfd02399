mod common;

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use common::TestLedger;
use stock_ledger_api::{
    entities::stock_movement::MovementType,
    errors::ServiceError,
    services::{
        stock_adjustment::{AdjustStockInput, ReorderLevelInput},
        stock_queries::MovementHistoryFilter,
        stock_reservation::ReserveStockInput,
        stock_transfer::TransferStockInput,
    },
};

async fn hold(ledger: &TestLedger, product_id: i64, location: &str, quantity: i64) {
    ledger
        .services
        .reservations
        .reserve_stock(ReserveStockInput {
            product_id,
            location: location.to_string(),
            quantity,
            reference_number: None,
            created_by: ledger.actor,
        })
        .await
        .expect("reserved");
}

#[tokio::test]
async fn balance_lookup_distinguishes_missing_product_from_missing_row() {
    let ledger = TestLedger::new().await;
    let product = ledger.seed_product("WID-001", "Widget").await;
    ledger.receive_stock(product.id, "MAIN", 10).await;

    let unknown = ledger
        .services
        .queries
        .get_stock_level(9_999, "MAIN")
        .await
        .expect_err("no such product");
    assert_matches!(unknown, ServiceError::NotFound(message) => {
        assert!(message.contains("Product"), "unexpected message: {}", message);
    });

    let unstocked = ledger
        .services
        .queries
        .get_stock_level(product.id, "OVERFLOW")
        .await
        .expect_err("no activity there");
    assert_matches!(unstocked, ServiceError::NotFound(message) => {
        assert!(message.contains("No stock level"), "unexpected message: {}", message);
    });
}

#[tokio::test]
async fn balance_lookup_joins_the_catalog() {
    let ledger = TestLedger::new().await;
    let product = ledger.seed_product("WID-001", "Widget").await;
    ledger.receive_stock(product.id, "MAIN", 40).await;
    hold(&ledger, product.id, "MAIN", 15).await;

    let view = ledger
        .services
        .queries
        .get_stock_level(product.id, "MAIN")
        .await
        .expect("found");

    assert_eq!(view.sku, "WID-001");
    assert_eq!(view.product_name, "Widget");
    assert_eq!(view.quantity_on_hand, 40);
    assert_eq!(view.quantity_reserved, 15);
    assert_eq!(view.available, 25);
}

#[tokio::test]
async fn listing_pages_in_product_and_location_order() {
    let ledger = TestLedger::new().await;
    let first = ledger.seed_product("AAA-001", "Anvil").await;
    let second = ledger.seed_product("BBB-001", "Bolt").await;
    let third = ledger.seed_product("CCC-001", "Clamp").await;

    ledger.receive_stock(first.id, "MAIN", 10).await;
    ledger.receive_stock(first.id, "OVERFLOW", 5).await;
    ledger.receive_stock(second.id, "MAIN", 20).await;
    ledger.receive_stock(third.id, "MAIN", 30).await;
    ledger.receive_stock(third.id, "OVERFLOW", 15).await;

    let (page_one, total) = ledger
        .services
        .queries
        .list_stock_levels(1, 2, None, None)
        .await
        .expect("first page");
    assert_eq!(total, 5);
    assert_eq!(page_one.len(), 2);
    assert_eq!(page_one[0].sku, "AAA-001");
    assert_eq!(page_one[0].location, "MAIN");
    assert_eq!(page_one[1].location, "OVERFLOW");

    let (last_page, _) = ledger
        .services
        .queries
        .list_stock_levels(3, 2, None, None)
        .await
        .expect("last page");
    assert_eq!(last_page.len(), 1);
    assert_eq!(last_page[0].sku, "CCC-001");

    let (main_only, main_total) = ledger
        .services
        .queries
        .list_stock_levels(1, 20, Some("MAIN".to_string()), None)
        .await
        .expect("location filter");
    assert_eq!(main_total, 3);
    assert!(main_only.iter().all(|view| view.location == "MAIN"));

    let (one_product, product_total) = ledger
        .services
        .queries
        .list_stock_levels(1, 20, None, Some(third.id))
        .await
        .expect("product filter");
    assert_eq!(product_total, 2);
    assert!(one_product.iter().all(|view| view.product_id == third.id));
}

#[tokio::test]
async fn paging_bounds_are_rejected() {
    let ledger = TestLedger::new().await;

    let err = ledger
        .services
        .queries
        .list_stock_levels(0, 10, None, None)
        .await
        .expect_err("page zero");
    assert_matches!(err, ServiceError::ValidationError(_));

    let err = ledger
        .services
        .queries
        .list_stock_levels(1, 0, None, None)
        .await
        .expect_err("limit zero");
    assert_matches!(err, ServiceError::ValidationError(_));

    let err = ledger
        .services
        .queries
        .movement_history(1, 1_001, MovementHistoryFilter::default())
        .await
        .expect_err("limit above the cap");
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn low_stock_tracks_availability_not_on_hand() {
    let ledger = TestLedger::new().await;
    let watched = ledger.seed_product("WID-001", "Widget").await;
    let unwatched = ledger.seed_product("GAD-001", "Gadget").await;

    ledger.receive_stock(watched.id, "MAIN", 20).await;
    ledger
        .services
        .adjustments
        .set_reorder_levels(ReorderLevelInput {
            product_id: watched.id,
            location: "MAIN".to_string(),
            reorder_level: 5,
            reorder_quantity: 50,
            updated_by: ledger.actor,
        })
        .await
        .expect("threshold set");

    // Plenty available; nothing to report yet.
    let report = ledger
        .services
        .queries
        .low_stock(None)
        .await
        .expect("report");
    assert!(report.is_empty());

    // Reservations eat into availability without moving stock.
    hold(&ledger, watched.id, "MAIN", 16).await;
    let report = ledger
        .services
        .queries
        .low_stock(None)
        .await
        .expect("report");
    assert_eq!(report.len(), 1);
    assert_eq!(report[0].product_id, watched.id);
    assert_eq!(report[0].available, 4);

    // A nearly empty row with the threshold disabled stays silent.
    ledger.receive_stock(unwatched.id, "MAIN", 2).await;
    let report = ledger
        .services
        .queries
        .low_stock(None)
        .await
        .expect("report");
    assert_eq!(report.len(), 1);

    let elsewhere = ledger
        .services
        .queries
        .low_stock(Some("OVERFLOW".to_string()))
        .await
        .expect("report");
    assert!(elsewhere.is_empty());
}

#[tokio::test]
async fn out_of_stock_includes_fully_reserved_rows() {
    let ledger = TestLedger::new().await;
    let promised = ledger.seed_product("WID-001", "Widget").await;
    let healthy = ledger.seed_product("GAD-001", "Gadget").await;
    let emptied = ledger.seed_product("CLA-001", "Clamp").await;

    ledger.receive_stock(promised.id, "MAIN", 10).await;
    hold(&ledger, promised.id, "MAIN", 10).await;

    ledger.receive_stock(healthy.id, "MAIN", 10).await;
    hold(&ledger, healthy.id, "MAIN", 3).await;

    ledger.receive_stock(emptied.id, "MAIN", 5).await;
    ledger
        .services
        .adjustments
        .adjust_stock(AdjustStockInput {
            product_id: emptied.id,
            location: "MAIN".to_string(),
            quantity_change: -5,
            reason: "written off after water damage".to_string(),
            created_by: ledger.actor,
        })
        .await
        .expect("written down");

    let report = ledger
        .services
        .queries
        .out_of_stock(None)
        .await
        .expect("report");
    assert_eq!(report.len(), 2);
    assert_eq!(report[0].product_id, promised.id);
    assert_eq!(report[0].available, 0);
    assert_eq!(report[1].product_id, emptied.id);
    assert_eq!(report[1].quantity_on_hand, 0);
}

#[tokio::test]
async fn movement_history_pages_newest_first() {
    let ledger = TestLedger::new().await;
    let product = ledger.seed_product("WID-001", "Widget").await;
    ledger.receive_stock(product.id, "MAIN", 10).await;
    ledger.receive_stock(product.id, "MAIN", 20).await;
    ledger.receive_stock(product.id, "MAIN", 30).await;

    let (first_page, total) = ledger
        .services
        .queries
        .movement_history(1, 2, MovementHistoryFilter::default())
        .await
        .expect("first page");
    assert_eq!(total, 3);
    assert_eq!(first_page.len(), 2);
    assert_eq!(first_page[0].quantity, 30);
    assert_eq!(first_page[1].quantity, 20);

    let (second_page, _) = ledger
        .services
        .queries
        .movement_history(2, 2, MovementHistoryFilter::default())
        .await
        .expect("second page");
    assert_eq!(second_page.len(), 1);
    assert_eq!(second_page[0].quantity, 10);
}

#[tokio::test]
async fn movement_history_filters_compose() {
    let ledger = TestLedger::new().await;
    let widget = ledger.seed_product("WID-001", "Widget").await;
    let gadget = ledger.seed_product("GAD-001", "Gadget").await;

    ledger.receive_stock(widget.id, "MAIN", 50).await;
    ledger.receive_stock(gadget.id, "MAIN", 30).await;
    ledger
        .services
        .transfers
        .transfer_stock(TransferStockInput {
            product_id: widget.id,
            from_location: "MAIN".to_string(),
            to_location: "OVERFLOW".to_string(),
            quantity: 10,
            notes: None,
            created_by: ledger.actor,
        })
        .await
        .expect("transferred");

    let (receipts, receipt_total) = ledger
        .services
        .queries
        .movement_history(
            1,
            20,
            MovementHistoryFilter {
                product_id: Some(widget.id),
                movement_type: Some(MovementType::Receipt),
                ..Default::default()
            },
        )
        .await
        .expect("receipts for one product");
    assert_eq!(receipt_total, 1);
    assert_eq!(receipts[0].quantity, 50);

    let (legs, leg_total) = ledger
        .services
        .queries
        .movement_history(
            1,
            20,
            MovementHistoryFilter {
                reference_number: Some("XFER-000001".to_string()),
                ..Default::default()
            },
        )
        .await
        .expect("transfer legs by reference");
    assert_eq!(leg_total, 2);
    assert!(legs
        .iter()
        .all(|movement| movement.reference_type.as_deref() == Some("TRANSFER")));

    let (at_overflow, overflow_total) = ledger
        .services
        .queries
        .movement_history(
            1,
            20,
            MovementHistoryFilter {
                location: Some("OVERFLOW".to_string()),
                ..Default::default()
            },
        )
        .await
        .expect("one location");
    assert_eq!(overflow_total, 1);
    assert_eq!(at_overflow[0].movement_type, "transfer_in");

    let (recent, recent_total) = ledger
        .services
        .queries
        .movement_history(
            1,
            20,
            MovementHistoryFilter {
                from: Some((Utc::now() - Duration::hours(1)).into()),
                ..Default::default()
            },
        )
        .await
        .expect("recent window");
    assert_eq!(recent_total, 4);
    assert_eq!(recent.len(), 4);

    let (stale, stale_total) = ledger
        .services
        .queries
        .movement_history(
            1,
            20,
            MovementHistoryFilter {
                to: Some((Utc::now() - Duration::hours(1)).into()),
                ..Default::default()
            },
        )
        .await
        .expect("stale window");
    assert_eq!(stale_total, 0);
    assert!(stale.is_empty());
}
