mod common;

use axum::{body, http::Method, response::Response};
use serde_json::{json, Value};

use common::TestLedger;

async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

#[tokio::test]
async fn stock_endpoints_cover_the_adjustment_cycle() {
    let ledger = TestLedger::new().await;
    let product = ledger.seed_product("WID-001", "Widget").await;

    // Bring stock on hand with a manual adjustment.
    let response = ledger
        .request(
            Method::POST,
            "/api/v1/stock/adjust",
            Some(json!({
                "product_id": product.id,
                "location": "MAIN",
                "quantity_change": 25,
                "reason": "initial load",
                "created_by": ledger.actor,
            })),
        )
        .await;
    assert_eq!(response.status(), 200);
    let adjusted = response_json(response).await;
    assert_eq!(adjusted["success"], true);
    assert_eq!(adjusted["data"]["new_on_hand"], 25);
    assert_eq!(adjusted["data"]["movement_type"], "adjustment_increase");

    // Read the balance back.
    let uri = format!("/api/v1/stock/{}/MAIN", product.id);
    let response = ledger.request(Method::GET, &uri, None).await;
    assert_eq!(response.status(), 200);
    let level = response_json(response).await;
    assert_eq!(level["data"]["sku"], "WID-001");
    assert_eq!(level["data"]["quantity_on_hand"], 25);
    assert_eq!(level["data"]["available"], 25);

    // The listing pages the same rows.
    let response = ledger
        .request(Method::GET, "/api/v1/stock?page=1&limit=10", None)
        .await;
    assert_eq!(response.status(), 200);
    let listing = response_json(response).await;
    assert_eq!(listing["data"]["total"], 1);
    assert_eq!(listing["data"]["items"][0]["product_id"], product.id);

    // A physical count below the book balance writes the variance down.
    let response = ledger
        .request(
            Method::POST,
            "/api/v1/stock/stock-take",
            Some(json!({
                "product_id": product.id,
                "location": "MAIN",
                "counted_quantity": 20,
                "created_by": ledger.actor,
            })),
        )
        .await;
    assert_eq!(response.status(), 200);
    let counted = response_json(response).await;
    assert_eq!(counted["data"]["variance"], -5);
    assert_eq!(counted["data"]["new_on_hand"], 20);

    // Watch the row, then check it shows up on the low stock report.
    let response = ledger
        .request(
            Method::PUT,
            "/api/v1/stock/reorder-levels",
            Some(json!({
                "product_id": product.id,
                "location": "MAIN",
                "reorder_level": 30,
                "reorder_quantity": 60,
                "updated_by": ledger.actor,
            })),
        )
        .await;
    assert_eq!(response.status(), 200);

    let response = ledger.request(Method::GET, "/api/v1/stock/low", None).await;
    assert_eq!(response.status(), 200);
    let low = response_json(response).await;
    assert_eq!(low["data"][0]["product_id"], product.id);
    assert_eq!(low["data"][0]["reorder_quantity"], 60);

    // A customer return tops the balance back up.
    let response = ledger
        .request(
            Method::POST,
            "/api/v1/stock/return",
            Some(json!({
                "product_id": product.id,
                "location": "MAIN",
                "quantity": 2,
                "reference_number": "RMA-0042",
                "created_by": ledger.actor,
            })),
        )
        .await;
    assert_eq!(response.status(), 200);
    let returned = response_json(response).await;
    assert_eq!(returned["data"]["new_on_hand"], 22);

    // Move part of it to another location.
    let response = ledger
        .request(
            Method::POST,
            "/api/v1/stock/transfer",
            Some(json!({
                "product_id": product.id,
                "from_location": "MAIN",
                "to_location": "OVERFLOW",
                "quantity": 5,
                "created_by": ledger.actor,
            })),
        )
        .await;
    assert_eq!(response.status(), 200);
    let transferred = response_json(response).await;
    assert_eq!(transferred["data"]["reference_number"], "XFER-000001");
    assert_eq!(transferred["data"]["outbound"]["new_on_hand"], 17);
    assert_eq!(transferred["data"]["inbound"]["new_on_hand"], 5);

    // The whole story is on the movement ledger.
    let uri = format!("/api/v1/movements?product_id={}&page=1&limit=10", product.id);
    let response = ledger.request(Method::GET, &uri, None).await;
    assert_eq!(response.status(), 200);
    let history = response_json(response).await;
    assert_eq!(history["data"]["total"], 5);
    assert_eq!(history["data"]["items"][0]["movement_type"], "transfer_in");
}

#[tokio::test]
async fn movements_endpoint_accepts_receipts_and_issues_only() {
    let ledger = TestLedger::new().await;
    let product = ledger.seed_product("WID-001", "Widget").await;

    let response = ledger
        .request(
            Method::POST,
            "/api/v1/movements",
            Some(json!({
                "product_id": product.id,
                "location": "MAIN",
                "movement_type": "receipt",
                "quantity": 12,
                "reference_type": "PO",
                "reference_number": "PO-001",
                "created_by": ledger.actor,
            })),
        )
        .await;
    assert_eq!(response.status(), 201);
    let recorded = response_json(response).await;
    assert_eq!(recorded["data"]["quantity_before"], 0);
    assert_eq!(recorded["data"]["new_on_hand"], 12);

    // Adjustment types have their own endpoint with reason handling.
    let response = ledger
        .request(
            Method::POST,
            "/api/v1/movements",
            Some(json!({
                "product_id": product.id,
                "location": "MAIN",
                "movement_type": "adjustment_increase",
                "quantity": 1,
                "created_by": ledger.actor,
            })),
        )
        .await;
    assert_eq!(response.status(), 400);
    let rejected = response_json(response).await;
    assert_eq!(rejected["error"], "Bad Request");
}

#[tokio::test]
async fn reservation_endpoints_hold_release_and_fulfil() {
    let ledger = TestLedger::new().await;
    let product = ledger.seed_product("WID-001", "Widget").await;
    ledger.receive_stock(product.id, "MAIN", 30).await;

    let response = ledger
        .request(
            Method::POST,
            "/api/v1/reservations/reserve",
            Some(json!({
                "product_id": product.id,
                "location": "MAIN",
                "quantity": 10,
                "reference_number": "SO-500",
                "created_by": ledger.actor,
            })),
        )
        .await;
    assert_eq!(response.status(), 200);
    let reserved = response_json(response).await;
    assert_eq!(reserved["data"]["new_reserved"], 10);
    assert_eq!(reserved["data"]["new_available"], 20);

    let response = ledger
        .request(
            Method::POST,
            "/api/v1/reservations/release",
            Some(json!({
                "product_id": product.id,
                "location": "MAIN",
                "quantity": 4,
                "created_by": ledger.actor,
            })),
        )
        .await;
    assert_eq!(response.status(), 200);
    let released = response_json(response).await;
    assert_eq!(released["data"]["new_reserved"], 6);

    let response = ledger
        .request(
            Method::POST,
            "/api/v1/reservations/fulfil",
            Some(json!({
                "product_id": product.id,
                "location": "MAIN",
                "quantity": 6,
                "reference_number": "SO-500",
                "created_by": ledger.actor,
            })),
        )
        .await;
    assert_eq!(response.status(), 200);
    let fulfilled = response_json(response).await;
    assert_eq!(fulfilled["data"]["new_on_hand"], 24);
    assert_eq!(fulfilled["data"]["new_reserved"], 0);

    // Asking for more than is available maps to a 422.
    let response = ledger
        .request(
            Method::POST,
            "/api/v1/reservations/reserve",
            Some(json!({
                "product_id": product.id,
                "location": "MAIN",
                "quantity": 100,
                "created_by": ledger.actor,
            })),
        )
        .await;
    assert_eq!(response.status(), 422);
    let refused = response_json(response).await;
    assert_eq!(refused["error"], "Unprocessable Entity");
    assert!(refused["message"]
        .as_str()
        .expect("message string")
        .contains("available"));
}

#[tokio::test]
async fn grn_endpoints_drive_the_document_workflow() {
    let ledger = TestLedger::new().await;
    let widget = ledger.seed_product("WID-001", "Widget").await;
    let gadget = ledger.seed_product("GAD-001", "Gadget").await;

    let response = ledger
        .request(
            Method::POST,
            "/api/v1/grns",
            Some(json!({
                "vendor_id": 7,
                "received_date": "2024-03-12",
                "location": "MAIN",
                "vendor_invoice_ref": "INV-2024-0311",
                "lines": [
                    {"product_id": widget.id, "quantity_received": 10, "unit_cost": "19.99", "gst_rate": "0.10"},
                    {"product_id": gadget.id, "quantity_received": 4, "unit_cost": "3.25", "gst_rate": "0.10"},
                ],
                "created_by": ledger.actor,
            })),
        )
        .await;
    assert_eq!(response.status(), 201);
    let created = response_json(response).await;
    assert_eq!(created["data"]["header"]["grn_number"], "GRN-000001");
    assert_eq!(created["data"]["header"]["status"], "draft");
    assert_eq!(created["data"]["header"]["total_items"], 14);
    let grn_id = created["data"]["header"]["id"].as_i64().expect("grn id");

    let uri = format!("/api/v1/grns/{}/post", grn_id);
    let response = ledger
        .request(Method::POST, &uri, Some(json!({"posted_by": ledger.actor})))
        .await;
    assert_eq!(response.status(), 200);
    let posted = response_json(response).await;
    assert_eq!(posted["data"]["header"]["status"], "posted");
    assert_eq!(posted["data"]["movements"].as_array().expect("movements").len(), 2);

    // Posting moved the stock in.
    let uri = format!("/api/v1/stock/{}/MAIN", widget.id);
    let response = ledger.request(Method::GET, &uri, None).await;
    let level = response_json(response).await;
    assert_eq!(level["data"]["quantity_on_hand"], 10);

    // The listing can be pinned to posted documents.
    let response = ledger
        .request(Method::GET, "/api/v1/grns?status=posted", None)
        .await;
    assert_eq!(response.status(), 200);
    let listing = response_json(response).await;
    assert_eq!(listing["data"]["total"], 1);
    assert_eq!(listing["data"]["items"][0]["grn_number"], "GRN-000001");

    // Posting twice conflicts with the document state.
    let uri = format!("/api/v1/grns/{}/post", grn_id);
    let response = ledger
        .request(Method::POST, &uri, Some(json!({"posted_by": ledger.actor})))
        .await;
    assert_eq!(response.status(), 409);
    let conflicted = response_json(response).await;
    assert_eq!(conflicted["error"], "Conflict");

    // Drafts can be deleted outright.
    let response = ledger
        .request(
            Method::POST,
            "/api/v1/grns",
            Some(json!({
                "vendor_id": 7,
                "received_date": "2024-03-13",
                "location": "MAIN",
                "lines": [
                    {"product_id": widget.id, "quantity_received": 1, "unit_cost": "19.99", "gst_rate": "0.10"},
                ],
                "created_by": ledger.actor,
            })),
        )
        .await;
    assert_eq!(response.status(), 201);
    let draft = response_json(response).await;
    let draft_id = draft["data"]["header"]["id"].as_i64().expect("draft id");

    let uri = format!("/api/v1/grns/{}", draft_id);
    let delete_uri = format!("{}?deleted_by={}", uri, ledger.actor);
    let response = ledger.request(Method::DELETE, &delete_uri, None).await;
    assert_eq!(response.status(), 204);

    let response = ledger.request(Method::GET, &uri, None).await;
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn error_statuses_map_to_the_failure_kind() {
    let ledger = TestLedger::new().await;
    let product = ledger.seed_product("WID-001", "Widget").await;
    ledger.receive_stock(product.id, "MAIN", 10).await;

    // Missing reason fails request validation.
    let response = ledger
        .request(
            Method::POST,
            "/api/v1/stock/adjust",
            Some(json!({
                "product_id": product.id,
                "location": "MAIN",
                "quantity_change": 5,
                "reason": "",
                "created_by": ledger.actor,
            })),
        )
        .await;
    assert_eq!(response.status(), 400);
    let invalid = response_json(response).await;
    assert_eq!(invalid["error"], "Bad Request");
    assert!(invalid["timestamp"].as_str().is_some());

    // Unknown product maps to 404.
    let response = ledger
        .request(Method::GET, "/api/v1/stock/9999/MAIN", None)
        .await;
    assert_eq!(response.status(), 404);
    let missing = response_json(response).await;
    assert_eq!(missing["error"], "Not Found");
    assert_eq!(missing["message"], "Not found: Product 9999 not found");

    // A write-down below the reserved floor maps to 422.
    let response = ledger
        .request(
            Method::POST,
            "/api/v1/reservations/reserve",
            Some(json!({
                "product_id": product.id,
                "location": "MAIN",
                "quantity": 8,
                "created_by": ledger.actor,
            })),
        )
        .await;
    assert_eq!(response.status(), 200);

    let response = ledger
        .request(
            Method::POST,
            "/api/v1/stock/adjust",
            Some(json!({
                "product_id": product.id,
                "location": "MAIN",
                "quantity_change": -5,
                "reason": "write-down attempt",
                "created_by": ledger.actor,
            })),
        )
        .await;
    assert_eq!(response.status(), 422);
    let floored = response_json(response).await;
    assert_eq!(floored["error"], "Unprocessable Entity");
    assert!(floored["message"]
        .as_str()
        .expect("message string")
        .contains("reserved"));
}
