//! Seed data script - populates the database with realistic demo data
//!
//! Run with: cargo run --bin seed-data
//!
//! This creates:
//! - 10 products across three locations
//! - Opening stock receipts written through the ledger
//! - Reorder levels for replenishment reporting
//! - One posted GRN so the receipt workflow has history
//!
//! Stock is seeded through the ledger services rather than direct table
//! writes, so every seeded balance reconciles with the movement journal.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Utc;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, Set};
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

use stock_ledger_api::entities::{product, stock_movement::MovementType};
use stock_ledger_api::events::{process_events, EventSender};
use stock_ledger_api::services::goods_receipt::{NewGrn, NewGrnLine};
use stock_ledger_api::services::stock_adjustment::ReorderLevelInput;
use stock_ledger_api::services::stock_ledger::NewMovement;
use stock_ledger_api::services::AppServices;

const OPENING_STOCK_REFERENCE: &str = "OPENING";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    info!("=== Stock Ledger Seed Data ===");
    info!("Creating realistic demo data for exploration...\n");

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "sqlite://stock_ledger.db?mode=rwc".to_string());

    let mut options = ConnectOptions::new(database_url.clone());
    options
        .max_connections(5)
        .min_connections(1)
        .connect_timeout(StdDuration::from_secs(10))
        .acquire_timeout(StdDuration::from_secs(10));

    info!("Connecting to database: {}", database_url);
    let db = Database::connect(options).await?;
    info!("Connected!\n");

    info!("Running migrations...");
    stock_ledger_api::db::run_migrations(&db).await?;

    let db = Arc::new(db);
    let (event_tx, event_rx) = mpsc::channel(256);
    tokio::spawn(process_events(event_rx));
    let services = AppServices::new(db.clone(), Arc::new(EventSender::new(event_tx)));

    let seeded_by = Uuid::new_v4();

    // Create products
    info!("Creating products...");
    let products = create_products(&db).await?;
    info!("  Created {} products", products.len());

    // Opening stock through the ledger
    info!("Receiving opening stock...");
    let movement_count = receive_opening_stock(&services, &products, seeded_by).await?;
    info!("  Recorded {} opening receipts", movement_count);

    // Reorder levels
    info!("Setting reorder levels...");
    let reorder_count = set_reorder_levels(&services, &products, seeded_by).await?;
    info!("  Set reorder levels on {} rows", reorder_count);

    // A posted GRN so the receipt workflow has history
    info!("Posting a demo GRN...");
    let grn_number = post_demo_grn(&services, &products, seeded_by).await?;
    info!("  Posted {}", grn_number);

    info!("\n=== Seed Data Complete ===");
    info!("Your stock ledger is now populated with demo data!");
    info!("");
    info!("Try these API calls:");
    info!("  curl http://localhost:8080/api/v1/stock");
    info!("  curl http://localhost:8080/api/v1/stock/low");
    info!("  curl http://localhost:8080/api/v1/movements");
    info!("  curl http://localhost:8080/api/v1/grns");
    info!("");
    info!("Or explore interactively at: http://localhost:8080/swagger-ui");

    Ok(())
}

async fn create_products(
    db: &sea_orm::DatabaseConnection,
) -> anyhow::Result<Vec<product::Model>> {
    let products_data = vec![
        // Electronics
        ("Wireless Bluetooth Headphones", "WBH-001", "each"),
        ("USB-C Fast Charger 65W", "CHG-065", "each"),
        ("Mechanical Keyboard RGB", "KBD-RGB", "each"),
        ("4K Webcam Pro", "WEB-4K1", "each"),
        // Apparel
        ("Classic Cotton T-Shirt", "TSH-BLK-M", "each"),
        ("Slim Fit Denim Jeans", "JNS-SLM-32", "each"),
        ("Merino Wool Sweater", "SWT-MRN-L", "each"),
        // Consumables
        ("Thermal Label Roll 100x150", "LBL-100150", "roll"),
        ("Packing Tape 48mm", "TPE-048", "roll"),
        ("Bubble Wrap 500mm", "BWR-500", "metre"),
    ];

    let mut created = Vec::new();
    let now = Utc::now();

    for (name, sku, unit) in products_data {
        let product = product::ActiveModel {
            sku: Set(sku.to_string()),
            name: Set(name.to_string()),
            unit: Set(unit.to_string()),
            active: Set(true),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
            ..Default::default()
        };

        let model = product.insert(db).await?;
        created.push(model);
    }

    Ok(created)
}

async fn receive_opening_stock(
    services: &AppServices,
    products: &[product::Model],
    seeded_by: Uuid,
) -> anyhow::Result<usize> {
    let locations = ["MAIN", "WEST", "EAST"];
    let mut count = 0;

    for (i, product) in products.iter().enumerate() {
        for location in &locations {
            // Vary quantities by location
            let quantity = match *location {
                "MAIN" => 100 + (i as i64 * 7) % 40,
                "WEST" => 50 + (i as i64 * 3) % 20,
                _ => 25,
            };

            services
                .ledger
                .record_movement(NewMovement {
                    product_id: product.id,
                    location: location.to_string(),
                    movement_type: MovementType::Receipt,
                    quantity,
                    reference_type: Some(OPENING_STOCK_REFERENCE.to_string()),
                    reference_number: None,
                    notes: Some("Opening stock".to_string()),
                    created_by: seeded_by,
                })
                .await?;
            count += 1;
        }
    }

    Ok(count)
}

async fn set_reorder_levels(
    services: &AppServices,
    products: &[product::Model],
    seeded_by: Uuid,
) -> anyhow::Result<usize> {
    let mut count = 0;

    for product in products {
        services
            .adjustments
            .set_reorder_levels(ReorderLevelInput {
                product_id: product.id,
                location: "MAIN".to_string(),
                reorder_level: 20,
                reorder_quantity: 50,
                updated_by: seeded_by,
            })
            .await?;
        count += 1;
    }

    Ok(count)
}

async fn post_demo_grn(
    services: &AppServices,
    products: &[product::Model],
    seeded_by: Uuid,
) -> anyhow::Result<String> {
    let lines = products
        .iter()
        .take(3)
        .map(|product| NewGrnLine {
            product_id: product.id,
            quantity_received: 24,
            unit_cost: dec!(12.50),
            gst_rate: dec!(0.10),
        })
        .collect();

    let details = services
        .receipts
        .create_grn(NewGrn {
            vendor_id: 1001,
            received_date: Utc::now().date_naive(),
            location: "MAIN".to_string(),
            vendor_invoice_ref: Some("INV-DEMO-001".to_string()),
            notes: Some("Seed data delivery".to_string()),
            lines,
            created_by: seeded_by,
        })
        .await?;

    services.receipts.post_grn(details.header.id, seeded_by).await?;

    Ok(details.header.grn_number)
}
