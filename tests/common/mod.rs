#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request},
    Router,
};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use serde_json::Value;
use stock_ledger_api::{
    api_v1_routes,
    config::AppConfig,
    db::{self, DbConfig, DbPool},
    entities::{
        product,
        stock_level::{self, Entity as StockLevelEntity},
        stock_movement::{self, Entity as StockMovementEntity, MovementType},
    },
    events::{self, EventSender},
    services::{stock_ledger::NewMovement, AppServices},
    AppState,
};
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

/// Harness bundling a private in-memory database with the full service
/// stack. Each instance gets its own database, so tests never share state.
pub struct TestLedger {
    router: Router,
    pub db: Arc<DbPool>,
    pub services: AppServices,
    pub actor: Uuid,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestLedger {
    /// Construct a fresh ledger backed by in-memory SQLite. The pool is
    /// pinned to a single connection so the in-memory database survives
    /// for the lifetime of the harness.
    pub async fn new() -> Self {
        let cfg = DbConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            min_connections: 1,
            ..Default::default()
        };

        let pool = db::establish_connection_with_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let db = Arc::new(pool);
        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let services = AppServices::new(db.clone(), Arc::new(event_sender.clone()));

        let state = AppState {
            db: db.clone(),
            config: AppConfig::new(
                "sqlite::memory:".to_string(),
                "127.0.0.1".to_string(),
                18_080,
                "test".to_string(),
            ),
            event_sender,
            services: services.clone(),
        };
        let router = Router::new()
            .nest("/api/v1", api_v1_routes())
            .with_state(state);

        Self {
            router,
            db,
            services,
            actor: Uuid::new_v4(),
            _event_task: event_task,
        }
    }

    /// Send a request against the API router and return the raw response.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Insert a catalog product and return the stored row.
    pub async fn seed_product(&self, sku: &str, name: &str) -> product::Model {
        let now = Utc::now();
        product::ActiveModel {
            sku: Set(sku.to_string()),
            name: Set(name.to_string()),
            unit: Set("each".to_string()),
            active: Set(true),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
            ..Default::default()
        }
        .insert(self.db.as_ref())
        .await
        .expect("failed to seed product")
    }

    /// Insert a product flagged inactive, for catalog validation tests.
    pub async fn seed_inactive_product(&self, sku: &str, name: &str) -> product::Model {
        let now = Utc::now();
        product::ActiveModel {
            sku: Set(sku.to_string()),
            name: Set(name.to_string()),
            unit: Set("each".to_string()),
            active: Set(false),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
            ..Default::default()
        }
        .insert(self.db.as_ref())
        .await
        .expect("failed to seed inactive product")
    }

    /// Bring stock on hand through the ledger, so the seeded balance has
    /// a movement trail like any real one.
    pub async fn receive_stock(&self, product_id: i64, location: &str, quantity: i64) {
        self.services
            .ledger
            .record_movement(NewMovement {
                product_id,
                location: location.to_string(),
                movement_type: MovementType::Receipt,
                quantity,
                reference_type: None,
                reference_number: None,
                notes: None,
                created_by: self.actor,
            })
            .await
            .expect("failed to seed stock through the ledger");
    }

    /// Read the balance row straight from the table.
    pub async fn stock_level(&self, product_id: i64, location: &str) -> stock_level::Model {
        StockLevelEntity::find()
            .filter(stock_level::Column::ProductId.eq(product_id))
            .filter(stock_level::Column::Location.eq(location))
            .one(self.db.as_ref())
            .await
            .expect("failed to query stock level")
            .expect("stock level row not found")
    }

    /// All movements for a product in insertion order.
    pub async fn movements_for(&self, product_id: i64) -> Vec<stock_movement::Model> {
        StockMovementEntity::find()
            .filter(stock_movement::Column::ProductId.eq(product_id))
            .order_by_asc(stock_movement::Column::Id)
            .all(self.db.as_ref())
            .await
            .expect("failed to query movements")
    }
}

impl Drop for TestLedger {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}
