/*!
 * # Health Check Module
 *
 * Endpoints for monitoring the health and readiness of the stock ledger API.
 *
 * - Basic health check (`/health`) - Simple up/down status
 * - Readiness check (`/health/ready`) - Checks if the system is ready to accept traffic
 * - Liveness check (`/health/live`) - Checks if the process is alive
 * - Detailed health check (`/health/details`) - Per-component status
 *
 * Readiness distinguishes connectivity from schema: a reachable database
 * with no ledger tables reports `degraded`, not `up`, so traffic is held
 * back until migrations have run.
 */

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use sea_orm::{DatabaseConnection, EntityTrait, QuerySelect};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::entities::stock_movement::Entity as StockMovementEntity;

/// Basic health status
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Up,
    Down,
    Degraded,
}

/// Health check detail for one component
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HealthDetail {
    pub status: HealthStatus,
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl HealthDetail {
    fn now(status: HealthStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            timestamp: Utc::now(),
        }
    }
}

/// Overall health information
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HealthInfo {
    pub status: HealthStatus,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub details: HashMap<String, HealthDetail>,
}

/// Health check state
#[derive(Clone)]
pub struct HealthState {
    pub db: Arc<DatabaseConnection>,
    pub health_cache: Arc<RwLock<HealthInfo>>,
    pub start_time: SystemTime,
}

impl HealthState {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            db,
            health_cache: Arc::new(RwLock::new(HealthInfo {
                status: HealthStatus::Up,
                version: env!("CARGO_PKG_VERSION").to_string(),
                timestamp: Utc::now(),
                uptime_seconds: 0,
                details: HashMap::new(),
            })),
            start_time: SystemTime::now(),
        }
    }

    /// Calculate process uptime
    pub fn uptime(&self) -> u64 {
        SystemTime::now()
            .duration_since(self.start_time)
            .unwrap_or(Duration::from_secs(0))
            .as_secs()
    }

    /// Probe each component and refresh the cached status
    pub async fn update_health(&self) {
        let connectivity = match self.db.ping().await {
            Ok(_) => HealthDetail::now(HealthStatus::Up, None),
            Err(e) => {
                error!("Database health check failed: {}", e);
                HealthDetail::now(HealthStatus::Down, Some(e.to_string()))
            }
        };

        // A LIMIT 1 scan of the movement table proves the ledger schema is
        // in place without touching more than one row.
        let schema = if connectivity.status == HealthStatus::Up {
            match StockMovementEntity::find().limit(1).all(self.db.as_ref()).await {
                Ok(_) => HealthDetail::now(HealthStatus::Up, None),
                Err(e) => {
                    warn!("Ledger schema probe failed: {}", e);
                    HealthDetail::now(
                        HealthStatus::Degraded,
                        Some("ledger tables are not queryable; have migrations run?".to_string()),
                    )
                }
            }
        } else {
            HealthDetail::now(HealthStatus::Down, Some("database unreachable".to_string()))
        };

        let mut health = self.health_cache.write().await;
        health.timestamp = Utc::now();
        health.uptime_seconds = self.uptime();
        health.details.insert("database".to_string(), connectivity);
        health.details.insert("ledger_schema".to_string(), schema);
        health.status = overall_status(&health.details);
    }
}

/// Down dominates degraded, degraded dominates up.
fn overall_status(details: &HashMap<String, HealthDetail>) -> HealthStatus {
    if details
        .values()
        .any(|detail| detail.status == HealthStatus::Down)
    {
        HealthStatus::Down
    } else if details
        .values()
        .any(|detail| detail.status == HealthStatus::Degraded)
    {
        HealthStatus::Degraded
    } else {
        HealthStatus::Up
    }
}

fn http_status(status: &HealthStatus) -> StatusCode {
    match status {
        HealthStatus::Up | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Down => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// Returns build and version information
pub async fn version_info() -> impl IntoResponse {
    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "commit": option_env!("GIT_HASH").unwrap_or("unknown"),
        "built": option_env!("BUILD_TIME").unwrap_or("unknown"),
    }))
}

/// Basic health check endpoint
pub async fn health_check(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    let health = state.health_cache.read().await;

    (
        http_status(&health.status),
        Json(json!({
            "status": health.status,
            "version": health.version,
            "timestamp": health.timestamp,
        })),
    )
}

/// Readiness check endpoint
pub async fn readiness_check(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    // Probe before responding so a dead database flips readiness promptly
    state.update_health().await;
    let health = state.health_cache.read().await;

    (
        http_status(&health.status),
        Json(json!({
            "ready": health.status == HealthStatus::Up,
            "timestamp": health.timestamp,
        })),
    )
}

/// Liveness check endpoint
pub async fn liveness_check(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    let health = state.health_cache.read().await;

    (
        StatusCode::OK,
        Json(json!({
            "alive": true,
            "uptime_seconds": health.uptime_seconds,
            "timestamp": health.timestamp,
        })),
    )
}

/// Detailed health check endpoint
pub async fn detailed_health(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    state.update_health().await;
    let health = state.health_cache.read().await;

    (http_status(&health.status), Json(health.clone()))
}

/// Run periodic health checks
pub async fn run_health_checker(state: Arc<HealthState>) {
    info!("Starting periodic health checker");

    let mut interval = tokio::time::interval(Duration::from_secs(30));

    loop {
        interval.tick().await;
        state.update_health().await;

        let health = state.health_cache.read().await;
        if health.status != HealthStatus::Up {
            warn!("System health is not optimal: {:?}", health.status);

            for (name, detail) in &health.details {
                if detail.status != HealthStatus::Up {
                    warn!("Component {name} is not healthy: {:?}", detail.status);
                }
            }
        }
    }
}

/// Creates router with health check endpoints
pub fn health_routes_with_state(db: Arc<DatabaseConnection>) -> Router {
    let health_state = Arc::new(HealthState::new(db));

    // Start the background health checker
    tokio::spawn(run_health_checker(health_state.clone()));

    Router::new()
        .route("/", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/live", get(liveness_check))
        .route("/details", get(detailed_health))
        .route("/version", get(version_info))
        .with_state(health_state)
}
