/*!
 * # Metrics Module
 *
 * In-memory metrics collection for the stock ledger API.
 *
 * ## Features
 *
 * - Movement and rejection counters by type
 * - Reservation and GRN lifecycle counters
 * - Optimistic-lock conflict and retry tracking
 * - Database query and transaction performance metrics
 *
 * ## Metrics Formats
 *
 * Metrics are exposed in the following formats:
 * - Prometheus text format at `/metrics`
 * - JSON format at `/metrics/json`
 */

use axum::{http::StatusCode, response::IntoResponse, Json};
use dashmap::DashMap;
use once_cell::sync::Lazy;
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::info;

/// Process start instant, used for uptime reporting.
pub static PROCESS_START: Lazy<Instant> = Lazy::new(Instant::now);

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("Failed to export metrics: {0}")]
    ExportError(String),
}

#[derive(Debug, Clone)]
pub struct Counter {
    value: Arc<AtomicU64>,
}

impl Counter {
    pub fn new() -> Self {
        Self {
            value: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_by(&self, value: u64) {
        self.value.fetch_add(value, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

impl Default for Counter {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct Gauge {
    value: Arc<AtomicU64>,
}

impl Gauge {
    pub fn new() -> Self {
        Self {
            value: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn set(&self, value: f64) {
        self.value.store(value as u64, Ordering::Relaxed);
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec(&self) {
        self.value.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> f64 {
        self.value.load(Ordering::Relaxed) as f64
    }
}

impl Default for Gauge {
    fn default() -> Self {
        Self::new()
    }
}

/// Sum is tracked in microseconds so sub-second observations survive the
/// atomic representation.
#[derive(Debug, Clone)]
pub struct Histogram {
    sum_micros: Arc<AtomicU64>,
    count: Arc<AtomicU64>,
}

impl Histogram {
    pub fn new() -> Self {
        Self {
            sum_micros: Arc::new(AtomicU64::new(0)),
            count: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn observe(&self, value: f64) {
        self.sum_micros
            .fetch_add((value * 1_000_000.0) as u64, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn get_sum(&self) -> f64 {
        self.sum_micros.load(Ordering::Relaxed) as f64 / 1_000_000.0
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct MetricsRegistry {
    counters: Arc<DashMap<String, Counter>>,
    gauges: Arc<DashMap<String, Gauge>>,
    histograms: Arc<DashMap<String, Histogram>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            counters: Arc::new(DashMap::new()),
            gauges: Arc::new(DashMap::new()),
            histograms: Arc::new(DashMap::new()),
        }
    }

    pub fn get_or_create_counter(&self, name: &str) -> Counter {
        self.counters
            .entry(name.to_string())
            .or_insert_with(Counter::new)
            .clone()
    }

    pub fn get_or_create_gauge(&self, name: &str) -> Gauge {
        self.gauges
            .entry(name.to_string())
            .or_insert_with(Gauge::new)
            .clone()
    }

    pub fn get_or_create_histogram(&self, name: &str) -> Histogram {
        self.histograms
            .entry(name.to_string())
            .or_insert_with(Histogram::new)
            .clone()
    }

    pub async fn export_metrics(&self) -> Result<String, MetricsError> {
        let mut output = String::new();

        for entry in self.counters.iter() {
            let (name, counter) = entry.pair();
            output.push_str(&format!("# TYPE {} counter\n", name));
            output.push_str(&format!("{} {}\n", name, counter.get()));
        }

        for entry in self.gauges.iter() {
            let (name, gauge) = entry.pair();
            output.push_str(&format!("# TYPE {} gauge\n", name));
            output.push_str(&format!("{} {}\n", name, gauge.get()));
        }

        for entry in self.histograms.iter() {
            let (name, histogram) = entry.pair();
            output.push_str(&format!("# TYPE {} histogram\n", name));
            output.push_str(&format!("{}_count {}\n", name, histogram.get_count()));
            output.push_str(&format!("{}_sum {}\n", name, histogram.get_sum()));
        }

        Ok(output)
    }

    pub async fn export_metrics_json(&self) -> Result<serde_json::Value, MetricsError> {
        let mut counters = serde_json::Map::new();
        for entry in self.counters.iter() {
            let (name, counter) = entry.pair();
            counters.insert(name.to_string(), json!(counter.get()));
        }

        let mut gauges = serde_json::Map::new();
        for entry in self.gauges.iter() {
            let (name, gauge) = entry.pair();
            gauges.insert(name.to_string(), json!(gauge.get()));
        }

        let mut histograms = serde_json::Map::new();
        for entry in self.histograms.iter() {
            let (name, histogram) = entry.pair();
            histograms.insert(
                name.to_string(),
                json!({
                    "count": histogram.get_count(),
                    "sum": histogram.get_sum(),
                }),
            );
        }

        Ok(json!({
            "counters": counters,
            "gauges": gauges,
            "histograms": histograms,
            "uptime_seconds": PROCESS_START.elapsed().as_secs(),
        }))
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// Global metrics registry
lazy_static::lazy_static! {
    pub static ref METRICS: MetricsRegistry = MetricsRegistry::new();
}

// Metrics collection functions
pub fn increment_counter(name: &str) {
    METRICS.get_or_create_counter(name).inc();
}

pub fn increment_counter_by(name: &str, value: u64) {
    METRICS.get_or_create_counter(name).inc_by(value);
}

pub fn set_gauge(name: &str, value: f64) {
    METRICS.get_or_create_gauge(name).set(value);
}

pub fn observe_histogram(name: &str, value: f64) {
    METRICS.get_or_create_histogram(name).observe(value);
}

// Ledger-specific metrics
pub struct LedgerMetrics {
    pub movements_recorded: Counter,
    pub movements_rejected: Counter,
    pub adjustments_applied: Counter,
    pub stock_takes_recorded: Counter,
    pub returns_recorded: Counter,
    pub transfers_completed: Counter,
    pub reservations_created: Counter,
    pub reservations_released: Counter,
    pub reservations_fulfilled: Counter,
    pub grns_created: Counter,
    pub grns_posted: Counter,
    pub grns_cancelled: Counter,
    pub version_conflicts: Counter,
    pub low_stock_alerts: Counter,
    pub reorder_sweeps: Counter,
    pub low_stock_products: Gauge,
    pub movement_duration: Histogram,
}

impl LedgerMetrics {
    pub fn new() -> Self {
        Self {
            movements_recorded: METRICS.get_or_create_counter("ledger_movements_recorded_total"),
            movements_rejected: METRICS.get_or_create_counter("ledger_movements_rejected_total"),
            adjustments_applied: METRICS.get_or_create_counter("ledger_adjustments_applied_total"),
            stock_takes_recorded: METRICS.get_or_create_counter("ledger_stock_takes_total"),
            returns_recorded: METRICS.get_or_create_counter("ledger_returns_total"),
            transfers_completed: METRICS.get_or_create_counter("ledger_transfers_total"),
            reservations_created: METRICS.get_or_create_counter("ledger_reservations_created_total"),
            reservations_released: METRICS
                .get_or_create_counter("ledger_reservations_released_total"),
            reservations_fulfilled: METRICS
                .get_or_create_counter("ledger_reservations_fulfilled_total"),
            grns_created: METRICS.get_or_create_counter("ledger_grns_created_total"),
            grns_posted: METRICS.get_or_create_counter("ledger_grns_posted_total"),
            grns_cancelled: METRICS.get_or_create_counter("ledger_grns_cancelled_total"),
            version_conflicts: METRICS.get_or_create_counter("ledger_version_conflicts_total"),
            low_stock_alerts: METRICS.get_or_create_counter("ledger_low_stock_alerts_total"),
            reorder_sweeps: METRICS.get_or_create_counter("ledger_reorder_sweeps_total"),
            low_stock_products: METRICS.get_or_create_gauge("ledger_low_stock_products"),
            movement_duration: METRICS
                .get_or_create_histogram("ledger_movement_duration_seconds"),
        }
    }

    pub fn record_movement(&self, duration: std::time::Duration) {
        self.movements_recorded.inc();
        self.movement_duration.observe(duration.as_secs_f64());
    }

    pub fn record_rejection(&self) {
        self.movements_rejected.inc();
    }

    pub fn record_version_conflict(&self) {
        self.version_conflicts.inc();
    }
}

impl Default for LedgerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

// Global instances
lazy_static::lazy_static! {
    pub static ref LEDGER_METRICS: LedgerMetrics = LedgerMetrics::new();
}

// HTTP endpoint handlers for metrics
pub async fn metrics_handler() -> impl IntoResponse {
    match METRICS.export_metrics().await {
        Ok(body) => (StatusCode::OK, body).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

pub async fn metrics_json_handler() -> impl IntoResponse {
    match METRICS.export_metrics_json().await {
        Ok(value) => Json(value).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

// Initialize metrics system
pub fn init_metrics() {
    Lazy::force(&PROCESS_START);
    LEDGER_METRICS.low_stock_products.set(0.0);

    info!("Metrics system initialized");
}
