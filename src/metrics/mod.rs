/*!
 * # Metrics Module
 *
 * In-process metrics for the repair-shop API: HTTP traffic, order total
 * recalculations, line-item mutations and the stock ledger.
 *
 * Metrics are exposed in two formats:
 * - Prometheus text format at `/metrics`
 * - JSON format at `/metrics/json`
 */

use axum::{http::header, response::IntoResponse, Json};
use dashmap::DashMap;
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("Failed to export metrics: {0}")]
    ExportError(String),
}

impl IntoResponse for MetricsError {
    fn into_response(self) -> axum::response::Response {
        (
            axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            self.to_string(),
        )
            .into_response()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Counter {
    value: Arc<AtomicU64>,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
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

/// Gauge values are stored as raw `f64` bits.
#[derive(Debug, Clone, Default)]
pub struct Gauge {
    bits: Arc<AtomicU64>,
}

impl Gauge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, value: f64) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, Default)]
pub struct Histogram {
    sum_micros: Arc<AtomicU64>,
    count: Arc<AtomicU64>,
}

impl Histogram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&self, duration: Duration) {
        self.sum_micros
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Sum of observations in seconds
    pub fn get_sum(&self) -> f64 {
        self.sum_micros.load(Ordering::Relaxed) as f64 / 1_000_000.0
    }
}

#[derive(Debug, Default)]
pub struct MetricsRegistry {
    counters: DashMap<String, Counter>,
    gauges: DashMap<String, Gauge>,
    histograms: DashMap<String, Histogram>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
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

    /// Prometheus text exposition, sorted by metric name.
    pub fn export_metrics(&self) -> Result<String, MetricsError> {
        use std::fmt::Write;

        let mut output = String::new();
        let mut write = |line: std::fmt::Arguments<'_>| {
            output
                .write_fmt(line)
                .map_err(|e| MetricsError::ExportError(e.to_string()))
        };

        let mut counters: Vec<_> = self
            .counters
            .iter()
            .map(|e| (e.key().clone(), e.value().get()))
            .collect();
        counters.sort_by(|a, b| a.0.cmp(&b.0));
        for (name, value) in counters {
            write(format_args!("# TYPE {} counter\n{} {}\n", name, name, value))?;
        }

        let mut gauges: Vec<_> = self
            .gauges
            .iter()
            .map(|e| (e.key().clone(), e.value().get()))
            .collect();
        gauges.sort_by(|a, b| a.0.cmp(&b.0));
        for (name, value) in gauges {
            write(format_args!("# TYPE {} gauge\n{} {}\n", name, name, value))?;
        }

        let mut histograms: Vec<_> = self
            .histograms
            .iter()
            .map(|e| (e.key().clone(), e.value().get_count(), e.value().get_sum()))
            .collect();
        histograms.sort_by(|a, b| a.0.cmp(&b.0));
        for (name, count, sum) in histograms {
            write(format_args!(
                "# TYPE {} summary\n{}_count {}\n{}_sum {}\n",
                name, name, count, name, sum
            ))?;
        }

        Ok(output)
    }

    pub fn export_metrics_json(&self) -> serde_json::Value {
        let mut counters = serde_json::Map::new();
        for entry in self.counters.iter() {
            counters.insert(entry.key().clone(), json!(entry.value().get()));
        }

        let mut gauges = serde_json::Map::new();
        for entry in self.gauges.iter() {
            gauges.insert(entry.key().clone(), json!(entry.value().get()));
        }

        let mut histograms = serde_json::Map::new();
        for entry in self.histograms.iter() {
            histograms.insert(
                entry.key().clone(),
                json!({
                    "count": entry.value().get_count(),
                    "sum": entry.value().get_sum(),
                }),
            );
        }

        json!({
            "counters": counters,
            "gauges": gauges,
            "histograms": histograms,
        })
    }
}

// Global metrics registry
lazy_static::lazy_static! {
    pub static ref METRICS: MetricsRegistry = MetricsRegistry::new();
}

pub fn increment_counter(name: &str) {
    METRICS.get_or_create_counter(name).inc();
}

pub fn increment_counter_by(name: &str, value: u64) {
    METRICS.get_or_create_counter(name).inc_by(value);
}

pub fn set_gauge(name: &str, value: f64) {
    METRICS.get_or_create_gauge(name).set(value);
}

pub fn observe_duration(name: &str, duration: Duration) {
    METRICS.get_or_create_histogram(name).observe(duration);
}

/// Named shop counters
pub struct ShopMetrics {
    pub http_requests: Counter,
    pub http_server_errors: Counter,
    pub http_duration: Histogram,
    pub recalculations: Counter,
    pub line_item_mutations: Counter,
    pub stock_movements_entrada: Counter,
    pub stock_movements_saida: Counter,
    pub stock_movements_ajuste: Counter,
    pub stock_movements_reversed: Counter,
    pub stock_rejections: Counter,
    pub stock_cas_retries: Counter,
    pub stock_conflicts: Counter,
}

impl ShopMetrics {
    fn new() -> Self {
        Self {
            http_requests: METRICS.get_or_create_counter("oficina_http_requests_total"),
            http_server_errors: METRICS.get_or_create_counter("oficina_http_server_errors_total"),
            http_duration: METRICS.get_or_create_histogram("oficina_http_request_duration_seconds"),
            recalculations: METRICS.get_or_create_counter("oficina_order_recalculations_total"),
            line_item_mutations: METRICS
                .get_or_create_counter("oficina_line_item_mutations_total"),
            stock_movements_entrada: METRICS
                .get_or_create_counter("oficina_stock_movements_entrada_total"),
            stock_movements_saida: METRICS
                .get_or_create_counter("oficina_stock_movements_saida_total"),
            stock_movements_ajuste: METRICS
                .get_or_create_counter("oficina_stock_movements_ajuste_total"),
            stock_movements_reversed: METRICS
                .get_or_create_counter("oficina_stock_movements_reversed_total"),
            stock_rejections: METRICS
                .get_or_create_counter("oficina_stock_insufficient_total"),
            stock_cas_retries: METRICS.get_or_create_counter("oficina_stock_cas_retries_total"),
            stock_conflicts: METRICS.get_or_create_counter("oficina_stock_conflicts_total"),
        }
    }

    pub fn record_request(&self, duration: Duration, status: u16) {
        self.http_requests.inc();
        self.http_duration.observe(duration);
        if status >= 500 {
            self.http_server_errors.inc();
        }
    }

    pub fn record_movement(&self, kind: crate::entities::MovementType) {
        use crate::entities::MovementType;
        match kind {
            MovementType::Entrada => self.stock_movements_entrada.inc(),
            MovementType::Saida => self.stock_movements_saida.inc(),
            MovementType::Ajuste => self.stock_movements_ajuste.inc(),
        }
    }
}

lazy_static::lazy_static! {
    pub static ref SHOP_METRICS: ShopMetrics = ShopMetrics::new();
}

/// `GET /metrics`
pub async fn metrics_handler() -> Result<impl IntoResponse, MetricsError> {
    let body = METRICS.export_metrics()?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    ))
}

/// `GET /metrics/json`
pub async fn metrics_json_handler() -> Json<serde_json::Value> {
    Json(METRICS.export_metrics_json())
}
