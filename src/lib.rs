//! Oficina API Library
//!
//! Repair-shop backend: work orders whose totals are derived from their line
//! items, and a parts inventory whose quantities move only through a stock
//! ledger.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod health;
pub mod metrics;
pub mod middleware_helpers;
pub mod migrator;
pub mod openapi;
pub mod services;
pub mod tracing;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{Json, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use http::HeaderValue;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
};
use utoipa::{IntoParams, ToSchema};

use crate::metrics::SHOP_METRICS;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<db::DbPool>,
    pub config: config::AppConfig,
    pub event_sender: Arc<events::EventSender>,
    pub services: handlers::AppServices,
    pub health: Arc<health::HealthState>,
}

impl AppState {
    pub fn new(
        db: Arc<db::DbPool>,
        config: config::AppConfig,
        event_sender: Arc<events::EventSender>,
    ) -> Self {
        let services = handlers::AppServices::new(db.clone(), event_sender.clone(), &config);
        let health = Arc::new(health::HealthState::new(db.clone(), event_sender.clone()));
        Self {
            db,
            config,
            event_sender,
            services,
            health,
        }
    }
}

// Common query parameters for list endpoints
#[derive(Debug, Default, Deserialize, ToSchema, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListQuery {
    /// Page number, starting at 1
    #[serde(default = "default_page")]
    pub page: u64,
    /// Items per page; clamped to the configured maximum
    pub limit: Option<u64>,
    /// Case-sensitive substring match (parts: code or name)
    pub search: Option<String>,
    /// Order status filter (orders only)
    pub status: Option<String>,
}

fn default_page() -> u64 {
    1
}

// Common response wrappers
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub errors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}

impl<T> PaginatedResponse<T> {
    pub fn new(items: Vec<T>, total: u64, page: u64, limit: u64) -> Self {
        let total_pages = if limit == 0 { 0 } else { total.div_ceil(limit) };
        Self {
            items,
            total,
            page,
            limit,
            total_pages,
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn validation_errors(errors: Vec<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: Some("Validation failed".to_string()),
            errors: Some(errors),
            meta: Some(ResponseMeta::capture()),
        }
    }
}

/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

pub fn api_v1_routes() -> Router<AppState> {
    use handlers::{items, orders, parts, stock_movements};

    Router::new()
        .route("/status", get(api_status))
        .route("/health", get(health_check))
        // Work orders and line items
        .route("/orders", get(orders::list_orders).post(orders::create_order))
        .route(
            "/orders/:id",
            get(orders::get_order)
                .put(orders::update_order)
                .delete(orders::delete_order),
        )
        .route(
            "/orders/:id/items",
            get(orders::get_order_items).post(orders::add_order_item),
        )
        .route("/orders/:id/recalculate", post(orders::recalculate_order))
        .route(
            "/items/:id",
            axum::routing::patch(items::update_item).delete(items::remove_item),
        )
        // Parts and the stock ledger
        .route("/parts", get(parts::list_parts).post(parts::create_part))
        .route("/parts/low-stock", get(parts::list_low_stock))
        .route(
            "/parts/:id",
            get(parts::get_part)
                .put(parts::update_part)
                .delete(parts::delete_part),
        )
        .route(
            "/parts/:id/movements",
            get(parts::list_part_movements).post(parts::record_movement),
        )
        .route("/stock-movements", get(stock_movements::list_movements))
        .route(
            "/stock-movements/:id",
            get(stock_movements::get_movement).delete(stock_movements::delete_movement),
        )
}

/// CORS from configuration: explicit origins, else permissive where allowed,
/// else same-origin only.
pub fn cors_layer(cfg: &config::AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = cfg
        .cors_allowed_origins
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();

    if !origins.is_empty() {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    } else if cfg.should_allow_permissive_cors() {
        ::tracing::info!(
            development = cfg.is_development(),
            "Using permissive CORS because explicit origins were not configured"
        );
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
    }
}

/// Full application router: `/api/v1`, `/health`, metrics and Swagger UI,
/// wrapped in the request-id, tracing, metrics, compression and CORS layers.
pub fn app_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config);
    let health = state.health.clone();

    Router::<AppState>::new()
        .route("/", get(|| async { "oficina-api up" }))
        .route("/metrics", get(metrics::metrics_handler))
        .route("/metrics/json", get(metrics::metrics_json_handler))
        .nest("/api/v1", api_v1_routes())
        .nest("/health", health::health_routes(health))
        .merge(openapi::swagger_ui())
        .layer(axum::middleware::from_fn(http_metrics_middleware))
        .layer(crate::tracing::configure_http_tracing())
        .layer(CompressionLayer::new())
        .layer(cors)
        // Outermost so every other layer sees the request id
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id_middleware,
        ))
        .with_state(state)
}

async fn http_metrics_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let response = next.run(request).await;
    SHOP_METRICS.record_request(start.elapsed(), response.status().as_u16());
    response
}

async fn api_status(State(state): State<AppState>) -> ApiResult<Value> {
    Ok(Json(ApiResponse::success(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "git": option_env!("GIT_HASH").unwrap_or("unknown"),
        "service": "oficina-api",
        "environment": state.config.environment,
        "discount_policy": format!("{:?}", state.config.discount_policy),
        "timestamp": Utc::now().to_rfc3339(),
    }))))
}

async fn health_check(State(state): State<AppState>) -> ApiResult<Value> {
    let (database, latency_ms) = match db::check_connection(&state.db).await {
        Ok(latency) => ("healthy", Some(latency.as_millis() as u64)),
        Err(_) => ("unhealthy", None),
    };
    let events = if state.event_sender.is_closed() {
        "stopped"
    } else {
        "running"
    };

    Ok(Json(ApiResponse::success(json!({
        "status": if database == "healthy" { "healthy" } else { "unhealthy" },
        "checks": {
            "database": database,
            "database_latency_ms": latency_ms,
            "event_processor": events,
        },
        "uptime_seconds": state.health.uptime(),
        "timestamp": Utc::now().to_rfc3339(),
    }))))
}

#[cfg(test)]
mod response_tests {
    use super::*;
    use chrono::DateTime;

    #[tokio::test]
    async fn success_response_includes_request_metadata() {
        let response =
            crate::tracing::scope_request_id(crate::tracing::RequestId::new("meta-123"), async {
                ApiResponse::success("ok")
            })
            .await;

        let meta = response.meta.expect("metadata expected");
        assert_eq!(meta.request_id.as_deref(), Some("meta-123"));
        DateTime::parse_from_rfc3339(&meta.timestamp).expect("timestamp should parse");
    }

    #[tokio::test]
    async fn validation_errors_response_includes_metadata() {
        let response = crate::tracing::scope_request_id(
            crate::tracing::RequestId::new("meta-validation"),
            async { ApiResponse::<()>::validation_errors(vec!["quantidade: missing".into()]) },
        )
        .await;

        assert!(!response.success);
        assert_eq!(response.errors.as_deref().map(<[String]>::len), Some(1));
        let meta = response.meta.expect("metadata expected");
        assert_eq!(meta.request_id.as_deref(), Some("meta-validation"));
    }

    #[test]
    fn response_outside_request_has_no_request_id() {
        let response = ApiResponse::<()>::error("oops".into());
        assert_eq!(response.meta.and_then(|m| m.request_id), None);
    }

    #[test]
    fn paginated_response_counts_pages() {
        assert_eq!(PaginatedResponse::<u8>::new(vec![], 0, 1, 20).total_pages, 0);
        assert_eq!(PaginatedResponse::<u8>::new(vec![], 20, 1, 20).total_pages, 1);
        assert_eq!(PaginatedResponse::<u8>::new(vec![], 21, 2, 20).total_pages, 2);
        assert_eq!(PaginatedResponse::<u8>::new(vec![], 5, 1, 0).total_pages, 0);
    }

    #[test]
    fn cors_layer_accepts_configured_origins() {
        let mut cfg = config::AppConfig::new(
            "sqlite::memory:".into(),
            "127.0.0.1".into(),
            8080,
            "production".into(),
        );
        cfg.cors_allowed_origins = Some("https://oficina.example, ,https://admin.example".into());
        // Construction must not panic on blank entries.
        let _ = cors_layer(&cfg);
    }
}
