#![allow(dead_code)]

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use oficina_api::{
    config::AppConfig,
    db,
    events::{self, EventSender},
    services::{inventory::PartService, orders::OrderService, stock_ledger::StockLedger},
    AppState,
};
use rust_decimal::Decimal;
use serde_json::Value;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tower::ServiceExt;

/// Application backed by a fresh SQLite database.
///
/// `new` and `with_config` pin the pool to a single connection, since every
/// connection to `sqlite::memory:` is its own database. `file_backed` puts
/// the database in a temporary directory so several connections share it.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    _event_task: tokio::task::JoinHandle<()>,
    _dir: Option<TempDir>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    pub async fn with_config(customize: impl FnOnce(&mut AppConfig)) -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        customize(&mut cfg);
        Self::start(cfg, None).await
    }

    /// Same as `new`, on a database file shared by `max_connections`
    /// pooled connections.
    pub async fn file_backed(max_connections: u32) -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let mut cfg = AppConfig::new(
            format!(
                "sqlite://{}?mode=rwc",
                dir.path().join("oficina.db").display()
            ),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.db_max_connections = max_connections;
        cfg.db_min_connections = 1;
        Self::start(cfg, Some(dir)).await
    }

    async fn start(cfg: AppConfig, dir: Option<TempDir>) -> Self {
        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let (event_tx, event_rx) = mpsc::channel(256);
        let event_task = tokio::spawn(events::process_events(event_rx));
        let state = AppState::new(Arc::new(pool), cfg, Arc::new(EventSender::new(event_tx)));
        let router = oficina_api::app_router(state.clone());

        Self {
            router,
            state,
            _event_task: event_task,
            _dir: dir,
        }
    }

    pub fn orders(&self) -> Arc<OrderService> {
        self.state.services.orders.clone()
    }

    pub fn parts(&self) -> Arc<PartService> {
        self.state.services.parts.clone()
    }

    pub fn ledger(&self) -> Arc<StockLedger> {
        self.state.services.stock_ledger.clone()
    }

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

    /// Sends a request and decodes the JSON body (Null when empty).
    pub async fn request_json(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let response = self.request(method, uri, body).await;
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("failed to read response body");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("response body is not JSON")
        };
        (status, value)
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

/// Reads a money field (string or number) at cent precision.
pub fn money(value: &Value) -> Decimal {
    let parsed = match value {
        Value::String(s) => Decimal::from_str(s).expect("money string"),
        Value::Number(n) => Decimal::from_str(&n.to_string()).expect("money number"),
        other => panic!("not a money value: {other}"),
    };
    parsed.round_dp(2)
}

/// Same for a typed value read back from the database.
pub fn cents(value: Decimal) -> Decimal {
    value.round_dp(2)
}
