pub mod items;
pub mod orders;
pub mod parts;
pub mod stock_movements;

use crate::{
    config::AppConfig,
    db::{DbPool, WriteGate},
    errors::validation_messages,
    events::EventSender,
    services::{inventory::PartService, orders::OrderService, stock_ledger::StockLedger},
    ApiResponse,
};
use axum::{http::StatusCode, Json};
use std::sync::Arc;
use tracing::debug;
use validator::Validate;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub orders: Arc<OrderService>,
    pub parts: Arc<PartService>,
    pub stock_ledger: Arc<StockLedger>,
}

impl AppServices {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>, config: &AppConfig) -> Self {
        let write_gate = WriteGate::for_pool(&db_pool);
        debug!(
            serialized_writes = write_gate.is_serializing(),
            "Write gate configured"
        );
        let stock_ledger = Arc::new(StockLedger::new(
            db_pool.clone(),
            event_sender.clone(),
            write_gate.clone(),
            config.stock_update_max_retries,
        ));
        let orders = Arc::new(OrderService::new(
            db_pool.clone(),
            event_sender.clone(),
            config.discount_policy,
            write_gate,
        ));
        let parts = Arc::new(PartService::new(db_pool, event_sender, stock_ledger.clone()));

        Self {
            orders,
            parts,
            stock_ledger,
        }
    }
}

/// Body returned when a request DTO fails its `validator` rules.
pub(crate) type ValidationFailure<T> = (StatusCode, Json<ApiResponse<T>>);

/// Runs the DTO's validation rules, turning violations into a 400 with
/// one `field: message` line per error.
pub(crate) fn check<T, R: Validate>(request: &R) -> Result<(), ValidationFailure<T>> {
    request.validate().map_err(|errors| {
        (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::validation_errors(validation_messages(&errors))),
        )
    })
}
