/*!
 * # Health Check Module
 *
 * Liveness and readiness endpoints mounted under `/health`:
 *
 * - `/health` - cached up/down status
 * - `/health/ready` - re-checks the database and the event processor
 * - `/health/live` - process is running
 * - `/health/details` - per-component status with database latency
 * - `/health/version` - build information
 */

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::{db::DbPool, events::EventSender};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Up,
    Down,
    Degraded,
}

impl HealthStatus {
    fn status_code(self) -> StatusCode {
        match self {
            HealthStatus::Up | HealthStatus::Degraded => StatusCode::OK,
            HealthStatus::Down => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HealthDetail {
    pub status: HealthStatus,
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl HealthDetail {
    fn new(status: HealthStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HealthInfo {
    pub status: HealthStatus,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub details: HashMap<String, HealthDetail>,
}

/// Folds component statuses: any down wins, then any degraded.
pub fn overall_status<'a>(statuses: impl IntoIterator<Item = &'a HealthStatus>) -> HealthStatus {
    let mut overall = HealthStatus::Up;
    for status in statuses {
        match status {
            HealthStatus::Down => return HealthStatus::Down,
            HealthStatus::Degraded => overall = HealthStatus::Degraded,
            HealthStatus::Up => {}
        }
    }
    overall
}

#[derive(Clone)]
pub struct HealthState {
    pub db_pool: Arc<DbPool>,
    pub event_sender: Arc<EventSender>,
    pub health_cache: Arc<RwLock<HealthInfo>>,
    pub start_time: SystemTime,
    /// Ping latency above which the database is reported as degraded
    pub slow_ping: Duration,
}

impl HealthState {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self {
            db_pool,
            event_sender,
            health_cache: Arc::new(RwLock::new(HealthInfo {
                status: HealthStatus::Up,
                version: env!("CARGO_PKG_VERSION").to_string(),
                timestamp: Utc::now(),
                uptime_seconds: 0,
                details: HashMap::new(),
            })),
            start_time: SystemTime::now(),
            slow_ping: Duration::from_millis(500),
        }
    }

    pub fn uptime(&self) -> u64 {
        SystemTime::now()
            .duration_since(self.start_time)
            .unwrap_or(Duration::from_secs(0))
            .as_secs()
    }

    /// Re-checks every component and refreshes the cache.
    pub async fn update_health(&self) -> HealthInfo {
        let mut details = HashMap::new();

        let database = match crate::db::check_connection(&self.db_pool).await {
            Ok(latency) if latency > self.slow_ping => HealthDetail::new(
                HealthStatus::Degraded,
                Some(format!("ping took {} ms", latency.as_millis())),
            ),
            Ok(latency) => HealthDetail::new(
                HealthStatus::Up,
                Some(format!("ping took {} ms", latency.as_millis())),
            ),
            Err(e) => HealthDetail::new(HealthStatus::Down, Some(e.response_message())),
        };
        details.insert("database".to_string(), database);

        let events = if self.event_sender.is_closed() {
            HealthDetail::new(
                HealthStatus::Degraded,
                Some("event processor stopped; events are dropped".to_string()),
            )
        } else {
            HealthDetail::new(HealthStatus::Up, None)
        };
        details.insert("event_processor".to_string(), events);

        let mut health = self.health_cache.write().await;
        health.status = overall_status(details.values().map(|d| &d.status));
        health.details = details;
        health.timestamp = Utc::now();
        health.uptime_seconds = self.uptime();
        health.clone()
    }
}

pub async fn version_info() -> impl IntoResponse {
    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "commit": option_env!("GIT_HASH").unwrap_or("unknown"),
        "built": option_env!("BUILD_TIME").unwrap_or("unknown"),
    }))
}

/// Cached status; cheap enough for load balancer checks
pub async fn health_check(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    let health = state.health_cache.read().await;
    (
        health.status.status_code(),
        Json(json!({
            "status": health.status,
            "version": health.version,
            "timestamp": health.timestamp,
        })),
    )
}

pub async fn readiness_check(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    let health = state.update_health().await;
    (
        health.status.status_code(),
        Json(json!({
            "ready": health.status != HealthStatus::Down,
            "timestamp": health.timestamp,
        })),
    )
}

pub async fn liveness_check(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "alive": true,
            "uptime_seconds": state.uptime(),
            "timestamp": Utc::now(),
        })),
    )
}

pub async fn detailed_health(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    let health = state.update_health().await;
    (health.status.status_code(), Json(health))
}

/// Refreshes the cached status every `every`
pub async fn run_health_checker(state: Arc<HealthState>, every: Duration) {
    debug!("Starting periodic health checker");
    let mut interval = tokio::time::interval(every);

    loop {
        interval.tick().await;
        let health = state.update_health().await;
        if health.status != HealthStatus::Up {
            for (name, detail) in &health.details {
                if detail.status != HealthStatus::Up {
                    warn!(component = %name, status = ?detail.status, message = ?detail.message, "Component is not healthy");
                }
            }
        }
    }
}

pub fn health_routes<S>(state: Arc<HealthState>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .route("/", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/live", get(liveness_check))
        .route("/details", get(detailed_health))
        .route("/version", get(version_info))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request};
    use tokio::sync::mpsc;
    use tower::ServiceExt;

    #[test]
    fn overall_status_prefers_worst_component() {
        assert_eq!(overall_status(&[] as &[HealthStatus]), HealthStatus::Up);
        assert_eq!(
            overall_status(&[HealthStatus::Up, HealthStatus::Degraded]),
            HealthStatus::Degraded
        );
        assert_eq!(
            overall_status(&[HealthStatus::Degraded, HealthStatus::Down, HealthStatus::Up]),
            HealthStatus::Down
        );
    }

    #[tokio::test]
    async fn readiness_reports_closed_event_channel_as_degraded() {
        let db = crate::db::establish_connection_with_config(&crate::db::DbConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            min_connections: 1,
            ..Default::default()
        })
        .await
        .unwrap();
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let state = Arc::new(HealthState::new(
            Arc::new(db),
            Arc::new(EventSender::new(tx)),
        ));

        let health = state.update_health().await;
        assert_eq!(health.status, HealthStatus::Degraded);
        assert_eq!(health.details["database"].status, HealthStatus::Up);

        let response = health_routes::<()>(state)
            .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
