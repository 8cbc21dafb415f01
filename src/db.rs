use crate::config::AppConfig;
use crate::errors::AppError;
use crate::metrics::{increment_counter, set_gauge};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbBackend, DbErr};
use sea_orm_migration::MigratorTrait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, info};

/// Type alias for a database connection pool
pub type DbPool = DatabaseConnection;

/// Configuration for database connection
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Database connection URL
    pub url: String,
    /// Maximum number of connections
    pub max_connections: u32,
    /// Minimum number of connections
    pub min_connections: u32,
    /// Connection timeout duration
    pub connect_timeout: Duration,
    /// Idle timeout duration
    pub idle_timeout: Duration,
    /// Acquire connection timeout
    pub acquire_timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            acquire_timeout: Duration::from_secs(8),
        }
    }
}

impl From<&AppConfig> for DbConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            url: cfg.database_url.clone(),
            max_connections: cfg.db_max_connections,
            min_connections: cfg.db_min_connections,
            connect_timeout: Duration::from_secs(cfg.db_connect_timeout_secs),
            idle_timeout: Duration::from_secs(cfg.db_idle_timeout_secs),
            acquire_timeout: Duration::from_secs(cfg.db_acquire_timeout_secs),
        }
    }
}

/// Establishes a connection pool to the database with custom configuration
///
/// # Errors
/// Returns an `AppError` if the connection cannot be established
pub async fn establish_connection_with_config(config: &DbConfig) -> Result<DbPool, AppError> {
    debug!(
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        "Configuring database connection"
    );

    let mut opt = ConnectOptions::new(config.url.clone());
    opt.max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(config.connect_timeout)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .sqlx_logging(false);

    set_gauge("oficina_db_max_connections", config.max_connections as f64);

    let db_pool = Database::connect(opt).await.map_err(|e| {
        error!("Database connection establishment failed: {}", e);
        AppError::DatabaseError(e)
    })?;

    info!(
        backend = ?db_pool.get_database_backend(),
        "Database connection pool established"
    );
    Ok(db_pool)
}

/// Establish DB pool using AppConfig tuning
pub async fn establish_connection_from_app_config(cfg: &AppConfig) -> Result<DbPool, AppError> {
    let db_cfg: DbConfig = cfg.into();
    establish_connection_with_config(&db_cfg).await
}

/// Serializes write transactions on SQLite, which admits a single writer and
/// fails a deferred transaction with `SQLITE_BUSY` instead of waiting when it
/// tries to upgrade its read lock. Other backends rely on row locks and get a
/// no-op gate.
#[derive(Debug, Clone, Default)]
pub struct WriteGate {
    lock: Option<Arc<Mutex<()>>>,
}

impl WriteGate {
    pub fn for_pool(pool: &DbPool) -> Self {
        let lock = (pool.get_database_backend() == DbBackend::Sqlite)
            .then(|| Arc::new(Mutex::new(())));
        Self { lock }
    }

    /// Waits for the gate. Hold the guard until the transaction is committed
    /// or rolled back.
    pub async fn enter(&self) -> Option<OwnedMutexGuard<()>> {
        match &self.lock {
            Some(lock) => Some(lock.clone().lock_owned().await),
            None => None,
        }
    }

    pub fn is_serializing(&self) -> bool {
        self.lock.is_some()
    }
}

/// Errors raised because another writer holds the database, table or row:
/// SQLite busy/locked, Postgres serialization failures and deadlocks.
pub fn is_write_contention(err: &DbErr) -> bool {
    const MARKERS: [&str; 8] = [
        "database is locked",
        "database table is locked",
        "(code: 5)",
        "(code: 6)",
        "40001",
        "40P01",
        "could not serialize access",
        "deadlock detected",
    ];
    let message = err.to_string();
    MARKERS.iter().any(|marker| message.contains(marker))
}

/// Runs the embedded migrations
pub async fn run_migrations(pool: &DbPool) -> Result<(), AppError> {
    info!("Running database migrations");
    let start = std::time::Instant::now();

    let result = crate::migrator::Migrator::up(pool, None)
        .await
        .map_err(AppError::DatabaseError);

    let elapsed = start.elapsed();
    match &result {
        Ok(_) => info!("Database migrations completed in {:?}", elapsed),
        Err(e) => error!("Database migrations failed after {:?}: {}", elapsed, e),
    }

    result
}

/// Checks if the database connection is active
pub async fn check_connection(pool: &DbPool) -> Result<Duration, AppError> {
    let start = std::time::Instant::now();
    let result = pool.ping().await;
    let elapsed = start.elapsed();

    match result {
        Ok(()) => {
            debug!("Database connection check successful in {:?}", elapsed);
            set_gauge(
                "oficina_db_ping_latency_ms",
                elapsed.as_secs_f64() * 1_000.0,
            );
            Ok(elapsed)
        }
        Err(e) => {
            error!("Database connection check failed after {:?}: {}", elapsed, e);
            increment_counter("oficina_db_connection_failures_total");
            Err(AppError::DatabaseError(e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_config_follows_app_config() {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".into(),
            "127.0.0.1".into(),
            8080,
            "development".into(),
        );
        cfg.db_max_connections = 4;
        cfg.db_acquire_timeout_secs = 2;

        let db_cfg = DbConfig::from(&cfg);
        assert_eq!(db_cfg.url, "sqlite::memory:");
        assert_eq!(db_cfg.max_connections, 4);
        assert_eq!(db_cfg.acquire_timeout, Duration::from_secs(2));
    }

    #[test]
    fn busy_and_serialization_errors_count_as_contention() {
        assert!(is_write_contention(&DbErr::Custom(
            "error returned from database: (code: 5) database is locked".into()
        )));
        assert!(is_write_contention(&DbErr::Custom(
            "could not serialize access due to concurrent update".into()
        )));
        assert!(!is_write_contention(&DbErr::Custom(
            "UNIQUE constraint failed: pecas.codigo".into()
        )));
        assert!(!is_write_contention(&DbErr::RecordNotFound("peca".into())));
    }

    #[tokio::test]
    async fn write_gate_serializes_only_sqlite() {
        let pool = establish_connection_with_config(&DbConfig {
            url: "sqlite::memory:".into(),
            max_connections: 1,
            ..Default::default()
        })
        .await
        .unwrap();
        let gate = WriteGate::for_pool(&pool);
        assert!(gate.is_serializing());

        let held = gate.enter().await;
        assert!(held.is_some());
        let second = gate.clone();
        let waiting = tokio::spawn(async move { second.enter().await.is_some() });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiting.is_finished());
        drop(held);
        assert!(waiting.await.unwrap());

        assert!(WriteGate::default().enter().await.is_none());
    }

    #[tokio::test]
    async fn in_memory_sqlite_migrates_and_pings() {
        let pool = establish_connection_with_config(&DbConfig {
            url: "sqlite::memory:".into(),
            max_connections: 1,
            ..Default::default()
        })
        .await
        .unwrap();
        run_migrations(&pool).await.unwrap();
        assert!(check_connection(&pool).await.is_ok());
    }

    #[tokio::test]
    async fn file_database_survives_reconnect_and_remigration() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!(
            "sqlite://{}?mode=rwc",
            dir.path().join("oficina.db").display()
        );
        let config = DbConfig {
            url,
            max_connections: 2,
            ..Default::default()
        };

        let pool = establish_connection_with_config(&config).await.unwrap();
        run_migrations(&pool).await.unwrap();
        pool.close().await.unwrap();

        let pool = establish_connection_with_config(&config).await.unwrap();
        run_migrations(&pool).await.unwrap();
        assert!(check_connection(&pool).await.is_ok());
    }
}
