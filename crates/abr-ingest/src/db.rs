//! SQLite connection pool
//!
//! The loader is a single writer, so the pool holds one connection. File
//! databases run in WAL mode with `synchronous = NORMAL`.

use crate::config::IngestConfig;
use crate::error::Result;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
    pub busy_timeout_secs: u64,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: crate::config::DEFAULT_DATABASE_URL.to_string(),
            max_connections: 1,
            busy_timeout_secs: crate::config::DEFAULT_BUSY_TIMEOUT_SECS,
        }
    }
}

impl From<&IngestConfig> for DbConfig {
    fn from(config: &IngestConfig) -> Self {
        Self {
            url: config.database_url.clone(),
            max_connections: 1,
            busy_timeout_secs: config.busy_timeout_secs,
        }
    }
}

impl DbConfig {
    fn is_in_memory(&self) -> bool {
        self.url.contains(":memory:") || self.url.contains("mode=memory")
    }
}

pub async fn create_pool(config: &DbConfig) -> Result<SqlitePool> {
    let mut connect = SqliteConnectOptions::from_str(&config.url)?
        .create_if_missing(true)
        .busy_timeout(Duration::from_secs(config.busy_timeout_secs))
        // Child tables declare references to abr_records without enforcing them.
        .foreign_keys(false);

    let mut options = SqlitePoolOptions::new().max_connections(config.max_connections);

    if config.is_in_memory() {
        // Each connection to :memory: is its own database; keep the one alive.
        options = options
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None);
    } else {
        connect = connect
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);
    }

    let pool = options.connect_with(connect).await?;

    tracing::info!(
        url = %config.url,
        max_connections = config.max_connections,
        "Database connection pool created"
    );

    Ok(pool)
}

/// Private in-memory database, mainly for tests
pub async fn connect_in_memory() -> Result<SqlitePool> {
    create_pool(&DbConfig {
        url: "sqlite::memory:".to_string(),
        ..DbConfig::default()
    })
    .await
}

pub async fn health_check(pool: &SqlitePool) -> Result<()> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}
