//! Connection pool setup and startup checks.

use std::time::{Duration, Instant};

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info, warn};

use aera_core::{Error, Result};

/// Default maximum number of connections in the pool.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Default connection timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default idle timeout in seconds.
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;

/// Connections are recycled after this long.
const MAX_LIFETIME_SECS: u64 = 1800;

/// Pool sizing and timeouts.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    /// How long to wait when acquiring a connection.
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            min_connections: 1,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
            max_lifetime: Some(Duration::from_secs(MAX_LIFETIME_SECS)),
        }
    }
}

fn env_number<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

impl PoolConfig {
    /// Defaults overridden by `DATABASE_MAX_CONNECTIONS`,
    /// `DATABASE_MIN_CONNECTIONS`, and `DATABASE_CONNECT_TIMEOUT_SECS`.
    pub fn from_env() -> Self {
        let base = Self::default();
        Self {
            max_connections: env_number("DATABASE_MAX_CONNECTIONS").unwrap_or(base.max_connections),
            min_connections: env_number("DATABASE_MIN_CONNECTIONS").unwrap_or(base.min_connections),
            connect_timeout: env_number("DATABASE_CONNECT_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(base.connect_timeout),
            ..base
        }
    }

    pub fn max_connections(mut self, n: u32) -> Self {
        self.max_connections = n;
        self
    }

    pub fn min_connections(mut self, n: u32) -> Self {
        self.min_connections = n;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    fn options(&self) -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .min_connections(self.min_connections.min(self.max_connections))
            .acquire_timeout(self.connect_timeout)
            .idle_timeout(self.idle_timeout)
            .max_lifetime(self.max_lifetime)
    }
}

/// Connect with [`PoolConfig::default`].
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    create_pool_with_config(database_url, PoolConfig::default()).await
}

pub async fn create_pool_with_config(database_url: &str, config: PoolConfig) -> Result<PgPool> {
    let start = Instant::now();
    debug!(
        subsystem = "db",
        component = "pool",
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        connect_timeout_secs = config.connect_timeout.as_secs(),
        "Connecting to Postgres"
    );

    let pool = config.options().connect(database_url).await?;

    info!(
        subsystem = "db",
        component = "pool",
        op = "connect",
        pool_size = pool.size(),
        duration_ms = start.elapsed().as_millis() as u64,
        "Database pool ready"
    );
    Ok(pool)
}

/// Fail fast when pgvector or the `match_documents` function is missing.
///
/// Run after migrations; a schema managed elsewhere may lack either.
pub async fn verify_vector_schema(pool: &PgPool) -> Result<()> {
    let (has_extension, has_function): (bool, bool) = sqlx::query_as(
        "SELECT \
            EXISTS (SELECT 1 FROM pg_extension WHERE extname = 'vector'), \
            to_regprocedure('match_documents(vector, integer, uuid)') IS NOT NULL",
    )
    .fetch_one(pool)
    .await?;

    if !has_extension {
        return Err(Error::Config(
            "Postgres extension 'vector' is not installed".to_string(),
        ));
    }
    if !has_function {
        return Err(Error::Config(
            "SQL function match_documents(vector, integer, uuid) is missing".to_string(),
        ));
    }
    debug!(subsystem = "db", component = "pool", "Vector schema verified");
    Ok(())
}

/// Log pool size and idle count; warn when every connection is busy.
pub fn log_pool_metrics(pool: &PgPool) {
    let size = pool.size();
    let idle = pool.num_idle();
    debug!(subsystem = "db", component = "pool", pool_size = size, pool_idle = idle, "Pool metrics");

    if size > 0 && idle == 0 {
        warn!(
            subsystem = "db",
            component = "pool",
            pool_size = size,
            "All pool connections are in use"
        );
    }
}
