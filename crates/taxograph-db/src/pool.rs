//! Database connection pool management.

use std::time::{Duration, Instant};

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info, warn};

use taxograph_core::config::env_or;
use taxograph_core::{defaults, Error, Result};

/// Default connection timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default idle timeout in seconds.
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;

/// Pool configuration options.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of connections in the pool.
    pub max_connections: u32,
    /// Minimum number of connections to maintain.
    pub min_connections: u32,
    /// Connection timeout duration.
    pub connect_timeout: Duration,
    /// Idle connection timeout duration.
    pub idle_timeout: Duration,
    /// Connection attempts before giving up.
    pub connect_attempts: u32,
    /// Fixed pause between connection attempts.
    pub retry_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: defaults::STORE_MAX_CONNECTIONS,
            min_connections: 1,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
            connect_attempts: defaults::STORE_CONNECT_ATTEMPTS,
            retry_interval: Duration::from_secs(defaults::STORE_RETRY_INTERVAL_SECS),
        }
    }
}

impl PoolConfig {
    /// Create a new pool configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read `STORE_MAX_CONNECTIONS`, `STORE_CONNECT_ATTEMPTS` and
    /// `STORE_RETRY_INTERVAL_SECS`, keeping defaults for unset variables.
    pub fn from_env() -> Result<Self> {
        let base = Self::default();
        Ok(Self {
            max_connections: env_or("STORE_MAX_CONNECTIONS", base.max_connections)?,
            connect_attempts: env_or("STORE_CONNECT_ATTEMPTS", base.connect_attempts)?,
            retry_interval: Duration::from_secs(env_or(
                "STORE_RETRY_INTERVAL_SECS",
                defaults::STORE_RETRY_INTERVAL_SECS,
            )?),
            ..base
        })
    }

    /// Set the maximum number of connections.
    pub fn max_connections(mut self, n: u32) -> Self {
        self.max_connections = n;
        self
    }

    /// Set the minimum number of connections.
    pub fn min_connections(mut self, n: u32) -> Self {
        self.min_connections = n;
        self
    }

    /// Set the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the number of connection attempts (at least one is always made).
    pub fn connect_attempts(mut self, n: u32) -> Self {
        self.connect_attempts = n;
        self
    }

    /// Set the pause between connection attempts.
    pub fn retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }
}

/// Create a new PostgreSQL connection pool with default configuration.
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    create_pool_with_config(database_url, PoolConfig::default()).await
}

/// Create a PostgreSQL connection pool, retrying at a fixed interval.
///
/// Returns `StoreUnavailable` once `connect_attempts` attempts have failed
/// with connectivity errors. Other failures (bad credentials, malformed URL)
/// are returned immediately.
pub async fn create_pool_with_config(database_url: &str, config: PoolConfig) -> Result<PgPool> {
    let start = Instant::now();
    let attempts = config.connect_attempts.max(1);

    info!(
        subsystem = "db",
        component = "pool",
        op = "create",
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        connect_attempts = attempts,
        retry_interval_secs = config.retry_interval.as_secs(),
        "Creating database connection pool"
    );

    let mut last_error = String::new();
    for attempt in 1..=attempts {
        let options = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout)
            .idle_timeout(config.idle_timeout);

        match options.connect(database_url).await {
            Ok(pool) => {
                info!(
                    subsystem = "db",
                    component = "pool",
                    op = "established",
                    attempt,
                    pool_size = pool.size(),
                    pool_idle = pool.num_idle(),
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Database connection pool established"
                );
                return Ok(pool);
            }
            Err(e) => match Error::from_store(e) {
                Error::StoreUnavailable(msg) => {
                    warn!(
                        subsystem = "db",
                        component = "pool",
                        op = "connect",
                        attempt,
                        max_attempts = attempts,
                        error = %msg,
                        "Database connection attempt failed"
                    );
                    last_error = msg;
                    if attempt < attempts {
                        tokio::time::sleep(config.retry_interval).await;
                    }
                }
                other => return Err(other),
            },
        }
    }

    Err(Error::StoreUnavailable(format!(
        "gave up after {} attempts: {}",
        attempts, last_error
    )))
}

/// Log current pool health metrics.
///
/// Emits structured debug-level log with pool size, idle count,
/// and warns if idle connections drop below 1 (potential exhaustion).
pub fn log_pool_metrics(pool: &PgPool) {
    let size = pool.size();
    let idle = pool.num_idle();

    debug!(
        subsystem = "db",
        component = "pool",
        op = "metrics",
        pool_size = size,
        pool_idle = idle,
        "Pool health check"
    );

    if idle == 0 && size > 0 {
        warn!(
            subsystem = "db",
            component = "pool",
            pool_size = size,
            "Connection pool has no idle connections, potential exhaustion"
        );
    }
}
