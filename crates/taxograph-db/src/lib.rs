//! # taxograph-db
//!
//! Graph store implementations for taxograph.
//!
//! This crate provides:
//! - Connection pool management with bounded, fixed-interval connect retry
//! - `PgGraphStore`: PostgreSQL implementation of the store contracts
//! - `InMemoryGraphStore`: in-process implementation for tests and fixtures
//! - `GraphSeed`: declarative fixtures loadable into either store
//!
//! ## Example
//!
//! ```rust,ignore
//! use taxograph_db::{Database, PoolConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect_with_config(
//!         "postgres://localhost/taxograph",
//!         PoolConfig::from_env()?,
//!     )
//!     .await?;
//!     db.healthcheck().await?;
//!     db.close().await;
//!     Ok(())
//! }
//! ```

pub mod graph_store;
pub mod memory;
pub mod pool;
pub mod seed;

// Test fixtures for integration tests
// Note: Always compiled so integration tests (in tests/) can use DEFAULT_TEST_DATABASE_URL
pub mod test_fixtures;

pub use graph_store::PgGraphStore;
pub use memory::InMemoryGraphStore;
pub use pool::{create_pool, create_pool_with_config, log_pool_metrics, PoolConfig};
pub use seed::GraphSeed;

// Re-export core types
pub use taxograph_core::{Error, GraphStore, GraphWriter, Result};

use taxograph_core::ResourceRef;

/// Check that `resource` may be attached to `parent`.
///
/// Datasets stand alone; every other resource type needs an owner of a
/// compatible type.
pub fn validate_parentage(resource: &ResourceRef, parent: Option<&ResourceRef>) -> Result<()> {
    match parent {
        Some(parent) if !resource.kind.can_belong_to(parent.kind) => Err(Error::InvalidQuery(
            format!("{} cannot belong to {}", resource.kind, parent.kind),
        )),
        None if resource.kind != taxograph_core::ResourceType::Dataset => Err(
            Error::InvalidQuery(format!("{} requires a parent resource", resource.kind)),
        ),
        _ => Ok(()),
    }
}

/// Owned handle on the PostgreSQL store.
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Graph store over the pool.
    pub graph: PgGraphStore,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            graph: PgGraphStore::new(pool.clone()),
            pool,
        }
    }

    /// Connect with default pool configuration.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Connect with custom pool configuration.
    ///
    /// Fails with `StoreUnavailable` once the configured attempts are spent.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Round trip to the server, logging pool metrics.
    pub async fn healthcheck(&self) -> Result<()> {
        self.graph.healthcheck().await?;
        log_pool_metrics(&self.pool);
        Ok(())
    }

    /// Close every pooled connection and wait for them to finish.
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::info!(
            subsystem = "db",
            component = "pool",
            op = "close",
            "Database connection pool closed"
        );
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}
