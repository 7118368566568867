//! Storage adapters for Licensor.
//!
//! PostgreSQL repositories for production use and an in-process
//! [`MemoryStore`] implementing the same ports.

pub mod memory;
pub mod repositories;

pub use memory::MemoryStore;
pub use repositories::*;

use licensor_core::Result;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;
use tracing::info;

/// Connection pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL.
    pub url: String,
    /// Maximum pooled connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Upper bound on waiting for a pooled connection.
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,
}

fn default_max_connections() -> u32 {
    10
}

fn default_acquire_timeout() -> u64 {
    5
}

impl DatabaseConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: default_max_connections(),
            acquire_timeout_secs: default_acquire_timeout(),
        }
    }
}

/// Database connection pool.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connect to the database.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(&config.url)
            .await
            .map_err(storage_error)?;

        Ok(Self { pool })
    }

    /// Get the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| licensor_core::Error::StorageUnavailable(e.to_string()))?;
        info!("Database migrations applied");
        Ok(())
    }

    pub fn license_types(&self) -> PgLicenseTypeRepository {
        PgLicenseTypeRepository::new(self.pool.clone())
    }

    pub fn key_registry(&self) -> PgKeyRegistry {
        PgKeyRegistry::new(self.pool.clone())
    }

    pub fn licenses(&self) -> PgLicenseRepository {
        PgLicenseRepository::new(self.pool.clone())
    }

    pub fn usage_log(&self) -> PgUsageLogRepository {
        PgUsageLogRepository::new(self.pool.clone())
    }
}
