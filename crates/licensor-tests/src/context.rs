//! Test context providing access to all test infrastructure.

use crate::containers::PostgresContainer;
use crate::fixtures::start_time;
use licensor_core::ManualClock;
use licensor_db::{Database, DatabaseConfig};
use licensor_engine::{EngineConfig, LicenseService, Stores};
use std::sync::Arc;

/// PostgreSQL plus an engine wired to it.
///
/// Drop this to stop the container.
pub struct TestContext {
    pub postgres: PostgresContainer,
    pub db: Database,
    pub service: Arc<LicenseService>,
    pub clock: ManualClock,
}

impl TestContext {
    /// Start PostgreSQL, migrate it and build an engine with default settings.
    pub async fn postgres() -> anyhow::Result<Self> {
        Self::with_config(EngineConfig::default()).await
    }

    pub async fn with_config(config: EngineConfig) -> anyhow::Result<Self> {
        crate::init_test_logging();

        let postgres = PostgresContainer::start().await?;
        let db = Database::connect(&DatabaseConfig::new(postgres.connection_string())).await?;
        db.migrate().await?;

        let clock = ManualClock::new(start_time());
        let stores = Stores {
            license_types: Arc::new(db.license_types()),
            keys: Arc::new(db.key_registry()),
            licenses: Arc::new(db.licenses()),
            usage_log: Arc::new(db.usage_log()),
        };
        let service = LicenseService::new(stores, config, Arc::new(clock.clone()))?;

        Ok(Self {
            postgres,
            db,
            service: Arc::new(service),
            clock,
        })
    }

    /// Get database connection string.
    pub fn db_url(&self) -> &str {
        self.postgres.connection_string()
    }
}
