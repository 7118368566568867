//! PostgreSQL implementation of KeyRegistry.

use super::storage_error;
use async_trait::async_trait;
use licensor_core::Result;
use licensor_core::ports::KeyRegistry;
use sqlx::PgPool;

#[derive(Clone)]
pub struct PgKeyRegistry {
    pool: PgPool,
}

impl PgKeyRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl KeyRegistry for PgKeyRegistry {
    async fn reserve(&self, key: &str) -> Result<bool> {
        let result = sqlx::query("INSERT INTO license_keys (key) VALUES ($1) ON CONFLICT (key) DO NOTHING")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(result.rows_affected() == 1)
    }
}
