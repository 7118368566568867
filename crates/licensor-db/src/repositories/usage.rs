//! PostgreSQL implementation of UsageLogRepository.

use super::storage_error;
use async_trait::async_trait;
use licensor_core::ids::{LicenseId, UsageLogId};
use licensor_core::ports::UsageLogRepository;
use licensor_core::usage::UsageLogEntry;
use licensor_core::Result;
use sqlx::{PgPool, Row};

#[derive(Clone)]
pub struct PgUsageLogRepository {
    pool: PgPool,
}

impl PgUsageLogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_entry(r: &sqlx::postgres::PgRow) -> Result<UsageLogEntry> {
        let kind: String = r.get("event_kind");
        Ok(UsageLogEntry {
            id: UsageLogId::from_uuid(r.get::<uuid::Uuid, _>("id")),
            license_id: LicenseId::from_uuid(r.get::<uuid::Uuid, _>("license_id")),
            event_kind: kind.parse()?,
            hardware_id: r.get("hardware_id"),
            timestamp: r.get("timestamp"),
            detail: r.get("detail"),
        })
    }
}

#[async_trait]
impl UsageLogRepository for PgUsageLogRepository {
    async fn append(&self, entry: &UsageLogEntry) -> Result<()> {
        sqlx::query("INSERT INTO usage_log (id, license_id, event_kind, hardware_id, timestamp, detail) VALUES ($1, $2, $3, $4, $5, $6)")
            .bind(entry.id.as_uuid())
            .bind(entry.license_id.as_uuid())
            .bind(entry.event_kind.as_str())
            .bind(&entry.hardware_id)
            .bind(entry.timestamp)
            .bind(&entry.detail)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(())
    }

    async fn list_for_license(&self, license_id: LicenseId) -> Result<Vec<UsageLogEntry>> {
        let rows = sqlx::query("SELECT id, license_id, event_kind, hardware_id, timestamp, detail FROM usage_log WHERE license_id = $1 ORDER BY timestamp ASC, seq ASC")
            .bind(license_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error)?;
        rows.iter().map(Self::row_to_entry).collect()
    }
}
