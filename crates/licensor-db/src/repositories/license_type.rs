//! PostgreSQL implementation of LicenseTypeRepository.

use super::{is_unique_violation, storage_error, to_i32};
use async_trait::async_trait;
use licensor_core::ids::LicenseTypeId;
use licensor_core::license::LicenseType;
use licensor_core::ports::LicenseTypeRepository;
use licensor_core::{Error, Result};
use sqlx::{PgPool, Row};

const COLUMNS: &str = "id, name, description, max_instances, duration_days, is_active, created_at";

#[derive(Clone)]
pub struct PgLicenseTypeRepository {
    pool: PgPool,
}

impl PgLicenseTypeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_type(r: &sqlx::postgres::PgRow) -> LicenseType {
        LicenseType {
            id: LicenseTypeId::from_uuid(r.get::<uuid::Uuid, _>("id")),
            name: r.get("name"),
            description: r.get("description"),
            max_instances: r.get::<i32, _>("max_instances") as u32,
            duration_days: r.get::<i32, _>("duration_days") as u32,
            is_active: r.get("is_active"),
            created_at: r.get("created_at"),
        }
    }
}

#[async_trait]
impl LicenseTypeRepository for PgLicenseTypeRepository {
    async fn create(&self, license_type: &LicenseType) -> Result<()> {
        let max_instances = to_i32("max_instances", license_type.max_instances)?;
        let duration_days = to_i32("duration_days", license_type.duration_days)?;

        sqlx::query("INSERT INTO license_types (id, name, description, max_instances, duration_days, is_active, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7)")
            .bind(license_type.id.as_uuid())
            .bind(&license_type.name)
            .bind(&license_type.description)
            .bind(max_instances)
            .bind(duration_days)
            .bind(license_type.is_active)
            .bind(license_type.created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    Error::DuplicateLicenseType(license_type.name.clone())
                } else {
                    storage_error(e)
                }
            })?;
        Ok(())
    }

    async fn get(&self, id: LicenseTypeId) -> Result<Option<LicenseType>> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM license_types WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(row.as_ref().map(Self::row_to_type))
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<LicenseType>> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM license_types WHERE name = $1"))
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(row.as_ref().map(Self::row_to_type))
    }

    async fn list(&self) -> Result<Vec<LicenseType>> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM license_types ORDER BY created_at ASC, name ASC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(rows.iter().map(Self::row_to_type).collect())
    }

    async fn set_active(&self, id: LicenseTypeId, active: bool) -> Result<()> {
        let result = sqlx::query("UPDATE license_types SET is_active = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(active)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;
        if result.rows_affected() == 0 {
            return Err(Error::InvalidLicenseType(id.to_string()));
        }
        Ok(())
    }
}
