//! PostgreSQL implementation of LicenseRepository.

use super::{is_unique_violation, like_pattern, storage_error, to_i32};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use licensor_core::ids::{LicenseId, LicenseTypeId};
use licensor_core::license::{License, LicenseFilter};
use licensor_core::ports::LicenseRepository;
use licensor_core::{Error, Result};
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tracing::debug;

const COLUMNS: &str = "l.id, l.key, l.license_type_id, l.user_name, l.status, l.max_activations, l.activated_hardware_ids, l.issued_at, l.activated_at, l.expires_at, l.expiry_pinned, l.revoked_at, l.revoked_reason, l.notes, l.version";

/// PostgreSQL implementation of LicenseRepository.
#[derive(Clone)]
pub struct PgLicenseRepository {
    pool: PgPool,
}

impl PgLicenseRepository {
    /// Create a new PgLicenseRepository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_license(r: &sqlx::postgres::PgRow) -> Result<License> {
        let status: String = r.get("status");
        Ok(License {
            id: LicenseId::from_uuid(r.get::<uuid::Uuid, _>("id")),
            key: r.get("key"),
            license_type_id: LicenseTypeId::from_uuid(r.get::<uuid::Uuid, _>("license_type_id")),
            user: r.get("user_name"),
            status: status
                .parse()
                .map_err(|_| Error::Serialization(format!("unknown license status: {}", status)))?,
            max_activations: r.get::<i32, _>("max_activations") as u32,
            activated_hardware_ids: r
                .get::<Vec<String>, _>("activated_hardware_ids")
                .into_iter()
                .collect(),
            issued_at: r.get("issued_at"),
            activated_at: r.get("activated_at"),
            expires_at: r.get("expires_at"),
            expiry_pinned: r.get("expiry_pinned"),
            revoked_at: r.get("revoked_at"),
            revoked_reason: r.get("revoked_reason"),
            notes: r.get("notes"),
            version: r.get::<i64, _>("version") as u64,
        })
    }

    /// Append the WHERE clause for a filter. The status test mirrors
    /// `License::effective_status`.
    fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &LicenseFilter, now: DateTime<Utc>) {
        qb.push(" WHERE TRUE");

        if let Some(status) = filter.status {
            qb.push(" AND (CASE WHEN l.status IN ('pending', 'active') AND l.expires_at IS NOT NULL AND l.expires_at <= ")
                .push_bind(now)
                .push(" THEN 'expired' ELSE l.status END) = ")
                .push_bind(status.as_str());
        }

        if let Some(ref name) = filter.license_type {
            qb.push(" AND t.name ILIKE ").push_bind(like_pattern(name));
        }

        if let Some(ref user) = filter.user {
            qb.push(" AND l.user_name ILIKE ").push_bind(like_pattern(user));
        }

        if let Some(cutoff) = filter.expiring_cutoff(now) {
            qb.push(" AND l.expires_at > ")
                .push_bind(now)
                .push(" AND l.expires_at <= ")
                .push_bind(cutoff);
        }

        if let Some(ref text) = filter.search {
            let pattern = like_pattern(text);
            qb.push(" AND (l.key ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR l.notes ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR l.user_name ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
    }
}

#[async_trait]
impl LicenseRepository for PgLicenseRepository {
    async fn insert(&self, license: &License) -> Result<()> {
        let hardware_ids: Vec<String> = license.activated_hardware_ids.iter().cloned().collect();
        let max_activations = to_i32("max_activations", license.max_activations)?;

        sqlx::query(
            r#"INSERT INTO licenses (id, key, license_type_id, user_name, status, max_activations, activated_hardware_ids, issued_at, activated_at, expires_at, expiry_pinned, revoked_at, revoked_reason, notes, version)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)"#,
        )
        .bind(license.id.as_uuid())
        .bind(&license.key)
        .bind(license.license_type_id.as_uuid())
        .bind(&license.user)
        .bind(license.status.as_str())
        .bind(max_activations)
        .bind(&hardware_ids)
        .bind(license.issued_at)
        .bind(license.activated_at)
        .bind(license.expires_at)
        .bind(license.expiry_pinned)
        .bind(license.revoked_at)
        .bind(&license.revoked_reason)
        .bind(&license.notes)
        .bind(license.version as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                Error::DuplicateKey
            } else if matches!(&e, sqlx::Error::Database(db) if db.is_foreign_key_violation()) {
                Error::InvalidLicenseType(license.license_type_id.to_string())
            } else {
                storage_error(e)
            }
        })?;

        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<License>> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM licenses l WHERE l.key = $1"))
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;

        row.as_ref().map(Self::row_to_license).transpose()
    }

    async fn update(&self, license: &License, expected_version: u64) -> Result<()> {
        let hardware_ids: Vec<String> = license.activated_hardware_ids.iter().cloned().collect();
        let max_activations = to_i32("max_activations", license.max_activations)?;

        let result = sqlx::query(
            "UPDATE licenses SET user_name = $3, status = $4, max_activations = $5, activated_hardware_ids = $6, activated_at = $7, expires_at = $8, expiry_pinned = $9, revoked_at = $10, revoked_reason = $11, notes = $12, version = $13, updated_at = NOW() WHERE key = $1 AND version = $2",
        )
        .bind(&license.key)
        .bind(expected_version as i64)
        .bind(&license.user)
        .bind(license.status.as_str())
        .bind(max_activations)
        .bind(&hardware_ids)
        .bind(license.activated_at)
        .bind(license.expires_at)
        .bind(license.expiry_pinned)
        .bind(license.revoked_at)
        .bind(&license.revoked_reason)
        .bind(&license.notes)
        .bind(license.version as i64)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM licenses WHERE key = $1)")
            .bind(&license.key)
            .fetch_one(&self.pool)
            .await
            .map_err(storage_error)?;

        if exists {
            debug!(key_prefix = license.key_prefix(), expected_version, "Stale license version");
            Err(Error::ConcurrentModification(license.id.to_string()))
        } else {
            Err(Error::NotFound)
        }
    }

    async fn list(
        &self,
        filter: &LicenseFilter,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<License>> {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {COLUMNS} FROM licenses l JOIN license_types t ON t.id = l.license_type_id"
        ));
        Self::push_filter(&mut qb, filter, now);
        qb.push(" ORDER BY l.issued_at DESC, l.id DESC LIMIT ")
            .push_bind(i64::from(limit));

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error)?;

        rows.iter().map(Self::row_to_license).collect()
    }

    async fn count(&self, filter: &LicenseFilter, now: DateTime<Utc>) -> Result<u64> {
        let mut qb = QueryBuilder::<Postgres>::new(
            "SELECT COUNT(*) FROM licenses l JOIN license_types t ON t.id = l.license_type_id",
        );
        Self::push_filter(&mut qb, filter, now);

        let count: i64 = qb
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(storage_error)?;

        Ok(count as u64)
    }
}
