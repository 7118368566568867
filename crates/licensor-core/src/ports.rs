//! Port traits (hexagonal architecture).
//!
//! These traits define the interfaces between the licensing engine and the
//! storage adapters.

use crate::ids::*;
use crate::license::{License, LicenseFilter, LicenseType};
use crate::usage::UsageLogEntry;
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Repository for license types.
#[async_trait]
pub trait LicenseTypeRepository: Send + Sync {
    /// Create a license type. Fails with `DuplicateLicenseType` on a name clash.
    async fn create(&self, license_type: &LicenseType) -> Result<()>;

    /// Get a license type by ID.
    async fn get(&self, id: LicenseTypeId) -> Result<Option<LicenseType>>;

    /// Get a license type by exact name.
    async fn get_by_name(&self, name: &str) -> Result<Option<LicenseType>>;

    /// List all license types, oldest first.
    async fn list(&self) -> Result<Vec<LicenseType>>;

    /// Enable or disable issuance for a type.
    async fn set_active(&self, id: LicenseTypeId, active: bool) -> Result<()>;
}

/// Registry of every key ever handed out.
///
/// Reservation is the atomic uniqueness check: keys are never released, so a
/// revoked license's key can not be issued again.
#[async_trait]
pub trait KeyRegistry: Send + Sync {
    /// Reserve a key. Returns `false` if it was already taken.
    async fn reserve(&self, key: &str) -> Result<bool>;
}

/// Repository for licenses.
#[async_trait]
pub trait LicenseRepository: Send + Sync {
    /// Insert a new license. Fails with `DuplicateKey` if the key exists.
    async fn insert(&self, license: &License) -> Result<()>;

    /// Get a license by key.
    async fn get(&self, key: &str) -> Result<Option<License>>;

    /// Replace a stored license if its version still equals `expected_version`.
    ///
    /// The stored row takes `license.version`. Fails with
    /// `ConcurrentModification` when another writer got there first and with
    /// `NotFound` when no license has that key.
    async fn update(&self, license: &License, expected_version: u64) -> Result<()>;

    /// List licenses matching a filter, newest first.
    async fn list(
        &self,
        filter: &LicenseFilter,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<License>>;

    /// Count licenses matching a filter.
    async fn count(&self, filter: &LicenseFilter, now: DateTime<Utc>) -> Result<u64>;
}

/// Append-only store for usage log entries.
#[async_trait]
pub trait UsageLogRepository: Send + Sync {
    /// Append an entry.
    async fn append(&self, entry: &UsageLogEntry) -> Result<()>;

    /// Entries for a license in chronological order.
    async fn list_for_license(&self, license_id: LicenseId) -> Result<Vec<UsageLogEntry>>;
}
