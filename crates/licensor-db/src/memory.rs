//! In-process storage implementing every port.
//!
//! Used by the test suites and by embedders. Writes are serialised through a
//! single lock, so the version check in `update` behaves like the conditional
//! UPDATE of the PostgreSQL adapter.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use licensor_core::ids::{LicenseId, LicenseTypeId};
use licensor_core::license::{License, LicenseFilter, LicenseType};
use licensor_core::ports::{KeyRegistry, LicenseRepository, LicenseTypeRepository, UsageLogRepository};
use licensor_core::usage::UsageLogEntry;
use licensor_core::{Error, Result};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

#[derive(Default)]
struct Inner {
    types: HashMap<LicenseTypeId, LicenseType>,
    keys: HashSet<String>,
    licenses: HashMap<String, License>,
    usage: Vec<UsageLogEntry>,
}

/// Shared in-memory store. Clones see the same data.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
    offline: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with `StorageUnavailable` until switched back.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::StorageUnavailable("memory store is offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl LicenseTypeRepository for MemoryStore {
    async fn create(&self, license_type: &LicenseType) -> Result<()> {
        self.check_online()?;
        let mut inner = self.inner.write().await;
        if inner.types.values().any(|t| t.name == license_type.name) {
            return Err(Error::DuplicateLicenseType(license_type.name.clone()));
        }
        inner.types.insert(license_type.id, license_type.clone());
        Ok(())
    }

    async fn get(&self, id: LicenseTypeId) -> Result<Option<LicenseType>> {
        self.check_online()?;
        Ok(self.inner.read().await.types.get(&id).cloned())
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<LicenseType>> {
        self.check_online()?;
        let inner = self.inner.read().await;
        Ok(inner.types.values().find(|t| t.name == name).cloned())
    }

    async fn list(&self) -> Result<Vec<LicenseType>> {
        self.check_online()?;
        let inner = self.inner.read().await;
        let mut types: Vec<LicenseType> = inner.types.values().cloned().collect();
        types.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.name.cmp(&b.name)));
        Ok(types)
    }

    async fn set_active(&self, id: LicenseTypeId, active: bool) -> Result<()> {
        self.check_online()?;
        let mut inner = self.inner.write().await;
        let license_type = inner
            .types
            .get_mut(&id)
            .ok_or_else(|| Error::InvalidLicenseType(id.to_string()))?;
        license_type.is_active = active;
        Ok(())
    }
}

#[async_trait]
impl KeyRegistry for MemoryStore {
    async fn reserve(&self, key: &str) -> Result<bool> {
        self.check_online()?;
        Ok(self.inner.write().await.keys.insert(key.to_string()))
    }
}

#[async_trait]
impl LicenseRepository for MemoryStore {
    async fn insert(&self, license: &License) -> Result<()> {
        self.check_online()?;
        let mut inner = self.inner.write().await;
        if !inner.types.contains_key(&license.license_type_id) {
            return Err(Error::InvalidLicenseType(license.license_type_id.to_string()));
        }
        if inner.licenses.contains_key(&license.key) {
            return Err(Error::DuplicateKey);
        }
        inner.keys.insert(license.key.clone());
        inner.licenses.insert(license.key.clone(), license.clone());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<License>> {
        self.check_online()?;
        Ok(self.inner.read().await.licenses.get(key).cloned())
    }

    async fn update(&self, license: &License, expected_version: u64) -> Result<()> {
        self.check_online()?;
        let mut inner = self.inner.write().await;
        let stored = inner.licenses.get_mut(&license.key).ok_or(Error::NotFound)?;
        if stored.version != expected_version {
            return Err(Error::ConcurrentModification(license.id.to_string()));
        }
        *stored = license.clone();
        Ok(())
    }

    async fn list(
        &self,
        filter: &LicenseFilter,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<License>> {
        self.check_online()?;
        let inner = self.inner.read().await;
        let mut matching = matching_licenses(&inner, filter, now);
        matching.sort_by(|a, b| b.issued_at.cmp(&a.issued_at).then_with(|| b.id.cmp(&a.id)));
        matching.truncate(limit as usize);
        Ok(matching)
    }

    async fn count(&self, filter: &LicenseFilter, now: DateTime<Utc>) -> Result<u64> {
        self.check_online()?;
        let inner = self.inner.read().await;
        Ok(matching_licenses(&inner, filter, now).len() as u64)
    }
}

fn matching_licenses(inner: &Inner, filter: &LicenseFilter, now: DateTime<Utc>) -> Vec<License> {
    inner
        .licenses
        .values()
        .filter(|license| {
            let type_name = inner
                .types
                .get(&license.license_type_id)
                .map(|t| t.name.as_str())
                .unwrap_or_default();
            filter.matches(license, type_name, now)
        })
        .cloned()
        .collect()
}

#[async_trait]
impl UsageLogRepository for MemoryStore {
    async fn append(&self, entry: &UsageLogEntry) -> Result<()> {
        self.check_online()?;
        self.inner.write().await.usage.push(entry.clone());
        Ok(())
    }

    async fn list_for_license(&self, license_id: LicenseId) -> Result<Vec<UsageLogEntry>> {
        self.check_online()?;
        let inner = self.inner.read().await;
        let mut entries: Vec<UsageLogEntry> = inner
            .usage
            .iter()
            .filter(|e| e.license_id == license_id)
            .cloned()
            .collect();
        // Stable sort keeps append order for equal timestamps.
        entries.sort_by_key(|e| e.timestamp);
        Ok(entries)
    }
}
