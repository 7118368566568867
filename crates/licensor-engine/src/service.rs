//! Public operations of the licensing engine.

use crate::audit::AuditLogger;
use crate::config::EngineConfig;
use crate::fingerprint::local_fingerprint;
use crate::keygen::normalize_key;
use crate::lifecycle::{CreateLicense, LicenseLifecycle};
use crate::validation::Validator;
use chrono::{DateTime, Utc};
use licensor_core::ids::LicenseTypeId;
use licensor_core::license::NewLicenseType;
use licensor_core::ports::{
    KeyRegistry, LicenseRepository, LicenseTypeRepository, UsageLogRepository,
};
use licensor_core::{
    Clock, Error, License, LicenseFilter, LicenseType, Result, UsageLogEntry, ValidationResult,
};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};
use tracing::info;

/// Rows returned by `list_licenses` when no limit is given.
pub const DEFAULT_LIST_LIMIT: u32 = 50;

/// Largest batch a single `generate_licenses` call may issue.
pub const MAX_BATCH: u32 = 1000;

/// The storage ports the engine runs on.
#[derive(Clone)]
pub struct Stores {
    pub license_types: Arc<dyn LicenseTypeRepository>,
    pub keys: Arc<dyn KeyRegistry>,
    pub licenses: Arc<dyn LicenseRepository>,
    pub usage_log: Arc<dyn UsageLogRepository>,
}

impl Stores {
    /// Use one backend for every port.
    pub fn shared<S>(store: S) -> Self
    where
        S: LicenseTypeRepository + KeyRegistry + LicenseRepository + UsageLogRepository + 'static,
    {
        let store = Arc::new(store);
        Self {
            license_types: store.clone(),
            keys: store.clone(),
            licenses: store.clone(),
            usage_log: store,
        }
    }
}

/// Request to issue one or more licenses of a type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateLicenses {
    pub license_type_id: LicenseTypeId,
    pub user: Option<String>,
    pub prefix: Option<String>,
    /// Only allowed when `count` is 1.
    pub custom_key: Option<String>,
    pub max_activations: Option<u32>,
    pub expires_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub count: u32,
}

impl GenerateLicenses {
    pub fn new(license_type_id: LicenseTypeId) -> Self {
        Self {
            license_type_id,
            user: None,
            prefix: None,
            custom_key: None,
            max_activations: None,
            expires_at: None,
            notes: None,
            count: 1,
        }
    }

    fn single(&self) -> CreateLicense {
        CreateLicense {
            license_type_id: self.license_type_id,
            user: self.user.clone(),
            prefix: self.prefix.clone(),
            custom_key: self.custom_key.clone(),
            max_activations: self.max_activations,
            expires_at: self.expires_at,
            notes: self.notes.clone(),
        }
    }
}

/// A license together with its type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LicenseDetails {
    pub license: License,
    pub license_type: LicenseType,
}

/// Facade used by the CLI and embedders.
pub struct LicenseService {
    stores: Stores,
    lifecycle: Arc<LicenseLifecycle>,
    validator: Validator,
    clock: Arc<dyn Clock>,
    local_fingerprint: OnceLock<String>,
}

impl LicenseService {
    pub fn new(stores: Stores, config: EngineConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let audit = AuditLogger::new(stores.usage_log.clone());
        let lifecycle = Arc::new(LicenseLifecycle::new(
            stores.license_types.clone(),
            stores.licenses.clone(),
            stores.keys.clone(),
            audit.clone(),
            clock.clone(),
            &config,
        )?);
        let validator = Validator::new(
            lifecycle.clone(),
            stores.license_types.clone(),
            audit,
            clock.clone(),
            config.hardware_policy,
        );

        Ok(Self {
            stores,
            lifecycle,
            validator,
            clock,
            local_fingerprint: OnceLock::new(),
        })
    }

    pub fn lifecycle(&self) -> &LicenseLifecycle {
        &self.lifecycle
    }

    /// Fingerprint used when a caller gives no hardware id.
    pub fn local_fingerprint(&self) -> &str {
        self.local_fingerprint.get_or_init(local_fingerprint)
    }

    pub async fn create_license_type(&self, new: NewLicenseType) -> Result<LicenseType> {
        new.validate()?;
        let license_type = LicenseType::from_new(new, self.clock.now());

        if self
            .stores
            .license_types
            .get_by_name(&license_type.name)
            .await?
            .is_some()
        {
            return Err(Error::DuplicateLicenseType(license_type.name));
        }

        self.stores.license_types.create(&license_type).await?;
        info!(
            license_type_id = %license_type.id,
            name = %license_type.name,
            max_instances = license_type.max_instances,
            duration_days = license_type.duration_days,
            "License type created"
        );
        Ok(license_type)
    }

    pub async fn list_license_types(&self) -> Result<Vec<LicenseType>> {
        self.stores.license_types.list().await
    }

    /// Look a type up by id (`ltp_...` or bare UUID) or exact name.
    pub async fn find_license_type(&self, id_or_name: &str) -> Result<LicenseType> {
        let found = match id_or_name.parse::<LicenseTypeId>() {
            Ok(id) => self.stores.license_types.get(id).await?,
            Err(_) => self.stores.license_types.get_by_name(id_or_name.trim()).await?,
        };
        found.ok_or_else(|| Error::InvalidLicenseType(id_or_name.to_string()))
    }

    /// Stop or resume issuance for a type. Existing licenses are unaffected.
    pub async fn set_license_type_active(&self, id: LicenseTypeId, active: bool) -> Result<()> {
        self.stores.license_types.set_active(id, active).await?;
        info!(license_type_id = %id, active, "License type issuance toggled");
        Ok(())
    }

    /// Issue `request.count` licenses.
    ///
    /// Licenses issued before a failure stay issued; the error is returned.
    pub async fn generate_licenses(&self, request: GenerateLicenses) -> Result<Vec<License>> {
        if request.count == 0 || request.count > MAX_BATCH {
            return Err(Error::InvalidInput(format!(
                "count must be between 1 and {}",
                MAX_BATCH
            )));
        }
        if request.custom_key.is_some() && request.count > 1 {
            return Err(Error::InvalidInput(
                "a custom key can only be used for a single license".into(),
            ));
        }

        let mut issued = Vec::with_capacity(request.count as usize);
        for _ in 0..request.count {
            issued.push(self.lifecycle.create(request.single()).await?);
        }

        if issued.len() > 1 {
            info!(count = issued.len(), "License batch issued");
        }
        Ok(issued)
    }

    pub async fn check_license(
        &self,
        key: &str,
        hardware_id: Option<&str>,
    ) -> Result<ValidationResult> {
        self.validator.validate(key, hardware_id).await
    }

    /// Activate on `hardware_id`, or on this machine when none is given.
    pub async fn activate_license(&self, key: &str, hardware_id: Option<&str>) -> Result<License> {
        let hardware_id = match hardware_id {
            Some(hardware_id) => hardware_id,
            None => self.local_fingerprint(),
        };
        self.lifecycle.activate(key, hardware_id).await
    }

    /// Release the slot of `hardware_id`, or of this machine when none is given.
    pub async fn deactivate_license(
        &self,
        key: &str,
        hardware_id: Option<&str>,
    ) -> Result<License> {
        let hardware_id = match hardware_id {
            Some(hardware_id) => hardware_id,
            None => self.local_fingerprint(),
        };
        self.lifecycle.deactivate(key, hardware_id).await
    }

    pub async fn revoke_license(&self, key: &str, reason: Option<String>) -> Result<License> {
        self.lifecycle.revoke(key, reason).await
    }

    pub async fn get_license(&self, key: &str) -> Result<LicenseDetails> {
        let license = self.lifecycle.fetch(key).await?;
        let license_type = self
            .stores
            .license_types
            .get(license.license_type_id)
            .await?
            .ok_or_else(|| Error::InvalidLicenseType(license.license_type_id.to_string()))?;
        Ok(LicenseDetails {
            license,
            license_type,
        })
    }

    /// Licenses matching `filter`, newest first.
    ///
    /// Lapsed licenses are reported as expired without being written.
    pub async fn list_licenses(
        &self,
        filter: &LicenseFilter,
        limit: Option<u32>,
    ) -> Result<Vec<License>> {
        filter.validate()?;
        let now = self.clock.now();
        let limit = limit.unwrap_or(DEFAULT_LIST_LIMIT);
        let mut licenses = self.stores.licenses.list(filter, now, limit).await?;
        for license in &mut licenses {
            license.status = license.effective_status(now);
        }
        Ok(licenses)
    }

    pub async fn count_licenses(&self, filter: &LicenseFilter) -> Result<u64> {
        filter.validate()?;
        self.stores.licenses.count(filter, self.clock.now()).await
    }

    /// Usage entries of a license, oldest first.
    pub async fn activity_log(&self, key: &str) -> Result<Vec<UsageLogEntry>> {
        let key = normalize_key(key);
        let license = self
            .stores
            .licenses
            .get(&key)
            .await?
            .ok_or(Error::NotFound)?;
        self.stores.usage_log.list_for_license(license.id).await
    }
}
