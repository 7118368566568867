//! License lifecycle state machine.
//!
//! ```text
//! Pending ──activate──▶ Active ──(expires_at passes)──▶ Expired
//!    │                    │                               │
//!    └──────────revoke────┴────────────revoke─────────────┴──▶ Revoked
//! ```
//!
//! Every mutation is a read-modify-write guarded by the license version, so
//! two writers racing on the same key can not both pass a capacity check.
//! Lapsed licenses are flipped to `Expired` the first time they are read.

use crate::audit::AuditLogger;
use crate::config::EngineConfig;
use crate::keygen::{KeyGenerator, normalize_key};
use chrono::{DateTime, Duration, Utc};
use licensor_core::ids::{LicenseId, LicenseTypeId};
use licensor_core::license::{MAX_ACTIVATIONS, checked_expiry, key_prefix, normalize_hardware_id};
use licensor_core::ports::{KeyRegistry, LicenseRepository, LicenseTypeRepository};
use licensor_core::{Clock, Error, License, LicenseStatus, LicenseType, Result, UsageEventKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Request to issue a single license.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateLicense {
    pub license_type_id: LicenseTypeId,
    pub user: Option<String>,
    /// Extra leading key group.
    pub prefix: Option<String>,
    /// Caller-chosen key instead of a generated one.
    pub custom_key: Option<String>,
    /// Overrides the type's `max_instances`.
    pub max_activations: Option<u32>,
    /// Fixed expiry, kept across activation.
    pub expires_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

impl CreateLicense {
    pub fn new(license_type_id: LicenseTypeId) -> Self {
        Self {
            license_type_id,
            user: None,
            prefix: None,
            custom_key: None,
            max_activations: None,
            expires_at: None,
            notes: None,
        }
    }
}

/// Result of applying a transition rule to a license.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Changed,
    Unchanged,
}

/// Owns every license state transition.
pub struct LicenseLifecycle {
    types: Arc<dyn LicenseTypeRepository>,
    licenses: Arc<dyn LicenseRepository>,
    keygen: KeyGenerator,
    audit: AuditLogger,
    clock: Arc<dyn Clock>,
    max_write_attempts: u32,
}

impl LicenseLifecycle {
    pub fn new(
        types: Arc<dyn LicenseTypeRepository>,
        licenses: Arc<dyn LicenseRepository>,
        keys: Arc<dyn KeyRegistry>,
        audit: AuditLogger,
        clock: Arc<dyn Clock>,
        config: &EngineConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            types,
            licenses,
            keygen: KeyGenerator::new(config.key_format.clone(), keys)?,
            audit,
            clock,
            max_write_attempts: config.max_write_attempts,
        })
    }

    pub fn keygen(&self) -> &KeyGenerator {
        &self.keygen
    }

    /// Issue a new `Pending` license.
    pub async fn create(&self, request: CreateLicense) -> Result<License> {
        let license_type = self
            .types
            .get(request.license_type_id)
            .await?
            .ok_or_else(|| Error::InvalidLicenseType(request.license_type_id.to_string()))?;

        if !license_type.is_active {
            return Err(Error::InvalidLicenseType(format!(
                "{} is not accepting new licenses",
                license_type.name
            )));
        }

        let max_activations = request.max_activations.unwrap_or(license_type.max_instances);
        if max_activations == 0 || max_activations > MAX_ACTIVATIONS {
            return Err(Error::InvalidInput(format!(
                "max_activations must be between 1 and {}",
                MAX_ACTIVATIONS
            )));
        }

        let now = self.clock.now();
        if let Some(expires_at) = request.expires_at
            && expires_at <= now
        {
            return Err(Error::InvalidInput("expiry must be in the future".into()));
        }

        let expires_at = match request.expires_at {
            Some(pinned) => pinned,
            None => checked_expiry(now, license_type.duration())?,
        };

        let key = match (&request.custom_key, &request.prefix) {
            (Some(_), Some(_)) => {
                return Err(Error::InvalidInput(
                    "a custom key can not be combined with a prefix".into(),
                ));
            }
            (Some(custom), None) => self.keygen.reserve_custom(custom).await?,
            (None, prefix) => self.keygen.generate(prefix.as_deref()).await?,
        };

        let license = License {
            id: LicenseId::new(),
            key,
            license_type_id: license_type.id,
            user: request.user.filter(|u| !u.trim().is_empty()),
            status: LicenseStatus::Pending,
            max_activations,
            activated_hardware_ids: BTreeSet::new(),
            issued_at: now,
            activated_at: None,
            expires_at: Some(expires_at),
            expiry_pinned: request.expires_at.is_some(),
            revoked_at: None,
            revoked_reason: None,
            notes: request.notes.filter(|n| !n.trim().is_empty()),
            version: 0,
        };

        self.licenses.insert(&license).await?;

        info!(
            license_id = %license.id,
            key_prefix = license.key_prefix(),
            license_type = %license_type.name,
            "License issued"
        );
        self.audit
            .record(
                &license,
                UsageEventKind::Generated,
                None,
                Some(format!("type {}", license_type.name)),
                now,
            )
            .await;

        Ok(license)
    }

    /// Read a license, persisting a pending expiry flip.
    pub async fn fetch(&self, key: &str) -> Result<License> {
        let key = self.checked_key(key)?;

        for attempt in 1..=self.max_write_attempts {
            let license = self.load(&key).await?;
            match self.settle(license, self.clock.now()).await {
                Err(Error::ConcurrentModification(_)) => {
                    debug!(key_prefix = key_prefix(&key), attempt, "Expiry flip raced, re-reading");
                }
                other => return other,
            }
        }

        Err(Error::ConcurrentModification(key_prefix(&key).to_string()))
    }

    /// Bind a device to a license, consuming an activation slot.
    ///
    /// Re-activating a bound device is a no-op and writes no usage entry.
    pub async fn activate(&self, key: &str, hardware_id: &str) -> Result<License> {
        let hardware_id = normalize_hardware_id(hardware_id)?;
        let license_type = self.license_type_of(key).await?;
        let duration = license_type.duration();

        let result = self
            .apply(key, |license, now| {
                activate_in_place(license, &hardware_id, duration, now)
            })
            .await;

        match result {
            Ok((license, Change::Changed, now)) => {
                info!(
                    license_id = %license.id,
                    key_prefix = license.key_prefix(),
                    hardware_prefix = key_prefix(&hardware_id),
                    activations = license.activation_count(),
                    "License activated"
                );
                self.audit
                    .record(&license, UsageEventKind::Activated, Some(&hardware_id), None, now)
                    .await;
                Ok(license)
            }
            Ok((license, Change::Unchanged, _)) => {
                debug!(
                    key_prefix = license.key_prefix(),
                    hardware_prefix = key_prefix(&hardware_id),
                    "Device already bound"
                );
                Ok(license)
            }
            Err(e) => {
                warn!(
                    key_prefix = key_prefix(key),
                    hardware_prefix = key_prefix(&hardware_id),
                    error = e.code(),
                    "Activation rejected"
                );
                Err(e)
            }
        }
    }

    /// Release the slot held by a device.
    pub async fn deactivate(&self, key: &str, hardware_id: &str) -> Result<License> {
        let hardware_id = normalize_hardware_id(hardware_id)?;

        let (license, _, now) = self
            .apply(key, |license, _| deactivate_in_place(license, &hardware_id))
            .await
            .inspect_err(|e| {
                warn!(key_prefix = key_prefix(key), error = e.code(), "Deactivation rejected")
            })?;

        info!(
            license_id = %license.id,
            key_prefix = license.key_prefix(),
            hardware_prefix = key_prefix(&hardware_id),
            activations = license.activation_count(),
            "Device deactivated"
        );
        self.audit
            .record(&license, UsageEventKind::Deactivated, Some(&hardware_id), None, now)
            .await;
        Ok(license)
    }

    /// Revoke a license permanently. Revoking twice is a no-op.
    pub async fn revoke(&self, key: &str, reason: Option<String>) -> Result<License> {
        let reason = reason.filter(|r| !r.trim().is_empty());

        let (license, change, now) = self
            .apply(key, |license, now| revoke_in_place(license, reason.clone(), now))
            .await?;

        if change == Change::Unchanged {
            debug!(key_prefix = license.key_prefix(), "License already revoked");
            return Ok(license);
        }

        info!(
            license_id = %license.id,
            key_prefix = license.key_prefix(),
            "License revoked"
        );
        self.audit
            .record(&license, UsageEventKind::Revoked, None, reason, now)
            .await;
        Ok(license)
    }

    /// Read-modify-write loop guarded by the license version.
    async fn apply<F>(&self, key: &str, mut rule: F) -> Result<(License, Change, DateTime<Utc>)>
    where
        F: FnMut(&mut License, DateTime<Utc>) -> Result<Change>,
    {
        let key = self.checked_key(key)?;

        for attempt in 1..=self.max_write_attempts {
            let now = self.clock.now();
            let current = match self.settle(self.load(&key).await?, now).await {
                Ok(license) => license,
                Err(Error::ConcurrentModification(_)) => {
                    debug!(key_prefix = key_prefix(&key), attempt, "Expiry flip raced, re-reading");
                    continue;
                }
                Err(e) => return Err(e),
            };

            let mut next = current.clone();
            if rule(&mut next, now)? == Change::Unchanged {
                return Ok((current, Change::Unchanged, now));
            }

            next.version = current.version + 1;
            match self.licenses.update(&next, current.version).await {
                Ok(()) => return Ok((next, Change::Changed, now)),
                Err(Error::ConcurrentModification(_)) => {
                    debug!(key_prefix = key_prefix(&key), attempt, "License changed underneath, retrying");
                }
                Err(e) => return Err(e),
            }
        }

        warn!(
            key_prefix = key_prefix(&key),
            attempts = self.max_write_attempts,
            "Giving up on contended license"
        );
        Err(Error::ConcurrentModification(key_prefix(&key).to_string()))
    }

    /// Persist the `Expired` flip of a lapsed license.
    async fn settle(&self, license: License, now: DateTime<Utc>) -> Result<License> {
        if !license.is_lapsed(now) {
            return Ok(license);
        }

        let mut expired = license.clone();
        expired.status = LicenseStatus::Expired;
        expired.version = license.version + 1;
        self.licenses.update(&expired, license.version).await?;

        info!(
            license_id = %expired.id,
            key_prefix = expired.key_prefix(),
            "License expired"
        );
        self.audit
            .record(
                &expired,
                UsageEventKind::Expired,
                None,
                expired.expires_at.map(|at| format!("expired at {}", at.to_rfc3339())),
                now,
            )
            .await;

        Ok(expired)
    }

    async fn load(&self, key: &str) -> Result<License> {
        self.licenses.get(key).await?.ok_or(Error::NotFound)
    }

    pub(crate) async fn license_type_of(&self, key: &str) -> Result<LicenseType> {
        let license = self.load(&self.checked_key(key)?).await?;
        self.types
            .get(license.license_type_id)
            .await?
            .ok_or_else(|| Error::InvalidLicenseType(license.license_type_id.to_string()))
    }

    /// Malformed keys are answered exactly like unknown ones.
    fn checked_key(&self, key: &str) -> Result<String> {
        let key = normalize_key(key);
        if self.keygen.format().is_well_formed(&key) {
            Ok(key)
        } else {
            Err(Error::NotFound)
        }
    }
}

fn activate_in_place(
    license: &mut License,
    hardware_id: &str,
    duration: Duration,
    now: DateTime<Utc>,
) -> Result<Change> {
    match license.status {
        LicenseStatus::Revoked => Err(Error::AlreadyRevoked),
        LicenseStatus::Expired => Err(Error::LicenseExpired),
        LicenseStatus::Pending => {
            if !license.expiry_pinned {
                license.expires_at = Some(checked_expiry(now, duration)?);
            }
            license.status = LicenseStatus::Active;
            license.activated_at = Some(now);
            license.activated_hardware_ids.insert(hardware_id.to_string());
            Ok(Change::Changed)
        }
        LicenseStatus::Active => {
            if license.is_bound_to(hardware_id) {
                return Ok(Change::Unchanged);
            }
            if !license.has_capacity() {
                return Err(Error::ActivationLimitExceeded {
                    max: license.max_activations,
                });
            }
            license.activated_hardware_ids.insert(hardware_id.to_string());
            Ok(Change::Changed)
        }
    }
}

fn deactivate_in_place(license: &mut License, hardware_id: &str) -> Result<Change> {
    match license.status {
        LicenseStatus::Revoked => Err(Error::AlreadyRevoked),
        LicenseStatus::Expired => Err(Error::LicenseExpired),
        LicenseStatus::Pending => Err(Error::NotActivated),
        LicenseStatus::Active => {
            if !license.activated_hardware_ids.remove(hardware_id) {
                return Err(Error::HardwareMismatch);
            }
            Ok(Change::Changed)
        }
    }
}

fn revoke_in_place(
    license: &mut License,
    reason: Option<String>,
    now: DateTime<Utc>,
) -> Result<Change> {
    if license.status == LicenseStatus::Revoked {
        return Ok(Change::Unchanged);
    }
    license.status = LicenseStatus::Revoked;
    license.revoked_at = Some(now);
    license.revoked_reason = reason;
    Ok(Change::Changed)
}
