//! License checks.

use crate::audit::AuditLogger;
use crate::config::HardwarePolicy;
use crate::lifecycle::LicenseLifecycle;
use licensor_core::license::{key_prefix, normalize_hardware_id};
use licensor_core::ports::LicenseTypeRepository;
use licensor_core::{
    Clock, Error, License, LicenseStatus, LicenseSummary, Result, UsageEventKind,
    ValidationReason, ValidationResult,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Answers "may this key be used now, on this device?".
pub struct Validator {
    lifecycle: Arc<LicenseLifecycle>,
    types: Arc<dyn LicenseTypeRepository>,
    audit: AuditLogger,
    clock: Arc<dyn Clock>,
    policy: HardwarePolicy,
}

impl Validator {
    pub fn new(
        lifecycle: Arc<LicenseLifecycle>,
        types: Arc<dyn LicenseTypeRepository>,
        audit: AuditLogger,
        clock: Arc<dyn Clock>,
        policy: HardwarePolicy,
    ) -> Self {
        Self {
            lifecycle,
            types,
            audit,
            clock,
            policy,
        }
    }

    /// Check a key, optionally for a specific device.
    ///
    /// Rejections are returned as results with a reason code; only storage
    /// failures and malformed hardware ids surface as errors. Every attempt
    /// against a known license leaves one usage entry.
    pub async fn validate(&self, key: &str, hardware_id: Option<&str>) -> Result<ValidationResult> {
        let hardware_id = hardware_id.map(normalize_hardware_id).transpose()?;

        let license = match self.lifecycle.fetch(key).await {
            Ok(license) => license,
            Err(Error::NotFound) => {
                info!(key_prefix = key_prefix(key.trim()), "Check for unknown license key");
                return Ok(ValidationResult::failure(
                    ValidationReason::NotFound,
                    self.clock.now(),
                ));
            }
            Err(e) => return Err(e),
        };

        let (license, outcome) = self.evaluate(license, hardware_id.as_deref()).await?;
        let now = self.clock.now();

        let result = match outcome {
            ValidationReason::Valid => {
                let license_type = self
                    .types
                    .get(license.license_type_id)
                    .await?
                    .ok_or_else(|| Error::InvalidLicenseType(license.license_type_id.to_string()))?;
                let summary = LicenseSummary {
                    license_type: license_type.name,
                    activation_count: license.activation_count(),
                    max_activations: license.max_activations,
                    remaining_days: license.remaining_days(now),
                };
                ValidationResult::success(summary, license.expires_at, now)
            }
            reason => ValidationResult::failure(reason, now),
        };

        let kind = if result.valid {
            UsageEventKind::ValidationSucceeded
        } else {
            warn!(
                key_prefix = license.key_prefix(),
                reason = %result.reason,
                "License check failed"
            );
            UsageEventKind::ValidationFailed
        };
        self.audit
            .record(
                &license,
                kind,
                hardware_id.as_deref(),
                Some(result.reason.code().to_string()),
                now,
            )
            .await;

        Ok(result)
    }

    /// Apply the check rules in order, stopping at the first failure.
    async fn evaluate(
        &self,
        license: License,
        hardware_id: Option<&str>,
    ) -> Result<(License, ValidationReason)> {
        match license.status {
            LicenseStatus::Revoked => return Ok((license, ValidationReason::Revoked)),
            LicenseStatus::Expired => return Ok((license, ValidationReason::Expired)),
            LicenseStatus::Pending => return Ok((license, ValidationReason::NotActivated)),
            LicenseStatus::Active => {}
        }

        let Some(hardware_id) = hardware_id else {
            return Ok((license, ValidationReason::Valid));
        };
        if license.is_bound_to(hardware_id) {
            return Ok((license, ValidationReason::Valid));
        }
        if !license.has_capacity() {
            return Ok((license, ValidationReason::HardwareMismatch));
        }

        match self.policy {
            HardwarePolicy::RequireActivation => {
                Ok((license, ValidationReason::HardwareNotActivated))
            }
            HardwarePolicy::AutoRegister => {
                debug!(key_prefix = license.key_prefix(), "Registering device during check");
                match self.lifecycle.activate(&license.key, hardware_id).await {
                    Ok(activated) => Ok((activated, ValidationReason::Valid)),
                    Err(Error::ActivationLimitExceeded { .. }) => {
                        Ok((license, ValidationReason::HardwareMismatch))
                    }
                    Err(Error::LicenseExpired) => Ok((license, ValidationReason::Expired)),
                    Err(Error::AlreadyRevoked) => Ok((license, ValidationReason::Revoked)),
                    Err(e) => Err(e),
                }
            }
        }
    }
}
