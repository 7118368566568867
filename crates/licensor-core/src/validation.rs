//! License validation results.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome code of a license check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ValidationReason {
    Valid,
    NotFound,
    Revoked,
    Expired,
    NotActivated,
    /// Device is not bound and every activation slot is taken.
    HardwareMismatch,
    /// Device is not bound but a slot is free; an explicit activation is required.
    HardwareNotActivated,
}

impl ValidationReason {
    pub fn code(&self) -> &'static str {
        match self {
            ValidationReason::Valid => "valid",
            ValidationReason::NotFound => "not_found",
            ValidationReason::Revoked => "revoked",
            ValidationReason::Expired => "expired",
            ValidationReason::NotActivated => "not_activated",
            ValidationReason::HardwareMismatch => "hardware_mismatch",
            ValidationReason::HardwareNotActivated => "hardware_not_activated",
        }
    }

    /// Human-readable message, safe to show to unauthenticated callers.
    pub fn message(&self) -> &'static str {
        match self {
            ValidationReason::Valid => "License is valid",
            ValidationReason::NotFound => "License key is not recognised",
            ValidationReason::Revoked => "License has been revoked",
            ValidationReason::Expired => "License has expired",
            ValidationReason::NotActivated => "License has not been activated",
            ValidationReason::HardwareMismatch => {
                "License is already in use on the maximum number of devices"
            }
            ValidationReason::HardwareNotActivated => {
                "License is not activated on this device"
            }
        }
    }
}

impl fmt::Display for ValidationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Redacted view of a valid license.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct LicenseSummary {
    pub license_type: String,
    pub activation_count: u32,
    pub max_activations: u32,
    pub remaining_days: Option<i64>,
}

/// License validation result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ValidationResult {
    /// Whether the license is valid.
    pub valid: bool,
    /// Machine-readable outcome.
    pub reason: ValidationReason,
    /// Human-readable outcome.
    pub message: String,
    /// Expiration date (if valid).
    pub expires_at: Option<DateTime<Utc>>,
    /// Redacted license details (if valid).
    pub summary: Option<LicenseSummary>,
    /// Validation timestamp.
    pub checked_at: DateTime<Utc>,
}

impl ValidationResult {
    pub fn success(
        summary: LicenseSummary,
        expires_at: Option<DateTime<Utc>>,
        checked_at: DateTime<Utc>,
    ) -> Self {
        Self {
            valid: true,
            reason: ValidationReason::Valid,
            message: ValidationReason::Valid.message().to_string(),
            expires_at,
            summary: Some(summary),
            checked_at,
        }
    }

    pub fn failure(reason: ValidationReason, checked_at: DateTime<Utc>) -> Self {
        Self {
            valid: false,
            reason,
            message: reason.message().to_string(),
            expires_at: None,
            summary: None,
            checked_at,
        }
    }
}
