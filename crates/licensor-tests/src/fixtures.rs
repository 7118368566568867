//! Test fixtures for creating sample data.

use chrono::{DateTime, TimeZone, Utc};
use licensor_core::ids::LicenseId;
use licensor_core::license::{License, LicenseStatus, LicenseType, NewLicenseType};
use std::collections::BTreeSet;

/// Whole seconds, so values survive a round trip through TIMESTAMPTZ.
pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
}

/// Factory for license types.
pub struct LicenseTypeFixture;

impl LicenseTypeFixture {
    /// Two devices, thirty days.
    pub fn standard() -> LicenseType {
        Self::named("Standard", 2, 30)
    }

    pub fn named(name: &str, max_instances: u32, duration_days: u32) -> LicenseType {
        LicenseType::from_new(
            NewLicenseType {
                name: name.to_string(),
                description: format!("{} tier", name),
                max_instances,
                duration_days,
            },
            start_time(),
        )
    }
}

/// Factory for licenses stored directly through the repositories.
pub struct LicenseFixture;

impl LicenseFixture {
    /// An unactivated license of `license_type` issued at `issued_at`.
    pub fn pending(key: &str, license_type: &LicenseType, issued_at: DateTime<Utc>) -> License {
        License {
            id: LicenseId::new(),
            key: key.to_string(),
            license_type_id: license_type.id,
            user: None,
            status: LicenseStatus::Pending,
            max_activations: license_type.max_instances,
            activated_hardware_ids: BTreeSet::new(),
            issued_at,
            activated_at: None,
            expires_at: Some(issued_at + license_type.duration()),
            expiry_pinned: false,
            revoked_at: None,
            revoked_reason: None,
            notes: None,
            version: 0,
        }
    }

    /// A license bound to `hardware_ids`, activated at `activated_at`.
    pub fn active(
        key: &str,
        license_type: &LicenseType,
        activated_at: DateTime<Utc>,
        hardware_ids: &[&str],
    ) -> License {
        let mut license = Self::pending(key, license_type, activated_at);
        license.status = LicenseStatus::Active;
        license.activated_at = Some(activated_at);
        license.activated_hardware_ids = hardware_ids.iter().map(|id| id.to_string()).collect();
        license
    }
}
