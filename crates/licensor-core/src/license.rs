//! License and license type definitions.

use crate::ids::{LicenseId, LicenseTypeId};
use crate::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Longest accepted license type name.
pub const MAX_TYPE_NAME_LEN: usize = 50;

/// Longest accepted hardware id.
pub const MAX_HARDWARE_ID_LEN: usize = 255;

/// Longest validity period and expiry window, in days.
pub const MAX_DURATION_DAYS: u32 = 36_500;

/// Most devices a single license may bind.
pub const MAX_ACTIVATIONS: u32 = 100_000;

/// Request to create a license type.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct NewLicenseType {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub max_instances: u32,
    pub duration_days: u32,
}

impl NewLicenseType {
    /// Reject names and limits the tier model cannot represent.
    pub fn validate(&self) -> Result<()> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(Error::InvalidInput("license type name is empty".into()));
        }
        if name.chars().count() > MAX_TYPE_NAME_LEN {
            return Err(Error::InvalidInput(format!(
                "license type name exceeds {} characters",
                MAX_TYPE_NAME_LEN
            )));
        }
        if self.max_instances == 0 || self.max_instances > MAX_ACTIVATIONS {
            return Err(Error::InvalidInput(format!(
                "max_instances must be between 1 and {}",
                MAX_ACTIVATIONS
            )));
        }
        if self.duration_days == 0 || self.duration_days > MAX_DURATION_DAYS {
            return Err(Error::InvalidInput(format!(
                "duration_days must be between 1 and {}",
                MAX_DURATION_DAYS
            )));
        }
        Ok(())
    }
}

/// `start + by`, or `InvalidInput` when the result is not representable.
pub fn checked_expiry(start: DateTime<Utc>, by: Duration) -> Result<DateTime<Utc>> {
    start
        .checked_add_signed(by)
        .ok_or_else(|| Error::InvalidInput("expiry date is out of range".into()))
}

/// A named product tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct LicenseType {
    pub id: LicenseTypeId,
    pub name: String,
    pub description: String,
    /// Maximum concurrent hardware activations for licenses of this tier.
    pub max_instances: u32,
    /// Validity period, counted from activation (or issuance while pending).
    pub duration_days: u32,
    /// Inactive tiers keep their licenses but cannot issue new ones.
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl LicenseType {
    pub fn from_new(new: NewLicenseType, now: DateTime<Utc>) -> Self {
        Self {
            id: LicenseTypeId::new(),
            name: new.name.trim().to_string(),
            description: new.description,
            max_instances: new.max_instances,
            duration_days: new.duration_days,
            is_active: true,
            created_at: now,
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::days(i64::from(self.duration_days))
    }
}

/// License lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum LicenseStatus {
    Pending,
    Active,
    Expired,
    Revoked,
}

impl LicenseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LicenseStatus::Pending => "pending",
            LicenseStatus::Active => "active",
            LicenseStatus::Expired => "expired",
            LicenseStatus::Revoked => "revoked",
        }
    }

    /// Revoked licenses never change state again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, LicenseStatus::Revoked)
    }
}

impl fmt::Display for LicenseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LicenseStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(LicenseStatus::Pending),
            "active" => Ok(LicenseStatus::Active),
            "expired" => Ok(LicenseStatus::Expired),
            "revoked" => Ok(LicenseStatus::Revoked),
            other => Err(Error::InvalidInput(format!("unknown license status: {}", other))),
        }
    }
}

/// An issued license key and its activation state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct License {
    pub id: LicenseId,
    /// Globally unique, never reused.
    pub key: String,
    pub license_type_id: LicenseTypeId,
    /// Optional account the license is assigned to.
    pub user: Option<String>,
    pub status: LicenseStatus,
    pub max_activations: u32,
    /// Fingerprints of the devices holding an activation slot.
    #[serde(default)]
    pub activated_hardware_ids: BTreeSet<String>,
    pub issued_at: DateTime<Utc>,
    pub activated_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Set when `expires_at` was given explicitly at issuance; activation keeps it.
    #[serde(default)]
    pub expiry_pinned: bool,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revoked_reason: Option<String>,
    pub notes: Option<String>,
    /// Optimistic concurrency token, bumped on every write.
    #[serde(default)]
    pub version: u64,
}

impl License {
    /// Pending or active with an expiry in the past.
    pub fn is_lapsed(&self, now: DateTime<Utc>) -> bool {
        matches!(self.status, LicenseStatus::Pending | LicenseStatus::Active)
            && self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }

    /// Status as observed at `now`, accounting for lazy expiration.
    pub fn effective_status(&self, now: DateTime<Utc>) -> LicenseStatus {
        if self.is_lapsed(now) {
            LicenseStatus::Expired
        } else {
            self.status
        }
    }

    pub fn activation_count(&self) -> u32 {
        self.activated_hardware_ids.len() as u32
    }

    pub fn has_capacity(&self) -> bool {
        self.activation_count() < self.max_activations
    }

    pub fn is_bound_to(&self, hardware_id: &str) -> bool {
        self.activated_hardware_ids.contains(hardware_id)
    }

    /// Whole days until expiry, zero once expired.
    pub fn remaining_days(&self, now: DateTime<Utc>) -> Option<i64> {
        self.expires_at
            .map(|expires_at| (expires_at - now).num_days().max(0))
    }

    /// Short, log-safe form of the key.
    pub fn key_prefix(&self) -> &str {
        key_prefix(&self.key)
    }
}

/// First eight characters of a key or hardware id, for logs.
pub fn key_prefix(value: &str) -> &str {
    match value.char_indices().nth(8) {
        Some((idx, _)) => &value[..idx],
        None => value,
    }
}

/// Normalise a caller-supplied hardware id.
pub fn normalize_hardware_id(hardware_id: &str) -> Result<String> {
    let trimmed = hardware_id.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidInput("hardware id is empty".into()));
    }
    if trimmed.len() > MAX_HARDWARE_ID_LEN {
        return Err(Error::InvalidInput(format!(
            "hardware id exceeds {} characters",
            MAX_HARDWARE_ID_LEN
        )));
    }
    Ok(trimmed.to_string())
}

/// Query filters for listing licenses.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct LicenseFilter {
    /// Matched against the effective status, so lapsed licenses count as expired.
    pub status: Option<LicenseStatus>,
    /// Case-insensitive substring of the license type name.
    pub license_type: Option<String>,
    /// Case-insensitive substring of the assigned user.
    pub user: Option<String>,
    /// Only licenses expiring after now and within this many days.
    pub expiring_within_days: Option<u32>,
    /// Case-insensitive substring of the key, notes or user.
    pub search: Option<String>,
}

impl LicenseFilter {
    pub fn validate(&self) -> Result<()> {
        if let Some(days) = self.expiring_within_days
            && days > MAX_DURATION_DAYS
        {
            return Err(Error::InvalidInput(format!(
                "expiring window must be at most {} days",
                MAX_DURATION_DAYS
            )));
        }
        Ok(())
    }

    /// End of the expiring window, clamped to the latest representable instant.
    pub fn expiring_cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.expiring_within_days.map(|days| {
            now.checked_add_signed(Duration::days(i64::from(days)))
                .unwrap_or(DateTime::<Utc>::MAX_UTC)
        })
    }

    /// Evaluate the filter against a license and the name of its type.
    pub fn matches(&self, license: &License, type_name: &str, now: DateTime<Utc>) -> bool {
        if let Some(status) = self.status
            && license.effective_status(now) != status
        {
            return false;
        }

        if let Some(ref wanted) = self.license_type
            && !contains_ignore_case(type_name, wanted)
        {
            return false;
        }

        if let Some(ref wanted) = self.user
            && !license
                .user
                .as_deref()
                .is_some_and(|user| contains_ignore_case(user, wanted))
        {
            return false;
        }

        if let Some(cutoff) = self.expiring_cutoff(now) {
            let expiring = license
                .expires_at
                .is_some_and(|expires_at| expires_at > now && expires_at <= cutoff);
            if !expiring {
                return false;
            }
        }

        if let Some(ref text) = self.search {
            let hit = contains_ignore_case(&license.key, text)
                || license
                    .notes
                    .as_deref()
                    .is_some_and(|notes| contains_ignore_case(notes, text))
                || license
                    .user
                    .as_deref()
                    .is_some_and(|user| contains_ignore_case(user, text));
            if !hit {
                return false;
            }
        }

        true
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn license(status: LicenseStatus, expires_in: Option<Duration>) -> License {
        let now = Utc::now();
        License {
            id: LicenseId::new(),
            key: "ABCDE-FGHJK-MNPQR-STUVW-XYZ23".to_string(),
            license_type_id: LicenseTypeId::new(),
            user: Some("alice".to_string()),
            status,
            max_activations: 2,
            activated_hardware_ids: BTreeSet::new(),
            issued_at: now,
            activated_at: None,
            expires_at: expires_in.map(|d| now + d),
            expiry_pinned: false,
            revoked_at: None,
            revoked_reason: None,
            notes: Some("reseller batch".to_string()),
            version: 0,
        }
    }

    #[test]
    fn test_lapsed_active_reads_as_expired() {
        let lic = license(LicenseStatus::Active, Some(Duration::seconds(-1)));
        assert!(lic.is_lapsed(Utc::now()));
        assert_eq!(lic.effective_status(Utc::now()), LicenseStatus::Expired);
    }

    #[test]
    fn test_revoked_never_lapses() {
        let lic = license(LicenseStatus::Revoked, Some(Duration::days(-10)));
        assert!(!lic.is_lapsed(Utc::now()));
        assert_eq!(lic.effective_status(Utc::now()), LicenseStatus::Revoked);
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("Active".parse::<LicenseStatus>().unwrap(), LicenseStatus::Active);
        assert!("suspended".parse::<LicenseStatus>().is_err());
    }

    #[test]
    fn test_new_license_type_validation() {
        let mut new = NewLicenseType {
            name: "Standard".to_string(),
            description: String::new(),
            max_instances: 1,
            duration_days: 365,
        };
        assert!(new.validate().is_ok());

        new.max_instances = 0;
        assert!(matches!(new.validate(), Err(Error::InvalidInput(_))));

        new.max_instances = MAX_ACTIVATIONS + 1;
        assert!(matches!(new.validate(), Err(Error::InvalidInput(_))));

        new.max_instances = 1;
        new.duration_days = MAX_DURATION_DAYS + 1;
        assert!(matches!(new.validate(), Err(Error::InvalidInput(_))));

        new.duration_days = MAX_DURATION_DAYS;
        assert!(new.validate().is_ok());

        new.name = "   ".to_string();
        assert!(matches!(new.validate(), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_checked_expiry_rejects_overflow() {
        let now = Utc::now();
        assert_eq!(checked_expiry(now, Duration::days(1)).unwrap(), now + Duration::days(1));

        let err = checked_expiry(now, Duration::days(365 * 1_000_000)).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_huge_expiring_window_is_rejected_not_panicking() {
        let now = Utc::now();
        let lic = license(LicenseStatus::Active, Some(Duration::days(10)));
        let filter = LicenseFilter {
            expiring_within_days: Some(u32::MAX),
            ..Default::default()
        };

        assert!(matches!(filter.validate(), Err(Error::InvalidInput(_))));
        assert!(filter.matches(&lic, "Standard", now));
    }

    #[test]
    fn test_filter_matches_search_and_expiry_window() {
        let now = Utc::now();
        let lic = license(LicenseStatus::Active, Some(Duration::days(10)));

        let filter = LicenseFilter {
            search: Some("RESELLER".to_string()),
            expiring_within_days: Some(30),
            ..Default::default()
        };
        assert!(filter.matches(&lic, "Standard", now));

        let filter = LicenseFilter {
            expiring_within_days: Some(5),
            ..Default::default()
        };
        assert!(!filter.matches(&lic, "Standard", now));

        let filter = LicenseFilter {
            license_type: Some("pro".to_string()),
            ..Default::default()
        };
        assert!(!filter.matches(&lic, "Standard", now));
    }

    #[test]
    fn test_key_prefix_truncates() {
        assert_eq!(key_prefix("ABCDE-FGHJK"), "ABCDE-FG");
        assert_eq!(key_prefix("HW-1"), "HW-1");
    }

    #[test]
    fn test_normalize_hardware_id() {
        assert_eq!(normalize_hardware_id("  HW-1 ").unwrap(), "HW-1");
        assert!(normalize_hardware_id("").is_err());
        assert!(normalize_hardware_id(&"x".repeat(256)).is_err());
    }
}
