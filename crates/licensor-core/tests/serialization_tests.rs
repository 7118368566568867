//! Wire format of the core types.

use chrono::{TimeZone, Utc};
use licensor_core::ids::*;
use licensor_core::license::{License, LicenseFilter, LicenseStatus, LicenseType, NewLicenseType};
use licensor_core::usage::{UsageEventKind, UsageLogEntry};
use licensor_core::validation::{LicenseSummary, ValidationReason, ValidationResult};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::collections::BTreeSet;

fn professional() -> LicenseType {
    LicenseType::from_new(
        NewLicenseType {
            name: "Professional".to_string(),
            description: "Five seats".to_string(),
            max_instances: 5,
            duration_days: 365,
        },
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
    )
}

#[test]
fn test_license_json_shape() {
    let license_type = professional();
    let issued_at = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
    let license = License {
        id: LicenseId::new(),
        key: "ABCDE-FGHJK-MNPQR-STUVW-XYZ23".to_string(),
        license_type_id: license_type.id,
        user: Some("alice@example.com".to_string()),
        status: LicenseStatus::Active,
        max_activations: 5,
        activated_hardware_ids: BTreeSet::from(["host-b".to_string(), "host-a".to_string()]),
        issued_at,
        activated_at: Some(issued_at),
        expires_at: Some(issued_at + license_type.duration()),
        expiry_pinned: false,
        revoked_at: None,
        revoked_reason: None,
        notes: None,
        version: 3,
    };

    let value = serde_json::to_value(&license).unwrap();
    assert_eq!(value["status"], json!("active"));
    assert_eq!(value["activated_hardware_ids"], json!(["host-a", "host-b"]));
    assert_eq!(value["id"], json!(license.id.as_uuid().to_string()));
    assert_eq!(value["expires_at"], json!("2025-03-01T09:00:00Z"));

    let parsed: License = serde_json::from_value(value).unwrap();
    assert_eq!(parsed, license);
}

#[test]
fn test_license_type_roundtrip() {
    let license_type = professional();
    let json = serde_json::to_string(&license_type).unwrap();
    let parsed: LicenseType = serde_json::from_str(&json).unwrap();

    assert_eq!(parsed, license_type);
    assert!(parsed.is_active);
}

#[test]
fn test_usage_entry_kind_names() {
    let at = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
    let entry = UsageLogEntry::new(
        LicenseId::new(),
        UsageEventKind::ValidationFailed,
        Some("host-a".to_string()),
        Some(ValidationReason::HardwareMismatch.code().to_string()),
        at,
    );

    let value = serde_json::to_value(&entry).unwrap();
    assert_eq!(value["event_kind"], json!("validation_failed"));
    assert_eq!(value["detail"], json!("hardware_mismatch"));
    assert_eq!(
        "validation_failed".parse::<UsageEventKind>().unwrap(),
        UsageEventKind::ValidationFailed
    );
}

#[test]
fn test_validation_result_json() {
    let at = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
    let result = ValidationResult::success(
        LicenseSummary {
            license_type: "Professional".to_string(),
            activation_count: 1,
            max_activations: 5,
            remaining_days: Some(30),
        },
        Some(at + chrono::Duration::days(30)),
        at,
    );

    let value = serde_json::to_value(&result).unwrap();
    assert_eq!(value["valid"], json!(true));
    assert_eq!(value["reason"], json!("valid"));
    assert_eq!(value["summary"]["remaining_days"], json!(30));
}

#[test]
fn test_partial_filter_deserializes() {
    let filter: LicenseFilter = serde_json::from_str(r#"{"status": "expired"}"#).unwrap();
    assert_eq!(filter.status, Some(LicenseStatus::Expired));
    assert!(filter.search.is_none());
}
