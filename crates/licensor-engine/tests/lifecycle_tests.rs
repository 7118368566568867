//! License lifecycle behaviour against the in-memory store.

mod common;

use chrono::Duration;
use common::Harness;
use licensor_core::license::{MAX_ACTIVATIONS, MAX_DURATION_DAYS};
use licensor_core::ports::LicenseRepository;
use licensor_core::{Error, LicenseFilter, LicenseStatus, UsageEventKind};
use licensor_engine::{GenerateLicenses, KeyFormat, KeyGenerator};
use licensor_db::MemoryStore;
use pretty_assertions::assert_eq;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Barrier;

#[tokio::test]
async fn test_ten_thousand_keys_are_unique_and_well_formed() {
    let format = KeyFormat::default();
    let generator = KeyGenerator::new(format.clone(), Arc::new(MemoryStore::new())).unwrap();

    let mut seen = HashSet::new();
    for _ in 0..10_000 {
        let key = generator.generate(None).await.unwrap();
        assert!(format.is_well_formed(&key), "malformed key {}", key);
        assert_eq!(key.len(), 29);
        assert!(seen.insert(key));
    }
    assert_eq!(seen.len(), 10_000);
}

#[tokio::test]
async fn test_generated_key_honours_prefix() {
    let h = Harness::new();
    let tier = h.license_type("Standard", 1, 365).await;

    let mut request = GenerateLicenses::new(tier.id);
    request.prefix = Some("acme".to_string());
    let license = h.issue_with(request).await;

    assert!(license.key.starts_with("ACME-"));
    assert_eq!(license.status, LicenseStatus::Pending);
}

#[tokio::test]
async fn test_reactivation_is_idempotent_and_unlogged() {
    let h = Harness::new();
    let tier = h.license_type("Team", 2, 30).await;
    let repeated = h.issue(&tier).await;
    let distinct = h.issue(&tier).await;

    let first = h.service.activate_license(&repeated.key, Some("HW-1")).await.unwrap();
    let second = h.service.activate_license(&repeated.key, Some("HW-1")).await.unwrap();
    assert_eq!(first, second);

    h.service.activate_license(&distinct.key, Some("HW-1")).await.unwrap();
    h.service.activate_license(&distinct.key, Some("HW-2")).await.unwrap();

    let repeated_log = h.service.activity_log(&repeated.key).await.unwrap();
    let distinct_log = h.service.activity_log(&distinct.key).await.unwrap();
    assert_eq!(repeated_log.len() + 1, distinct_log.len());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_activation_never_oversubscribes() {
    let h = Harness::new();
    let tier = h.license_type("Single", 1, 365).await;

    for round in 0..25 {
        let license = h.issue(&tier).await;
        let barrier = Arc::new(Barrier::new(2));

        let tasks: Vec<_> = ["HW-A", "HW-B"]
            .into_iter()
            .map(|hw| {
                let service = h.service.clone();
                let barrier = barrier.clone();
                let key = license.key.clone();
                tokio::spawn(async move {
                    barrier.wait().await;
                    service.activate_license(&key, Some(hw)).await
                })
            })
            .collect();

        let mut succeeded = 0;
        let mut rejected = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => succeeded += 1,
                Err(Error::ActivationLimitExceeded { max: 1 }) => rejected += 1,
                Err(e) => panic!("round {}: unexpected error {:?}", round, e),
            }
        }
        assert_eq!((succeeded, rejected), (1, 1), "round {}", round);

        let stored = h.store.get(&license.key).await.unwrap().unwrap();
        assert_eq!(stored.activation_count(), 1);
    }
}

#[tokio::test]
async fn test_expired_license_cannot_be_reactivated() {
    let h = Harness::new();
    let tier = h.license_type("Annual", 2, 365).await;
    let license = h.issue(&tier).await;

    h.service.activate_license(&license.key, Some("HW-1")).await.unwrap();
    h.clock.advance(Duration::days(366));

    let result = h.service.check_license(&license.key, Some("HW-1")).await.unwrap();
    assert!(!result.valid);
    assert_eq!(result.reason.code(), "expired");

    let stored = h.store.get(&license.key).await.unwrap().unwrap();
    assert_eq!(stored.status, LicenseStatus::Expired);

    let err = h.service.activate_license(&license.key, Some("HW-2")).await.unwrap_err();
    assert!(matches!(err, Error::LicenseExpired));

    assert_eq!(
        h.event_kinds(&license.key).await,
        vec![
            UsageEventKind::Generated,
            UsageEventKind::Activated,
            UsageEventKind::Expired,
            UsageEventKind::ValidationFailed,
        ]
    );
}

#[tokio::test]
async fn test_unactivated_license_lapses_after_issuance_window() {
    let h = Harness::new();
    let tier = h.license_type("Trial", 1, 14).await;
    let license = h.issue(&tier).await;
    assert_eq!(license.expires_at, Some(license.issued_at + Duration::days(14)));

    h.clock.advance(Duration::days(15));

    let err = h.service.activate_license(&license.key, Some("HW-1")).await.unwrap_err();
    assert!(matches!(err, Error::LicenseExpired));

    let details = h.service.get_license(&license.key).await.unwrap();
    assert_eq!(details.license.status, LicenseStatus::Expired);
    assert_eq!(details.license_type.name, "Trial");
}

#[tokio::test]
async fn test_first_activation_restarts_the_clock() {
    let h = Harness::new();
    let tier = h.license_type("Standard", 1, 365).await;
    let license = h.issue(&tier).await;

    h.clock.advance(Duration::days(100));
    let activated = h.service.activate_license(&license.key, Some("HW-1")).await.unwrap();

    let activated_at = activated.activated_at.unwrap();
    assert_eq!(activated_at, license.issued_at + Duration::days(100));
    assert_eq!(activated.expires_at, Some(activated_at + Duration::days(365)));
}

#[tokio::test]
async fn test_pinned_expiry_is_kept_on_activation() {
    let h = Harness::new();
    let tier = h.license_type("Standard", 1, 365).await;
    let pinned = common::start_time() + Duration::days(30);

    let mut request = GenerateLicenses::new(tier.id);
    request.expires_at = Some(pinned);
    let license = h.issue_with(request).await;
    assert!(license.expiry_pinned);

    h.clock.advance(Duration::days(10));
    let activated = h.service.activate_license(&license.key, Some("HW-1")).await.unwrap();
    assert_eq!(activated.expires_at, Some(pinned));
}

#[tokio::test]
async fn test_expiry_override_must_be_in_the_future() {
    let h = Harness::new();
    let tier = h.license_type("Standard", 1, 365).await;

    let mut request = GenerateLicenses::new(tier.id);
    request.expires_at = Some(common::start_time() - Duration::days(1));
    let err = h.service.generate_licenses(request).await.unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
}

#[tokio::test]
async fn test_revocation_is_terminal() {
    let h = Harness::new();
    let tier = h.license_type("Standard", 2, 365).await;
    let pending = h.issue(&tier).await;
    let active = h.issue(&tier).await;
    h.service.activate_license(&active.key, Some("HW-1")).await.unwrap();

    for key in [&pending.key, &active.key] {
        let revoked = h
            .service
            .revoke_license(key, Some("refund".to_string()))
            .await
            .unwrap();
        assert_eq!(revoked.status, LicenseStatus::Revoked);
        assert_eq!(revoked.revoked_at, Some(common::start_time()));

        let result = h.service.check_license(key, Some("HW-1")).await.unwrap();
        assert_eq!(result.reason.code(), "revoked");

        let err = h.service.activate_license(key, Some("HW-9")).await.unwrap_err();
        assert!(matches!(err, Error::AlreadyRevoked));
    }
}

#[tokio::test]
async fn test_redundant_revoke_writes_nothing() {
    let h = Harness::new();
    let tier = h.license_type("Standard", 1, 365).await;
    let license = h.issue(&tier).await;

    h.service.revoke_license(&license.key, Some("fraud".to_string())).await.unwrap();
    let before = h.event_kinds(&license.key).await;

    let again = h.service.revoke_license(&license.key, None).await.unwrap();
    assert_eq!(again.revoked_reason.as_deref(), Some("fraud"));
    assert_eq!(h.event_kinds(&license.key).await, before);
}

#[tokio::test]
async fn test_revoking_an_expired_license() {
    let h = Harness::new();
    let tier = h.license_type("Trial", 1, 7).await;
    let license = h.issue(&tier).await;
    h.clock.advance(Duration::days(8));

    let revoked = h.service.revoke_license(&license.key, None).await.unwrap();
    assert_eq!(revoked.status, LicenseStatus::Revoked);
    assert_eq!(
        h.event_kinds(&license.key).await,
        vec![
            UsageEventKind::Generated,
            UsageEventKind::Expired,
            UsageEventKind::Revoked,
        ]
    );
}

#[tokio::test]
async fn test_deactivation_frees_a_slot() {
    let h = Harness::new();
    let tier = h.license_type("Solo", 1, 365).await;
    let license = h.issue(&tier).await;

    let err = h.service.deactivate_license(&license.key, Some("HW-1")).await.unwrap_err();
    assert!(matches!(err, Error::NotActivated));

    h.service.activate_license(&license.key, Some("HW-1")).await.unwrap();
    let err = h.service.deactivate_license(&license.key, Some("HW-2")).await.unwrap_err();
    assert!(matches!(err, Error::HardwareMismatch));

    let released = h.service.deactivate_license(&license.key, Some("HW-1")).await.unwrap();
    assert_eq!(released.activation_count(), 0);
    assert_eq!(released.status, LicenseStatus::Active);

    let moved = h.service.activate_license(&license.key, Some("HW-2")).await.unwrap();
    assert!(moved.is_bound_to("HW-2"));
}

#[tokio::test]
async fn test_every_transition_logged_in_order() {
    let h = Harness::new();
    let tier = h.license_type("Standard", 2, 365).await;
    let license = h.issue(&tier).await;

    h.clock.advance(Duration::minutes(5));
    h.service.activate_license(&license.key, Some("HW-1")).await.unwrap();
    h.clock.advance(Duration::minutes(5));
    h.service.check_license(&license.key, Some("HW-1")).await.unwrap();
    h.clock.advance(Duration::minutes(5));
    h.service.deactivate_license(&license.key, Some("HW-1")).await.unwrap();
    h.clock.advance(Duration::minutes(5));
    h.service.revoke_license(&license.key, None).await.unwrap();

    let log = h.service.activity_log(&license.key).await.unwrap();
    let kinds: Vec<UsageEventKind> = log.iter().map(|e| e.event_kind).collect();
    assert_eq!(
        kinds,
        vec![
            UsageEventKind::Generated,
            UsageEventKind::Activated,
            UsageEventKind::ValidationSucceeded,
            UsageEventKind::Deactivated,
            UsageEventKind::Revoked,
        ]
    );
    assert!(log.windows(2).all(|pair| pair[0].timestamp <= pair[1].timestamp));
    assert_eq!(log[1].hardware_id.as_deref(), Some("HW-1"));
}

#[tokio::test]
async fn test_issuance_rules() {
    let h = Harness::new();
    let tier = h.license_type("Standard", 1, 365).await;

    let mut custom = GenerateLicenses::new(tier.id);
    custom.custom_key = Some("vip-00001".to_string());
    let license = h.issue_with(custom.clone()).await;
    assert_eq!(license.key, "VIP-00001");

    let err = h.service.generate_licenses(custom.clone()).await.unwrap_err();
    assert!(matches!(err, Error::DuplicateKey));

    custom.custom_key = Some("bad key!".to_string());
    let err = h.service.generate_licenses(custom).await.unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));

    let mut batch = GenerateLicenses::new(tier.id);
    batch.count = 0;
    assert!(h.service.generate_licenses(batch.clone()).await.is_err());
    batch.count = 1001;
    assert!(h.service.generate_licenses(batch.clone()).await.is_err());
    batch.count = 25;
    batch.max_activations = Some(3);
    let issued = h.service.generate_licenses(batch).await.unwrap();
    assert_eq!(issued.len(), 25);
    assert!(issued.iter().all(|l| l.max_activations == 3));

    let err = h
        .service
        .generate_licenses(GenerateLicenses::new(Default::default()))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidLicenseType(_)));
}

#[tokio::test]
async fn test_revoked_keys_are_never_reissued() {
    let h = Harness::new();
    let tier = h.license_type("Standard", 1, 365).await;

    let mut request = GenerateLicenses::new(tier.id);
    request.custom_key = Some("PROMO-2024".to_string());
    let license = h.issue_with(request.clone()).await;
    h.service.revoke_license(&license.key, None).await.unwrap();

    let err = h.service.generate_licenses(request).await.unwrap_err();
    assert!(matches!(err, Error::DuplicateKey));
}

#[tokio::test]
async fn test_inactive_type_stops_issuance() {
    let h = Harness::new();
    let tier = h.license_type("Legacy", 1, 365).await;
    let existing = h.issue(&tier).await;

    h.service.set_license_type_active(tier.id, false).await.unwrap();

    let err = h
        .service
        .generate_licenses(GenerateLicenses::new(tier.id))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidLicenseType(_)));

    h.service.activate_license(&existing.key, Some("HW-1")).await.unwrap();
}

#[tokio::test]
async fn test_license_type_rules() {
    let h = Harness::new();
    h.license_type("Standard", 1, 365).await;

    let err = h
        .service
        .create_license_type(licensor_core::NewLicenseType {
            name: "Standard".to_string(),
            description: String::new(),
            max_instances: 5,
            duration_days: 30,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::DuplicateLicenseType(_)));

    let found = h.service.find_license_type("Standard").await.unwrap();
    let by_id = h.service.find_license_type(&found.id.to_string()).await.unwrap();
    assert_eq!(found, by_id);
    assert_eq!(h.service.list_license_types().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_oversized_counts_are_rejected() {
    let h = Harness::new();

    let oversized = [
        (1, MAX_DURATION_DAYS + 1),
        (1, 1_000_000_000),
        (3_000_000_000, 30),
    ];
    for (max_instances, duration_days) in oversized {
        let err = h
            .service
            .create_license_type(licensor_core::NewLicenseType {
                name: "Forever".to_string(),
                description: String::new(),
                max_instances,
                duration_days,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
    assert!(h.service.list_license_types().await.unwrap().is_empty());

    let century = h.license_type("Century", MAX_ACTIVATIONS, MAX_DURATION_DAYS).await;
    let license = h.issue(&century).await;
    assert_eq!(license.expires_at, Some(common::start_time() + Duration::days(36_500)));

    let mut request = GenerateLicenses::new(century.id);
    request.max_activations = Some(3_000_000_000);
    let err = h.service.generate_licenses(request).await.unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
    assert_eq!(h.service.count_licenses(&LicenseFilter::default()).await.unwrap(), 1);
}

#[tokio::test]
async fn test_expiring_window_is_bounded() {
    let h = Harness::new();
    let tier = h.license_type("Standard", 1, 365).await;
    h.issue(&tier).await;

    let filter = LicenseFilter {
        expiring_within_days: Some(u32::MAX),
        ..Default::default()
    };
    let err = h.service.list_licenses(&filter, None).await.unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
    let err = h.service.count_licenses(&filter).await.unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));

    let filter = LicenseFilter {
        expiring_within_days: Some(MAX_DURATION_DAYS),
        ..Default::default()
    };
    assert_eq!(h.service.list_licenses(&filter, None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_list_filters() {
    let h = Harness::new();
    let standard = h.license_type("Standard", 1, 365).await;
    let trial = h.license_type("Trial", 1, 10).await;

    let mut request = GenerateLicenses::new(standard.id);
    request.user = Some("alice@example.com".to_string());
    request.notes = Some("reseller order 1182".to_string());
    let alice = h.issue_with(request).await;
    h.clock.advance(Duration::minutes(1));
    let short = h.issue(&trial).await;
    h.clock.advance(Duration::minutes(1));
    let revoked = h.issue(&standard).await;
    h.service.revoke_license(&revoked.key, None).await.unwrap();

    let all = h.service.list_licenses(&LicenseFilter::default(), None).await.unwrap();
    let keys: Vec<&str> = all.iter().map(|l| l.key.as_str()).collect();
    assert_eq!(keys, vec![revoked.key.as_str(), short.key.as_str(), alice.key.as_str()]);

    let expiring = LicenseFilter {
        expiring_within_days: Some(30),
        ..Default::default()
    };
    let found = h.service.list_licenses(&expiring, None).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].key, short.key);

    let search = LicenseFilter {
        search: Some("ORDER 1182".to_string()),
        ..Default::default()
    };
    assert_eq!(h.service.count_licenses(&search).await.unwrap(), 1);

    let by_user = LicenseFilter {
        user: Some("alice".to_string()),
        license_type: Some("stand".to_string()),
        ..Default::default()
    };
    assert_eq!(h.service.count_licenses(&by_user).await.unwrap(), 1);

    h.clock.advance(Duration::days(11));
    let expired = LicenseFilter {
        status: Some(LicenseStatus::Expired),
        ..Default::default()
    };
    let lapsed = h.service.list_licenses(&expired, Some(10)).await.unwrap();
    assert_eq!(lapsed.len(), 1);
    assert_eq!(lapsed[0].key, short.key);
    assert_eq!(lapsed[0].status, LicenseStatus::Expired);

    let stored = h.store.get(&short.key).await.unwrap().unwrap();
    assert_eq!(stored.status, LicenseStatus::Pending);
}

#[tokio::test]
async fn test_unknown_key_operations() {
    let h = Harness::new();

    for key in ["ZZZZZ-ZZZZZ-ZZZZZ-ZZZZZ-ZZZZZ", "not a key", ""] {
        let err = h.service.activate_license(key, Some("HW-1")).await.unwrap_err();
        assert!(matches!(err, Error::NotFound), "{:?}", key);
        let err = h.service.revoke_license(key, None).await.unwrap_err();
        assert!(matches!(err, Error::NotFound));
        let err = h.service.activity_log(key).await.unwrap_err();
        assert!(matches!(err, Error::NotFound));
    }
}

#[tokio::test]
async fn test_hardware_id_is_validated() {
    let h = Harness::new();
    let tier = h.license_type("Standard", 1, 365).await;
    let license = h.issue(&tier).await;

    let err = h.service.activate_license(&license.key, Some("   ")).await.unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));

    let activated = h
        .service
        .activate_license(&license.key, Some("  HW-1  "))
        .await
        .unwrap();
    assert!(activated.is_bound_to("HW-1"));
}

#[tokio::test]
async fn test_local_fingerprint_is_default_device() {
    let h = Harness::new();
    let tier = h.license_type("Standard", 1, 365).await;
    let license = h.issue(&tier).await;

    let activated = h.service.activate_license(&license.key, None).await.unwrap();
    assert!(activated.is_bound_to(h.service.local_fingerprint()));

    let result = h
        .service
        .check_license(&license.key, Some(h.service.local_fingerprint()))
        .await
        .unwrap();
    assert!(result.valid);
}
