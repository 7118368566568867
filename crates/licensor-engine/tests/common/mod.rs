//! Shared setup for engine tests.

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use licensor_core::license::NewLicenseType;
use licensor_core::{License, LicenseType, ManualClock, UsageEventKind};
use licensor_db::MemoryStore;
use licensor_engine::{EngineConfig, GenerateLicenses, LicenseService, Stores};
use std::sync::Arc;

pub struct Harness {
    pub service: Arc<LicenseService>,
    pub store: MemoryStore,
    pub clock: ManualClock,
}

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
}

pub fn init_test_logging() {
    use tracing_subscriber::{EnvFilter, fmt};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,licensor_engine=debug")),
        )
        .with_test_writer()
        .try_init();
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        init_test_logging();
        let store = MemoryStore::new();
        let clock = ManualClock::new(start_time());
        let service = LicenseService::new(
            Stores::shared(store.clone()),
            config,
            Arc::new(clock.clone()),
        )
        .expect("valid engine config");

        Self {
            service: Arc::new(service),
            store,
            clock,
        }
    }

    pub async fn license_type(&self, name: &str, max_instances: u32, duration_days: u32) -> LicenseType {
        self.service
            .create_license_type(NewLicenseType {
                name: name.to_string(),
                description: format!("{} tier", name),
                max_instances,
                duration_days,
            })
            .await
            .expect("create license type")
    }

    pub async fn issue(&self, license_type: &LicenseType) -> License {
        self.issue_with(GenerateLicenses::new(license_type.id)).await
    }

    pub async fn issue_with(&self, request: GenerateLicenses) -> License {
        self.service
            .generate_licenses(request)
            .await
            .expect("generate license")
            .remove(0)
    }

    pub async fn event_kinds(&self, key: &str) -> Vec<UsageEventKind> {
        self.service
            .activity_log(key)
            .await
            .expect("activity log")
            .iter()
            .map(|entry| entry.event_kind)
            .collect()
    }
}
