//! Audit trail writer.

use chrono::{DateTime, Utc};
use licensor_core::license::key_prefix;
use licensor_core::ports::UsageLogRepository;
use licensor_core::{License, UsageEventKind, UsageLogEntry};
use std::sync::Arc;
use tracing::{debug, error};

/// Appends usage entries. Never fails the operation that triggered it.
#[derive(Clone)]
pub struct AuditLogger {
    repo: Arc<dyn UsageLogRepository>,
}

impl AuditLogger {
    pub fn new(repo: Arc<dyn UsageLogRepository>) -> Self {
        Self { repo }
    }

    /// Record an event against `license`.
    ///
    /// Storage errors are reported on the `licensor::audit` target and
    /// swallowed; the license write that preceded this call stands.
    pub async fn record(
        &self,
        license: &License,
        kind: UsageEventKind,
        hardware_id: Option<&str>,
        detail: Option<String>,
        at: DateTime<Utc>,
    ) {
        let entry = UsageLogEntry::new(
            license.id,
            kind,
            hardware_id.map(str::to_string),
            detail,
            at,
        );

        match self.repo.append(&entry).await {
            Ok(()) => debug!(license_id = %license.id, event = %kind, "Recorded usage entry"),
            Err(e) => error!(
                target: "licensor::audit",
                license_id = %license.id,
                key_prefix = license.key_prefix(),
                hardware_prefix = hardware_id.map(key_prefix),
                event = %kind,
                error = %e,
                "Failed to record usage entry"
            ),
        }
    }
}
