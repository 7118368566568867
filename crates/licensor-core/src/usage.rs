//! Usage log (audit trail) records.

use crate::ids::{LicenseId, UsageLogId};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of event recorded against a license.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum UsageEventKind {
    Generated,
    Activated,
    Deactivated,
    ValidationSucceeded,
    ValidationFailed,
    Expired,
    Revoked,
}

impl UsageEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UsageEventKind::Generated => "generated",
            UsageEventKind::Activated => "activated",
            UsageEventKind::Deactivated => "deactivated",
            UsageEventKind::ValidationSucceeded => "validation_succeeded",
            UsageEventKind::ValidationFailed => "validation_failed",
            UsageEventKind::Expired => "expired",
            UsageEventKind::Revoked => "revoked",
        }
    }

    /// Failed checks are the only negative outcome recorded.
    pub fn is_failure(&self) -> bool {
        matches!(self, UsageEventKind::ValidationFailed)
    }
}

impl fmt::Display for UsageEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UsageEventKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "generated" => Ok(UsageEventKind::Generated),
            "activated" => Ok(UsageEventKind::Activated),
            "deactivated" => Ok(UsageEventKind::Deactivated),
            "validation_succeeded" => Ok(UsageEventKind::ValidationSucceeded),
            "validation_failed" => Ok(UsageEventKind::ValidationFailed),
            "expired" => Ok(UsageEventKind::Expired),
            "revoked" => Ok(UsageEventKind::Revoked),
            other => Err(Error::Serialization(format!("unknown usage event: {}", other))),
        }
    }
}

/// Append-only audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct UsageLogEntry {
    pub id: UsageLogId,
    pub license_id: LicenseId,
    pub event_kind: UsageEventKind,
    pub hardware_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub detail: Option<String>,
}

impl UsageLogEntry {
    pub fn new(
        license_id: LicenseId,
        event_kind: UsageEventKind,
        hardware_id: Option<String>,
        detail: Option<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: UsageLogId::new(),
            license_id,
            event_kind,
            hardware_id,
            timestamp,
            detail,
        }
    }
}
