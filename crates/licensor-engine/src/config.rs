//! Engine configuration.

use crate::keygen::KeyFormat;
use licensor_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What a check does with an unbound device while slots remain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HardwarePolicy {
    /// Reject with `hardware_not_activated`; the device must activate first.
    #[default]
    RequireActivation,
    /// Bind the device as part of the check.
    AutoRegister,
}

impl fmt::Display for HardwarePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HardwarePolicy::RequireActivation => f.write_str("require_activation"),
            HardwarePolicy::AutoRegister => f.write_str("auto_register"),
        }
    }
}

/// Settings injected into the engine at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub key_format: KeyFormat,
    pub hardware_policy: HardwarePolicy,
    /// Read-modify-write attempts per license before giving up on contention.
    pub max_write_attempts: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            key_format: KeyFormat::default(),
            hardware_policy: HardwarePolicy::default(),
            max_write_attempts: 5,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        self.key_format.validate()?;
        if self.max_write_attempts == 0 {
            return Err(Error::Configuration(
                "max_write_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
