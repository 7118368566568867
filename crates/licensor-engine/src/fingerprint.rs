//! Hardware fingerprinting.
//!
//! A fingerprint is the SHA-256 digest of a canonical rendering of stable
//! machine attributes. The hash is a pure function of [`SystemAttributes`];
//! only [`SystemAttributes::collect`] touches the host.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sysinfo::System;

/// Machine characteristics that feed the fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemAttributes {
    pub os_name: String,
    pub hostname: String,
    pub os_release: String,
    pub machine: String,
    pub processor: String,
}

impl SystemAttributes {
    /// Read the attributes of the current machine.
    pub fn collect() -> Self {
        let mut sys = System::new();
        sys.refresh_cpu_all();

        let processor = sys
            .cpus()
            .first()
            .map(|cpu| cpu.brand().trim().to_string())
            .filter(|brand| !brand.is_empty())
            .unwrap_or_else(unknown);

        Self {
            os_name: System::name().unwrap_or_else(|| std::env::consts::OS.to_string()),
            hostname: hostname::get()
                .ok()
                .and_then(|h| h.into_string().ok())
                .or_else(System::host_name)
                .unwrap_or_else(unknown),
            os_release: System::kernel_version()
                .or_else(System::os_version)
                .unwrap_or_else(unknown),
            machine: std::env::consts::ARCH.to_string(),
            processor,
        }
    }

    /// `key:value` pairs in a fixed order, joined by `|`.
    pub fn canonical(&self) -> String {
        [
            ("os", &self.os_name),
            ("host", &self.hostname),
            ("release", &self.os_release),
            ("machine", &self.machine),
            ("processor", &self.processor),
        ]
        .iter()
        .map(|(name, value)| format!("{}:{}", name, value.trim()))
        .collect::<Vec<_>>()
        .join("|")
    }
}

fn unknown() -> String {
    "unknown".to_string()
}

/// Lowercase hex SHA-256 of the canonical attribute string.
pub fn fingerprint(attrs: &SystemAttributes) -> String {
    let mut hasher = Sha256::new();
    hasher.update(attrs.canonical().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Fingerprint of the machine this process runs on.
pub fn local_fingerprint() -> String {
    fingerprint(&SystemAttributes::collect())
}
