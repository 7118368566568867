//! Error types for Licensor.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    // Lookup errors
    #[error("License not found")]
    NotFound,

    #[error("License key already exists")]
    DuplicateKey,

    #[error("Invalid license type: {0}")]
    InvalidLicenseType(String),

    #[error("License type already exists: {0}")]
    DuplicateLicenseType(String),

    // Lifecycle errors
    #[error("License has been revoked")]
    AlreadyRevoked,

    #[error("License has expired")]
    LicenseExpired,

    #[error("Activation limit reached ({max} devices)")]
    ActivationLimitExceeded { max: u32 },

    #[error("Hardware id is not bound to this license")]
    HardwareMismatch,

    #[error("License has not been activated")]
    NotActivated,

    #[error("License was modified concurrently: {0}")]
    ConcurrentModification(String),

    // Input errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    // Infrastructure errors
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Error::NotFound => "not_found",
            Error::DuplicateKey => "duplicate_key",
            Error::InvalidLicenseType(_) => "invalid_license_type",
            Error::DuplicateLicenseType(_) => "duplicate_license_type",
            Error::AlreadyRevoked => "already_revoked",
            Error::LicenseExpired => "license_expired",
            Error::ActivationLimitExceeded { .. } => "activation_limit_exceeded",
            Error::HardwareMismatch => "hardware_mismatch",
            Error::NotActivated => "not_activated",
            Error::ConcurrentModification(_) => "concurrent_modification",
            Error::InvalidInput(_) => "invalid_input",
            Error::Configuration(_) => "configuration",
            Error::StorageUnavailable(_) => "storage_unavailable",
            Error::Serialization(_) => "serialization",
        }
    }

    /// Whether a caller may reasonably retry the operation.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::StorageUnavailable(_) | Error::ConcurrentModification(_)
        )
    }
}
