//! Licensor Engine
//!
//! Key generation, hardware fingerprinting, the license lifecycle state
//! machine, license checks and the audit trail, exposed through
//! [`LicenseService`].

pub mod audit;
pub mod config;
pub mod fingerprint;
pub mod keygen;
pub mod lifecycle;
pub mod service;
pub mod validation;

pub use audit::AuditLogger;
pub use config::{EngineConfig, HardwarePolicy};
pub use fingerprint::{SystemAttributes, fingerprint, local_fingerprint};
pub use keygen::{KeyFormat, KeyGenerator};
pub use lifecycle::{CreateLicense, LicenseLifecycle};
pub use service::{GenerateLicenses, LicenseDetails, LicenseService, Stores};
pub use validation::Validator;
