//! Licensor Core
//!
//! Core domain types, traits, and error handling for Licensor.
//! This crate has minimal dependencies and defines the shared vocabulary
//! used by the storage adapters, the licensing engine and the CLI.

pub mod clock;
pub mod error;
pub mod ids;
pub mod license;
pub mod ports;
pub mod usage;
pub mod validation;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Error, Result};
pub use ids::*;
pub use license::{License, LicenseFilter, LicenseStatus, LicenseType, NewLicenseType};
pub use usage::{UsageEventKind, UsageLogEntry};
pub use validation::{LicenseSummary, ValidationReason, ValidationResult};
