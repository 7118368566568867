//! CLI command definitions.

use chrono::{DateTime, NaiveDate, Utc};
use clap::Subcommand;
use licensor_core::LicenseStatus;

#[derive(Subcommand)]
pub enum Commands {
    #[command(flatten)]
    License(LicenseCommands),

    /// Print this machine's hardware fingerprint
    Fingerprint {
        /// Show the attributes it is derived from
        #[arg(short, long)]
        verbose: bool,
    },

    /// Apply database migrations
    Migrate,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

/// Commands that need a database connection and an engine.
#[derive(Subcommand)]
pub enum LicenseCommands {
    /// Manage license types
    Type {
        #[command(subcommand)]
        command: TypeCommands,
    },

    /// Issue one or more licenses
    Generate {
        /// License type name or ID
        #[arg(short = 't', long = "type")]
        license_type: String,

        /// Assign to a user
        #[arg(short, long)]
        user: Option<String>,

        /// Extra leading key group, e.g. ACME
        #[arg(short, long)]
        prefix: Option<String>,

        /// Use this key instead of a generated one
        #[arg(long, conflicts_with_all = ["prefix", "count"])]
        key: Option<String>,

        /// Maximum devices (defaults to the type's limit)
        #[arg(short, long)]
        activations: Option<u32>,

        /// Fixed expiry (YYYY-MM-DD or RFC 3339)
        #[arg(long, value_parser = parse_expiry)]
        expires: Option<DateTime<Utc>>,

        /// Free-text notes
        #[arg(short, long)]
        notes: Option<String>,

        /// Number of licenses to issue
        #[arg(short, long, default_value_t = 1)]
        count: u32,
    },

    /// Check whether a license may be used
    Check {
        /// License key
        key: String,

        /// Device to check for (defaults to this machine)
        #[arg(long = "hardware-id")]
        hardware_id: Option<String>,

        /// Ignore device binding
        #[arg(long, conflicts_with = "hardware_id")]
        any_device: bool,

        /// Show license details
        #[arg(short, long)]
        details: bool,
    },

    /// Bind a device to a license
    Activate {
        /// License key
        key: String,

        /// Device to bind (defaults to this machine)
        #[arg(long = "hardware-id")]
        hardware_id: Option<String>,
    },

    /// Release a device's activation slot
    Deactivate {
        /// License key
        key: String,

        /// Device to release (defaults to this machine)
        #[arg(long = "hardware-id")]
        hardware_id: Option<String>,
    },

    /// Revoke a license permanently
    Revoke {
        /// License key
        key: String,

        /// Reason recorded with the revocation
        #[arg(short, long)]
        reason: Option<String>,

        /// Skip confirmation
        #[arg(short, long)]
        force: bool,
    },

    /// Show a license
    Info {
        /// License key
        key: String,
    },

    /// List licenses
    List {
        /// Filter by status
        #[arg(short, long)]
        status: Option<LicenseStatus>,

        /// Filter by license type name
        #[arg(short = 't', long = "type")]
        license_type: Option<String>,

        /// Filter by user
        #[arg(short, long)]
        user: Option<String>,

        /// Only licenses expiring within this many days
        #[arg(short, long)]
        expiring: Option<u32>,

        /// Search keys, notes and users
        #[arg(long)]
        search: Option<String>,

        /// Maximum rows
        #[arg(short, long)]
        limit: Option<u32>,
    },

    /// Show the activity log of a license
    Log {
        /// License key
        key: String,

        /// Most recent entries to show
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
}

#[derive(Subcommand)]
pub enum TypeCommands {
    /// Create a license type
    Create {
        /// Unique name
        name: String,

        /// Maximum devices per license
        #[arg(short, long, default_value_t = 1)]
        max_instances: u32,

        /// Validity in days
        #[arg(short, long, default_value_t = 365)]
        duration_days: u32,

        /// Description
        #[arg(long, default_value = "")]
        description: String,
    },

    /// List license types
    List,

    /// Resume issuing licenses of a type
    Enable {
        /// License type name or ID
        license_type: String,
    },

    /// Stop issuing licenses of a type
    Disable {
        /// License type name or ID
        license_type: String,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Set configuration value
    Set {
        /// Key
        key: String,

        /// Value
        value: String,
    },

    /// Print the configuration file path
    Path,
}

/// A date means the end of that day, UTC.
pub fn parse_expiry(value: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(at) = DateTime::parse_from_rfc3339(value) {
        return Ok(at.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(23, 59, 59))
        .map(|at| at.and_utc())
        .ok_or_else(|| format!("invalid date {:?}, expected YYYY-MM-DD", value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_expiry_date() {
        assert_eq!(
            parse_expiry("2025-06-30").unwrap(),
            Utc.with_ymd_and_hms(2025, 6, 30, 23, 59, 59).unwrap()
        );
    }

    #[test]
    fn test_parse_expiry_rfc3339() {
        assert_eq!(
            parse_expiry("2025-06-30T12:00:00+02:00").unwrap(),
            Utc.with_ymd_and_hms(2025, 6, 30, 10, 0, 0).unwrap()
        );
        assert!(parse_expiry("next tuesday").is_err());
    }
}
