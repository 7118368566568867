//! CLI configuration management.

use clap::ValueEnum;
use licensor_db::DatabaseConfig;
use licensor_engine::{EngineConfig, HardwarePolicy};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Overrides `database_url` from the file.
pub const DATABASE_URL_ENV: &str = "LICENSOR_DATABASE_URL";

/// CLI configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliConfig {
    /// PostgreSQL connection URL.
    #[serde(default)]
    pub database_url: Option<String>,
    /// Pool size.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Seconds to wait for a pooled connection.
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,
    /// Output format.
    #[serde(default)]
    pub output_format: OutputFormat,
    /// Engine settings.
    #[serde(default)]
    pub engine: EngineConfig,
}

fn default_max_connections() -> u32 {
    5
}

fn default_acquire_timeout() -> u64 {
    5
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            max_connections: default_max_connections(),
            acquire_timeout_secs: default_acquire_timeout(),
            output_format: OutputFormat::default(),
            engine: EngineConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

impl CliConfig {
    /// Load configuration from file.
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let path = Self::config_path()?;
        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            Ok(serde_yaml::from_str(&content)?)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file.
    pub fn save(&self) -> Result<(), Box<dyn std::error::Error>> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(self)?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Get the configuration file path.
    pub fn config_path() -> Result<PathBuf, Box<dyn std::error::Error>> {
        let dirs = directories::ProjectDirs::from("dev", "licensor", "licensor")
            .ok_or("Could not determine config directory")?;
        Ok(dirs.config_dir().join("config.yaml"))
    }

    /// Apply environment overrides.
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(DATABASE_URL_ENV)
            && !url.trim().is_empty()
        {
            self.database_url = Some(url);
        }
    }

    pub fn database(&self) -> Result<DatabaseConfig, String> {
        let url = self.database_url.clone().ok_or_else(|| {
            format!(
                "No database configured. Set {} or run `licensor config set database_url <url>`",
                DATABASE_URL_ENV
            )
        })?;
        Ok(DatabaseConfig {
            url,
            max_connections: self.max_connections,
            acquire_timeout_secs: self.acquire_timeout_secs,
        })
    }

    /// Set a configuration value. Leaves `self` unchanged on error.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), String> {
        let mut next = self.clone();
        next.apply(key, value)?;
        next.engine.validate().map_err(|e| e.to_string())?;
        *self = next;
        Ok(())
    }

    fn apply(&mut self, key: &str, value: &str) -> Result<(), String> {
        match key {
            "database_url" => self.database_url = Some(value.to_string()),
            "max_connections" => self.max_connections = parse_number(key, value)?,
            "acquire_timeout_secs" => self.acquire_timeout_secs = parse_number(key, value)?,
            "output_format" => {
                self.output_format = match value {
                    "table" => OutputFormat::Table,
                    "json" => OutputFormat::Json,
                    _ => return Err(format!("Invalid output format: {}", value)),
                };
            }
            "hardware_policy" => {
                self.engine.hardware_policy = match value {
                    "require_activation" => HardwarePolicy::RequireActivation,
                    "auto_register" => HardwarePolicy::AutoRegister,
                    _ => return Err(format!("Invalid hardware policy: {}", value)),
                };
            }
            "max_write_attempts" => self.engine.max_write_attempts = parse_number(key, value)?,
            "key_groups" => self.engine.key_format.groups = parse_number(key, value)?,
            "key_group_len" => self.engine.key_format.group_len = parse_number(key, value)?,
            _ => return Err(format!("Unknown config key: {}", key)),
        }
        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, String> {
    value
        .parse()
        .map_err(|_| format!("Invalid number for {}: {}", key, value))
}
