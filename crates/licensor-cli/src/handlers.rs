//! Command handlers.

use crate::config::{CliConfig, OutputFormat};
use crate::retry::retry_once;
use chrono::{DateTime, Utc};
use console::style;
use licensor_core::license::key_prefix;
use licensor_core::{
    License, LicenseFilter, LicenseStatus, LicenseType, NewLicenseType, SystemClock,
    ValidationResult,
};
use licensor_db::Database;
use licensor_engine::{
    GenerateLicenses, LicenseService, Stores, SystemAttributes, fingerprint,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

type HandlerResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

/// Connected engine plus output settings.
pub struct Context {
    pub service: LicenseService,
    pub output: OutputFormat,
}

impl Context {
    pub async fn connect(config: &CliConfig) -> HandlerResult<Self> {
        let db = Database::connect(&config.database()?).await?;
        let stores = Stores {
            license_types: Arc::new(db.license_types()),
            keys: Arc::new(db.key_registry()),
            licenses: Arc::new(db.licenses()),
            usage_log: Arc::new(db.usage_log()),
        };
        let service = LicenseService::new(stores, config.engine.clone(), Arc::new(SystemClock))?;

        Ok(Self {
            service,
            output: config.output_format,
        })
    }

    fn json(&self) -> bool {
        self.output == OutputFormat::Json
    }
}

fn print_json<T: Serialize>(value: &T) -> HandlerResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn date(at: Option<DateTime<Utc>>) -> String {
    at.map(|at| at.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn styled_status(status: LicenseStatus) -> String {
    match status {
        LicenseStatus::Active => style(status).green().to_string(),
        LicenseStatus::Pending => style(status).yellow().to_string(),
        LicenseStatus::Expired => style(status).dim().to_string(),
        LicenseStatus::Revoked => style(status).red().to_string(),
    }
}

/// Create a license type.
pub async fn create_type(
    ctx: &Context,
    name: String,
    max_instances: u32,
    duration_days: u32,
    description: String,
) -> HandlerResult {
    let license_type = ctx
        .service
        .create_license_type(NewLicenseType {
            name,
            description,
            max_instances,
            duration_days,
        })
        .await?;

    if ctx.json() {
        return print_json(&license_type);
    }
    println!(
        "{} Created license type {} ({})",
        style("✓").green(),
        style(&license_type.name).bold(),
        license_type.id
    );
    Ok(())
}

/// List license types.
pub async fn list_types(ctx: &Context) -> HandlerResult {
    let types = retry_once(|| ctx.service.list_license_types()).await?;

    if ctx.json() {
        return print_json(&types);
    }
    if types.is_empty() {
        println!("{} No license types defined", style("i").blue());
        return Ok(());
    }

    println!(
        "{:<20} {:>9} {:>8} {:<8} {}",
        "NAME", "DEVICES", "DAYS", "ISSUING", "ID"
    );
    for t in &types {
        println!(
            "{:<20} {:>9} {:>8} {:<8} {}",
            t.name,
            t.max_instances,
            t.duration_days,
            if t.is_active { "yes" } else { "no" },
            style(t.id).dim()
        );
    }
    Ok(())
}

/// Enable or disable issuance for a type.
pub async fn set_type_active(ctx: &Context, license_type: &str, active: bool) -> HandlerResult {
    let license_type = ctx.service.find_license_type(license_type).await?;
    ctx.service
        .set_license_type_active(license_type.id, active)
        .await?;

    println!(
        "{} {} {}",
        style("✓").green(),
        license_type.name,
        if active {
            "is issuing licenses"
        } else {
            "no longer issues licenses"
        }
    );
    Ok(())
}

/// Options for `generate` beyond the license type.
pub struct IssueOptions {
    pub user: Option<String>,
    pub prefix: Option<String>,
    pub key: Option<String>,
    pub activations: Option<u32>,
    pub expires: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub count: u32,
}

/// Issue licenses.
pub async fn generate(ctx: &Context, license_type: &str, options: IssueOptions) -> HandlerResult {
    let license_type = ctx.service.find_license_type(license_type).await?;

    let request = GenerateLicenses {
        license_type_id: license_type.id,
        user: options.user,
        prefix: options.prefix,
        custom_key: options.key,
        max_activations: options.activations,
        expires_at: options.expires,
        notes: options.notes,
        count: options.count,
    };
    let licenses = ctx.service.generate_licenses(request).await?;

    if ctx.json() {
        return print_json(&licenses);
    }
    for license in &licenses {
        println!("{}", license.key);
    }
    eprintln!(
        "{} Issued {} {} license{}",
        style("✓").green(),
        licenses.len(),
        license_type.name,
        if licenses.len() == 1 { "" } else { "s" }
    );
    Ok(())
}

/// Check a license. Returns whether it is valid.
pub async fn check(
    ctx: &Context,
    key: &str,
    hardware_id: Option<String>,
    any_device: bool,
    details: bool,
) -> HandlerResult<bool> {
    let hardware_id = match (any_device, hardware_id) {
        (true, _) => None,
        (false, Some(hardware_id)) => Some(hardware_id),
        (false, None) => Some(ctx.service.local_fingerprint().to_string()),
    };

    let result = retry_once(|| ctx.service.check_license(key, hardware_id.as_deref())).await?;

    if ctx.json() {
        print_json(&result)?;
    } else {
        print_result(&result);
    }

    if details && result.valid {
        show_license(ctx, key).await?;
    }
    Ok(result.valid)
}

fn print_result(result: &ValidationResult) {
    if !result.valid {
        println!(
            "{} {} ({})",
            style("✗").red(),
            result.message,
            style(result.reason.code()).dim()
        );
        return;
    }

    println!("{} {}", style("✓").green(), result.message);
    if let Some(summary) = &result.summary {
        println!("  Type:        {}", summary.license_type);
        println!(
            "  Activations: {}/{}",
            summary.activation_count, summary.max_activations
        );
        if let Some(days) = summary.remaining_days {
            println!("  Expires:     {} ({} days left)", date(result.expires_at), days);
        }
    }
}

/// Activate a license on a device.
pub async fn activate(ctx: &Context, key: &str, hardware_id: Option<String>) -> HandlerResult {
    let license =
        retry_once(|| ctx.service.activate_license(key, hardware_id.as_deref())).await?;

    if ctx.json() {
        return print_json(&license);
    }
    println!(
        "{} License activated ({}/{} devices, expires {})",
        style("✓").green(),
        license.activation_count(),
        license.max_activations,
        date(license.expires_at)
    );
    Ok(())
}

/// Release a device.
pub async fn deactivate(ctx: &Context, key: &str, hardware_id: Option<String>) -> HandlerResult {
    let license = ctx
        .service
        .deactivate_license(key, hardware_id.as_deref())
        .await?;

    if ctx.json() {
        return print_json(&license);
    }
    println!(
        "{} Device released ({}/{} devices in use)",
        style("✓").green(),
        license.activation_count(),
        license.max_activations
    );
    Ok(())
}

/// Revoke a license, asking first unless forced.
pub async fn revoke(
    ctx: &Context,
    key: &str,
    reason: Option<String>,
    force: bool,
) -> HandlerResult {
    if !force {
        use dialoguer::Confirm;

        let details = ctx.service.get_license(key).await?;
        if details.license.status == LicenseStatus::Revoked {
            println!("{} License is already revoked", style("!").yellow());
            return Ok(());
        }

        print_license(&details.license, &details.license_type);
        let confirmed = Confirm::new()
            .with_prompt(format!("Revoke license {}?", key_prefix(&details.license.key)))
            .default(false)
            .interact()?;

        if !confirmed {
            println!("{} Cancelled", style("!").yellow());
            return Ok(());
        }
    }

    let license = retry_once(|| ctx.service.revoke_license(key, reason.clone())).await?;

    if ctx.json() {
        return print_json(&license);
    }
    println!("{} License revoked", style("✓").green());
    Ok(())
}

/// Show a license.
pub async fn info(ctx: &Context, key: &str) -> HandlerResult {
    show_license(ctx, key).await
}

async fn show_license(ctx: &Context, key: &str) -> HandlerResult {
    let details = retry_once(|| ctx.service.get_license(key)).await?;

    if ctx.json() {
        return print_json(&details);
    }
    print_license(&details.license, &details.license_type);
    Ok(())
}

fn print_license(license: &License, license_type: &LicenseType) {
    println!("{}", style(&license.key).bold());
    println!("  Type:        {}", license_type.name);
    println!("  Status:      {}", styled_status(license.status));
    println!("  User:        {}", license.user.as_deref().unwrap_or("-"));
    println!(
        "  Activations: {}/{}",
        license.activation_count(),
        license.max_activations
    );
    for hardware_id in &license.activated_hardware_ids {
        println!("    - {}", hardware_id);
    }
    println!("  Issued:      {}", date(Some(license.issued_at)));
    println!("  Activated:   {}", date(license.activated_at));
    println!(
        "  Expires:     {}{}",
        date(license.expires_at),
        if license.expiry_pinned { " (fixed)" } else { "" }
    );
    if let Some(revoked_at) = license.revoked_at {
        println!(
            "  Revoked:     {} {}",
            date(Some(revoked_at)),
            license.revoked_reason.as_deref().unwrap_or("")
        );
    }
    if let Some(notes) = &license.notes {
        println!("  Notes:       {}", notes);
    }
}

/// List licenses.
pub async fn list(ctx: &Context, filter: LicenseFilter, limit: Option<u32>) -> HandlerResult {
    let licenses = retry_once(|| ctx.service.list_licenses(&filter, limit)).await?;

    if ctx.json() {
        return print_json(&licenses);
    }
    if licenses.is_empty() {
        println!("{} No licenses match", style("i").blue());
        return Ok(());
    }

    let type_names: HashMap<_, _> = retry_once(|| ctx.service.list_license_types())
        .await?
        .into_iter()
        .map(|t| (t.id, t.name))
        .collect();

    println!(
        "{:<36} {:<14} {:<9} {:>7} {:<10} {}",
        "KEY", "TYPE", "STATUS", "DEVICES", "EXPIRES", "USER"
    );
    for license in &licenses {
        println!(
            "{:<36} {:<14} {:<9} {:>7} {:<10} {}",
            license.key,
            type_names
                .get(&license.license_type_id)
                .map(String::as_str)
                .unwrap_or("?"),
            styled_status(license.status),
            format!("{}/{}", license.activation_count(), license.max_activations),
            date(license.expires_at),
            license.user.as_deref().unwrap_or("")
        );
    }

    let total = retry_once(|| ctx.service.count_licenses(&filter)).await?;
    if total > licenses.len() as u64 {
        println!(
            "{}",
            style(format!("Showing {} of {} licenses", licenses.len(), total)).dim()
        );
    }
    Ok(())
}

/// Show the most recent usage entries of a license.
pub async fn activity_log(ctx: &Context, key: &str, limit: usize) -> HandlerResult {
    let entries = retry_once(|| ctx.service.activity_log(key)).await?;
    let recent = &entries[entries.len().saturating_sub(limit)..];

    if ctx.json() {
        return print_json(&recent);
    }
    if recent.is_empty() {
        println!("{} No activity recorded", style("i").blue());
        return Ok(());
    }

    for entry in recent {
        let kind = if entry.event_kind.is_failure() {
            style(entry.event_kind).red().to_string()
        } else {
            style(entry.event_kind).cyan().to_string()
        };
        println!(
            "{}  {:<21} {:<10} {}",
            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
            kind,
            entry.hardware_id.as_deref().map(key_prefix).unwrap_or("-"),
            entry.detail.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

/// Print this machine's fingerprint.
pub fn show_fingerprint(output: OutputFormat, verbose: bool) -> HandlerResult {
    let attrs = SystemAttributes::collect();
    let id = fingerprint(&attrs);

    if output == OutputFormat::Json {
        return print_json(&serde_json::json!({
            "fingerprint": id,
            "attributes": attrs,
        }));
    }
    println!("{}", id);
    if verbose {
        println!("  OS:        {}", attrs.os_name);
        println!("  Hostname:  {}", attrs.hostname);
        println!("  Release:   {}", attrs.os_release);
        println!("  Machine:   {}", attrs.machine);
        println!("  Processor: {}", attrs.processor);
    }
    Ok(())
}

/// Apply database migrations.
pub async fn migrate(config: &CliConfig) -> HandlerResult {
    let db = Database::connect(&config.database()?).await?;
    db.migrate().await?;
    println!("{} Database is up to date", style("✓").green());
    Ok(())
}

/// Show configuration.
pub fn show_config(config: &CliConfig) -> HandlerResult {
    println!("Current configuration:");
    println!(
        "  database_url: {}",
        config
            .database_url
            .as_deref()
            .map(redact_url)
            .unwrap_or_else(|| "(not set)".to_string())
    );
    println!("  max_connections: {}", config.max_connections);
    println!("  acquire_timeout_secs: {}", config.acquire_timeout_secs);
    println!("  output_format: {:?}", config.output_format);
    println!("  hardware_policy: {}", config.engine.hardware_policy);
    println!("  max_write_attempts: {}", config.engine.max_write_attempts);
    println!(
        "  key_format: {} groups of {}",
        config.engine.key_format.groups, config.engine.key_format.group_len
    );

    if let Ok(path) = CliConfig::config_path() {
        println!("\nConfig file: {}", path.display());
    }

    Ok(())
}

/// Set configuration.
pub fn set_config(key: &str, value: &str) -> HandlerResult {
    let mut config = CliConfig::load().unwrap_or_default();
    config.set(key, value)?;
    config.save()?;

    let shown = if key == "database_url" {
        redact_url(value)
    } else {
        value.to_string()
    };
    println!("{} Set {} = {}", style("✓").green(), key, shown);
    Ok(())
}

/// Print the configuration file path.
pub fn config_path() -> HandlerResult {
    println!("{}", CliConfig::config_path()?.display());
    Ok(())
}

/// Hide the password of a connection URL.
fn redact_url(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    let Some((credentials, host)) = rest.rsplit_once('@') else {
        return url.to_string();
    };
    match credentials.split_once(':') {
        Some((user, _)) => format!("{}://{}:***@{}", scheme, user, host),
        None => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_url() {
        assert_eq!(
            redact_url("postgres://admin:s3cret@db:5432/licensor"),
            "postgres://admin:***@db:5432/licensor"
        );
        assert_eq!(
            redact_url("postgres://db:5432/licensor"),
            "postgres://db:5432/licensor"
        );
    }

    #[test]
    fn test_date_formatting() {
        assert_eq!(date(None), "-");
        let at = DateTime::parse_from_rfc3339("2025-01-31T18:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(date(Some(at)), "2025-01-31");
    }
}
