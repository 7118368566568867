//! Licensor CLI entrypoint.

use clap::Parser;
use console::style;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod handlers;
mod retry;

use commands::{Commands, ConfigCommands, LicenseCommands, TypeCommands};
use config::{CliConfig, OutputFormat};
use handlers::{Context, IssueOptions};
use licensor_core::LicenseFilter;

#[derive(Parser)]
#[command(name = "licensor")]
#[command(author, version, about = "License key issuance and validation", long_about = None)]
struct Cli {
    /// Output format
    #[arg(short, long, global = true, value_enum)]
    output: Option<OutputFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = CliConfig::load().unwrap_or_default();
    config.apply_env();
    if let Some(output) = cli.output {
        config.output_format = output;
    }

    match run(cli.command, config).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {}", style("✗").red(), e);
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands, config: CliConfig) -> Result<ExitCode, Box<dyn std::error::Error>> {
    match command {
        Commands::Fingerprint { verbose } => {
            handlers::show_fingerprint(config.output_format, verbose)?
        }
        Commands::Migrate => handlers::migrate(&config).await?,
        Commands::Config { command } => match command {
            ConfigCommands::Show => handlers::show_config(&config)?,
            ConfigCommands::Set { key, value } => handlers::set_config(&key, &value)?,
            ConfigCommands::Path => handlers::config_path()?,
        },
        Commands::License(command) => {
            let ctx = Context::connect(&config).await?;
            return run_connected(&ctx, command).await;
        }
    }

    Ok(ExitCode::SUCCESS)
}

async fn run_connected(
    ctx: &Context,
    command: LicenseCommands,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    match command {
        LicenseCommands::Type { command } => match command {
            TypeCommands::Create {
                name,
                max_instances,
                duration_days,
                description,
            } => handlers::create_type(ctx, name, max_instances, duration_days, description).await?,
            TypeCommands::List => handlers::list_types(ctx).await?,
            TypeCommands::Enable { license_type } => {
                handlers::set_type_active(ctx, &license_type, true).await?
            }
            TypeCommands::Disable { license_type } => {
                handlers::set_type_active(ctx, &license_type, false).await?
            }
        },
        LicenseCommands::Generate {
            license_type,
            user,
            prefix,
            key,
            activations,
            expires,
            notes,
            count,
        } => {
            let options = IssueOptions {
                user,
                prefix,
                key,
                activations,
                expires,
                notes,
                count,
            };
            handlers::generate(ctx, &license_type, options).await?
        }
        LicenseCommands::Check {
            key,
            hardware_id,
            any_device,
            details,
        } => {
            // Exit code 2 separates an invalid license from a failed command.
            if !handlers::check(ctx, &key, hardware_id, any_device, details).await? {
                return Ok(ExitCode::from(2));
            }
        }
        LicenseCommands::Activate { key, hardware_id } => {
            handlers::activate(ctx, &key, hardware_id).await?
        }
        LicenseCommands::Deactivate { key, hardware_id } => {
            handlers::deactivate(ctx, &key, hardware_id).await?
        }
        LicenseCommands::Revoke { key, reason, force } => {
            handlers::revoke(ctx, &key, reason, force).await?
        }
        LicenseCommands::Info { key } => handlers::info(ctx, &key).await?,
        LicenseCommands::List {
            status,
            license_type,
            user,
            expiring,
            search,
            limit,
        } => {
            let filter = LicenseFilter {
                status,
                license_type,
                user,
                expiring_within_days: expiring,
                search,
            };
            handlers::list(ctx, filter, limit).await?
        }
        LicenseCommands::Log { key, limit } => handlers::activity_log(ctx, &key, limit).await?,
    }

    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_license_commands_sit_at_top_level() {
        let cli = Cli::try_parse_from(["licensor", "check", "ABCDE-FGHJK", "--any-device"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::License(LicenseCommands::Check { any_device: true, .. })
        ));

        let cli = Cli::try_parse_from(["licensor", "-o", "json", "fingerprint"]).unwrap();
        assert!(matches!(cli.command, Commands::Fingerprint { verbose: false }));
        assert_eq!(cli.output, Some(OutputFormat::Json));

        assert!(Cli::try_parse_from(["licensor", "check", "K", "--hardware-id", "HW", "--any-device"]).is_err());
    }
}
