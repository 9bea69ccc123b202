//! Config validation CLI tool
//!
//! Validates a finguard-agent configuration file and reports any errors.

use finguard_api::AlertCategory;
use finguard_config::{ConfigError, StorageBackend};
use finguard_util::{default_config_path, format_duration};
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let config_path = match args.get(1) {
        Some(path) => PathBuf::from(path),
        None => {
            let default_path = default_config_path();
            eprintln!("Usage: validate-config [config-file]");
            eprintln!();
            eprintln!("Validates a finguard-agent configuration file.");
            eprintln!();
            eprintln!("If no path is provided, uses: {}", default_path.display());
            eprintln!();
            eprintln!("Example:");
            eprintln!("  validate-config {}", default_path.display());
            return ExitCode::from(2);
        }
    };

    if !config_path.exists() {
        eprintln!("Error: Configuration file not found: {}", config_path.display());
        return ExitCode::from(1);
    }

    match finguard_config::load_config(&config_path) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!();
            println!("Summary:");
            println!("  Config version: {}", finguard_config::CURRENT_CONFIG_VERSION);
            println!("  API: {}", config.api.base_url);
            println!(
                "  Renewal: {} before expiry, {} attempts",
                format_duration(config.session.refresh_threshold),
                config.session.max_refresh_retries
            );
            println!(
                "  Idle: logout after {}, warning {} before",
                format_duration(config.session.idle_timeout),
                format_duration(config.session.warning_lead)
            );
            println!("  Weekly digest: {}", config.notifications.digest_day);

            let storage = match config.storage.backend {
                StorageBackend::Sqlite => format!("sqlite ({})", config.storage.database_path().display()),
                StorageBackend::Memory => "memory".to_string(),
            };
            println!("  Storage: {}", storage);

            let disabled: Vec<&str> = AlertCategory::ALL
                .iter()
                .filter(|c| !config.notifications.defaults.is_enabled(**c))
                .map(|c| c.as_str())
                .collect();
            if !disabled.is_empty() {
                println!();
                println!("Disabled by default:");
                for name in disabled {
                    println!("  - {}", name);
                }
            }

            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed");
            eprintln!();
            match &e {
                ConfigError::ReadError(io_err) => {
                    eprintln!("Failed to read file: {}", io_err);
                }
                ConfigError::ParseError(parse_err) => {
                    eprintln!("TOML parse error:");
                    eprintln!("  {}", parse_err);
                }
                ConfigError::ValidationFailed { errors } => {
                    eprintln!("Validation errors ({}):", errors.len());
                    for err in errors {
                        eprintln!("  - {}", err);
                    }
                }
                ConfigError::UnsupportedVersion(ver) => {
                    eprintln!(
                        "Unsupported config version: {} (expected {})",
                        ver,
                        finguard_config::CURRENT_CONFIG_VERSION
                    );
                }
            }
            ExitCode::from(1)
        }
    }
}
