//! Default paths for the session agent
//!
//! Paths are user-writable by default:
//! - Config: `$XDG_CONFIG_HOME/finguard/agent.toml` or `~/.config/finguard/agent.toml`
//! - Data: `$XDG_DATA_HOME/finguard` or `~/.local/share/finguard`
//! - Logs: `$XDG_STATE_HOME/finguard` or `~/.local/state/finguard`

use std::path::PathBuf;

/// Environment variable for overriding the config file path
pub const FINGUARD_CONFIG_ENV: &str = "FINGUARD_CONFIG";

/// Environment variable for overriding the data directory
pub const FINGUARD_DATA_DIR_ENV: &str = "FINGUARD_DATA_DIR";

/// Application subdirectory name
const APP_DIR: &str = "finguard";

/// Config filename within the config directory
const CONFIG_FILENAME: &str = "agent.toml";

/// Database filename within the data directory
pub const DATABASE_FILENAME: &str = "finguard.db";

fn home_subdir(parts: &[&str]) -> Option<PathBuf> {
    let home = std::env::var("HOME").ok()?;
    let mut path = PathBuf::from(home);
    for part in parts {
        path.push(part);
    }
    Some(path.join(APP_DIR))
}

/// Get the default config file path.
///
/// Order of precedence:
/// 1. `$FINGUARD_CONFIG`
/// 2. `$XDG_CONFIG_HOME/finguard/agent.toml`
/// 3. `~/.config/finguard/agent.toml`
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = std::env::var(FINGUARD_CONFIG_ENV) {
        return PathBuf::from(path);
    }

    if let Ok(config_home) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(config_home).join(APP_DIR).join(CONFIG_FILENAME);
    }

    home_subdir(&[".config"])
        .unwrap_or_else(|| PathBuf::from("/tmp").join(APP_DIR))
        .join(CONFIG_FILENAME)
}

/// Get the default data directory.
///
/// Order of precedence:
/// 1. `$FINGUARD_DATA_DIR`
/// 2. `$XDG_DATA_HOME/finguard`
/// 3. `~/.local/share/finguard`
pub fn default_data_dir() -> PathBuf {
    if let Ok(path) = std::env::var(FINGUARD_DATA_DIR_ENV) {
        return PathBuf::from(path);
    }

    data_dir_without_env()
}

/// Get the data directory without checking `FINGUARD_DATA_DIR`.
/// Used for config defaults where the env var is checked separately.
pub fn data_dir_without_env() -> PathBuf {
    if let Ok(data_home) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(data_home).join(APP_DIR);
    }

    home_subdir(&[".local", "share"])
        .unwrap_or_else(|| PathBuf::from("/tmp").join(APP_DIR).join("data"))
}

/// Get the default log directory.
pub fn default_log_dir() -> PathBuf {
    if let Ok(state_home) = std::env::var("XDG_STATE_HOME") {
        return PathBuf::from(state_home).join(APP_DIR);
    }

    home_subdir(&[".local", "state"])
        .unwrap_or_else(|| PathBuf::from("/tmp").join(APP_DIR).join("logs"))
}
