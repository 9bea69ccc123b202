//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    /// Backend connection
    #[serde(default)]
    pub api: RawApiConfig,

    /// Credential renewal and idle timeout
    #[serde(default)]
    pub session: RawSessionConfig,

    /// Notification rules and defaults
    #[serde(default)]
    pub notifications: RawNotificationConfig,

    /// Local persistence
    #[serde(default)]
    pub storage: RawStorageConfig,
}

/// Backend connection settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawApiConfig {
    /// Base URL, e.g. `http://localhost:5000`
    pub base_url: Option<String>,

    /// Per-request timeout
    pub timeout_seconds: Option<u64>,
}

/// Session timing
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawSessionConfig {
    /// Renew this long before the access token expires
    pub refresh_threshold_seconds: Option<u64>,

    /// Attempts per renewal before the session is ended
    pub max_refresh_retries: Option<u32>,

    /// Backoff between attempts is `base ^ attempt` seconds
    pub retry_backoff_base_seconds: Option<u64>,

    /// Inactivity before forced logout
    pub idle_timeout_seconds: Option<u64>,

    /// How long before logout the warning appears
    pub warning_lead_seconds: Option<u64>,

    /// Countdown tick while in warning
    pub countdown_tick_ms: Option<u64>,

    /// How often the heartbeat checks credential validity
    pub heartbeat_seconds: Option<u64>,
}

/// Notification engine settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawNotificationConfig {
    pub bill_poll_seconds: Option<u64>,
    pub goal_poll_seconds: Option<u64>,
    pub digest_poll_seconds: Option<u64>,
    pub anomaly_poll_seconds: Option<u64>,

    /// History retention window
    pub retention_days: Option<u32>,

    /// Day of week the weekly digest fires, e.g. "sunday"
    pub digest_day: Option<String>,

    /// Default per-category toggles, used until the user saves settings
    #[serde(default)]
    pub categories: BTreeMap<String, bool>,

    /// Default quiet hours
    pub quiet_hours: Option<RawQuietHours>,
}

/// Quiet hours window
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawQuietHours {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Start time (HH:MM format)
    pub start: String,

    /// End time (HH:MM format)
    pub end: String,
}

fn default_true() -> bool {
    true
}

/// Storage settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawStorageConfig {
    /// "sqlite" (durable) or "memory" (ephemeral)
    pub backend: Option<String>,

    /// Data directory for the SQLite database
    pub data_dir: Option<PathBuf>,
}
