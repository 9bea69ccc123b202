//! Validated agent configuration

use crate::schema::{
    RawApiConfig, RawConfig, RawNotificationConfig, RawQuietHours, RawSessionConfig,
    RawStorageConfig,
};
use crate::validation::{parse_time, parse_weekday};
use chrono::Weekday;
use finguard_api::{AlertCategory, NotificationSettings, QuietHours};
use finguard_util::default_data_dir;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://localhost:5000";
pub const DEFAULT_REFRESH_THRESHOLD_SECS: u64 = 5 * 60;
pub const DEFAULT_MAX_REFRESH_RETRIES: u32 = 3;
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 30 * 60;
pub const DEFAULT_WARNING_LEAD_SECS: u64 = 5 * 60;
pub const DEFAULT_HEARTBEAT_SECS: u64 = 5 * 60;
pub const DEFAULT_RETENTION_DAYS: u32 = 30;

/// Validated configuration ready for use by the session runtime
#[derive(Debug, Clone, Default)]
pub struct AgentConfig {
    pub api: ApiConfig,
    pub session: SessionConfig,
    pub notifications: NotificationConfig,
    pub storage: StorageConfig,
}

impl AgentConfig {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        Self {
            api: ApiConfig::from_raw(raw.api),
            session: SessionConfig::from_raw(raw.session),
            notifications: NotificationConfig::from_raw(raw.notifications),
            storage: StorageConfig::from_raw(raw.storage),
        }
    }
}

/// Backend connection
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl ApiConfig {
    fn from_raw(raw: RawApiConfig) -> Self {
        Self {
            base_url: raw
                .base_url
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            timeout: Duration::from_secs(raw.timeout_seconds.unwrap_or(30)),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self::from_raw(RawApiConfig::default())
    }
}

/// Credential renewal and idle timing
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub refresh_threshold: Duration,
    pub max_refresh_retries: u32,
    pub retry_backoff_base: u64,
    pub idle_timeout: Duration,
    pub warning_lead: Duration,
    pub countdown_tick: Duration,
    pub heartbeat_interval: Duration,
}

impl SessionConfig {
    fn from_raw(raw: RawSessionConfig) -> Self {
        Self {
            refresh_threshold: Duration::from_secs(
                raw.refresh_threshold_seconds
                    .unwrap_or(DEFAULT_REFRESH_THRESHOLD_SECS),
            ),
            max_refresh_retries: raw.max_refresh_retries.unwrap_or(DEFAULT_MAX_REFRESH_RETRIES),
            retry_backoff_base: raw.retry_backoff_base_seconds.unwrap_or(2),
            idle_timeout: Duration::from_secs(
                raw.idle_timeout_seconds.unwrap_or(DEFAULT_IDLE_TIMEOUT_SECS),
            ),
            warning_lead: Duration::from_secs(
                raw.warning_lead_seconds.unwrap_or(DEFAULT_WARNING_LEAD_SECS),
            ),
            countdown_tick: Duration::from_millis(raw.countdown_tick_ms.unwrap_or(1000)),
            heartbeat_interval: Duration::from_secs(
                raw.heartbeat_seconds.unwrap_or(DEFAULT_HEARTBEAT_SECS),
            ),
        }
    }

    /// Delay after failed attempt `attempt` (1-based): `base ^ attempt` seconds
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        Duration::from_secs(self.retry_backoff_base.saturating_pow(attempt))
    }

    /// Time from the last activity until the warning fires
    pub fn warning_after(&self) -> Duration {
        self.idle_timeout.saturating_sub(self.warning_lead)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from_raw(RawSessionConfig::default())
    }
}

/// Notification engine timing and defaults
#[derive(Debug, Clone)]
pub struct NotificationConfig {
    pub bill_poll_interval: Duration,
    pub goal_poll_interval: Duration,
    pub digest_poll_interval: Duration,
    pub anomaly_poll_interval: Duration,
    pub retention: chrono::Duration,
    pub digest_day: Weekday,
    /// Settings used until the user saves their own
    pub defaults: NotificationSettings,
}

impl NotificationConfig {
    fn from_raw(raw: RawNotificationConfig) -> Self {
        let mut defaults = NotificationSettings::default();
        for (name, enabled) in &raw.categories {
            if let Some(category) = AlertCategory::parse(name) {
                defaults.set_enabled(category, *enabled);
            }
        }
        if let Some(quiet) = raw.quiet_hours.as_ref().and_then(convert_quiet_hours) {
            defaults.quiet_hours = quiet;
        }

        Self {
            bill_poll_interval: Duration::from_secs(raw.bill_poll_seconds.unwrap_or(3600)),
            goal_poll_interval: Duration::from_secs(raw.goal_poll_seconds.unwrap_or(1800)),
            digest_poll_interval: Duration::from_secs(raw.digest_poll_seconds.unwrap_or(86_400)),
            anomaly_poll_interval: Duration::from_secs(raw.anomaly_poll_seconds.unwrap_or(7200)),
            retention: chrono::Duration::days(i64::from(
                raw.retention_days.unwrap_or(DEFAULT_RETENTION_DAYS),
            )),
            digest_day: raw
                .digest_day
                .as_deref()
                .and_then(|d| parse_weekday(d).ok())
                .unwrap_or(Weekday::Sun),
            defaults,
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self::from_raw(RawNotificationConfig::default())
    }
}

fn convert_quiet_hours(raw: &RawQuietHours) -> Option<QuietHours> {
    Some(QuietHours {
        enabled: raw.enabled,
        start: parse_time(&raw.start).ok()?,
        end: parse_time(&raw.end).ok()?,
    })
}

/// Which persistence capability backs the agent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    /// Survives restarts
    Sqlite,
    /// Lives only as long as the process
    Memory,
}

/// Local persistence
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub data_dir: PathBuf,
}

impl StorageConfig {
    fn from_raw(raw: RawStorageConfig) -> Self {
        let backend = match raw.backend.as_deref() {
            Some("memory") => StorageBackend::Memory,
            _ => StorageBackend::Sqlite,
        };

        Self {
            backend,
            data_dir: raw.data_dir.unwrap_or_else(default_data_dir),
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(finguard_util::DATABASE_FILENAME)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::from_raw(RawStorageConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_session_policy() {
        let config = AgentConfig::default();

        assert_eq!(config.api.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.session.refresh_threshold, Duration::from_secs(300));
        assert_eq!(config.session.max_refresh_retries, 3);
        assert_eq!(config.session.idle_timeout, Duration::from_secs(1800));
        assert_eq!(config.session.warning_after(), Duration::from_secs(1500));
        assert_eq!(config.notifications.retention, chrono::Duration::days(30));
        assert_eq!(config.notifications.digest_day, Weekday::Sun);
        assert_eq!(config.storage.backend, StorageBackend::Sqlite);
    }

    #[test]
    fn backoff_is_exponential() {
        let session = SessionConfig::default();
        assert_eq!(session.backoff_for(1), Duration::from_secs(2));
        assert_eq!(session.backoff_for(2), Duration::from_secs(4));
        assert_eq!(session.backoff_for(3), Duration::from_secs(8));
    }

    #[test]
    fn category_defaults_from_config() {
        let mut raw = RawNotificationConfig::default();
        raw.categories.insert("weekly_digest".into(), false);
        raw.quiet_hours = Some(RawQuietHours {
            enabled: false,
            start: "23:00".into(),
            end: "06:30".into(),
        });

        let config = NotificationConfig::from_raw(raw);
        assert!(!config.defaults.is_enabled(AlertCategory::WeeklyDigest));
        assert!(config.defaults.is_enabled(AlertCategory::BillReminders));
        assert!(!config.defaults.quiet_hours.enabled);
        assert_eq!(config.defaults.quiet_hours.end.to_string(), "06:30");
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let api = ApiConfig::from_raw(RawApiConfig {
            base_url: Some("https://api.finguard.example/".into()),
            timeout_seconds: None,
        });
        assert_eq!(api.base_url, "https://api.finguard.example");
    }
}
