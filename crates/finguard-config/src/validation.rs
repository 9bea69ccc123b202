//! Configuration validation

use crate::schema::{RawConfig, RawQuietHours};
use chrono::Weekday;
use finguard_api::AlertCategory;
use finguard_util::WallClock;
use thiserror::Error;

/// Validation error
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("Invalid base URL '{0}': must start with http:// or https://")]
    InvalidBaseUrl(String),

    #[error("Invalid time format '{value}': {message}")]
    InvalidTimeFormat { value: String, message: String },

    #[error("Invalid day specification: {0}")]
    InvalidDaySpec(String),

    #[error("Unknown notification category: {0}")]
    UnknownCategory(String),

    #[error("'{field}' must be greater than zero")]
    ZeroValue { field: &'static str },

    #[error("Warning lead {warning_lead}s must be shorter than idle timeout {idle_timeout}s")]
    WarningExceedsIdleTimeout { warning_lead: u64, idle_timeout: u64 },

    #[error("Unknown storage backend '{0}': expected 'sqlite' or 'memory'")]
    UnknownStorageBackend(String),
}

/// Validate a raw configuration
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if let Some(url) = &config.api.base_url
        && !(url.starts_with("http://") || url.starts_with("https://"))
    {
        errors.push(ValidationError::InvalidBaseUrl(url.clone()));
    }

    let session = &config.session;
    let positive_fields = [
        ("api.timeout_seconds", config.api.timeout_seconds),
        ("session.refresh_threshold_seconds", session.refresh_threshold_seconds),
        ("session.max_refresh_retries", session.max_refresh_retries.map(u64::from)),
        ("session.retry_backoff_base_seconds", session.retry_backoff_base_seconds),
        ("session.idle_timeout_seconds", session.idle_timeout_seconds),
        ("session.warning_lead_seconds", session.warning_lead_seconds),
        ("session.countdown_tick_ms", session.countdown_tick_ms),
        ("session.heartbeat_seconds", session.heartbeat_seconds),
        ("notifications.bill_poll_seconds", config.notifications.bill_poll_seconds),
        ("notifications.goal_poll_seconds", config.notifications.goal_poll_seconds),
        ("notifications.digest_poll_seconds", config.notifications.digest_poll_seconds),
        ("notifications.anomaly_poll_seconds", config.notifications.anomaly_poll_seconds),
        (
            "notifications.retention_days",
            config.notifications.retention_days.map(u64::from),
        ),
    ];
    for (field, value) in positive_fields {
        if value == Some(0) {
            errors.push(ValidationError::ZeroValue { field });
        }
    }

    let idle_timeout = session
        .idle_timeout_seconds
        .unwrap_or(crate::DEFAULT_IDLE_TIMEOUT_SECS);
    let warning_lead = session
        .warning_lead_seconds
        .unwrap_or(crate::DEFAULT_WARNING_LEAD_SECS);
    if warning_lead >= idle_timeout {
        errors.push(ValidationError::WarningExceedsIdleTimeout {
            warning_lead,
            idle_timeout,
        });
    }

    if let Some(day) = &config.notifications.digest_day
        && let Err(e) = parse_weekday(day)
    {
        errors.push(ValidationError::InvalidDaySpec(e));
    }

    for name in config.notifications.categories.keys() {
        if AlertCategory::parse(name).is_none() {
            errors.push(ValidationError::UnknownCategory(name.clone()));
        }
    }

    if let Some(quiet) = &config.notifications.quiet_hours {
        errors.extend(validate_quiet_hours(quiet));
    }

    if let Some(backend) = &config.storage.backend
        && !matches!(backend.as_str(), "sqlite" | "memory")
    {
        errors.push(ValidationError::UnknownStorageBackend(backend.clone()));
    }

    errors
}

fn validate_quiet_hours(quiet: &RawQuietHours) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    for value in [&quiet.start, &quiet.end] {
        if let Err(message) = parse_time(value) {
            errors.push(ValidationError::InvalidTimeFormat {
                value: value.clone(),
                message,
            });
        }
    }

    errors
}

/// Parse HH:MM time format
pub fn parse_time(s: &str) -> Result<WallClock, String> {
    s.parse()
}

/// Parse a day-of-week name ("sun", "sunday", case-insensitive)
pub fn parse_weekday(s: &str) -> Result<Weekday, String> {
    match s.to_lowercase().as_str() {
        "mon" | "monday" => Ok(Weekday::Mon),
        "tue" | "tuesday" => Ok(Weekday::Tue),
        "wed" | "wednesday" => Ok(Weekday::Wed),
        "thu" | "thursday" => Ok(Weekday::Thu),
        "fri" | "friday" => Ok(Weekday::Fri),
        "sat" | "saturday" => Ok(Weekday::Sat),
        "sun" | "sunday" => Ok(Weekday::Sun),
        other => Err(format!("Unknown day: {}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(toml_str: &str) -> RawConfig {
        toml::from_str(toml_str).unwrap()
    }

    #[test]
    fn test_parse_time() {
        assert_eq!(parse_time("14:30").unwrap(), WallClock::new(14, 30).unwrap());
        assert_eq!(parse_time("00:00").unwrap(), WallClock::new(0, 0).unwrap());

        assert!(parse_time("24:00").is_err());
        assert!(parse_time("12:60").is_err());
        assert!(parse_time("invalid").is_err());
    }

    #[test]
    fn test_parse_weekday() {
        assert_eq!(parse_weekday("Sunday").unwrap(), Weekday::Sun);
        assert_eq!(parse_weekday("wed").unwrap(), Weekday::Wed);
        assert!(parse_weekday("someday").is_err());
    }

    #[test]
    fn defaults_are_valid() {
        assert!(validate_config(&raw("config_version = 1")).is_empty());
    }

    #[test]
    fn rejects_warning_longer_than_idle_timeout() {
        let config = raw(
            r#"
            config_version = 1
            [session]
            idle_timeout_seconds = 600
            warning_lead_seconds = 600
            "#,
        );

        let errors = validate_config(&config);
        assert!(errors.iter().any(|e| matches!(
            e,
            ValidationError::WarningExceedsIdleTimeout {
                warning_lead: 600,
                idle_timeout: 600
            }
        )));
    }

    #[test]
    fn collects_every_error() {
        let config = raw(
            r#"
            config_version = 1
            [api]
            base_url = "localhost:5000"
            [session]
            max_refresh_retries = 0
            [notifications]
            digest_day = "funday"
            [notifications.categories]
            lottery_alerts = true
            [notifications.quiet_hours]
            start = "25:00"
            end = "07:00"
            [storage]
            backend = "cookies"
            "#,
        );

        let errors = validate_config(&config);
        assert_eq!(errors.len(), 6, "{:?}", errors);
        assert!(errors.iter().any(|e| matches!(e, ValidationError::InvalidBaseUrl(_))));
        assert!(errors.iter().any(|e| matches!(
            e,
            ValidationError::ZeroValue {
                field: "session.max_refresh_retries"
            }
        )));
        assert!(errors.iter().any(|e| matches!(e, ValidationError::InvalidDaySpec(_))));
        assert!(errors.iter().any(|e| matches!(e, ValidationError::UnknownCategory(_))));
        assert!(errors.iter().any(|e| matches!(e, ValidationError::InvalidTimeFormat { .. })));
        assert!(errors.iter().any(|e| matches!(e, ValidationError::UnknownStorageBackend(_))));
    }
}
