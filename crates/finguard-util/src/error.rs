//! Session error taxonomy

use thiserror::Error;

/// Errors that cross component boundaries in the session agent.
///
/// Only the session-ending variants ever propagate to the UI, and they do so
/// as a session-expired broadcast rather than as a returned error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Timeouts, 5xx, 429 and network failures
    #[error("Transient failure: {0}")]
    Transient(String),

    /// The backend rejected the refresh credential
    #[error("Refresh credential rejected: {0}")]
    FatalAuth(String),

    #[error("No refresh token available")]
    MissingRefreshToken,

    #[error("Credential renewal failed after {attempts} attempts: {last_error}")]
    RenewalExhausted { attempts: u32, last_error: String },

    /// The session ended or was replaced while a renewal was in flight
    #[error("Credential renewal abandoned")]
    RenewalAbandoned,

    #[error("No active credential")]
    NoCredential,

    #[error("Credential expired")]
    CredentialExpired,

    #[error("Rule poll '{rule}' failed: {message}")]
    RulePoll { rule: String, message: String },

    #[error("Settings could not be persisted: {0}")]
    SettingsPersistence(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SessionError {
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn fatal_auth(msg: impl Into<String>) -> Self {
        Self::FatalAuth(msg.into())
    }

    pub fn rule_poll(rule: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::RulePoll {
            rule: rule.into(),
            message: msg.into(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether another attempt may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Whether this error ends the session
    pub fn ends_session(&self) -> bool {
        matches!(
            self,
            Self::FatalAuth(_)
                | Self::MissingRefreshToken
                | Self::RenewalExhausted { .. }
                | Self::CredentialExpired
        )
    }
}

pub type SessionResult<T> = std::result::Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_is_retryable() {
        assert!(SessionError::transient("timeout").is_retryable());
        assert!(!SessionError::fatal_auth("invalid").is_retryable());
        assert!(!SessionError::MissingRefreshToken.is_retryable());
        assert!(!SessionError::rule_poll("bills", "500").is_retryable());
    }

    #[test]
    fn session_ending_errors() {
        assert!(SessionError::fatal_auth("invalid").ends_session());
        assert!(SessionError::MissingRefreshToken.ends_session());
        assert!(
            SessionError::RenewalExhausted {
                attempts: 3,
                last_error: "500".into()
            }
            .ends_session()
        );
        assert!(!SessionError::transient("timeout").ends_session());
        assert!(!SessionError::SettingsPersistence("disk full".into()).ends_session());
        assert!(!SessionError::RenewalAbandoned.ends_session());
    }
}
