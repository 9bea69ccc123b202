//! Audit event types

use chrono::{DateTime, Local};
use finguard_api::SessionEndReason;
use serde::{Deserialize, Serialize};

/// Types of audit events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEventType {
    /// Agent process started
    AgentStarted,

    /// Agent process stopped
    AgentStopped,

    /// A token pair was installed by login
    LoggedIn { expires_at: Option<DateTime<Local>> },

    /// The credential was renewed
    CredentialRenewed {
        expires_at: DateTime<Local>,
        attempts: u32,
    },

    /// The session ended without the user asking for it
    SessionExpired { reason: SessionEndReason },

    /// Explicit logout
    LoggedOut,

    /// Idle warning shown
    IdleWarning,

    /// User chose to stay signed in
    IdleExtended,

    /// Notification settings changed
    SettingsUpdated,
}

/// Full audit event with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event ID
    pub id: i64,

    /// Event timestamp
    pub timestamp: DateTime<Local>,

    /// Event type and details
    pub event: AuditEventType,
}

impl AuditEvent {
    pub fn new(event: AuditEventType) -> Self {
        Self {
            id: 0, // Will be set by store
            timestamp: finguard_util::now(),
            event,
        }
    }
}
