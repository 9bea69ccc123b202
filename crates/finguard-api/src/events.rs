//! Events published by the session components

use chrono::{DateTime, Local};
use finguard_util::NotificationId;
use serde::{Deserialize, Serialize};

use crate::{
    IdleWindowState, Notification, NotificationSettings, NotificationStats, SessionEndReason,
    SessionStats, API_VERSION,
};

/// Credential lifecycle events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CredentialEvent {
    /// A new credential replaced the old one
    Renewed { expires_at: DateTime<Local> },

    /// Heartbeat found the credential inside the renewal threshold.
    /// Published at most once per session.
    ExpiringSoon { remaining_ms: u64 },

    /// The session ended without the user asking for it
    SessionExpired { reason: SessionEndReason },

    /// The user logged out
    LoggedOut,
}

/// Idle monitor events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IdleEvent {
    /// Warning entered; the UI should show the extend-or-ignore prompt
    WarningStarted { remaining_ms: u64 },

    /// One countdown tick while in warning
    Countdown { remaining_ms: u64, display: String },

    /// The user extended the session
    Extended,

    /// The countdown ran out
    Expired,
}

/// Notification engine events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationEvent {
    /// A notification was created. `immediate` is false when quiet hours
    /// deferred it.
    Added {
        notification: Notification,
        immediate: bool,
    },

    /// A notification was read, dismissed or acted on
    Updated { notification: Notification },

    /// Every notification was marked read
    AllRead { count: usize },

    /// Notifications were dismissed in bulk or history was wiped
    Cleared,

    /// A toast became visible
    ToastShown {
        id: NotificationId,
        auto_dismiss_ms: u64,
    },

    /// A toast was hidden (auto-dismiss or dismissal)
    ToastHidden { id: NotificationId },
}

/// Event envelope written to subscribers outside the process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub api_version: u32,
    pub timestamp: DateTime<Local>,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            api_version: API_VERSION,
            timestamp: finguard_util::now(),
            payload,
        }
    }
}

/// Everything the agent can report
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "channel", content = "event", rename_all = "snake_case")]
pub enum EventPayload {
    Credential(CredentialEvent),

    Idle(IdleEvent),

    Notification(NotificationEvent),

    /// Reply to a notification listing query
    Notifications { items: Vec<Notification> },

    /// Reply to a stats query
    Stats(NotificationStats),

    /// Current settings (reply to a query or after an update)
    Settings(NotificationSettings),

    /// Current idle window (reply to a query)
    IdleWindow(IdleWindowState),

    /// Session timing (reply to a query)
    SessionStats(SessionStats),

    /// A notification action the UI should carry out
    ActionRequested {
        notification: Notification,
        action_id: String,
    },

    /// A command could not be handled
    Error { message: String },

    /// The agent is shutting down
    Shutdown,
}
