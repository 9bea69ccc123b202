//! Commands accepted from the UI

use finguard_util::NotificationId;
use serde::{Deserialize, Serialize};

use crate::{ActivityKind, NotificationSettings, TokenPair};

/// Domain events raised elsewhere in the application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    ExpenseRecorded {
        amount: f64,
        category: String,
    },
    GoalProgressUpdated {
        goal_id: String,
        name: String,
        #[serde(default)]
        previous_progress: f64,
        progress: f64,
    },
    AchievementUnlocked {
        name: String,
        #[serde(default)]
        description: String,
    },
    FamilyMemberAdded {
        name: String,
    },
}

/// All commands the agent understands
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    /// Start a session with a freshly issued token pair
    Login {
        #[serde(flatten)]
        tokens: TokenPair,
    },

    Logout,

    /// Qualifying user interaction
    Activity { kind: ActivityKind },

    /// Explicit "stay signed in" from the idle prompt
    Extend,

    /// Application window regained focus
    Focus,

    Domain { event: DomainEvent },

    MarkRead { id: NotificationId },

    MarkAllRead,

    Dismiss { id: NotificationId },

    DismissAll,

    ClearAll,

    Action {
        id: NotificationId,
        action_id: String,
    },

    GetNotifications {
        #[serde(default)]
        limit: Option<usize>,
        #[serde(default)]
        unread_only: bool,
    },

    GetStats,

    GetSettings,

    UpdateSettings { settings: NotificationSettings },

    GetIdleWindow,

    GetSessionStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_login() {
        let json = r#"{"command":"login","access_token":"a.b.c","refresh_token":"r"}"#;
        let command: Command = serde_json::from_str(json).unwrap();

        assert_eq!(
            command,
            Command::Login {
                tokens: TokenPair::new("a.b.c", Some("r".into()))
            }
        );
    }

    #[test]
    fn parse_domain_event() {
        let json = r#"{"command":"domain","event":{"type":"expense_recorded","amount":120.5,"category":"Food"}}"#;
        let command: Command = serde_json::from_str(json).unwrap();

        assert!(matches!(
            command,
            Command::Domain {
                event: DomainEvent::ExpenseRecorded { ref category, .. }
            } if category == "Food"
        ));
    }

    #[test]
    fn parse_queries_with_defaults() {
        let command: Command = serde_json::from_str(r#"{"command":"get_notifications"}"#).unwrap();
        assert_eq!(
            command,
            Command::GetNotifications {
                limit: None,
                unread_only: false
            }
        );

        let command: Command =
            serde_json::from_str(r#"{"command":"activity","kind":"pointer"}"#).unwrap();
        assert_eq!(
            command,
            Command::Activity {
                kind: ActivityKind::Pointer
            }
        );
    }
}
