//! Shared types for the session agent API

use chrono::{DateTime, Local};
use finguard_util::{DailyWindow, NotificationId, WallClock};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Access/refresh token pair as issued by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl TokenPair {
    pub fn new(access_token: impl Into<String>, refresh_token: Option<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
        }
    }
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEndReason {
    /// Every renewal attempt failed with a retryable error
    RenewalExhausted,
    /// The backend rejected the refresh token
    RefreshRejected,
    /// No refresh token was available to renew with
    MissingRefreshToken,
    /// The credential was found expired (e.g. on window refocus)
    CredentialExpired,
    /// The idle countdown ran out
    IdleTimeout,
}

/// Notification priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Info,
    Positive,
    Medium,
    High,
    Critical,
    Celebration,
}

impl Priority {
    /// Critical notifications bypass quiet hours
    pub fn is_critical(&self) -> bool {
        matches!(self, Priority::Critical)
    }
}

/// User-toggleable rule categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertCategory {
    BudgetAlerts,
    GoalCelebrations,
    BillReminders,
    WeeklyDigest,
    AnomalyDetection,
    FamilyUpdates,
    AchievementNotifications,
}

impl AlertCategory {
    pub const ALL: [AlertCategory; 7] = [
        AlertCategory::BudgetAlerts,
        AlertCategory::GoalCelebrations,
        AlertCategory::BillReminders,
        AlertCategory::WeeklyDigest,
        AlertCategory::AnomalyDetection,
        AlertCategory::FamilyUpdates,
        AlertCategory::AchievementNotifications,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertCategory::BudgetAlerts => "budget_alerts",
            AlertCategory::GoalCelebrations => "goal_celebrations",
            AlertCategory::BillReminders => "bill_reminders",
            AlertCategory::WeeklyDigest => "weekly_digest",
            AlertCategory::AnomalyDetection => "anomaly_detection",
            AlertCategory::FamilyUpdates => "family_updates",
            AlertCategory::AchievementNotifications => "achievement_notifications",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == s)
    }
}

/// Notification type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    BudgetWarning,
    BudgetExceeded,
    GoalAchieved,
    GoalMilestone,
    BillDue,
    SavingsStreak,
    SpendingPattern,
    FamilyUpdate,
    AchievementUnlock,
    AnomalyDetected,
    WeeklySummary,
    MonthlyReport,
}

impl NotificationKind {
    pub fn default_priority(&self) -> Priority {
        match self {
            NotificationKind::BudgetWarning => Priority::High,
            NotificationKind::BudgetExceeded => Priority::Critical,
            NotificationKind::GoalAchieved => Priority::Celebration,
            NotificationKind::GoalMilestone => Priority::Medium,
            NotificationKind::BillDue => Priority::High,
            NotificationKind::SavingsStreak => Priority::Positive,
            NotificationKind::SpendingPattern => Priority::Info,
            NotificationKind::FamilyUpdate => Priority::Medium,
            NotificationKind::AchievementUnlock => Priority::Celebration,
            NotificationKind::AnomalyDetected => Priority::Medium,
            NotificationKind::WeeklySummary => Priority::Low,
            NotificationKind::MonthlyReport => Priority::Medium,
        }
    }

    pub fn is_celebratory(&self) -> bool {
        matches!(
            self,
            NotificationKind::GoalAchieved
                | NotificationKind::AchievementUnlock
                | NotificationKind::FamilyUpdate
        )
    }

    /// Settings category that suppresses this kind, if any
    pub fn category(&self) -> Option<AlertCategory> {
        match self {
            NotificationKind::BudgetWarning | NotificationKind::BudgetExceeded => {
                Some(AlertCategory::BudgetAlerts)
            }
            NotificationKind::GoalAchieved | NotificationKind::GoalMilestone => {
                Some(AlertCategory::GoalCelebrations)
            }
            NotificationKind::BillDue => Some(AlertCategory::BillReminders),
            NotificationKind::WeeklySummary => Some(AlertCategory::WeeklyDigest),
            NotificationKind::AnomalyDetected => Some(AlertCategory::AnomalyDetection),
            NotificationKind::FamilyUpdate => Some(AlertCategory::FamilyUpdates),
            NotificationKind::AchievementUnlock => Some(AlertCategory::AchievementNotifications),
            NotificationKind::SavingsStreak
            | NotificationKind::SpendingPattern
            | NotificationKind::MonthlyReport => None,
        }
    }
}

/// How the UI should style a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisualClass {
    Critical,
    Celebration,
    Warning,
    Standard,
    Subtle,
}

/// Presentation fixed at creation time from priority and kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Presentation {
    pub visual_class: VisualClass,
    pub auto_dismiss: Duration,
}

impl Presentation {
    pub const CRITICAL_TIMEOUT: Duration = Duration::from_secs(10);
    pub const CELEBRATION_TIMEOUT: Duration = Duration::from_secs(8);
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    pub fn for_notification(priority: Priority, kind: NotificationKind) -> Self {
        let celebratory = kind.is_celebratory() || priority == Priority::Celebration;

        let visual_class = match priority {
            Priority::Critical => VisualClass::Critical,
            _ if celebratory => VisualClass::Celebration,
            Priority::High => VisualClass::Warning,
            Priority::Low | Priority::Info => VisualClass::Subtle,
            _ => VisualClass::Standard,
        };

        let auto_dismiss = if priority.is_critical() {
            Self::CRITICAL_TIMEOUT
        } else if celebratory {
            Self::CELEBRATION_TIMEOUT
        } else {
            Self::DEFAULT_TIMEOUT
        };

        Self {
            visual_class,
            auto_dismiss,
        }
    }
}

/// A button attached to a notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
    pub label: String,
    pub action_id: String,
}

impl NotificationAction {
    pub fn new(label: impl Into<String>, action_id: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            action_id: action_id.into(),
        }
    }
}

/// A notification record as kept in history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub priority: Priority,
    /// Spending category the notification refers to, if any
    #[serde(default)]
    pub category: Option<String>,
    pub created_at: DateTime<Local>,
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub dismissed: bool,
    #[serde(default)]
    pub deferred_until: Option<DateTime<Local>>,
    #[serde(default)]
    pub actions: Vec<NotificationAction>,
    /// Idempotency key for polled rules
    #[serde(default)]
    pub dedupe_key: Option<String>,
    pub visual_class: VisualClass,
    pub auto_dismiss_ms: u64,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

impl Notification {
    pub fn auto_dismiss(&self) -> Duration {
        Duration::from_millis(self.auto_dismiss_ms)
    }

    /// Whether the notification is still held back by quiet hours at `now`
    pub fn is_deferred_at(&self, now: &DateTime<Local>) -> bool {
        self.deferred_until.is_some_and(|until| until > *now)
    }

    pub fn has_action(&self, action_id: &str) -> bool {
        self.actions.iter().any(|a| a.action_id == action_id)
    }
}

/// Quiet-hours configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuietHours {
    pub enabled: bool,
    pub start: WallClock,
    pub end: WallClock,
}

impl QuietHours {
    /// The active window, if quiet hours are enabled
    pub fn window(&self) -> Option<DailyWindow> {
        self.enabled.then(|| DailyWindow::new(self.start, self.end))
    }

    pub fn contains(&self, dt: &DateTime<Local>) -> bool {
        self.window().is_some_and(|w| w.contains(dt))
    }
}

impl Default for QuietHours {
    fn default() -> Self {
        Self {
            enabled: true,
            start: WallClock { hour: 22, minute: 0 },
            end: WallClock { hour: 7, minute: 0 },
        }
    }
}

/// Per-user notification preferences
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationSettings {
    /// Missing categories are treated as enabled
    #[serde(default)]
    pub categories: BTreeMap<AlertCategory, bool>,
    #[serde(default)]
    pub quiet_hours: QuietHours,
}

impl NotificationSettings {
    pub fn is_enabled(&self, category: AlertCategory) -> bool {
        self.categories.get(&category).copied().unwrap_or(true)
    }

    pub fn set_enabled(&mut self, category: AlertCategory, enabled: bool) {
        self.categories.insert(category, enabled);
    }
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            categories: AlertCategory::ALL.into_iter().map(|c| (c, true)).collect(),
            quiet_hours: QuietHours::default(),
        }
    }
}

/// Aggregate counters over notification history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationStats {
    pub total: usize,
    pub unread: usize,
    pub read: usize,
    pub by_kind: BTreeMap<NotificationKind, usize>,
    pub last_notification: Option<DateTime<Local>>,
}

/// Idle monitor state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdleState {
    /// No session (before login or after logout)
    Stopped,
    Active,
    Warning,
    /// Terminal until the next login
    Expired,
}

/// Snapshot of the idle timers for the UI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdleWindowState {
    pub state: IdleState,
    pub warning_armed: bool,
    pub logout_armed: bool,
    pub remaining_ms: u64,
}

/// Session timing for a status display. Timestamps are None outside a
/// session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    pub active: bool,
    pub started_at: Option<DateTime<Local>>,
    pub last_activity_at: Option<DateTime<Local>>,
    pub session_duration_ms: u64,
    pub since_activity_ms: u64,
    /// Zero once the warning is showing
    pub until_warning_ms: u64,
    pub until_logout_ms: u64,
}

impl SessionStats {
    pub fn inactive() -> Self {
        Self {
            active: false,
            started_at: None,
            last_activity_at: None,
            session_duration_ms: 0,
            since_activity_ms: 0,
            until_warning_ms: 0,
            until_logout_ms: 0,
        }
    }
}

/// Qualifying user interaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Pointer,
    Key,
    Scroll,
    Touch,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn presentation_timeouts() {
        let critical = Presentation::for_notification(Priority::Critical, NotificationKind::BillDue);
        assert_eq!(critical.visual_class, VisualClass::Critical);
        assert_eq!(critical.auto_dismiss, Duration::from_secs(10));

        let goal = Presentation::for_notification(Priority::Celebration, NotificationKind::GoalAchieved);
        assert_eq!(goal.visual_class, VisualClass::Celebration);
        assert_eq!(goal.auto_dismiss, Duration::from_secs(8));

        // Family updates are medium but celebratory
        let family = Presentation::for_notification(Priority::Medium, NotificationKind::FamilyUpdate);
        assert_eq!(family.visual_class, VisualClass::Celebration);
        assert_eq!(family.auto_dismiss, Duration::from_secs(8));

        let budget = Presentation::for_notification(Priority::Medium, NotificationKind::BudgetWarning);
        assert_eq!(budget.visual_class, VisualClass::Standard);
        assert_eq!(budget.auto_dismiss, Duration::from_secs(5));

        let warning = Presentation::for_notification(Priority::High, NotificationKind::BudgetWarning);
        assert_eq!(warning.visual_class, VisualClass::Warning);

        let digest = Presentation::for_notification(Priority::Low, NotificationKind::WeeklySummary);
        assert_eq!(digest.visual_class, VisualClass::Subtle);
    }

    #[test]
    fn settings_default_enable_everything() {
        let settings = NotificationSettings::default();
        for category in AlertCategory::ALL {
            assert!(settings.is_enabled(category));
        }
        assert!(settings.quiet_hours.enabled);
        assert_eq!(settings.quiet_hours.start.to_string(), "22:00");
        assert_eq!(settings.quiet_hours.end.to_string(), "07:00");
    }

    #[test]
    fn missing_category_defaults_to_enabled() {
        let json = r#"{ "categories": { "bill_reminders": false } }"#;
        let settings: NotificationSettings = serde_json::from_str(json).unwrap();

        assert!(!settings.is_enabled(AlertCategory::BillReminders));
        assert!(settings.is_enabled(AlertCategory::BudgetAlerts));
        assert_eq!(settings.quiet_hours, QuietHours::default());
    }

    #[test]
    fn quiet_hours_disabled_never_contains() {
        let quiet = QuietHours {
            enabled: false,
            ..QuietHours::default()
        };
        let late = Local.with_ymd_and_hms(2025, 12, 29, 23, 0, 0).unwrap();
        assert!(!quiet.contains(&late));
        assert!(QuietHours::default().contains(&late));
    }

    #[test]
    fn kind_serializes_like_wire_type() {
        let json = serde_json::to_string(&NotificationKind::BudgetExceeded).unwrap();
        assert_eq!(json, "\"BUDGET_EXCEEDED\"");
        assert_eq!(
            NotificationKind::AnomalyDetected.category(),
            Some(AlertCategory::AnomalyDetection)
        );
        assert_eq!(NotificationKind::SpendingPattern.category(), None);
    }

    #[test]
    fn category_names_round_trip() {
        for category in AlertCategory::ALL {
            assert_eq!(AlertCategory::parse(category.as_str()), Some(category));
        }
        assert_eq!(AlertCategory::parse("nope"), None);
    }
}
