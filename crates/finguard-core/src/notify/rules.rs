//! Notification rules: backend data in, drafts out

use chrono::{DateTime, Datelike, Local};
use finguard_api::{
    AlertCategory, Notification, NotificationAction, NotificationKind, Presentation, Priority,
};
use finguard_backend::{Anomaly, Bill, BudgetCategory, GoalAchievement, MonthlySummary};
use finguard_config::NotificationConfig;
use finguard_util::NotificationId;
use serde_json::{Value, json};
use std::time::Duration;

/// Polled rules. Budget checks are event-driven and not listed here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Rule {
    Bills,
    Goals,
    WeeklySummary,
    Anomalies,
}

impl Rule {
    pub const POLLED: [Rule; 4] = [
        Rule::Bills,
        Rule::Goals,
        Rule::WeeklySummary,
        Rule::Anomalies,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Rule::Bills => "bills",
            Rule::Goals => "goals",
            Rule::WeeklySummary => "weekly_summary",
            Rule::Anomalies => "anomalies",
        }
    }

    pub fn category(&self) -> AlertCategory {
        match self {
            Rule::Bills => AlertCategory::BillReminders,
            Rule::Goals => AlertCategory::GoalCelebrations,
            Rule::WeeklySummary => AlertCategory::WeeklyDigest,
            Rule::Anomalies => AlertCategory::AnomalyDetection,
        }
    }

    pub fn interval(&self, config: &NotificationConfig) -> Duration {
        match self {
            Rule::Bills => config.bill_poll_interval,
            Rule::Goals => config.goal_poll_interval,
            Rule::WeeklySummary => config.digest_poll_interval,
            Rule::Anomalies => config.anomaly_poll_interval,
        }
    }
}

/// A notification before the engine stamps id, time and deferral on it
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationDraft {
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub priority: Priority,
    pub category: Option<String>,
    pub actions: Vec<NotificationAction>,
    pub dedupe_key: Option<String>,
    pub data: Option<Value>,
}

impl NotificationDraft {
    pub fn new(kind: NotificationKind, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            message: message.into(),
            priority: kind.default_priority(),
            category: None,
            actions: Vec::new(),
            dedupe_key: None,
            data: None,
        }
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn action(mut self, label: &str, action_id: &str) -> Self {
        self.actions.push(NotificationAction::new(label, action_id));
        self
    }

    pub fn dedupe_key(mut self, key: impl Into<String>) -> Self {
        self.dedupe_key = Some(key.into());
        self
    }

    pub fn data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn into_notification(
        self,
        created_at: DateTime<Local>,
        deferred_until: Option<DateTime<Local>>,
    ) -> Notification {
        let presentation = Presentation::for_notification(self.priority, self.kind);
        Notification {
            id: NotificationId::new(),
            kind: self.kind,
            title: self.title,
            message: self.message,
            priority: self.priority,
            category: self.category,
            created_at,
            read: false,
            dismissed: false,
            deferred_until,
            actions: self.actions,
            dedupe_key: self.dedupe_key,
            visual_class: presentation.visual_class,
            auto_dismiss_ms: presentation.auto_dismiss.as_millis() as u64,
            data: self.data,
        }
    }
}

/// Money with thousands grouping and at most two decimals: `12,500.5`
pub fn format_amount(amount: f64) -> String {
    let cents = (amount.abs() * 100.0).round() as u64;
    let whole = (cents / 100).to_string();
    let frac = cents % 100;

    let mut out = String::new();
    if amount < 0.0 && cents > 0 {
        out.push('-');
    }
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }

    match frac {
        0 => {}
        f if f % 10 == 0 => out.push_str(&format!(".{}", f / 10)),
        f => out.push_str(&format!(".{:02}", f)),
    }
    out
}

/// Plain number without trailing zeros: `50`, `62.5`
fn format_number(value: f64) -> String {
    let rounded = (value * 100.0).round() / 100.0;
    if rounded.fract() == 0.0 {
        format!("{}", rounded as i64)
    } else {
        format!("{}", rounded)
    }
}

/// Budget threshold check for one recorded expense. Only the highest
/// threshold reached is reported.
pub fn budget_alert(
    category: &str,
    amount: f64,
    budgets: &[BudgetCategory],
) -> Option<NotificationDraft> {
    let budget = budgets.iter().find(|b| b.category == category)?;
    if budget.budget_limit <= 0.0 {
        return None;
    }

    let new_total = budget.spent + amount;
    let percentage = new_total / budget.budget_limit * 100.0;
    let shown = percentage.round() as i64;
    let data = json!({
        "category": category,
        "spent": new_total,
        "budgetLimit": budget.budget_limit,
        "percentage": shown,
    });

    let draft = if percentage >= 100.0 {
        NotificationDraft::new(
            NotificationKind::BudgetExceeded,
            "Budget Exceeded!",
            format!(
                "You've exceeded your {} budget by Rs.{}",
                category,
                format_amount(new_total - budget.budget_limit)
            ),
        )
        .priority(Priority::Critical)
        .action("Review Spending", "open-category-details")
        .action("Adjust Budget", "edit-budget")
    } else if percentage >= 90.0 {
        NotificationDraft::new(
            NotificationKind::BudgetWarning,
            "Budget Warning",
            format!("You've used {}% of your {} budget", shown, category),
        )
        .priority(Priority::High)
    } else if percentage >= 75.0 {
        NotificationDraft::new(
            NotificationKind::BudgetWarning,
            "Budget Update",
            format!("{}% of {} budget used", shown, category),
        )
        .priority(Priority::Medium)
    } else {
        return None;
    };

    Some(draft.category(category).data(data))
}

/// Whole days until `due`, rounded up
pub fn days_until(due: &DateTime<Local>, now: &DateTime<Local>) -> i64 {
    let millis = (*due - *now).num_milliseconds();
    let day = 24 * 60 * 60 * 1000;
    millis.div_euclid(day) + i64::from(millis.rem_euclid(day) != 0)
}

pub fn bill_reminders(bills: &[Bill], now: &DateTime<Local>) -> Vec<NotificationDraft> {
    bills
        .iter()
        .filter_map(|bill| {
            let days = days_until(&bill.due_at()?, now);
            let amount = format_amount(bill.amount);

            let draft = match days {
                3 => NotificationDraft::new(
                    NotificationKind::BillDue,
                    "Bill Reminder",
                    format!("{} (Rs.{}) is due in 3 days", bill.name, amount),
                )
                .priority(Priority::High)
                .action("Pay Now", "pay-bill")
                .action("Set Reminder", "snooze-reminder"),
                1 => NotificationDraft::new(
                    NotificationKind::BillDue,
                    "Bill Due Tomorrow!",
                    format!("Don't forget: {} (Rs.{}) is due tomorrow", bill.name, amount),
                )
                .priority(Priority::Critical)
                .action("Pay Now", "pay-bill"),
                _ => return None,
            };

            Some(
                draft
                    .dedupe_key(format!("bill:{}:{}:{}", bill.id, bill.due_date, days))
                    .data(json!({
                        "billId": bill.id,
                        "amount": bill.amount,
                        "dueDate": bill.due_date,
                    })),
            )
        })
        .collect()
}

fn goal_completed(goal_id: &str, name: &str) -> NotificationDraft {
    NotificationDraft::new(
        NotificationKind::GoalAchieved,
        "Goal Achieved!",
        format!("Congratulations! You've completed your {} goal!", name),
    )
    .priority(Priority::Celebration)
    .action("Set New Goal", "create-goal")
    .action("Share Achievement", "share-goal")
    .dedupe_key(format!("goal:{}:complete", goal_id))
    .data(json!({ "goalId": goal_id }))
}

fn goal_milestone(goal_id: &str, name: &str, progress: f64, milestone: u32) -> NotificationDraft {
    NotificationDraft::new(
        NotificationKind::GoalMilestone,
        "Milestone Reached!",
        format!(
            "You're {}% of the way to your {} goal!",
            format_number(progress),
            name
        ),
    )
    .priority(Priority::Medium)
    .dedupe_key(format!("goal:{}:milestone:{}", goal_id, milestone))
    .data(json!({ "goalId": goal_id, "milestone": milestone }))
}

pub fn goal_notifications(goals: &[GoalAchievement]) -> Vec<NotificationDraft> {
    goals
        .iter()
        .filter_map(|goal| {
            let id = goal.id.to_string();
            if goal.just_completed {
                return Some(goal_completed(&id, &goal.name));
            }
            match goal.milestone_hit {
                Some(m) if m > 0 && m % 25 == 0 => {
                    Some(goal_milestone(&id, &goal.name, goal.progress, m))
                }
                _ => None,
            }
        })
        .collect()
}

/// Progress update for one goal: completion when 100% is crossed, else the
/// highest 25% milestone crossed
pub fn goal_progress(
    goal_id: &str,
    name: &str,
    previous: f64,
    progress: f64,
) -> Option<NotificationDraft> {
    if progress <= previous {
        return None;
    }
    if progress >= 100.0 {
        return (previous < 100.0).then(|| goal_completed(goal_id, name));
    }

    let milestone = ((progress / 25.0).floor() * 25.0) as u32;
    (milestone > 0 && f64::from(milestone) > previous)
        .then(|| goal_milestone(goal_id, name, progress, milestone))
}

pub fn anomaly_alerts(anomalies: &[Anomaly]) -> Vec<NotificationDraft> {
    anomalies
        .iter()
        .map(|anomaly| {
            let key = match &anomaly.id {
                Some(id) => format!("anomaly:{}", id),
                None => format!("anomaly:{}", anomaly.description),
            };

            let mut draft = NotificationDraft::new(
                NotificationKind::AnomalyDetected,
                "Unusual Spending Detected",
                anomaly.description.clone(),
            )
            .priority(Priority::Medium)
            .action("Review Transaction", "review-transaction")
            .action("Mark as Normal", "dismiss-anomaly")
            .dedupe_key(key);

            if let Ok(data) = serde_json::to_value(anomaly) {
                draft = draft.data(data);
            }
            if let Some(category) = &anomaly.category {
                draft = draft.category(category.clone());
            }
            draft
        })
        .collect()
}

/// Weekly digest from this month's totals
pub fn weekly_summary(
    summary: &MonthlySummary,
    budgets: &[BudgetCategory],
    now: &DateTime<Local>,
) -> NotificationDraft {
    let total_spent = summary.expenses;
    let total_budget: f64 = budgets.iter().map(|b| b.budget_limit).sum();
    let saved = (total_budget - total_spent).max(0.0);

    let top_category = budgets
        .iter()
        .fold(None::<&BudgetCategory>, |top, b| match top {
            Some(t) if b.spent <= t.spent => Some(t),
            _ if b.spent > 0.0 => Some(b),
            _ => top,
        })
        .map(|b| b.category.as_str())
        .unwrap_or("General");

    let outcome = if saved > 0.0 {
        format!("saved Rs.{} vs budget", format_amount(saved))
    } else {
        "exceeded budget".to_string()
    };

    let week = now.iso_week();
    NotificationDraft::new(
        NotificationKind::WeeklySummary,
        "Your Week in Finance",
        format!("Spent Rs.{}, {}", format_amount(total_spent), outcome),
    )
    .priority(Priority::Low)
    .action("View Full Report", "open-weekly-report")
    .dedupe_key(format!("weekly:{}-W{:02}", week.year(), week.week()))
    .data(json!({
        "totalSpent": total_spent,
        "savedVsBudget": saved,
        "topCategory": top_category,
        "budgetPerformance": if saved > 0.0 { "good" } else { "over" },
    }))
}

pub fn family_update(name: &str) -> NotificationDraft {
    NotificationDraft::new(
        NotificationKind::FamilyUpdate,
        "Family Member Added",
        format!("{} joined your family budget group!", name),
    )
    .priority(Priority::Medium)
}

pub fn achievement_unlocked(name: &str, description: &str) -> NotificationDraft {
    let message = if description.is_empty() {
        format!("You earned \"{}\"", name)
    } else {
        format!("You earned \"{}\" - {}", name, description)
    };

    NotificationDraft::new(NotificationKind::AchievementUnlock, "Achievement Unlocked!", message)
        .priority(Priority::Celebration)
        .data(json!({ "name": name, "description": description }))
}
