//! Notification engine
//!
//! Owns notification history, user settings and the toast queue. Polled
//! rules are driven by [`NotificationEngine::tick`]; the caller runs the
//! returned rules with [`NotificationEngine::poll`] using a live access
//! token.

use chrono::{DateTime, Datelike, Local};
use finguard_api::{
    AlertCategory, DomainEvent, Notification, NotificationEvent, NotificationSettings,
    NotificationStats,
};
use finguard_backend::{BackendResult, FinanceApi};
use finguard_config::NotificationConfig;
use finguard_store::{AuditEvent, AuditEventType, Store};
use finguard_util::{MonotonicInstant, NotificationId, SessionError, SessionResult};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

use super::rules::{self, NotificationDraft, Rule};
use crate::{EventBus, TimerRegistry};

/// Default page size for [`NotificationEngine::notifications`]
pub const DEFAULT_PAGE_SIZE: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EngineTimer {
    Poll(Rule),
    /// Auto-dismiss for a visible toast
    Toast(NotificationId),
}

struct Inner {
    /// Newest first
    history: Vec<Notification>,
    settings: NotificationSettings,
    timers: TimerRegistry<EngineTimer>,
    /// Visible toasts, oldest first
    toasts: Vec<NotificationId>,
    /// Held back by quiet hours, waiting for their window to end
    deferred: Vec<NotificationId>,
    running: bool,
}

impl Inner {
    fn find_mut(&mut self, id: &NotificationId) -> Option<&mut Notification> {
        self.history.iter_mut().find(|n| n.id == *id)
    }

    fn hide_toast(&mut self, id: &NotificationId) -> bool {
        self.timers.cancel(&EngineTimer::Toast(*id));
        let before = self.toasts.len();
        self.toasts.retain(|t| t != id);
        before != self.toasts.len()
    }
}

pub struct NotificationEngine {
    api: FinanceApi,
    store: Arc<dyn Store>,
    config: NotificationConfig,
    inner: Mutex<Inner>,
    events: EventBus<NotificationEvent>,
}

impl NotificationEngine {
    pub fn new(api: FinanceApi, store: Arc<dyn Store>, config: NotificationConfig) -> Self {
        let settings = config.defaults.clone();
        Self {
            api,
            store,
            config,
            inner: Mutex::new(Inner {
                history: Vec::new(),
                settings,
                timers: TimerRegistry::new(),
                toasts: Vec::new(),
                deferred: Vec::new(),
                running: false,
            }),
            events: EventBus::default(),
        }
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn events(&self) -> &EventBus<NotificationEvent> {
        &self.events
    }

    /// Load settings and history from the store, dropping history past the
    /// retention window. Returns how many records were pruned.
    pub fn load(&self, now: DateTime<Local>) -> usize {
        let settings = match self.store.load_settings() {
            Ok(Some(settings)) => Some(settings),
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "Failed to load notification settings; using defaults");
                None
            }
        };
        let history = self.store.load_notifications().unwrap_or_else(|e| {
            warn!(error = %e, "Failed to load notification history");
            Vec::new()
        });

        let mut inner = self.inner();
        if let Some(settings) = settings {
            inner.settings = settings;
        }

        let cutoff = now - self.config.retention;
        let loaded = history.len();
        inner.history = history;
        inner.history.retain(|n| n.created_at > cutoff);
        inner.deferred = pending_release(&inner.history, &now);

        let pruned = loaded - inner.history.len();
        if pruned > 0 {
            self.persist(&inner);
        }
        info!(
            retained = inner.history.len(),
            pruned,
            deferred = inner.deferred.len(),
            "Notification history loaded"
        );
        pruned
    }

    fn persist(&self, inner: &Inner) {
        if let Err(e) = self.store.save_notifications(&inner.history) {
            warn!(error = %e, "Failed to persist notification history");
        }
    }

    /// Arm the rule polls for a new session and pick up notifications
    /// still held by quiet hours
    pub fn start(&self, now: DateTime<Local>, now_mono: MonotonicInstant) {
        let mut inner = self.inner();
        inner.running = true;
        inner.deferred = pending_release(&inner.history, &now);
        for rule in Rule::POLLED {
            inner
                .timers
                .arm_interval(EngineTimer::Poll(rule), now_mono, rule.interval(&self.config));
        }
        debug!("Notification rules armed");
    }

    /// Cancel polls, hide toasts and stop releasing deferred
    /// notifications. History is kept.
    pub fn stop(&self) {
        let mut inner = self.inner();
        inner.running = false;
        let cancelled = inner.timers.cancel_all();
        inner.toasts.clear();
        inner.deferred.clear();
        debug!(cancelled, "Notification engine stopped");
    }

    pub fn is_running(&self) -> bool {
        self.inner().running
    }

    pub fn armed_timers(&self) -> usize {
        self.inner().timers.len()
    }

    /// Fire due timers: hide expired toasts, release notifications whose
    /// quiet hours ended, and return the rules due for a poll.
    pub fn tick(&self, now: DateTime<Local>, now_mono: MonotonicInstant) -> Vec<Rule> {
        let mut events = Vec::new();
        let mut due_rules = Vec::new();
        {
            let mut inner = self.inner();

            for timer in inner.timers.take_due(now_mono) {
                match timer {
                    EngineTimer::Poll(rule) => {
                        if inner.running {
                            due_rules.push(rule);
                        }
                    }
                    EngineTimer::Toast(id) => {
                        if inner.hide_toast(&id) {
                            events.push(NotificationEvent::ToastHidden { id });
                        }
                    }
                }
            }

            let deferred = std::mem::take(&mut inner.deferred);
            for id in deferred {
                let Some(n) = inner.history.iter().find(|n| n.id == id) else {
                    continue;
                };
                if n.dismissed {
                    continue;
                }
                if n.is_deferred_at(&now) {
                    inner.deferred.push(id);
                    continue;
                }
                let auto_dismiss = n.auto_dismiss();
                debug!(%id, "Releasing notification after quiet hours");
                inner.toasts.push(id);
                inner.timers.arm(EngineTimer::Toast(id), now_mono, auto_dismiss);
                events.push(NotificationEvent::ToastShown {
                    id,
                    auto_dismiss_ms: auto_dismiss.as_millis() as u64,
                });
            }
        }

        for event in events {
            self.events.publish(event);
        }
        due_rules
    }

    /// Run one polled rule. Failures are logged and yield nothing.
    pub async fn poll(&self, rule: Rule, token: &str, now: DateTime<Local>) -> usize {
        if !self.settings().is_enabled(rule.category()) {
            debug!(rule = rule.name(), "Rule disabled in settings");
            return 0;
        }
        if rule == Rule::WeeklySummary && now.weekday() != self.config.digest_day {
            return 0;
        }

        let drafts = match self.fetch(rule, token, now).await {
            Ok(drafts) => drafts,
            Err(e) => {
                let error = SessionError::rule_poll(rule.name(), e.to_string());
                warn!(rule = rule.name(), error = %error, "Rule poll failed");
                return 0;
            }
        };

        if !self.is_running() {
            debug!(rule = rule.name(), "Session ended during poll; dropping results");
            return 0;
        }

        let delivered = drafts
            .into_iter()
            .filter_map(|draft| self.deliver(draft, now))
            .count();
        debug!(rule = rule.name(), delivered, "Rule poll complete");
        delivered
    }

    async fn fetch(
        &self,
        rule: Rule,
        token: &str,
        now: DateTime<Local>,
    ) -> BackendResult<Vec<NotificationDraft>> {
        Ok(match rule {
            Rule::Bills => rules::bill_reminders(&self.api.upcoming_bills(token).await?, &now),
            Rule::Goals => rules::goal_notifications(&self.api.goal_achievements(token).await?),
            Rule::Anomalies => rules::anomaly_alerts(&self.api.anomalies(token).await?),
            Rule::WeeklySummary => {
                let summary = self
                    .api
                    .monthly_summary(token, now.month(), now.year())
                    .await?;
                let budgets = self
                    .api
                    .budget_summary(token, now.month(), now.year())
                    .await?;
                vec![rules::weekly_summary(&summary, &budgets, &now)]
            }
        })
    }

    /// Budget threshold check for a just-recorded expense
    pub async fn on_expense(
        &self,
        token: &str,
        amount: f64,
        category: &str,
        now: DateTime<Local>,
    ) -> Option<Notification> {
        if !self.settings().is_enabled(AlertCategory::BudgetAlerts) {
            return None;
        }

        let budgets = match self
            .api
            .budget_summary(token, now.month(), now.year())
            .await
        {
            Ok(budgets) => budgets,
            Err(e) => {
                warn!(category, error = %e, "Budget check failed");
                return None;
            }
        };

        if !self.is_running() {
            debug!(category, "Session ended during budget check; dropping result");
            return None;
        }

        let draft = rules::budget_alert(category, amount, &budgets)?;
        self.deliver(draft, now)
    }

    /// Notification-producing application events. The access token is only
    /// needed for expense checks.
    pub async fn handle_domain_event(
        &self,
        event: DomainEvent,
        token: Option<&str>,
        now: DateTime<Local>,
    ) -> Option<Notification> {
        if !self.is_running() {
            debug!(?event, "No active session; ignoring domain event");
            return None;
        }

        match event {
            DomainEvent::ExpenseRecorded { amount, category } => {
                let Some(token) = token else {
                    debug!(%category, "No access token for budget check");
                    return None;
                };
                self.on_expense(token, amount, &category, now).await
            }
            DomainEvent::GoalProgressUpdated {
                goal_id,
                name,
                previous_progress,
                progress,
            } => rules::goal_progress(&goal_id, &name, previous_progress, progress)
                .and_then(|draft| self.deliver(draft, now)),
            DomainEvent::AchievementUnlocked { name, description } => {
                self.deliver(rules::achievement_unlocked(&name, &description), now)
            }
            DomainEvent::FamilyMemberAdded { name } => {
                self.deliver(rules::family_update(&name), now)
            }
        }
    }

    /// Record a draft: apply category settings, idempotency and quiet hours,
    /// then persist and publish. None when the draft was suppressed.
    pub fn deliver(&self, draft: NotificationDraft, now: DateTime<Local>) -> Option<Notification> {
        let now_mono = MonotonicInstant::now();
        let (notification, immediate) = {
            let mut inner = self.inner();

            if let Some(category) = draft.kind.category()
                && !inner.settings.is_enabled(category)
            {
                debug!(kind = ?draft.kind, "Category disabled; suppressed");
                return None;
            }

            if let Some(key) = &draft.dedupe_key
                && inner
                    .history
                    .iter()
                    .any(|n| n.dedupe_key.as_ref() == Some(key))
            {
                debug!(key = %key, "Already notified");
                return None;
            }

            let deferred_until = if draft.priority.is_critical() {
                None
            } else {
                inner
                    .settings
                    .quiet_hours
                    .window()
                    .filter(|w| w.contains(&now))
                    .map(|w| w.next_end(&now))
            };

            let notification = draft.into_notification(now, deferred_until);
            let immediate = deferred_until.is_none();

            inner.history.insert(0, notification.clone());
            if immediate {
                inner.toasts.push(notification.id);
                inner.timers.arm(
                    EngineTimer::Toast(notification.id),
                    now_mono,
                    notification.auto_dismiss(),
                );
            } else {
                inner.deferred.push(notification.id);
            }
            self.persist(&inner);
            (notification, immediate)
        };

        info!(
            id = %notification.id,
            kind = ?notification.kind,
            priority = ?notification.priority,
            immediate,
            "Notification added"
        );

        let id = notification.id;
        let auto_dismiss_ms = notification.auto_dismiss_ms;
        self.events.publish(NotificationEvent::Added {
            notification: notification.clone(),
            immediate,
        });
        if immediate {
            self.events
                .publish(NotificationEvent::ToastShown { id, auto_dismiss_ms });
        }
        Some(notification)
    }

    fn update(
        &self,
        id: &NotificationId,
        apply: impl FnOnce(&mut Notification) -> bool,
    ) -> Option<(Notification, bool)> {
        let mut inner = self.inner();
        let notification = inner.find_mut(id)?;
        if !apply(notification) {
            return Some((notification.clone(), false));
        }
        let notification = notification.clone();

        let hidden = notification.dismissed && inner.hide_toast(id);
        if notification.dismissed {
            inner.deferred.retain(|d| d != id);
        }
        self.persist(&inner);
        Some((notification, hidden))
    }

    fn publish_update(&self, notification: &Notification, hidden: bool) {
        if hidden {
            self.events.publish(NotificationEvent::ToastHidden {
                id: notification.id,
            });
        }
        self.events.publish(NotificationEvent::Updated {
            notification: notification.clone(),
        });
    }

    pub fn mark_read(&self, id: &NotificationId) -> Option<Notification> {
        let (notification, hidden) = self.update(id, |n| !std::mem::replace(&mut n.read, true))?;
        self.publish_update(&notification, hidden);
        Some(notification)
    }

    /// Dismiss one notification. Dismissing twice is a no-op.
    pub fn dismiss(&self, id: &NotificationId) -> bool {
        let mut changed = false;
        let Some((notification, hidden)) = self.update(id, |n| {
            changed = !std::mem::replace(&mut n.dismissed, true);
            changed
        }) else {
            return false;
        };

        if changed {
            self.publish_update(&notification, hidden);
        }
        changed
    }

    pub fn dismiss_all(&self) -> usize {
        let count = {
            let mut inner = self.inner();
            let mut count = 0;
            for n in inner.history.iter_mut().filter(|n| !n.dismissed) {
                n.dismissed = true;
                count += 1;
            }
            let toasts = std::mem::take(&mut inner.toasts);
            for id in &toasts {
                inner.timers.cancel(&EngineTimer::Toast(*id));
            }
            inner.deferred.clear();
            if count > 0 {
                self.persist(&inner);
            }
            count
        };

        self.events.publish(NotificationEvent::Cleared);
        count
    }

    pub fn mark_all_read(&self) -> usize {
        let count = {
            let mut inner = self.inner();
            let mut count = 0;
            for n in inner.history.iter_mut().filter(|n| !n.read) {
                n.read = true;
                count += 1;
            }
            if count > 0 {
                self.persist(&inner);
            }
            count
        };

        self.events.publish(NotificationEvent::AllRead { count });
        count
    }

    /// Wipe history
    pub fn clear_all(&self) -> usize {
        let count = {
            let mut inner = self.inner();
            let count = inner.history.len();
            inner.history.clear();
            let toasts = std::mem::take(&mut inner.toasts);
            for id in &toasts {
                inner.timers.cancel(&EngineTimer::Toast(*id));
            }
            inner.deferred.clear();
            self.persist(&inner);
            count
        };

        info!(count, "Notification history cleared");
        self.events.publish(NotificationEvent::Cleared);
        count
    }

    /// A notification button was pressed. Marks it read and returns it so
    /// the host can route the action.
    pub fn handle_action(&self, id: &NotificationId, action_id: &str) -> Option<Notification> {
        let (notification, hidden) = self.update(id, |n| {
            n.read = true;
            true
        })?;

        if !notification.has_action(action_id) {
            debug!(%id, action_id, "Action not offered by notification");
        }
        info!(%id, action_id, "Notification action");
        self.publish_update(&notification, hidden);
        Some(notification)
    }

    /// Non-dismissed history, newest first
    pub fn notifications(&self, limit: Option<usize>, unread_only: bool) -> Vec<Notification> {
        self.inner()
            .history
            .iter()
            .filter(|n| !n.dismissed && (!unread_only || !n.read))
            .take(limit.unwrap_or(DEFAULT_PAGE_SIZE))
            .cloned()
            .collect()
    }

    /// Currently visible toasts, oldest first
    pub fn toasts(&self) -> Vec<Notification> {
        let inner = self.inner();
        inner
            .toasts
            .iter()
            .filter_map(|id| inner.history.iter().find(|n| n.id == *id))
            .cloned()
            .collect()
    }

    pub fn stats(&self) -> NotificationStats {
        let inner = self.inner();
        let total = inner.history.len();
        let unread = inner
            .history
            .iter()
            .filter(|n| !n.read && !n.dismissed)
            .count();

        let mut by_kind = BTreeMap::new();
        for n in &inner.history {
            *by_kind.entry(n.kind).or_insert(0) += 1;
        }

        NotificationStats {
            total,
            unread,
            read: total - unread,
            by_kind,
            last_notification: inner.history.iter().map(|n| n.created_at).max(),
        }
    }

    pub fn settings(&self) -> NotificationSettings {
        self.inner().settings.clone()
    }

    /// Replace settings. The new settings apply even when saving them fails.
    pub fn update_settings(&self, settings: NotificationSettings) -> SessionResult<()> {
        self.inner().settings = settings.clone();

        let _ = self
            .store
            .append_audit(AuditEvent::new(AuditEventType::SettingsUpdated));

        self.store.save_settings(&settings).map_err(|e| {
            warn!(error = %e, "Failed to persist notification settings");
            SessionError::SettingsPersistence(e.to_string())
        })?;

        info!("Notification settings updated");
        Ok(())
    }
}

/// Undismissed notifications whose quiet-hours deferral has not ended
fn pending_release(history: &[Notification], now: &DateTime<Local>) -> Vec<NotificationId> {
    history
        .iter()
        .filter(|n| !n.dismissed && n.is_deferred_at(now))
        .map(|n| n.id)
        .collect()
}
