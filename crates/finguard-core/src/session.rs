//! Session runtime: wires the credential scheduler, idle monitor and
//! notification engine together

use chrono::{DateTime, Local};
use finguard_api::{
    CredentialEvent, DomainEvent, IdleEvent, IdleState, Notification, SessionEndReason,
    SessionStats, TokenPair,
};
use finguard_backend::FinanceApi;
use finguard_config::AgentConfig;
use finguard_store::{AuditEvent, AuditEventType, Store};
use finguard_util::{MonotonicInstant, SessionResult};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{
    CredentialScheduler, CredentialStatus, IdleSessionMonitor, NotificationEngine,
    ScheduleDecision, TimerRegistry,
};

/// Tasks spawned on behalf of the current session (renewals, rule polls
/// and budget checks)
#[derive(Default)]
struct SessionTasks {
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl SessionTasks {
    fn lock(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn spawn(&self, future: impl Future<Output = ()> + Send + 'static) {
        let handle = tokio::spawn(future);
        let mut handles = self.lock();
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
    }

    fn abort_all(&self) -> usize {
        let handles = std::mem::take(&mut *self.lock());
        let count = handles.len();
        for handle in handles {
            handle.abort();
        }
        count
    }

    fn take(&self) -> Vec<JoinHandle<()>> {
        std::mem::take(&mut *self.lock())
    }

    fn pending(&self) -> usize {
        self.lock().iter().filter(|h| !h.is_finished()).count()
    }
}

/// What one [`SessionRuntime::tick`] set in motion
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub renewal_started: bool,
    pub heartbeat: bool,
    pub idle_expired: bool,
    pub polls_started: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RuntimeTimer {
    /// Periodic credential validity check
    Heartbeat,
}

type Heartbeat = Arc<Mutex<TimerRegistry<RuntimeTimer>>>;

fn lock_heartbeat(heartbeat: &Heartbeat) -> MutexGuard<'_, TimerRegistry<RuntimeTimer>> {
    heartbeat.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Owns the three session components. Session-expired and logout tear
/// down the idle monitor and notification engine and abort every task
/// spawned for the session.
pub struct SessionRuntime {
    credentials: Arc<CredentialScheduler>,
    idle: Arc<IdleSessionMonitor>,
    notifications: Arc<NotificationEngine>,
    store: Arc<dyn Store>,
    tasks: Arc<SessionTasks>,
    heartbeat: Heartbeat,
    heartbeat_interval: Duration,
    /// Set by a renewal; the next tick re-arms the idle timers
    renewed: Arc<AtomicBool>,
}

impl SessionRuntime {
    pub fn new(api: FinanceApi, store: Arc<dyn Store>, config: &AgentConfig) -> Self {
        let credentials = Arc::new(CredentialScheduler::new(
            api.clone(),
            store.clone(),
            config.session.clone(),
        ));
        let idle = Arc::new(IdleSessionMonitor::new(config.session.clone()));
        let notifications = Arc::new(NotificationEngine::new(
            api,
            store.clone(),
            config.notifications.clone(),
        ));
        let tasks = Arc::new(SessionTasks::default());
        let heartbeat: Heartbeat = Arc::new(Mutex::new(TimerRegistry::new()));
        let renewed = Arc::new(AtomicBool::new(false));

        {
            let idle = idle.clone();
            let notifications = notifications.clone();
            let tasks = tasks.clone();
            let heartbeat = heartbeat.clone();
            let renewed = renewed.clone();
            let pending_reset = renewed.clone();
            let teardown = move |state: IdleState| {
                idle.end_session(state);
                notifications.stop();
                lock_heartbeat(&heartbeat).cancel_all();
                pending_reset.store(false, Ordering::SeqCst);
                tasks.abort_all();
            };
            credentials.events().observe(move |event| match event {
                CredentialEvent::Renewed { .. } => {
                    renewed.store(true, Ordering::SeqCst);
                }
                CredentialEvent::ExpiringSoon { .. } => {}
                CredentialEvent::SessionExpired { reason } => {
                    debug!(?reason, "Tearing down expired session");
                    teardown(IdleState::Expired);
                }
                CredentialEvent::LoggedOut => teardown(IdleState::Stopped),
            });
        }

        {
            let store = store.clone();
            idle.events().observe(move |event| {
                let audit = match event {
                    IdleEvent::WarningStarted { .. } => AuditEventType::IdleWarning,
                    IdleEvent::Extended => AuditEventType::IdleExtended,
                    _ => return,
                };
                let _ = store.append_audit(AuditEvent::new(audit));
            });
        }

        Self {
            credentials,
            idle,
            notifications,
            store,
            tasks,
            heartbeat,
            heartbeat_interval: config.session.heartbeat_interval,
            renewed,
        }
    }

    pub fn credentials(&self) -> &Arc<CredentialScheduler> {
        &self.credentials
    }

    pub fn idle(&self) -> &Arc<IdleSessionMonitor> {
        &self.idle
    }

    pub fn notifications(&self) -> &Arc<NotificationEngine> {
        &self.notifications
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Renewals and polls still running
    pub fn pending_tasks(&self) -> usize {
        self.tasks.pending()
    }

    fn begin(&self, decision: ScheduleDecision, now: DateTime<Local>, now_mono: MonotonicInstant) {
        self.idle.start(now_mono);
        self.notifications.start(now, now_mono);
        self.renewed.store(false, Ordering::SeqCst);
        lock_heartbeat(&self.heartbeat).arm_interval(
            RuntimeTimer::Heartbeat,
            now_mono,
            self.heartbeat_interval,
        );
        if decision == ScheduleDecision::RefreshNow {
            self.spawn_renewal();
        }
    }

    /// Start a session with a freshly issued token pair
    pub fn login(
        &self,
        tokens: TokenPair,
        now: DateTime<Local>,
        now_mono: MonotonicInstant,
    ) -> SessionResult<ScheduleDecision> {
        self.tasks.abort_all();
        let decision = self.credentials.install(tokens, now, now_mono)?;
        self.begin(decision, now, now_mono);
        info!(?decision, "Session started");
        Ok(decision)
    }

    /// Startup: load notification history and resume a persisted session.
    /// Returns whether a session was resumed.
    pub fn restore(&self, now: DateTime<Local>, now_mono: MonotonicInstant) -> SessionResult<bool> {
        self.notifications.load(now);

        let Some(decision) = self.credentials.restore(now, now_mono)? else {
            return Ok(false);
        };
        self.begin(decision, now, now_mono);
        info!(?decision, "Session resumed");
        Ok(true)
    }

    pub fn record_activity(&self, now_mono: MonotonicInstant) -> bool {
        self.idle.reset_timers(now_mono)
    }

    pub fn extend(&self, now_mono: MonotonicInstant) -> bool {
        self.idle.extend(now_mono)
    }

    /// Application window regained focus
    pub fn on_focus(&self, now: &DateTime<Local>) -> CredentialStatus {
        let status = self.credentials.check_status(now);
        match status {
            CredentialStatus::Expired => {
                self.credentials.expire(SessionEndReason::CredentialExpired);
            }
            CredentialStatus::RefreshNeeded => self.spawn_renewal(),
            CredentialStatus::Valid | CredentialStatus::NoCredential => {}
        }
        debug!(?status, "Focus check");
        status
    }

    /// Session timing for a status display
    pub fn session_stats(&self, now: DateTime<Local>, now_mono: MonotonicInstant) -> SessionStats {
        self.idle.stats(now, now_mono)
    }

    /// Route an application event to the notification engine
    pub async fn dispatch(&self, event: DomainEvent, now: DateTime<Local>) -> Option<Notification> {
        Self::route(&self.credentials, &self.notifications, event, now).await
    }

    /// [`dispatch`](Self::dispatch) as a session task, so logout and
    /// expiry cancel a budget check still waiting on the network
    pub fn spawn_dispatch(&self, event: DomainEvent, now: DateTime<Local>) {
        let credentials = self.credentials.clone();
        let notifications = self.notifications.clone();
        self.tasks.spawn(async move {
            if Self::route(&credentials, &notifications, event, now)
                .await
                .is_none()
            {
                debug!("Domain event produced no notification");
            }
        });
    }

    async fn route(
        credentials: &CredentialScheduler,
        notifications: &NotificationEngine,
        event: DomainEvent,
        now: DateTime<Local>,
    ) -> Option<Notification> {
        let token = match &event {
            DomainEvent::ExpenseRecorded { .. } => match credentials.valid_token(now).await {
                Ok(token) => Some(token),
                Err(e) => {
                    debug!(error = %e, "No usable token for budget check");
                    None
                }
            },
            _ => None,
        };

        notifications
            .handle_domain_event(event, token.as_deref(), now)
            .await
    }

    pub fn logout(&self) {
        self.credentials.logout();
    }

    /// Drive every component's timers
    pub fn tick(&self, now: DateTime<Local>, now_mono: MonotonicInstant) -> TickReport {
        let mut report = TickReport::default();

        if self.credentials.tick(now_mono) {
            debug!("Renewal timer fired");
            self.spawn_renewal();
            report.renewal_started = true;
        }

        if self.renewed.swap(false, Ordering::SeqCst) {
            self.idle.reset_timers(now_mono);
        }

        let heartbeat_due = !lock_heartbeat(&self.heartbeat)
            .take_due(now_mono)
            .is_empty();
        if heartbeat_due {
            report.heartbeat = true;
            if self.credentials.heartbeat(&now) == CredentialStatus::Expired {
                return report;
            }
        }

        let idle_events = self.idle.tick(now_mono);
        if idle_events.contains(&IdleEvent::Expired) {
            report.idle_expired = true;
            if !self.credentials.expire(SessionEndReason::IdleTimeout) {
                self.notifications.stop();
                lock_heartbeat(&self.heartbeat).cancel_all();
                self.tasks.abort_all();
            }
            return report;
        }

        for rule in self.notifications.tick(now, now_mono) {
            let credentials = self.credentials.clone();
            let notifications = self.notifications.clone();
            self.tasks.spawn(async move {
                let token = match credentials.valid_token(now).await {
                    Ok(token) => token,
                    Err(e) => {
                        debug!(rule = rule.name(), error = %e, "Skipping poll without a valid token");
                        return;
                    }
                };
                notifications.poll(rule, &token, now).await;
            });
            report.polls_started += 1;
        }

        report
    }

    fn spawn_renewal(&self) {
        let credentials = self.credentials.clone();
        self.tasks.spawn(async move {
            if let Err(e) = credentials.refresh().await {
                warn!(error = %e, "Credential renewal failed");
            }
        });
    }

    /// Wait for every task spawned so far
    pub async fn settle(&self) {
        loop {
            let handles = self.tasks.take();
            if handles.is_empty() {
                return;
            }
            for handle in handles {
                let _ = handle.await;
            }
        }
    }

    /// Stop timers and tasks without ending the session. The persisted
    /// credential is kept for the next start.
    pub fn shutdown(&self) {
        let aborted = self.tasks.abort_all();
        self.idle.end_session(IdleState::Stopped);
        self.notifications.stop();
        lock_heartbeat(&self.heartbeat).cancel_all();
        info!(aborted, "Session runtime stopped");
    }
}
