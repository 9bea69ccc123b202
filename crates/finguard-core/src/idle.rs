//! Idle timeout state machine

use chrono::{DateTime, Local};
use finguard_api::{IdleEvent, IdleState, IdleWindowState, SessionStats};
use finguard_config::SessionConfig;
use finguard_util::{MonotonicInstant, format_countdown};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

use crate::{EventBus, TimerRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IdleTimer {
    /// Active -> Warning
    Warning,
    /// Warning -> Expired
    Logout,
    /// One countdown tick while in Warning
    Countdown,
}

struct Inner {
    state: IdleState,
    timers: TimerRegistry<IdleTimer>,
    started: Option<MonotonicInstant>,
    last_activity: Option<MonotonicInstant>,
}

/// Tracks user inactivity. Activity resets the timers only while Active;
/// once the warning is showing, only an explicit extend brings the session
/// back.
pub struct IdleSessionMonitor {
    config: SessionConfig,
    inner: Mutex<Inner>,
    events: EventBus<IdleEvent>,
}

impl IdleSessionMonitor {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                state: IdleState::Stopped,
                timers: TimerRegistry::new(),
                started: None,
                last_activity: None,
            }),
            events: EventBus::default(),
        }
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn events(&self) -> &EventBus<IdleEvent> {
        &self.events
    }

    pub fn state(&self) -> IdleState {
        self.inner().state
    }

    fn arm(&self, inner: &mut Inner, now: MonotonicInstant) {
        inner.last_activity = Some(now);
        inner.timers.cancel_all();
        inner
            .timers
            .arm(IdleTimer::Warning, now, self.config.warning_after());
        inner
            .timers
            .arm(IdleTimer::Logout, now, self.config.idle_timeout);
    }

    /// Begin monitoring for a new session
    pub fn start(&self, now: MonotonicInstant) {
        let mut inner = self.inner();
        inner.state = IdleState::Active;
        inner.started = Some(now);
        self.arm(&mut inner, now);
        debug!(
            idle_timeout_secs = self.config.idle_timeout.as_secs(),
            "Idle monitor started"
        );
    }

    /// Qualifying activity. Re-arms only while Active.
    pub fn reset_timers(&self, now: MonotonicInstant) -> bool {
        let mut inner = self.inner();
        if inner.state != IdleState::Active {
            return false;
        }
        self.arm(&mut inner, now);
        true
    }

    /// "Stay signed in". Leaves Warning for Active.
    pub fn extend(&self, now: MonotonicInstant) -> bool {
        let was_warning = {
            let mut inner = self.inner();
            match inner.state {
                IdleState::Warning => {
                    inner.state = IdleState::Active;
                    self.arm(&mut inner, now);
                    true
                }
                IdleState::Active => {
                    self.arm(&mut inner, now);
                    return true;
                }
                IdleState::Expired | IdleState::Stopped => return false,
            }
        };

        if was_warning {
            info!("Session extended from idle warning");
            self.events.publish(IdleEvent::Extended);
        }
        true
    }

    /// Fire due timers
    pub fn tick(&self, now: MonotonicInstant) -> Vec<IdleEvent> {
        let mut events = Vec::new();
        {
            let mut inner = self.inner();
            if !matches!(inner.state, IdleState::Active | IdleState::Warning) {
                return events;
            }

            for timer in inner.timers.take_due(now) {
                match timer {
                    IdleTimer::Warning if inner.state == IdleState::Active => {
                        inner.state = IdleState::Warning;
                        inner
                            .timers
                            .arm_interval(IdleTimer::Countdown, now, self.config.countdown_tick);
                        let remaining = inner
                            .timers
                            .remaining(&IdleTimer::Logout, now)
                            .unwrap_or_default();

                        info!(remaining_secs = remaining.as_secs(), "Idle warning");
                        events.push(IdleEvent::WarningStarted {
                            remaining_ms: remaining.as_millis() as u64,
                        });
                    }
                    IdleTimer::Countdown if inner.state == IdleState::Warning => {
                        let remaining = inner
                            .timers
                            .remaining(&IdleTimer::Logout, now)
                            .unwrap_or_default();
                        events.push(IdleEvent::Countdown {
                            remaining_ms: remaining.as_millis() as u64,
                            display: format_countdown(remaining),
                        });
                    }
                    IdleTimer::Logout => {
                        inner.state = IdleState::Expired;
                        inner.timers.cancel_all();
                        info!("Idle timeout reached");
                        events.push(IdleEvent::Expired);
                        break;
                    }
                    _ => {}
                }
            }
        }

        for event in &events {
            self.events.publish(event.clone());
        }
        events
    }

    /// Stop monitoring. `state` is Expired when the session ended on its
    /// own, Stopped after an explicit logout.
    pub fn end_session(&self, state: IdleState) {
        let mut inner = self.inner();
        let cancelled = inner.timers.cancel_all();
        inner.state = state;
        inner.started = None;
        inner.last_activity = None;
        debug!(?state, cancelled, "Idle monitor ended");
    }

    /// Snapshot for the UI
    pub fn window_state(&self, now: MonotonicInstant) -> IdleWindowState {
        let inner = self.inner();
        IdleWindowState {
            state: inner.state,
            warning_armed: inner.timers.is_armed(&IdleTimer::Warning),
            logout_armed: inner.timers.is_armed(&IdleTimer::Logout),
            remaining_ms: inner
                .timers
                .remaining(&IdleTimer::Logout, now)
                .unwrap_or_default()
                .as_millis() as u64,
        }
    }

    /// Session timing. Wall-clock timestamps are derived from `now`.
    pub fn stats(&self, now: DateTime<Local>, now_mono: MonotonicInstant) -> SessionStats {
        let inner = self.inner();
        let (Some(started), Some(last_activity)) = (inner.started, inner.last_activity) else {
            return SessionStats::inactive();
        };
        if !matches!(inner.state, IdleState::Active | IdleState::Warning) {
            return SessionStats::inactive();
        }

        let duration = now_mono.duration_since(started);
        let since_activity = now_mono.duration_since(last_activity);
        let remaining = |timer: &IdleTimer| {
            inner
                .timers
                .remaining(timer, now_mono)
                .unwrap_or_default()
                .as_millis() as u64
        };

        SessionStats {
            active: true,
            started_at: chrono::Duration::from_std(duration).ok().map(|d| now - d),
            last_activity_at: chrono::Duration::from_std(since_activity)
                .ok()
                .map(|d| now - d),
            session_duration_ms: duration.as_millis() as u64,
            since_activity_ms: since_activity.as_millis() as u64,
            until_warning_ms: remaining(&IdleTimer::Warning),
            until_logout_ms: remaining(&IdleTimer::Logout),
        }
    }

    pub fn armed_timers(&self) -> usize {
        self.inner().timers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn monitor() -> IdleSessionMonitor {
        IdleSessionMonitor::new(SessionConfig::default())
    }

    const WARNING_AT: Duration = Duration::from_secs(25 * 60);

    #[test]
    fn starts_stopped() {
        let monitor = monitor();
        assert_eq!(monitor.state(), IdleState::Stopped);
        assert!(!monitor.reset_timers(MonotonicInstant::now()));
        assert!(monitor.tick(MonotonicInstant::now() + WARNING_AT).is_empty());
    }

    #[test]
    fn activity_while_active_pushes_warning_back() {
        let monitor = monitor();
        let t0 = MonotonicInstant::now();
        monitor.start(t0);

        let t1 = t0 + Duration::from_secs(20 * 60);
        assert!(monitor.reset_timers(t1));
        assert_eq!(monitor.armed_timers(), 2);

        // The original warning deadline has passed but was replaced
        assert!(monitor.tick(t0 + WARNING_AT).is_empty());
        assert_eq!(monitor.state(), IdleState::Active);

        let events = monitor.tick(t1 + WARNING_AT);
        assert_eq!(
            events,
            vec![IdleEvent::WarningStarted {
                remaining_ms: 300_000
            }]
        );
        assert_eq!(monitor.state(), IdleState::Warning);
    }

    #[test]
    fn activity_during_warning_is_ignored() {
        let monitor = monitor();
        let t0 = MonotonicInstant::now();
        monitor.start(t0);
        monitor.tick(t0 + WARNING_AT);

        assert!(!monitor.reset_timers(t0 + WARNING_AT + Duration::from_secs(10)));
        assert_eq!(monitor.state(), IdleState::Warning);
        let window = monitor.window_state(t0 + WARNING_AT + Duration::from_secs(10));
        assert_eq!(window.remaining_ms, 290_000);
    }

    #[test]
    fn countdown_ticks_and_expires() {
        let monitor = monitor();
        let t0 = MonotonicInstant::now();
        monitor.start(t0);
        monitor.tick(t0 + WARNING_AT);

        let events = monitor.tick(t0 + WARNING_AT + Duration::from_secs(1));
        assert_eq!(
            events,
            vec![IdleEvent::Countdown {
                remaining_ms: 299_000,
                display: "4:59".into()
            }]
        );

        let events = monitor.tick(t0 + Duration::from_secs(30 * 60));
        assert_eq!(events.last(), Some(&IdleEvent::Expired));
        assert_eq!(monitor.state(), IdleState::Expired);
        assert_eq!(monitor.armed_timers(), 0);

        // Terminal until restarted
        assert!(!monitor.extend(t0 + Duration::from_secs(31 * 60)));
        assert!(monitor.tick(t0 + Duration::from_secs(40 * 60)).is_empty());
    }

    #[test]
    fn extend_returns_to_active() {
        let monitor = monitor();
        let mut rx = monitor.events().subscribe();
        let t0 = MonotonicInstant::now();
        monitor.start(t0);
        monitor.tick(t0 + WARNING_AT);

        let t1 = t0 + WARNING_AT + Duration::from_secs(30);
        assert!(monitor.extend(t1));
        assert_eq!(monitor.state(), IdleState::Active);
        assert_eq!(monitor.armed_timers(), 2);

        let window = monitor.window_state(t1);
        assert_eq!(window.remaining_ms, 30 * 60 * 1000);

        assert!(matches!(rx.try_recv(), Ok(IdleEvent::WarningStarted { .. })));
        assert_eq!(rx.try_recv().unwrap(), IdleEvent::Extended);
    }

    #[test]
    fn end_session_clears_timers() {
        let monitor = monitor();
        let t0 = MonotonicInstant::now();
        monitor.start(t0);

        monitor.end_session(IdleState::Stopped);
        assert_eq!(monitor.state(), IdleState::Stopped);
        assert_eq!(monitor.armed_timers(), 0);
        assert!(monitor.tick(t0 + Duration::from_secs(3600)).is_empty());
    }

    #[test]
    fn long_sleep_warns_then_expires_in_one_tick() {
        let monitor = monitor();
        let t0 = MonotonicInstant::now();
        monitor.start(t0);

        let events = monitor.tick(t0 + Duration::from_secs(3600));
        assert!(matches!(events[0], IdleEvent::WarningStarted { .. }));
        assert_eq!(events.last(), Some(&IdleEvent::Expired));
    }
}
