//! Credential ownership and renewal scheduling

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Local, TimeZone};
use finguard_api::{CredentialEvent, SessionEndReason, TokenPair};
use finguard_backend::FinanceApi;
use finguard_config::SessionConfig;
use finguard_store::{AuditEvent, AuditEventType, Store};
use finguard_util::{MonotonicInstant, SessionError, SessionResult};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::{EventBus, TimerRegistry};

/// Read the `exp` claim of a JWT without verifying it
pub fn decode_expiry(token: &str) -> Option<DateTime<Local>> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&bytes).ok()?;

    let exp = claims.get("exp")?;
    let secs = exp.as_i64().or_else(|| exp.as_f64().map(|f| f as i64))?;
    Local.timestamp_opt(secs, 0).single()
}

/// The live access/refresh token pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// None when the access token carries no readable expiry, which is
    /// treated as already expired
    pub expires_at: Option<DateTime<Local>>,
}

impl Credential {
    pub fn from_tokens(tokens: TokenPair) -> Self {
        Self {
            expires_at: decode_expiry(&tokens.access_token),
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
        }
    }

    pub fn tokens(&self) -> TokenPair {
        TokenPair::new(self.access_token.clone(), self.refresh_token.clone())
    }

    pub fn is_expired(&self, now: &DateTime<Local>) -> bool {
        self.expires_at.is_none_or(|exp| exp <= *now)
    }

    /// Zero once expired
    pub fn time_until_expiry(&self, now: &DateTime<Local>) -> Duration {
        self.expires_at
            .and_then(|exp| (exp - *now).to_std().ok())
            .unwrap_or(Duration::ZERO)
    }

    /// Still valid but inside the renewal threshold
    pub fn should_refresh(&self, now: &DateTime<Local>, threshold: Duration) -> bool {
        let until = self.time_until_expiry(now);
        !until.is_zero() && until <= threshold
    }

    /// `(expires_at - now) - threshold`, floored at zero
    pub fn time_until_refresh(&self, now: &DateTime<Local>, threshold: Duration) -> Duration {
        self.time_until_expiry(now).saturating_sub(threshold)
    }
}

/// Result of [`CredentialScheduler::schedule_next`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleDecision {
    /// Renewal timer armed for `delay`
    Armed { delay: Duration },
    /// Inside the threshold (or expired): renew right away
    RefreshNow,
    NoCredential,
}

/// Result of [`CredentialScheduler::check_status`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialStatus {
    Valid,
    RefreshNeeded,
    Expired,
    NoCredential,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CredentialTimer {
    Refresh,
}

type Flight = watch::Receiver<Option<SessionResult<Credential>>>;

struct State {
    credential: Option<Credential>,
    timers: TimerRegistry<CredentialTimer>,
    in_flight: Option<(u64, Flight)>,
    next_flight: u64,
    /// Bumped whenever the credential is replaced or dropped, so a renewal
    /// started for an older session cannot write its result back
    generation: u64,
    /// Expiring-soon already published for this session
    expiry_warned: bool,
}

/// Sole owner of the credential. Readers get copies.
pub struct CredentialScheduler {
    api: FinanceApi,
    store: Arc<dyn Store>,
    config: SessionConfig,
    state: Mutex<State>,
    events: EventBus<CredentialEvent>,
}

/// Outcome of the locked half of [`CredentialScheduler::refresh`]
enum Begin {
    Join(Flight),
    Start {
        tx: watch::Sender<Option<SessionResult<Credential>>>,
        flight: u64,
        generation: u64,
        refresh_token: String,
    },
    NoCredential,
    NoRefreshToken,
}

struct FlightGuard<'a> {
    scheduler: &'a CredentialScheduler,
    flight: u64,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.scheduler.state();
        if state.in_flight.as_ref().is_some_and(|(id, _)| *id == self.flight) {
            state.in_flight = None;
        }
    }
}

impl CredentialScheduler {
    pub fn new(api: FinanceApi, store: Arc<dyn Store>, config: SessionConfig) -> Self {
        Self {
            api,
            store,
            config,
            state: Mutex::new(State {
                credential: None,
                timers: TimerRegistry::new(),
                in_flight: None,
                next_flight: 0,
                generation: 0,
                expiry_warned: false,
            }),
            events: EventBus::default(),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn events(&self) -> &EventBus<CredentialEvent> {
        &self.events
    }

    /// Copy of the current credential
    pub fn credential(&self) -> Option<Credential> {
        self.state().credential.clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.state().credential.as_ref().map(|c| c.access_token.clone())
    }

    pub fn has_credential(&self) -> bool {
        self.state().credential.is_some()
    }

    pub fn is_refreshing(&self) -> bool {
        self.state().in_flight.is_some()
    }

    /// Number of armed renewal timers (0 or 1)
    pub fn armed_timers(&self) -> usize {
        self.state().timers.len()
    }

    pub fn is_expired(&self, now: &DateTime<Local>) -> bool {
        self.state()
            .credential
            .as_ref()
            .is_none_or(|c| c.is_expired(now))
    }

    pub fn should_refresh(&self, now: &DateTime<Local>) -> bool {
        self.state()
            .credential
            .as_ref()
            .is_some_and(|c| c.should_refresh(now, self.config.refresh_threshold))
    }

    pub fn time_until_expiry(&self, now: &DateTime<Local>) -> Option<Duration> {
        self.state()
            .credential
            .as_ref()
            .map(|c| c.time_until_expiry(now))
    }

    /// Install a freshly issued pair (login)
    pub fn install(
        &self,
        tokens: TokenPair,
        now: DateTime<Local>,
        now_mono: MonotonicInstant,
    ) -> SessionResult<ScheduleDecision> {
        if tokens.access_token.is_empty() {
            return Err(SessionError::internal("empty access token"));
        }

        let credential = Credential::from_tokens(tokens);
        if let Err(e) = self.store.save_credential(&credential.tokens()) {
            warn!(error = %e, "Failed to persist credential");
        }
        let _ = self.store.append_audit(AuditEvent::new(AuditEventType::LoggedIn {
            expires_at: credential.expires_at,
        }));

        info!(
            expires_at = ?credential.expires_at,
            has_refresh_token = credential.refresh_token.is_some(),
            "Credential installed"
        );

        self.replace(credential);
        Ok(self.schedule_next(now, now_mono))
    }

    /// Reload the persisted credential at startup
    pub fn restore(
        &self,
        now: DateTime<Local>,
        now_mono: MonotonicInstant,
    ) -> SessionResult<Option<ScheduleDecision>> {
        let tokens = self
            .store
            .load_credential()
            .map_err(|e| SessionError::internal(e.to_string()))?;

        let Some(tokens) = tokens else {
            debug!("No persisted credential");
            return Ok(None);
        };

        let credential = Credential::from_tokens(tokens);
        info!(expires_at = ?credential.expires_at, "Credential restored");

        self.replace(credential);
        Ok(Some(self.schedule_next(now, now_mono)))
    }

    fn replace(&self, credential: Credential) {
        let mut state = self.state();
        state.generation += 1;
        state.in_flight = None;
        state.expiry_warned = false;
        state.timers.cancel_all();
        state.credential = Some(credential);
    }

    /// Cancel any armed renewal and arm the next one
    pub fn schedule_next(&self, now: DateTime<Local>, now_mono: MonotonicInstant) -> ScheduleDecision {
        let mut state = self.state();
        state.timers.cancel(&CredentialTimer::Refresh);

        let Some(credential) = &state.credential else {
            return ScheduleDecision::NoCredential;
        };

        let delay = credential.time_until_refresh(&now, self.config.refresh_threshold);
        state.timers.arm(CredentialTimer::Refresh, now_mono, delay);

        if delay.is_zero() {
            debug!("Credential inside renewal threshold");
            ScheduleDecision::RefreshNow
        } else {
            debug!(delay_secs = delay.as_secs(), "Renewal scheduled");
            ScheduleDecision::Armed { delay }
        }
    }

    /// True when the renewal timer fired
    pub fn tick(&self, now_mono: MonotonicInstant) -> bool {
        !self.state().timers.take_due(now_mono).is_empty()
    }

    /// Status check used when the application regains focus
    pub fn check_status(&self, now: &DateTime<Local>) -> CredentialStatus {
        let state = self.state();
        match &state.credential {
            None => CredentialStatus::NoCredential,
            Some(c) if c.is_expired(now) => CredentialStatus::Expired,
            Some(c) if c.should_refresh(now, self.config.refresh_threshold) => {
                CredentialStatus::RefreshNeeded
            }
            Some(_) => CredentialStatus::Valid,
        }
    }

    /// Periodic validity check. Ends the session once the credential has
    /// expired and publishes expiring-soon the first time it finds the
    /// credential inside the renewal threshold.
    pub fn heartbeat(&self, now: &DateTime<Local>) -> CredentialStatus {
        let status = self.check_status(now);
        let remaining = self.time_until_expiry(now).unwrap_or_default();

        match status {
            CredentialStatus::Expired => {
                self.expire(SessionEndReason::CredentialExpired);
            }
            CredentialStatus::RefreshNeeded => {
                let first = !std::mem::replace(&mut self.state().expiry_warned, true);
                if first {
                    warn!(remaining_secs = remaining.as_secs(), "Credential expiring soon");
                    self.events.publish(CredentialEvent::ExpiringSoon {
                        remaining_ms: remaining.as_millis() as u64,
                    });
                }
            }
            CredentialStatus::Valid => {
                debug!(remaining_mins = remaining.as_secs() / 60, "Session heartbeat");
            }
            CredentialStatus::NoCredential => {}
        }

        status
    }

    /// Access token for an outgoing call, renewing first when inside the
    /// threshold
    pub async fn valid_token(&self, now: DateTime<Local>) -> SessionResult<String> {
        match self.check_status(&now) {
            CredentialStatus::NoCredential => Err(SessionError::NoCredential),
            CredentialStatus::Expired => Err(SessionError::CredentialExpired),
            CredentialStatus::RefreshNeeded => self.refresh().await.map(|c| c.access_token),
            CredentialStatus::Valid => self.access_token().ok_or(SessionError::NoCredential),
        }
    }

    /// Renew the credential. Concurrent callers share one renewal.
    pub async fn refresh(&self) -> SessionResult<Credential> {
        // No lock is held past this point
        let begin = self.begin_flight();

        let (tx, flight, generation, refresh_token) = match begin {
            Begin::Join(rx) => {
                debug!("Joining in-flight renewal");
                return Self::join(rx).await;
            }
            Begin::NoCredential => return Err(SessionError::NoCredential),
            Begin::NoRefreshToken => {
                warn!("No refresh token; ending session");
                self.expire(SessionEndReason::MissingRefreshToken);
                return Err(SessionError::MissingRefreshToken);
            }
            Begin::Start {
                tx,
                flight,
                generation,
                refresh_token,
            } => (tx, flight, generation, refresh_token),
        };

        let _guard = FlightGuard {
            scheduler: self,
            flight,
        };

        let result = self.renew(&refresh_token, generation).await;
        tx.send_replace(Some(result.clone()));
        result
    }

    fn begin_flight(&self) -> Begin {
        let mut state = self.state();

        if let Some((_, rx)) = &state.in_flight {
            return Begin::Join(rx.clone());
        }

        state.timers.cancel(&CredentialTimer::Refresh);

        let Some(credential) = &state.credential else {
            return Begin::NoCredential;
        };
        let Some(refresh_token) = credential.refresh_token.clone() else {
            return Begin::NoRefreshToken;
        };

        let (tx, rx) = watch::channel(None);
        let flight = state.next_flight;
        state.next_flight += 1;
        state.in_flight = Some((flight, rx));
        Begin::Start {
            tx,
            flight,
            generation: state.generation,
            refresh_token,
        }
    }

    async fn join(mut rx: Flight) -> SessionResult<Credential> {
        loop {
            let current = rx.borrow().clone();
            if let Some(result) = current {
                return result;
            }
            if rx.changed().await.is_err() {
                let last = rx.borrow().clone();
                return last.unwrap_or(Err(SessionError::RenewalAbandoned));
            }
        }
    }

    fn generation(&self) -> u64 {
        self.state().generation
    }

    async fn renew(&self, refresh_token: &str, generation: u64) -> SessionResult<Credential> {
        let max_attempts = self.config.max_refresh_retries.max(1);
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            debug!(attempt, max_attempts, "Renewing credential");

            match self.api.renew(refresh_token).await {
                Ok(tokens) => {
                    let credential = Credential::from_tokens(tokens);
                    match credential.expires_at {
                        Some(expires_at) => {
                            return self.apply(credential, expires_at, attempt, generation);
                        }
                        None => {
                            warn!(attempt, "Renewed token has no readable expiry");
                            last_error = "renewed token has no readable expiry".into();
                        }
                    }
                }
                Err(e) if e.is_retryable() => {
                    warn!(attempt, error = %e, "Credential renewal attempt failed");
                    last_error = e.to_string();
                }
                Err(e) => {
                    warn!(error = %e, "Refresh credential rejected");
                    if self.generation() == generation {
                        self.expire(SessionEndReason::RefreshRejected);
                    }
                    return Err(SessionError::fatal_auth(e.to_string()));
                }
            }

            if attempt < max_attempts {
                tokio::time::sleep(self.config.backoff_for(attempt)).await;
            }
            if self.generation() != generation {
                debug!("Session changed during renewal");
                return Err(SessionError::RenewalAbandoned);
            }
        }

        error!(attempts = max_attempts, last_error = %last_error, "Credential renewal exhausted");
        if self.generation() == generation {
            self.expire(SessionEndReason::RenewalExhausted);
        }
        Err(SessionError::RenewalExhausted {
            attempts: max_attempts,
            last_error,
        })
    }

    fn apply(
        &self,
        credential: Credential,
        expires_at: DateTime<Local>,
        attempts: u32,
        generation: u64,
    ) -> SessionResult<Credential> {
        {
            let mut state = self.state();
            if state.generation != generation {
                return Err(SessionError::RenewalAbandoned);
            }
            state.credential = Some(credential.clone());
        }

        if let Err(e) = self.store.save_credential(&credential.tokens()) {
            warn!(error = %e, "Failed to persist renewed credential");
        }
        let _ = self
            .store
            .append_audit(AuditEvent::new(AuditEventType::CredentialRenewed {
                expires_at,
                attempts,
            }));

        info!(%expires_at, attempts, "Credential renewed");

        self.schedule_next(finguard_util::now(), MonotonicInstant::now());
        self.events.publish(CredentialEvent::Renewed { expires_at });
        Ok(credential)
    }

    /// Drop the credential and every timer. Publishes session-expired when
    /// there was a credential to drop.
    pub fn expire(&self, reason: SessionEndReason) -> bool {
        let had_credential = self.clear();

        if had_credential {
            let _ = self
                .store
                .append_audit(AuditEvent::new(AuditEventType::SessionExpired { reason }));
            warn!(?reason, "Session expired");
            self.events.publish(CredentialEvent::SessionExpired { reason });
        }

        had_credential
    }

    /// Explicit logout
    pub fn logout(&self) {
        let had_credential = self.clear();

        let _ = self.store.append_audit(AuditEvent::new(AuditEventType::LoggedOut));
        info!(had_credential, "Logged out");
        self.events.publish(CredentialEvent::LoggedOut);
    }

    fn clear(&self) -> bool {
        let had_credential = {
            let mut state = self.state();
            state.generation += 1;
            state.in_flight = None;
            state.expiry_warned = false;
            state.timers.cancel_all();
            state.credential.take().is_some()
        };

        if let Err(e) = self.store.clear_credential() {
            warn!(error = %e, "Failed to clear persisted credential");
        }

        had_credential
    }
}
