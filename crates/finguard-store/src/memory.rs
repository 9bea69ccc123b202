//! Ephemeral in-process store

use finguard_api::{Notification, NotificationSettings, TokenPair};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::{AuditEvent, Store, StoreError, StoreResult};

#[derive(Default)]
struct MemoryState {
    audits: Vec<AuditEvent>,
    credential: Option<TokenPair>,
    settings: Option<NotificationSettings>,
    notifications: Vec<Notification>,
}

/// Store that keeps everything in process memory
///
/// Writes can be made to fail on demand, which lets tests exercise the
/// persistence-failure paths.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail with [`StoreError::Unavailable`]
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn state(&self) -> StoreResult<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))
    }

    fn writable(&self) -> StoreResult<MutexGuard<'_, MemoryState>> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("writes disabled".into()));
        }
        self.state()
    }
}

impl Store for MemoryStore {
    fn append_audit(&self, mut event: AuditEvent) -> StoreResult<()> {
        let mut state = self.writable()?;
        event.id = state.audits.len() as i64 + 1;
        state.audits.push(event);
        Ok(())
    }

    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>> {
        let state = self.state()?;
        Ok(state.audits.iter().rev().take(limit).cloned().collect())
    }

    fn load_credential(&self) -> StoreResult<Option<TokenPair>> {
        Ok(self.state()?.credential.clone())
    }

    fn save_credential(&self, tokens: &TokenPair) -> StoreResult<()> {
        self.writable()?.credential = Some(tokens.clone());
        Ok(())
    }

    fn clear_credential(&self) -> StoreResult<()> {
        self.writable()?.credential = None;
        Ok(())
    }

    fn load_settings(&self) -> StoreResult<Option<NotificationSettings>> {
        Ok(self.state()?.settings.clone())
    }

    fn save_settings(&self, settings: &NotificationSettings) -> StoreResult<()> {
        self.writable()?.settings = Some(settings.clone());
        Ok(())
    }

    fn load_notifications(&self) -> StoreResult<Vec<Notification>> {
        Ok(self.state()?.notifications.clone())
    }

    fn save_notifications(&self, notifications: &[Notification]) -> StoreResult<()> {
        self.writable()?.notifications = notifications.to_vec();
        Ok(())
    }

    fn is_healthy(&self) -> bool {
        self.state.lock().is_ok() && !self.fail_writes.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AuditEventType;

    #[test]
    fn credential_round_trip() {
        let store = MemoryStore::new();
        store
            .save_credential(&TokenPair::new("a.b.c", Some("r".into())))
            .unwrap();
        assert_eq!(store.load_credential().unwrap().unwrap().access_token, "a.b.c");

        store.clear_credential().unwrap();
        assert!(store.load_credential().unwrap().is_none());
    }

    #[test]
    fn audits_newest_first() {
        let store = MemoryStore::new();
        store
            .append_audit(AuditEvent::new(AuditEventType::AgentStarted))
            .unwrap();
        store
            .append_audit(AuditEvent::new(AuditEventType::LoggedOut))
            .unwrap();

        let audits = store.get_recent_audits(1).unwrap();
        assert_eq!(audits.len(), 1);
        assert_eq!(audits[0].event, AuditEventType::LoggedOut);
        assert_eq!(audits[0].id, 2);
    }

    #[test]
    fn failing_writes_keep_reads_working() {
        let store = MemoryStore::new();
        store.save_settings(&NotificationSettings::default()).unwrap();

        store.set_fail_writes(true);
        assert!(!store.is_healthy());
        assert!(matches!(
            store.save_settings(&NotificationSettings::default()),
            Err(StoreError::Unavailable(_))
        ));
        assert!(store.load_settings().unwrap().is_some());

        store.set_fail_writes(false);
        assert!(store.is_healthy());
    }
}
