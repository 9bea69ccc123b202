//! Store trait definitions

use finguard_api::{Notification, NotificationSettings, TokenPair};

use crate::{AuditEvent, StoreResult};

/// Persistence capability shared by the session components
pub trait Store: Send + Sync {
    // Audit log

    /// Append an audit event
    fn append_audit(&self, event: AuditEvent) -> StoreResult<()>;

    /// Get recent audit events, newest first
    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>>;

    // Credential

    /// Load the persisted token pair
    fn load_credential(&self) -> StoreResult<Option<TokenPair>>;

    /// Replace the persisted token pair
    fn save_credential(&self, tokens: &TokenPair) -> StoreResult<()>;

    /// Remove the persisted token pair
    fn clear_credential(&self) -> StoreResult<()>;

    // Notification settings

    /// Load saved settings. None until the user saves once.
    fn load_settings(&self) -> StoreResult<Option<NotificationSettings>>;

    /// Save settings
    fn save_settings(&self, settings: &NotificationSettings) -> StoreResult<()>;

    // Notification history

    /// Load history, newest first
    fn load_notifications(&self) -> StoreResult<Vec<Notification>>;

    /// Replace the whole history
    fn save_notifications(&self, notifications: &[Notification]) -> StoreResult<()>;

    // Health

    /// Check if store is healthy
    fn is_healthy(&self) -> bool;
}
