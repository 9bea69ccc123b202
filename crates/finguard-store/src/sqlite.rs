//! SQLite-based store implementation

use chrono::{DateTime, Local};
use finguard_api::{Notification, NotificationSettings, TokenPair};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::{AuditEvent, AuditEventType, Store, StoreError, StoreResult};

/// SQLite-based store
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a store at the given path
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        if let Some(parent) = path.as_ref().parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("connection lock poisoned".into()))
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            -- Audit log (append-only)
            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                event_json TEXT NOT NULL
            );

            -- Credential (single row)
            CREATE TABLE IF NOT EXISTS credential (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                access_token TEXT NOT NULL,
                refresh_token TEXT
            );

            -- Notification settings (single row)
            CREATE TABLE IF NOT EXISTS settings (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                settings_json TEXT NOT NULL
            );

            -- Notification history
            CREATE TABLE IF NOT EXISTS notifications (
                id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL,
                notification_json TEXT NOT NULL
            );

            -- Indexes
            CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_log(timestamp);
            CREATE INDEX IF NOT EXISTS idx_notifications_created ON notifications(created_at);
            "#,
        )?;

        debug!("Store schema initialized");
        Ok(())
    }
}

impl Store for SqliteStore {
    fn append_audit(&self, mut event: AuditEvent) -> StoreResult<()> {
        let conn = self.conn()?;
        let event_json = serde_json::to_string(&event.event)?;

        conn.execute(
            "INSERT INTO audit_log (timestamp, event_json) VALUES (?, ?)",
            params![event.timestamp.to_rfc3339(), event_json],
        )?;

        event.id = conn.last_insert_rowid();
        debug!(event_id = event.id, "Audit event appended");

        Ok(())
    }

    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            "SELECT id, timestamp, event_json FROM audit_log ORDER BY id DESC LIMIT ?",
        )?;

        let rows = stmt.query_map([limit], |row| {
            let id: i64 = row.get(0)?;
            let timestamp_str: String = row.get(1)?;
            let event_json: String = row.get(2)?;
            Ok((id, timestamp_str, event_json))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (id, timestamp_str, event_json) = row?;
            let timestamp = DateTime::parse_from_rfc3339(&timestamp_str)
                .map(|dt| dt.with_timezone(&Local))
                .unwrap_or_else(|_| finguard_util::now());
            let event: AuditEventType = serde_json::from_str(&event_json)?;

            events.push(AuditEvent {
                id,
                timestamp,
                event,
            });
        }

        Ok(events)
    }

    fn load_credential(&self) -> StoreResult<Option<TokenPair>> {
        let conn = self.conn()?;

        let row: Option<(String, Option<String>)> = conn
            .query_row(
                "SELECT access_token, refresh_token FROM credential WHERE id = 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        Ok(row.map(|(access_token, refresh_token)| TokenPair {
            access_token,
            refresh_token,
        }))
    }

    fn save_credential(&self, tokens: &TokenPair) -> StoreResult<()> {
        let conn = self.conn()?;

        conn.execute(
            r#"
            INSERT INTO credential (id, access_token, refresh_token)
            VALUES (1, ?, ?)
            ON CONFLICT(id)
            DO UPDATE SET access_token = excluded.access_token,
                          refresh_token = excluded.refresh_token
            "#,
            params![tokens.access_token, tokens.refresh_token],
        )?;

        debug!("Credential saved");
        Ok(())
    }

    fn clear_credential(&self) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM credential", [])?;
        Ok(())
    }

    fn load_settings(&self) -> StoreResult<Option<NotificationSettings>> {
        let conn = self.conn()?;

        let json: Option<String> = conn
            .query_row("SELECT settings_json FROM settings WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()?;

        match json {
            Some(s) => Ok(Some(serde_json::from_str(&s)?)),
            None => Ok(None),
        }
    }

    fn save_settings(&self, settings: &NotificationSettings) -> StoreResult<()> {
        let conn = self.conn()?;
        let json = serde_json::to_string(settings)?;

        conn.execute(
            r#"
            INSERT INTO settings (id, settings_json)
            VALUES (1, ?)
            ON CONFLICT(id)
            DO UPDATE SET settings_json = excluded.settings_json
            "#,
            [json],
        )?;

        debug!("Settings saved");
        Ok(())
    }

    fn load_notifications(&self) -> StoreResult<Vec<Notification>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            "SELECT notification_json FROM notifications ORDER BY created_at DESC, rowid DESC",
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut notifications = Vec::new();
        for row in rows {
            let json = row?;
            match serde_json::from_str::<Notification>(&json) {
                Ok(n) => notifications.push(n),
                Err(e) => warn!(error = %e, "Skipping unreadable notification row"),
            }
        }

        Ok(notifications)
    }

    fn save_notifications(&self, notifications: &[Notification]) -> StoreResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM notifications", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO notifications (id, created_at, notification_json) VALUES (?, ?, ?)",
            )?;
            // Insert oldest first so rowid breaks created_at ties newest-last
            for n in notifications.iter().rev() {
                let json = serde_json::to_string(n)?;
                stmt.execute(params![n.id.to_string(), n.created_at.to_rfc3339(), json])?;
            }
        }
        tx.commit()?;

        debug!(count = notifications.len(), "Notification history saved");
        Ok(())
    }

    fn is_healthy(&self) -> bool {
        match self.conn.lock() {
            Ok(conn) => conn.query_row("SELECT 1", [], |_| Ok(())).is_ok(),
            Err(_) => {
                warn!("Store lock poisoned");
                false
            }
        }
    }
}
