//! Durable record store
//!
//! Backs the confirmation gate and the per-conversation concurrency
//! controller: dedup markers, leased conversation locks, and pending actions.
//! All access is read-then-write without cross-record transactions; the
//! invariants (at-most-once execution of a pending action, at-most-one live
//! lock) are maintained by delete-before-execute and create-before-proceed.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS dedup_markers (
    event_id   TEXT PRIMARY KEY,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS conversation_locks (
    conversation_id TEXT PRIMARY KEY,
    created_at      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS pending_actions (
    id              TEXT PRIMARY KEY,
    conversation_id TEXT NOT NULL,
    tool_name       TEXT NOT NULL,
    input           TEXT NOT NULL,
    created_at      TEXT NOT NULL,
    expires_at      TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_pending_conversation
    ON pending_actions (conversation_id, created_at);
";

/// A gated tool request awaiting approval or rejection
#[derive(Debug, Clone, PartialEq)]
pub struct PendingAction {
    pub id: String,
    pub conversation_id: String,
    pub tool_name: String,
    pub input: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Outcome of a lock acquisition attempt
pub enum LockAcquire {
    /// Lock written; released when the guard drops
    Acquired(LockGuard),
    /// A younger-than-TTL lock exists - another turn is in flight
    Busy,
}

/// RAII lease on a conversation. Deletes the lock row on drop, so the lock
/// is released on every exit path.
pub struct LockGuard {
    store: RecordStore,
    conversation_id: String,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = self.store.release_lock(&self.conversation_id) {
            tracing::warn!(
                conversation_id = %self.conversation_id,
                error = %e,
                "Failed to release conversation lock"
            );
        }
    }
}

/// Thread-safe store handle
#[derive(Clone)]
pub struct RecordStore {
    conn: Arc<Mutex<Connection>>,
}

impl RecordStore {
    /// Open or create the store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.run_migrations()?;
        Ok(store)
    }

    /// Open an in-memory store (for testing)
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.run_migrations()?;
        Ok(store)
    }

    fn run_migrations(&self) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    // ==================== Dedup Markers ====================

    /// Attempt to create the write-once marker for an inbound event.
    ///
    /// Returns `true` when the marker was created (first delivery) and
    /// `false` when it already existed (duplicate delivery).
    pub fn try_create_dedup_marker(&self, event_id: &str) -> StoreResult<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "INSERT OR IGNORE INTO dedup_markers (event_id, created_at) VALUES (?1, ?2)",
            params![event_id, Utc::now().to_rfc3339()],
        )?;
        Ok(changed == 1)
    }

    // ==================== Conversation Locks ====================

    /// Acquire the leased lock for a conversation.
    ///
    /// A lock younger than `ttl` means another turn is in flight. A stale
    /// lock (a crashed turn whose cleanup never ran) is overwritten.
    pub fn acquire_lock(&self, conversation_id: &str, ttl: Duration) -> StoreResult<LockAcquire> {
        let now = Utc::now();
        {
            let conn = self.conn.lock().unwrap();

            let existing: Option<String> = conn
                .query_row(
                    "SELECT created_at FROM conversation_locks WHERE conversation_id = ?1",
                    params![conversation_id],
                    |row| row.get(0),
                )
                .map(Some)
                .or_else(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => Ok(None),
                    other => Err(other),
                })?;

            if let Some(created_at) = existing {
                let age = parse_datetime(&created_at)
                    .map(|t| now.signed_duration_since(t))
                    .and_then(|d| d.to_std().ok());
                match age {
                    Some(age) if age < ttl => return Ok(LockAcquire::Busy),
                    _ => {
                        tracing::warn!(
                            conversation_id,
                            "Overwriting stale conversation lock"
                        );
                    }
                }
            }

            conn.execute(
                "INSERT OR REPLACE INTO conversation_locks (conversation_id, created_at)
                 VALUES (?1, ?2)",
                params![conversation_id, now.to_rfc3339()],
            )?;
        }

        Ok(LockAcquire::Acquired(LockGuard {
            store: self.clone(),
            conversation_id: conversation_id.to_string(),
        }))
    }

    fn release_lock(&self, conversation_id: &str) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM conversation_locks WHERE conversation_id = ?1",
            params![conversation_id],
        )?;
        Ok(())
    }

    /// Write a lock row with an explicit timestamp. Used by tests to simulate
    /// in-flight and crashed turns.
    #[allow(dead_code)] // Used in tests
    pub fn write_lock_at(
        &self,
        conversation_id: &str,
        created_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO conversation_locks (conversation_id, created_at)
             VALUES (?1, ?2)",
            params![conversation_id, created_at.to_rfc3339()],
        )?;
        Ok(())
    }

    // ==================== Pending Actions ====================

    /// Persist a new pending action
    pub fn insert_pending_action(&self, action: &PendingAction) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO pending_actions (id, conversation_id, tool_name, input, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                action.id,
                action.conversation_id,
                action.tool_name,
                action.input.to_string(),
                action.created_at.to_rfc3339(),
                action.expires_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Atomically claim the most recently created non-expired pending action
    /// for a conversation: the record is deleted before it is returned, so
    /// concurrent approve/approve or approve/reject races are resolved by
    /// first-successful-delete-wins.
    ///
    /// Expired records encountered on this read path are deleted lazily.
    pub fn take_latest_pending(&self, conversation_id: &str) -> StoreResult<Option<PendingAction>> {
        let now = Utc::now();
        let conn = self.conn.lock().unwrap();

        // Lazy expiry
        conn.execute(
            "DELETE FROM pending_actions WHERE conversation_id = ?1 AND expires_at <= ?2",
            params![conversation_id, now.to_rfc3339()],
        )?;

        let action = conn
            .query_row(
                "SELECT id, conversation_id, tool_name, input, created_at, expires_at
                 FROM pending_actions
                 WHERE conversation_id = ?1
                 ORDER BY created_at DESC, id DESC
                 LIMIT 1",
                params![conversation_id],
                row_to_pending,
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;

        let Some(action) = action else {
            return Ok(None);
        };

        // First successful delete wins; a raced loser observes nothing to act on
        let deleted = conn.execute(
            "DELETE FROM pending_actions WHERE id = ?1",
            params![action.id],
        )?;
        if deleted == 1 {
            Ok(Some(action))
        } else {
            Ok(None)
        }
    }

    /// Count live (non-expired) pending actions for a conversation
    pub fn count_pending(&self, conversation_id: &str) -> StoreResult<u64> {
        let conn = self.conn.lock().unwrap();
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM pending_actions
             WHERE conversation_id = ?1 AND expires_at > ?2",
            params![conversation_id, Utc::now().to_rfc3339()],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

fn row_to_pending(row: &rusqlite::Row<'_>) -> rusqlite::Result<PendingAction> {
    let input_json: String = row.get(3)?;
    let created_at: String = row.get(4)?;
    let expires_at: String = row.get(5)?;
    Ok(PendingAction {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        tool_name: row.get(2)?,
        input: serde_json::from_str(&input_json).unwrap_or(serde_json::Value::Null),
        created_at: parse_datetime(&created_at).unwrap_or_else(Utc::now),
        expires_at: parse_datetime(&expires_at).unwrap_or_else(Utc::now),
    })
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
