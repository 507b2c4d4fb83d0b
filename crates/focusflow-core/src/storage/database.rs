//! SQLite-based session storage.
//!
//! Provides persistent, append-only storage for session records produced by
//! the timer coordinator. Statistics are computed from the listed records by
//! [`crate::stats`].

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::data_dir;
use crate::error::{DatabaseError, Result};
use crate::timer::Phase;

/// One finished or aborted interval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: i64,
    pub start_time_ms: i64,
    pub duration_minutes: u32,
    pub phase: Phase,
    /// `false` when the user stopped the interval before it ran out.
    pub completed: bool,
}

impl SessionRecord {
    pub fn started_at(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.start_time_ms)
            .single()
            .unwrap_or_default()
    }
}

/// SQLite database for session storage.
///
/// Cloning shares the same connection; every statement runs under one lock,
/// so readers never observe a half-written row.
#[derive(Clone)]
pub struct SessionStore {
    conn: Arc<Mutex<Connection>>,
}

impl SessionStore {
    /// Open the database at `<data dir>/focusflow.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open_default() -> Result<Self> {
        Self::open(data_dir()?.join("focusflow.db"))
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        self.lock().execute_batch(
            "CREATE TABLE IF NOT EXISTS sessions (
                id            INTEGER PRIMARY KEY,
                start_time_ms INTEGER NOT NULL,
                duration_min  INTEGER NOT NULL,
                phase         TEXT NOT NULL,
                completed     INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_start_time ON sessions(start_time_ms);",
        )?;
        Ok(())
    }

    /// Append a record. Re-appending the same id is ignored.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub fn append(&self, record: &SessionRecord) -> Result<()> {
        self.lock().execute(
            "INSERT OR IGNORE INTO sessions (id, start_time_ms, duration_min, phase, completed)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.id,
                record.start_time_ms,
                record.duration_minutes,
                record.phase.as_str(),
                record.completed,
            ],
        )?;
        Ok(())
    }

    /// All records, newest first.
    pub fn list(&self) -> Result<Vec<SessionRecord>> {
        self.query(
            "SELECT id, start_time_ms, duration_min, phase, completed
             FROM sessions
             ORDER BY start_time_ms DESC, id DESC",
            params![],
        )
    }

    /// Records that started at or after `since_ms`, newest first.
    pub fn list_since(&self, since_ms: i64) -> Result<Vec<SessionRecord>> {
        self.query(
            "SELECT id, start_time_ms, duration_min, phase, completed
             FROM sessions
             WHERE start_time_ms >= ?1
             ORDER BY start_time_ms DESC, id DESC",
            params![since_ms],
        )
    }

    pub fn count(&self) -> Result<u64> {
        let n = self
            .lock()
            .query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get::<_, i64>(0))?;
        Ok(n.max(0) as u64)
    }

    /// Delete every record. Returns how many were removed.
    pub fn clear(&self) -> Result<usize> {
        let removed = self.lock().execute("DELETE FROM sessions", [])?;
        info!(removed, "session log cleared");
        Ok(removed)
    }

    fn query(&self, sql: &str, params: &[&dyn rusqlite::ToSql]) -> Result<Vec<SessionRecord>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, u32>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, bool>(4)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (id, start_time_ms, duration_minutes, phase, completed) = row?;
            let phase = Phase::parse(&phase).ok_or_else(|| DatabaseError::CorruptRow {
                id,
                message: format!("unknown phase '{phase}'"),
            })?;
            records.push(SessionRecord {
                id,
                start_time_ms,
                duration_minutes,
                phase,
                completed,
            });
        }
        Ok(records)
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Forward coordinator session events into `store` until the sender closes.
///
/// Records are appended in arrival order, each synchronous SQLite write on
/// the blocking pool. Failed appends are logged and dropped.
pub fn spawn_recorder(
    store: SessionStore,
    mut sessions: mpsc::UnboundedReceiver<SessionRecord>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(record) = sessions.recv().await {
            let db = store.clone();
            let id = record.id;
            let written = tokio::task::spawn_blocking(move || {
                let result = db.append(&record);
                (record, result)
            })
            .await;
            match written {
                Ok((record, Ok(()))) => info!(
                    id = record.id,
                    phase = record.phase.as_str(),
                    minutes = record.duration_minutes,
                    completed = record.completed,
                    "session recorded"
                ),
                Ok((record, Err(e))) => error!(id = record.id, "failed to record session: {e}"),
                Err(e) => error!(id, "session write did not complete: {e}"),
            }
        }
    })
}
