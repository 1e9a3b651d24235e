//! PersistentStore: SQLite-backed key/value storage for cached configuration.
//!
//! Reads are soft-failing by contract: a missing row, a kind mismatch or a
//! driver error all degrade to the caller's default, never to an error. All
//! writes go through a [`BatchEditor`] so that N staged entries cost one
//! commit instead of N.

use crate::error::{StoreError, StoreResult};
use crate::schema::{self, CACHE_SCHEMA};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::warn;

/// Durable key/value store surviving process restarts.
#[derive(Clone)]
pub struct PersistentStore {
    conn: Arc<Mutex<Connection>>,
    commits: Arc<AtomicU64>,
}

impl PersistentStore {
    /// Open a file-backed store.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path).map_err(|e| StoreError::Open {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::init_connection(&conn)?;
        Ok(Self::from_connection(conn))
    }

    /// Create an in-memory store (for testing).
    pub fn memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_connection(&conn)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            commits: Arc::new(AtomicU64::new(0)),
        }
    }

    fn init_connection(conn: &Connection) -> StoreResult<()> {
        // WAL mode for file-backed DBs (no-op for in-memory)
        let _ = conn.execute("PRAGMA journal_mode = WAL", []);
        conn.execute_batch(CACHE_SCHEMA)?;
        Ok(())
    }

    /// Read a boolean, falling back to `default` on missing or corrupt data.
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.int_raw(key, schema::KIND_BOOL)
            .map(|v| v != 0)
            .unwrap_or(default)
    }

    /// Read a 32-bit integer, falling back to `default`.
    pub fn get_i32(&self, key: &str, default: i32) -> i32 {
        self.int_raw(key, schema::KIND_INT)
            .and_then(|v| i32::try_from(v).ok())
            .unwrap_or(default)
    }

    /// Read a 64-bit integer, falling back to `default`.
    pub fn get_i64(&self, key: &str, default: i64) -> i64 {
        self.int_raw(key, schema::KIND_LONG).unwrap_or(default)
    }

    /// Read a string, falling back to `default`.
    pub fn get_string(&self, key: &str, default: &str) -> String {
        self.text_raw(key, schema::KIND_STRING)
            .unwrap_or_else(|| default.to_string())
    }

    /// Whether any entry exists under `key`, regardless of kind.
    pub fn contains(&self, key: &str) -> bool {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT 1 FROM cached_values WHERE key = ?1",
                [key],
                |_| Ok(()),
            )
            .optional();
        match row {
            Ok(found) => found.is_some(),
            Err(e) => {
                warn!(key = %key, error = %e, "existence check failed");
                false
            }
        }
    }

    /// Open a staging editor. Nothing touches the database until `commit`.
    pub fn batch(&self) -> BatchEditor {
        BatchEditor {
            store: self.clone(),
            staged: Vec::new(),
        }
    }

    /// Number of successful batch commits on this store (for testing/debugging).
    pub fn commit_count(&self) -> u64 {
        self.commits.load(Ordering::Relaxed)
    }

    /// Boolean read that keeps "absent or corrupt" distinguishable from a
    /// stored value. Safe-mode bookkeeping needs the difference.
    pub(crate) fn try_get_bool(&self, key: &str) -> Option<bool> {
        self.int_raw(key, schema::KIND_BOOL).map(|v| v != 0)
    }

    fn int_raw(&self, key: &str, kind: &str) -> Option<i64> {
        let (stored_kind, int_value, _) = self.read_row(key)?;
        if stored_kind != kind {
            warn!(key = %key, stored = %stored_kind, expected = kind, "cached value kind mismatch, using default");
            return None;
        }
        if int_value.is_none() {
            warn!(key = %key, "cached value has no integer payload, using default");
        }
        int_value
    }

    fn text_raw(&self, key: &str, kind: &str) -> Option<String> {
        let (stored_kind, _, text_value) = self.read_row(key)?;
        if stored_kind != kind {
            warn!(key = %key, stored = %stored_kind, expected = kind, "cached value kind mismatch, using default");
            return None;
        }
        if text_value.is_none() {
            warn!(key = %key, "cached value has no text payload, using default");
        }
        text_value
    }

    #[allow(clippy::type_complexity)]
    fn read_row(&self, key: &str) -> Option<(String, Option<i64>, Option<String>)> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT kind, int_value, text_value FROM cached_values WHERE key = ?1",
                [key],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional();
        match row {
            Ok(r) => r,
            Err(e) => {
                warn!(key = %key, error = %e, "cached value read failed, using default");
                None
            }
        }
    }
}

enum Staged {
    Int { kind: &'static str, value: i64 },
    Text { kind: &'static str, value: String },
    Remove,
}

/// Staging object for batched writes. Later puts for the same key win.
pub struct BatchEditor {
    store: PersistentStore,
    staged: Vec<(String, Staged)>,
}

impl BatchEditor {
    /// Stage a boolean.
    pub fn put_bool(&mut self, key: &str, value: bool) {
        self.stage_int(key, schema::KIND_BOOL, i64::from(value));
    }

    /// Stage a 32-bit integer.
    pub fn put_i32(&mut self, key: &str, value: i32) {
        self.stage_int(key, schema::KIND_INT, i64::from(value));
    }

    /// Stage a 64-bit integer.
    pub fn put_i64(&mut self, key: &str, value: i64) {
        self.stage_int(key, schema::KIND_LONG, value);
    }

    /// Stage a string.
    pub fn put_string(&mut self, key: &str, value: &str) {
        self.staged.push((
            key.to_string(),
            Staged::Text {
                kind: schema::KIND_STRING,
                value: value.to_string(),
            },
        ));
    }

    /// Stage removal of an entry.
    pub fn remove(&mut self, key: &str) {
        self.staged.push((key.to_string(), Staged::Remove));
    }

    /// Number of staged entries.
    pub fn len(&self) -> usize {
        self.staged.len()
    }

    /// True when nothing has been staged.
    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    fn stage_int(&mut self, key: &str, kind: &'static str, value: i64) {
        self.staged.push((key.to_string(), Staged::Int { kind, value }));
    }

    /// Apply every staged entry in one transaction.
    pub fn commit(self) -> StoreResult<()> {
        let staged = self.staged;
        let conn = self.store.conn.lock().unwrap();

        // BEGIN IMMEDIATE acquires the write lock up front
        conn.execute("BEGIN IMMEDIATE", [])?;

        let result = Self::apply(&conn, &staged).map_err(|e| StoreError::Commit {
            staged: staged.len(),
            reason: e.to_string(),
        });

        match &result {
            Ok(()) => {
                conn.execute("COMMIT", [])?;
                self.store.commits.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                let _ = conn.execute("ROLLBACK", []);
            }
        }

        result
    }

    fn apply(conn: &Connection, staged: &[(String, Staged)]) -> Result<(), rusqlite::Error> {
        for (key, entry) in staged {
            match entry {
                Staged::Int { kind, value } => {
                    conn.execute(
                        "INSERT OR REPLACE INTO cached_values (key, kind, int_value, text_value) \
                         VALUES (?1, ?2, ?3, NULL)",
                        params![key, kind, value],
                    )?;
                }
                Staged::Text { kind, value } => {
                    conn.execute(
                        "INSERT OR REPLACE INTO cached_values (key, kind, int_value, text_value) \
                         VALUES (?1, ?2, NULL, ?3)",
                        params![key, kind, value],
                    )?;
                }
                Staged::Remove => {
                    conn.execute("DELETE FROM cached_values WHERE key = ?1", [key])?;
                }
            }
        }
        Ok(())
    }
}
