//! Thread-safe SQLite connection wrapper with durability pragmas and
//! scoped transactions.
//!
//! One process holds one connection, guarded by a `parking_lot::Mutex`
//! (rusqlite connections are not `Sync`). Cross-process coordination is the
//! lock coordinator's job; within the process every operation serializes on
//! the mutex, which matches the single-writer desktop model.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::Connection;
use tracing::info;

use crate::errors::{Result, StoreError};

/// Connection tuning applied on open.
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    /// Busy timeout in milliseconds (default: 30000). Transient contention
    /// from another process resolves by waiting, not failing.
    pub busy_timeout_ms: u32,
    /// Page cache size in KiB (default: 8192 = 8 MB).
    pub cache_size_kib: i64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 30_000,
            cache_size_kib: 8192,
        }
    }
}

fn pragma_sql(config: &ConnectionConfig) -> String {
    // synchronous = NORMAL is a deliberate durability/throughput trade-off:
    // WAL guarantees write-ahead ordering, and a power loss can cost at most
    // the last checkpoint, never a torn page.
    format!(
        "PRAGMA journal_mode = WAL;\
         PRAGMA foreign_keys = ON;\
         PRAGMA busy_timeout = {};\
         PRAGMA cache_size = -{};\
         PRAGMA synchronous = NORMAL;",
        config.busy_timeout_ms, config.cache_size_kib
    )
}

/// Shared handle to the embedded database.
#[derive(Debug)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
}

impl Database {
    /// Open or create a database file and apply pragmas.
    ///
    /// Does not touch the schema; callers run the migrator before serving
    /// reads or writes.
    pub fn open(path: &Path, config: &ConnectionConfig) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(&pragma_sql(config))?;

        info!(path = %path.display(), "database opened");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: path.to_owned(),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(&pragma_sql(&ConnectionConfig::default()))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: PathBuf::from(":memory:"),
        })
    }

    /// Execute a closure with the connection. Read paths use this directly;
    /// no transaction is opened.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock();
        f(&conn)
    }

    /// Execute a closure inside a transaction.
    ///
    /// Commits on `Ok`; rolls back on `Err` and propagates the body's error
    /// unchanged. Every multi-statement write path goes through here so the
    /// domain write and its audit entry commit atomically.
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock();
        let tx = conn.unchecked_transaction()?;
        match f(&tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(e) => {
                // Explicit rollback so a rollback failure doesn't mask the
                // body's error silently.
                if let Err(rb) = tx.rollback() {
                    tracing::warn!(error = %rb, "rollback failed after write error");
                }
                Err(e)
            }
        }
    }

    /// Path this database was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
            path: self.path.clone(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
