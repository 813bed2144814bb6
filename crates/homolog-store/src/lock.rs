//! Single-writer admission gate: an advisory side-car lock file.
//!
//! The lock guards the database *file*, not rows. `<db>.lock` holds a JSON
//! record with the holder's pid, a random token, and a heartbeat timestamp
//! refreshed by a background thread. Staleness is defined by the heartbeat:
//! a record whose `heartbeat_at` is older than the configured threshold is
//! treated as abandoned (the holder crashed) and cleaned up by the next
//! acquirer. Unreadable or corrupt lock files count as stale.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::{Result, StoreError};

/// Pause between acquisition retries after a stale-lock claim, so the loop
/// never spins hot against a contended file.
const RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// Lock tuning.
#[derive(Clone, Debug)]
pub struct LockConfig {
    /// How often the holder refreshes the heartbeat (default: 5 s).
    pub heartbeat_interval: Duration,
    /// Heartbeat age beyond which a lock counts as stale (default: 30 s).
    pub stale_after: Duration,
    /// Deadline for the whole acquisition attempt (default: 10 s). Bounds
    /// the retry loop after stale-lock cleanup so the caller never hangs.
    pub acquire_timeout: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(5),
            stale_after: Duration::from_secs(30),
            acquire_timeout: Duration::from_secs(10),
        }
    }
}

/// Contents of the side-car lock file.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct LockRecord {
    pid: u32,
    token: String,
    acquired_at: String,
    heartbeat_at: String,
}

impl LockRecord {
    fn fresh(token: &str) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            pid: std::process::id(),
            token: token.to_string(),
            acquired_at: now.clone(),
            heartbeat_at: now,
        }
    }

    fn is_stale(&self, stale_after: Duration) -> bool {
        let Ok(beat) = chrono::DateTime::parse_from_rfc3339(&self.heartbeat_at) else {
            return true;
        };
        let age = chrono::Utc::now().signed_duration_since(beat.with_timezone(&chrono::Utc));
        age.to_std().is_ok_and(|age| age > stale_after)
    }
}

/// Exclusive write-access handle for one database file.
///
/// Holds the side-car lock until dropped. Dropping stops the heartbeat and
/// removes the lock file if this guard still owns it.
#[derive(Debug)]
pub struct LockGuard {
    lock_path: PathBuf,
    token: String,
    stop_tx: Option<mpsc::Sender<()>>,
    heartbeat: Option<JoinHandle<()>>,
}

/// Side-car lock coordinator for a database file.
pub struct LockFile;

impl LockFile {
    /// Acquire exclusive write access to `db_path`.
    ///
    /// Fails fast with [`StoreError::PermissionDenied`] when the containing
    /// directory is not writable, and with [`StoreError::LockHeld`] when a
    /// live instance owns the lock. A stale lock is removed and acquisition
    /// retried. The whole attempt is bounded by
    /// [`LockConfig::acquire_timeout`]; on expiry the error is retryable
    /// ([`StoreError::Unavailable`]).
    pub fn acquire(db_path: &Path, config: &LockConfig) -> Result<LockGuard> {
        let dir = db_path.parent().unwrap_or_else(|| Path::new("."));
        check_dir_writable(dir)?;

        let lock_path = lock_path_for(db_path);
        let token = new_token();
        let deadline = Instant::now() + config.acquire_timeout;

        let record = loop {
            match try_create(&lock_path, &token) {
                Ok(record) => break record,
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    match read_record(&lock_path) {
                        Some(record) if !record.is_stale(config.stale_after) => {
                            debug!(pid = record.pid, path = %lock_path.display(), "live lock held");
                            return Err(StoreError::LockHeld { pid: record.pid });
                        }
                        record => {
                            // Stale or unreadable: claim it and retry.
                            warn!(
                                path = %lock_path.display(),
                                stale_pid = record.as_ref().map(|r| r.pid),
                                "claiming stale lock file"
                            );
                            claim_stale(&lock_path, record.as_ref())?;
                        }
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                    return Err(StoreError::PermissionDenied(format!(
                        "cannot create lock file {}",
                        lock_path.display()
                    )));
                }
                Err(e) => return Err(StoreError::Io(e)),
            }

            if Instant::now() >= deadline {
                return Err(StoreError::Unavailable(format!(
                    "lock acquisition timed out after {:?}",
                    config.acquire_timeout
                )));
            }
            std::thread::sleep(RETRY_INTERVAL);
        };

        info!(path = %lock_path.display(), "lock acquired");

        let (stop_tx, stop_rx) = mpsc::channel();
        let heartbeat = spawn_heartbeat(lock_path.clone(), record, config.heartbeat_interval, stop_rx);

        Ok(LockGuard {
            lock_path,
            token,
            stop_tx: Some(stop_tx),
            heartbeat: Some(heartbeat),
        })
    }
}

impl LockGuard {
    /// Path of the side-car lock file.
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Release the lock explicitly. Equivalent to dropping the guard.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            // A closed channel also wakes the thread; ignore send errors.
            let _ = tx.send(());
        }
        if let Some(handle) = self.heartbeat.take() {
            let _ = handle.join();
        }
        // Only remove the file if we still own it; a stale-cleanup race may
        // have handed it to another instance.
        match read_record(&self.lock_path) {
            Some(record) if record.token == self.token => {
                if let Err(e) = std::fs::remove_file(&self.lock_path) {
                    warn!(error = %e, path = %self.lock_path.display(), "failed to remove lock file");
                } else {
                    debug!(path = %self.lock_path.display(), "lock released");
                }
            }
            _ => {}
        }
    }
}

/// Side-car path for a database file: `<db_path>.lock`.
pub fn lock_path_for(db_path: &Path) -> PathBuf {
    let mut name = db_path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

/// Fail fast with a distinguishable error when `dir` is not writable.
fn check_dir_writable(dir: &Path) -> Result<()> {
    let probe = dir.join(format!(".homolog-write-probe-{}", std::process::id()));
    match std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&probe)
    {
        Ok(file) => {
            drop(file);
            let _ = std::fs::remove_file(&probe);
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => Err(
            StoreError::PermissionDenied(format!("directory not writable: {}", dir.display())),
        ),
        Err(e) => Err(StoreError::Io(e)),
    }
}

/// Atomically create the lock file with a fresh record. `create_new` makes
/// creation the mutual-exclusion point. Returns the record written, which
/// the heartbeat keeps refreshing.
fn try_create(lock_path: &Path, token: &str) -> std::io::Result<LockRecord> {
    let record = LockRecord::fresh(token);
    let body = serde_json::to_vec_pretty(&record).unwrap_or_default();
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(lock_path)?;
    file.write_all(&body)?;
    file.sync_all()?;
    Ok(record)
}

/// Take a stale lock out of the way by renaming it aside.
///
/// The rename is the atomic step: when several contenders judge the same
/// file stale, exactly one rename succeeds; the losers see `NotFound` and
/// loop back to creation. The claimed file is then compared against the
/// record that was judged stale — if a new holder recreated the lock
/// between the read and the rename, the claim grabbed a live lock and is
/// renamed back, and the next creation attempt reports `LockHeld`.
fn claim_stale(lock_path: &Path, expected: Option<&LockRecord>) -> Result<()> {
    let claim = lock_path.with_extension(format!("lock.claim-{}", std::process::id()));
    match std::fs::rename(lock_path, &claim) {
        Ok(()) => {}
        // Another contender claimed it first.
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(StoreError::PermissionDenied(format!(
                "cannot claim stale lock file {}",
                lock_path.display()
            )));
        }
        Err(e) => return Err(StoreError::Io(e)),
    }

    let claimed = read_record(&claim);
    let judged_record = match (&claimed, expected) {
        (Some(claimed), Some(expected)) => claimed.token == expected.token,
        (None, None) => true,
        _ => false,
    };
    if judged_record {
        if let Err(e) = std::fs::remove_file(&claim) {
            warn!(error = %e, path = %claim.display(), "failed to discard claimed lock file");
        }
    } else {
        warn!(path = %lock_path.display(), "lock was recreated during claim, restoring");
        if let Err(e) = std::fs::rename(&claim, lock_path) {
            warn!(error = %e, path = %lock_path.display(), "failed to restore claimed lock file");
        }
    }
    Ok(())
}

fn read_record(lock_path: &Path) -> Option<LockRecord> {
    let content = std::fs::read_to_string(lock_path).ok()?;
    serde_json::from_str(&content).ok()
}

fn new_token() -> String {
    // Unique within the staleness model: pid plus a monotonic nanosecond
    // stamp distinguishes re-acquisitions by the same process.
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |d| d.as_nanos());
    format!("{}-{nanos:x}", std::process::id())
}

/// Refresh `heartbeat_at` until the stop channel fires or closes. The rest
/// of the record, `acquired_at` included, is carried unchanged from
/// acquisition. Writes go through a temp file plus rename so readers never
/// observe a torn record.
fn spawn_heartbeat(
    lock_path: PathBuf,
    mut record: LockRecord,
    interval: Duration,
    stop_rx: mpsc::Receiver<()>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        loop {
            match stop_rx.recv_timeout(interval) {
                Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
                Err(mpsc::RecvTimeoutError::Timeout) => {}
            }

            record.heartbeat_at = chrono::Utc::now().to_rfc3339();
            let tmp = lock_path.with_extension("lock.tmp");
            let write = serde_json::to_vec_pretty(&record)
                .map_err(std::io::Error::other)
                .and_then(|body| std::fs::write(&tmp, body))
                .and_then(|()| std::fs::rename(&tmp, &lock_path));
            if let Err(e) = write {
                warn!(error = %e, path = %lock_path.display(), "heartbeat write failed");
            }
        }
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
