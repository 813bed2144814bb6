//! Store facade: the ordered open sequence and repository accessors.
//!
//! Opening a store runs the full startup protocol: writable-directory
//! pre-check, exclusive lock acquisition, connection setup with pragmas, an
//! optional pre-migration snapshot when the existing file needs schema
//! changes, and the migrator. Any failure surfaces as a typed error before
//! the first read or write is served.

use std::path::{Path, PathBuf};

use tracing::{info, instrument};

use crate::backup;
use crate::database::{ConnectionConfig, Database};
use crate::errors::Result;
use crate::lock::{LockConfig, LockFile, LockGuard};
use crate::migrations;
use crate::repos::audit::AuditRepo;
use crate::repos::homologations::HomologationRepo;
use crate::repos::users::UserRepo;

/// Everything needed to open a store.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Database file path.
    pub db_path: PathBuf,
    /// Directory for snapshots.
    pub backups_dir: PathBuf,
    /// Lock coordinator tuning.
    pub lock: LockConfig,
    /// Connection tuning.
    pub connection: ConnectionConfig,
    /// Snapshot an existing file before applying pending migrations.
    pub snapshot_before_migration: bool,
}

impl StoreConfig {
    /// Config with defaults for everything but the paths.
    pub fn new(db_path: impl Into<PathBuf>, backups_dir: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            backups_dir: backups_dir.into(),
            lock: LockConfig::default(),
            connection: ConnectionConfig::default(),
            snapshot_before_migration: true,
        }
    }
}

/// An open, migrated, exclusively held store.
///
/// Dropping the store releases the cross-process lock.
#[derive(Debug)]
pub struct Store {
    db: Database,
    backups_dir: PathBuf,
    // Held for its Drop; releases the lock file when the store goes away.
    _lock: LockGuard,
}

impl Store {
    /// Run the open sequence and return a ready store.
    #[instrument(skip(config), fields(db_path = %config.db_path.display()))]
    pub fn open(config: &StoreConfig) -> Result<Self> {
        let lock = LockFile::acquire(&config.db_path, &config.lock)?;

        let existed = config.db_path.exists();
        let db = Database::open(&config.db_path, &config.connection)?;

        if existed && config.snapshot_before_migration {
            let pending = db.with_conn(migrations::has_pending)?;
            if pending {
                let path = backup::snapshot(&db, &config.backups_dir, Some("premigration"))?;
                info!(path = %path.display(), "pre-migration snapshot taken");
            }
        }

        let applied = db.with_conn(migrations::ensure_schema)?;
        info!(applied, "store open");

        Ok(Self {
            db,
            backups_dir: config.backups_dir.clone(),
            _lock: lock,
        })
    }

    /// User repository.
    pub fn users(&self) -> UserRepo {
        UserRepo::new(self.db.clone())
    }

    /// Homologation record repository.
    pub fn homologations(&self) -> HomologationRepo {
        HomologationRepo::new(self.db.clone())
    }

    /// Audit trail repository.
    pub fn audit(&self) -> AuditRepo {
        AuditRepo::new(self.db.clone())
    }

    /// Take a manual snapshot into the configured backups directory.
    pub fn snapshot(&self) -> Result<PathBuf> {
        backup::snapshot(&self.db, &self.backups_dir, None)
    }

    /// Remove snapshots older than the retention window.
    pub fn prune_backups(&self, retention_days: u32) -> Result<usize> {
        backup::prune_backups(&self.backups_dir, retention_days)
    }

    /// The underlying database handle, for callers composing their own
    /// transactions (a domain write plus audit entries, for instance).
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Path of the database file.
    pub fn db_path(&self) -> &Path {
        self.db.path()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use homolog_core::NewHomologation;

    use crate::errors::StoreError;

    fn quick_lock() -> LockConfig {
        LockConfig {
            acquire_timeout: std::time::Duration::from_millis(100),
            ..Default::default()
        }
    }

    fn test_config(dir: &Path) -> StoreConfig {
        let mut config = StoreConfig::new(dir.join("homologador.db"), dir.join("backups"));
        config.lock = quick_lock();
        config
    }

    #[test]
    fn open_creates_and_migrates() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(&test_config(dir.path())).unwrap();
        assert!(store.db_path().exists());

        let version = store
            .database()
            .with_conn(migrations::current_version)
            .unwrap();
        assert_eq!(version, migrations::latest_version());
    }

    #[test]
    fn second_open_fails_while_lock_held() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let _store = Store::open(&config).unwrap();

        let second = Store::open(&config);
        assert_matches!(second, Err(StoreError::LockHeld { .. }));
    }

    #[test]
    fn reopen_succeeds_after_drop() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        drop(Store::open(&config).unwrap());
        let reopened = Store::open(&config);
        assert!(reopened.is_ok());
    }

    #[test]
    fn fresh_file_gets_no_premigration_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let _store = Store::open(&config).unwrap();
        // Snapshots are only taken for existing files with pending schema.
        assert!(!config.backups_dir.exists() || std::fs::read_dir(&config.backups_dir).unwrap().next().is_none());
    }

    #[test]
    fn legacy_file_is_snapshotted_before_upgrade() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());

        // Lay down a v1-era file with no version table and no status column.
        {
            let conn = rusqlite::Connection::open(&config.db_path).unwrap();
            conn.execute_batch(include_str!("migrations/v001_baseline.sql")).unwrap();
        }

        let store = Store::open(&config).unwrap();
        let snapshots: Vec<_> = std::fs::read_dir(&config.backups_dir)
            .unwrap()
            .filter_map(std::result::Result::ok)
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(snapshots.len(), 1);
        assert!(snapshots[0].ends_with("_premigration.db"), "got {snapshots:?}");

        let version = store
            .database()
            .with_conn(migrations::current_version)
            .unwrap();
        assert_eq!(version, migrations::latest_version());
    }

    #[test]
    fn repositories_share_the_open_database() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(&test_config(dir.path())).unwrap();

        let alice = store
            .users()
            .create(
                None,
                &homolog_core::NewUser {
                    username: "alice".into(),
                    password_hash: "h".into(),
                    role: homolog_core::UserRole::Editor,
                    full_name: None,
                    email: None,
                    must_change_password: false,
                },
            )
            .unwrap();
        let created = store
            .homologations()
            .create(alice.id, &NewHomologation::named("App"))
            .unwrap();

        let entries = store.audit().query_by_record("homologations", created.id).unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn manual_snapshot_lands_in_backups_dir() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(&test_config(dir.path())).unwrap();
        let path = store.snapshot().unwrap();
        assert!(path.exists());
        assert_eq!(path.parent().unwrap(), dir.path().join("backups"));
    }
}
