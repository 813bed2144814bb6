//! Point-in-time snapshots of the database file.
//!
//! Snapshots use `VACUUM INTO`, which produces a consistent, compacted copy
//! without blocking writers for the duration of a file copy. Old snapshots
//! are pruned by age based on a retention window.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::Local;
use tracing::{info, instrument, warn};

use crate::database::Database;
use crate::errors::{Result, StoreError};

const BACKUP_PREFIX: &str = "homolog_backup_";

/// Create a snapshot of the database in `backups_dir`.
///
/// The file is named `homolog_backup_{YYYYmmdd_HHMMSS}.db`, with an optional
/// suffix before the extension (used to tag pre-migration snapshots).
/// Returns the path of the new snapshot.
#[instrument(skip(db))]
pub fn snapshot(db: &Database, backups_dir: &Path, suffix: Option<&str>) -> Result<PathBuf> {
    fs::create_dir_all(backups_dir)?;

    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    let name = match suffix {
        Some(tag) => format!("{BACKUP_PREFIX}{stamp}_{tag}.db"),
        None => format!("{BACKUP_PREFIX}{stamp}.db"),
    };
    let target = backups_dir.join(name);

    let target_sql = target.to_string_lossy().replace('\'', "''");
    db.with_conn(|conn| {
        conn.execute_batch(&format!("VACUUM INTO '{target_sql}'"))
            .map_err(StoreError::from)
    })?;

    info!(path = %target.display(), "snapshot created");
    Ok(target)
}

/// Delete snapshots older than `retention_days`. Returns how many were
/// removed. Files that do not carry the backup prefix are left alone.
#[instrument]
pub fn prune_backups(backups_dir: &Path, retention_days: u32) -> Result<usize> {
    if !backups_dir.is_dir() {
        return Ok(0);
    }

    let cutoff = SystemTime::now()
        .checked_sub(Duration::from_secs(u64::from(retention_days) * 24 * 60 * 60));
    let Some(cutoff) = cutoff else {
        return Ok(0);
    };

    let mut removed = 0;
    for entry in fs::read_dir(backups_dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !name.starts_with(BACKUP_PREFIX) || !name.ends_with(".db") {
            continue;
        }

        let modified = entry.metadata().and_then(|m| m.modified());
        match modified {
            Ok(modified) if modified < cutoff => {
                if let Err(e) = fs::remove_file(entry.path()) {
                    warn!(path = %entry.path().display(), error = %e, "failed to prune snapshot");
                } else {
                    removed += 1;
                }
            }
            Ok(_) => {}
            Err(e) => {
                warn!(path = %entry.path().display(), error = %e, "failed to stat snapshot");
            }
        }
    }

    if removed > 0 {
        info!(removed, "pruned old snapshots");
    }
    Ok(removed)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
