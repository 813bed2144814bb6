//! Settings structures and their compiled defaults.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Retention window bounds, in days.
pub const RETENTION_DAYS_MIN: u32 = 1;
/// Upper bound; anything longer is a typo, not a policy.
pub const RETENTION_DAYS_MAX: u32 = 3650;

/// Application settings as loaded from defaults, file and environment.
///
/// Paths may be relative here; [`AppSettings::resolve`] turns them into a
/// [`ResolvedSettings`] with absolute paths and created directories.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppSettings {
    /// Database file path.
    pub db_path: String,
    /// Snapshot directory.
    pub backups_dir: String,
    /// How long snapshots are kept, in days.
    pub retention_days: u32,
    /// Whether to snapshot automatically before schema migrations.
    pub auto_backup: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            db_path: "homologador.db".to_string(),
            backups_dir: "backups".to_string(),
            retention_days: 30,
            auto_backup: true,
        }
    }
}

/// Caller-supplied overrides, applied above every other layer.
#[derive(Clone, Debug, Default)]
pub struct Overrides {
    /// Database file path.
    pub db_path: Option<PathBuf>,
    /// Snapshot directory.
    pub backups_dir: Option<PathBuf>,
    /// Retention window in days.
    pub retention_days: Option<u32>,
    /// Automatic pre-migration snapshots.
    pub auto_backup: Option<bool>,
}

/// Settings after resolution: absolute paths, directories present, values
/// range-checked.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedSettings {
    /// Absolute database file path.
    pub db_path: PathBuf,
    /// Absolute snapshot directory; exists after resolution.
    pub backups_dir: PathBuf,
    /// Retention window in days.
    pub retention_days: u32,
    /// Automatic pre-migration snapshots.
    pub auto_backup: bool,
}

impl AppSettings {
    /// Apply caller overrides on top of this layer.
    pub fn with_overrides(mut self, overrides: &Overrides) -> Self {
        if let Some(ref path) = overrides.db_path {
            self.db_path = path.to_string_lossy().into_owned();
        }
        if let Some(ref dir) = overrides.backups_dir {
            self.backups_dir = dir.to_string_lossy().into_owned();
        }
        if let Some(days) = overrides.retention_days {
            self.retention_days = days;
        }
        if let Some(auto) = overrides.auto_backup {
            self.auto_backup = auto;
        }
        self
    }

    /// Absolutize paths against `base_dir`, create the directories the
    /// store needs, and range-check numeric values.
    pub fn resolve(&self, base_dir: &std::path::Path) -> Result<ResolvedSettings> {
        if !(RETENTION_DAYS_MIN..=RETENTION_DAYS_MAX).contains(&self.retention_days) {
            return Err(SettingsError::InvalidValue(format!(
                "retention_days must be between {RETENTION_DAYS_MIN} and {RETENTION_DAYS_MAX}, got {}",
                self.retention_days
            )));
        }

        let db_path = absolutize(base_dir, &self.db_path);
        let backups_dir = absolutize(base_dir, &self.backups_dir);

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::create_dir_all(&backups_dir)?;

        Ok(ResolvedSettings {
            db_path,
            backups_dir,
            retention_days: self.retention_days,
            auto_backup: self.auto_backup,
        })
    }
}

fn absolutize(base: &std::path::Path, raw: &str) -> PathBuf {
    let path = PathBuf::from(raw);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
