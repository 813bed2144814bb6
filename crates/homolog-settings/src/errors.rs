//! Settings error types.

use thiserror::Error;

/// Errors from loading or resolving settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Failed to read the config file or create a directory.
    #[error("settings I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Config file contained invalid JSON.
    #[error("failed to parse config JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// A settings value was out of range or otherwise unusable.
    #[error("invalid settings value: {0}")]
    InvalidValue(String),
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
