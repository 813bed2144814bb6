//! # homolog-settings
//!
//! Layered configuration for the homologation record manager.
//!
//! Settings come from four layers, lowest to highest priority:
//! 1. **Compiled defaults** — [`AppSettings::default()`]
//! 2. **Config file** — JSON, deep-merged over defaults
//! 3. **Environment variables** — `HOMOLOG_*`
//! 4. **Caller overrides** — [`Overrides`], typically CLI flags
//!
//! Loading is explicit; there is no process-global settings singleton.
//! [`AppSettings::resolve`] produces the absolute, directory-backed
//! [`ResolvedSettings`] the store opens from.

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{apply_env_overrides, deep_merge, load_settings};
pub use types::{AppSettings, Overrides, ResolvedSettings};
