//! Embedded persistence layer for the homologation record manager.
//!
//! A single SQLite file holds users, homologation records, and an
//! append-only audit trail. This crate owns everything between the domain
//! types and that file: schema migrations, cross-process locking, the
//! shared connection with its durability pragmas, typed repositories, and
//! snapshots.
//!
//! [`Store::open`] is the entry point; it runs the whole startup sequence
//! (lock, connect, snapshot, migrate) and hands out repositories.

pub mod backup;
pub mod database;
pub mod errors;
pub mod lock;
pub mod migrations;
pub mod repos;
pub mod row_helpers;
pub mod store;

pub use database::{ConnectionConfig, Database};
pub use errors::{Result, StoreError};
pub use lock::{LockConfig, LockFile, LockGuard};
pub use repos::audit::AuditRepo;
pub use repos::homologations::{HomologationRepo, HomologationWithOwner};
pub use repos::users::UserRepo;
pub use store::{Store, StoreConfig};
