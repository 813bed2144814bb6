//! # homolog-core
//!
//! Domain entities for the homologation record store.
//!
//! These types mirror the database rows one-to-one: enum string forms
//! (`Display`/`FromStr`) are exactly the values persisted in TEXT columns,
//! and every struct serializes to the JSON shape used for audit images.
//! No I/O happens here — persistence lives in `homolog-store`.

pub mod audit;
pub mod record;
pub mod user;

pub use audit::{AuditAction, AuditEntry};
pub use record::{
    HomologationFilter, HomologationRecord, HomologationStatus, HomologationUpdate,
    NewHomologation, RepositoryLocation,
};
pub use user::{NewUser, User, UserRole, UserUpdate};
