//! Typed repositories over the shared [`Database`](crate::database::Database)
//! handle. Each repository is a cheap clone around the connection; the audit
//! repository additionally exposes a stateless append used inside the entity
//! repositories' transactions.

pub mod audit;
pub mod homologations;
pub mod users;

use chrono::{SecondsFormat, Utc};

/// Current time as an RFC 3339 UTC string, the storage format for all
/// timestamp columns.
pub(crate) fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
