//! Append-only audit trail.
//!
//! [`AuditRepo::record`] is deliberately stateless over a borrowed
//! connection: the entity repositories call it inside their own write
//! transaction, so a domain mutation and its audit entry commit or roll
//! back together. Queries run through the shared [`Database`] handle.

use rusqlite::{Connection, Row};
use tracing::instrument;

use homolog_core::{AuditAction, AuditEntry};

use crate::database::Database;
use crate::errors::{Result, StoreError};
use crate::row_helpers;

/// Read/append access to the audit log.
#[derive(Clone)]
pub struct AuditRepo {
    db: Database,
}

impl AuditRepo {
    pub(crate) fn new(db: Database) -> Self {
        Self { db }
    }

    /// Append one audit entry on the caller's connection.
    ///
    /// Must run inside the same transaction as the mutation it describes.
    /// Images are serialized to JSON text; `None` stores NULL.
    pub fn record(
        conn: &Connection,
        actor_id: i64,
        action: AuditAction,
        table_name: &str,
        record_id: i64,
        before_image: Option<&serde_json::Value>,
        after_image: Option<&serde_json::Value>,
    ) -> Result<i64> {
        let before = before_image.map(serde_json::to_string).transpose()?;
        let after = after_image.map(serde_json::to_string).transpose()?;
        let now = super::now_rfc3339();

        let _ = conn.execute(
            "INSERT INTO audit_log (actor_id, action, table_name, record_id, before_image, after_image, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                actor_id,
                action.to_string(),
                table_name,
                record_id,
                before,
                after,
                now
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    /// Full history of one row, oldest first.
    #[instrument(skip(self))]
    pub fn query_by_record(&self, table_name: &str, record_id: i64) -> Result<Vec<AuditEntry>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, actor_id, action, table_name, record_id, before_image, after_image, created_at
                 FROM audit_log
                 WHERE table_name = ?1 AND record_id = ?2
                 ORDER BY id ASC",
            )?;
            let rows = stmt.query_and_then(rusqlite::params![table_name, record_id], entry_from_row)?;
            rows.collect()
        })
    }

    /// Everything a user has done, oldest first.
    #[instrument(skip(self))]
    pub fn query_by_user(&self, actor_id: i64) -> Result<Vec<AuditEntry>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, actor_id, action, table_name, record_id, before_image, after_image, created_at
                 FROM audit_log
                 WHERE actor_id = ?1
                 ORDER BY id ASC",
            )?;
            let rows = stmt.query_and_then([actor_id], entry_from_row)?;
            rows.collect()
        })
    }
}

fn entry_from_row(row: &Row<'_>) -> Result<AuditEntry> {
    const TABLE: &str = "audit_log";
    let action_raw: String = row_helpers::get(row, 2, TABLE, "action")?;
    let before_raw: Option<String> = row_helpers::get_opt(row, 5, TABLE, "before_image")?;
    let after_raw: Option<String> = row_helpers::get_opt(row, 6, TABLE, "after_image")?;

    Ok(AuditEntry {
        id: row_helpers::get(row, 0, TABLE, "id")?,
        actor_id: row_helpers::get(row, 1, TABLE, "actor_id")?,
        action: row_helpers::parse_enum(&action_raw, TABLE, "action")?,
        table_name: row_helpers::get(row, 3, TABLE, "table_name")?,
        record_id: row_helpers::get(row, 4, TABLE, "record_id")?,
        before_image: before_raw
            .as_deref()
            .map(|raw| parse_image(raw, "before_image"))
            .transpose()?,
        after_image: after_raw
            .as_deref()
            .map(|raw| parse_image(raw, "after_image"))
            .transpose()?,
        created_at: row_helpers::get(row, 7, TABLE, "created_at")?,
    })
}

/// Images are stored as JSON text; an unparseable image is row corruption,
/// not a caller error.
fn parse_image(raw: &str, column: &'static str) -> Result<serde_json::Value> {
    serde_json::from_str(raw).map_err(|e| StoreError::CorruptRow {
        table: "audit_log",
        column,
        detail: format!("invalid JSON: {e}"),
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
