//! Schema migration runner.
//!
//! Migrations are embedded at compile time via [`include_str!`] and applied
//! in strict ascending version order, each inside its own transaction — a
//! failure rolls back cleanly with no partial schema state and is fatal for
//! startup.
//!
//! A `schema_version` table records applied versions, but it is not assumed
//! to exist: every migration also carries a probe against the live schema
//! (table or column presence), so a legacy file created before version
//! tracking is recognized and upgraded from the right point. The probes
//! double as idempotence guards — re-running the migrator against any state
//! is safe.

use rusqlite::Connection;
use tracing::{debug, info};

use crate::errors::{Result, StoreError};

/// A single migration: version, human description, embedded SQL, and a
/// probe that detects whether the live schema already carries it.
struct Migration {
    version: u32,
    description: &'static str,
    sql: &'static str,
    already_applied: fn(&Connection) -> rusqlite::Result<bool>,
}

/// All migrations in version order.
///
/// A migration that adds a column to a mutation-relevant table must land in
/// the same release as the matching insert/update/view changes; the
/// repository tests pin that pairing.
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Baseline — users, homologations, audit log, read view",
        sql: include_str!("v001_baseline.sql"),
        already_applied: |conn| table_exists(conn, "homologations"),
    },
    Migration {
        version: 2,
        description: "Approval status column on homologations",
        sql: include_str!("v002_record_status.sql"),
        already_applied: |conn| column_exists(conn, "homologations", "status"),
    },
];

/// Run all pending migrations. Returns the number applied.
///
/// On a fresh file this creates the whole schema in one pass; on an
/// existing file it determines the current version (recorded or probed)
/// and applies only what is missing.
pub fn ensure_schema(conn: &Connection) -> Result<u32> {
    ensure_version_table(conn)?;
    let recorded = current_version(conn)?;
    let mut applied = 0;

    for migration in MIGRATIONS {
        if migration.version <= recorded {
            debug!(version = migration.version, "migration recorded, skipping");
            continue;
        }

        let present = (migration.already_applied)(conn).map_err(|e| StoreError::Migration {
            message: format!("probe for v{} failed: {e}", migration.version),
        })?;
        if present {
            // Applied by an earlier release that predates version tracking;
            // backfill the record so future runs skip the probe.
            debug!(version = migration.version, "migration present in schema, recording");
            record_version(conn, migration)?;
            continue;
        }

        info!(
            version = migration.version,
            description = migration.description,
            "applying migration"
        );
        apply_migration(conn, migration)?;
        applied += 1;
    }

    if applied > 0 {
        info!(applied, "migrations complete");
    }

    Ok(applied)
}

/// True when the migrator would change anything on this connection.
pub fn has_pending(conn: &Connection) -> Result<bool> {
    for migration in MIGRATIONS {
        let present = (migration.already_applied)(conn).map_err(|e| StoreError::Migration {
            message: format!("probe for v{} failed: {e}", migration.version),
        })?;
        if !present {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Highest recorded migration version, or 0 if none.
pub fn current_version(conn: &Connection) -> Result<u32> {
    let version: u32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .map_err(|e| StoreError::Migration {
            message: format!("failed to read schema_version: {e}"),
        })?;
    Ok(version)
}

/// Latest migration version defined in code.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |m| m.version)
}

// ─────────────────────────────────────────────────────────────────────────────
// Internal
// ─────────────────────────────────────────────────────────────────────────────

fn ensure_version_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
           version     INTEGER PRIMARY KEY,
           applied_at  TEXT    NOT NULL,
           description TEXT
         );",
    )
    .map_err(|e| StoreError::Migration {
        message: format!("failed to create schema_version table: {e}"),
    })?;
    Ok(())
}

fn apply_migration(conn: &Connection, migration: &Migration) -> Result<()> {
    let tx = conn.unchecked_transaction().map_err(|e| StoreError::Migration {
        message: format!("failed to begin transaction for v{}: {e}", migration.version),
    })?;

    tx.execute_batch(migration.sql).map_err(|e| StoreError::Migration {
        message: format!("migration v{} ({}) failed: {e}", migration.version, migration.description),
    })?;

    let _ = tx
        .execute(
            "INSERT INTO schema_version (version, applied_at, description) VALUES (?1, datetime('now'), ?2)",
            rusqlite::params![migration.version, migration.description],
        )
        .map_err(|e| StoreError::Migration {
            message: format!("failed to record v{} in schema_version: {e}", migration.version),
        })?;

    tx.commit().map_err(|e| StoreError::Migration {
        message: format!("failed to commit v{}: {e}", migration.version),
    })?;

    Ok(())
}

fn record_version(conn: &Connection, migration: &Migration) -> Result<()> {
    let _ = conn
        .execute(
            "INSERT OR IGNORE INTO schema_version (version, applied_at, description) VALUES (?1, datetime('now'), ?2)",
            rusqlite::params![migration.version, migration.description],
        )
        .map_err(|e| StoreError::Migration {
            message: format!("failed to record v{} in schema_version: {e}", migration.version),
        })?;
    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
        [table],
        |row| row.get(0),
    )
}

fn column_exists(conn: &Connection, table: &str, column: &str) -> rusqlite::Result<bool> {
    if !table_exists(conn, table)? {
        return Ok(false);
    }
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
