//! User repository — typed CRUD over the `users` table.
//!
//! Deactivation is the normal removal path: the row stays so audit history
//! and record ownership keep resolving, but the user's records drop out of
//! list views. Hard delete exists for rows created by mistake and is
//! rejected by the foreign key once the user owns records.

use rusqlite::{Connection, OptionalExtension, Row};
use tracing::instrument;

use homolog_core::{AuditAction, NewUser, User, UserUpdate};

use crate::database::Database;
use crate::errors::{Result, StoreError};
use crate::repos::audit::AuditRepo;
use crate::row_helpers;

const TABLE: &str = "users";

const SELECT_COLUMNS: &str = "id, username, password_hash, role, full_name, email, \
                              is_active, must_change_password, last_login, created_at, updated_at";

/// Typed access to user rows.
#[derive(Clone)]
pub struct UserRepo {
    db: Database,
}

impl UserRepo {
    pub(crate) fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a new user.
    ///
    /// `actor_id` is the creating user for the audit entry; `None` is the
    /// bootstrap case (first admin), where the entry is attributed to the
    /// created row itself.
    #[instrument(skip(self, new), fields(username = %new.username))]
    pub fn create(&self, actor_id: Option<i64>, new: &NewUser) -> Result<User> {
        if new.username.trim().is_empty() {
            return Err(StoreError::Validation("username must not be empty".into()));
        }
        if new.password_hash.is_empty() {
            return Err(StoreError::Validation("password hash must not be empty".into()));
        }

        self.db.with_transaction(|conn| {
            let now = super::now_rfc3339();
            let _ = conn.execute(
                "INSERT INTO users (username, password_hash, role, full_name, email,
                                    is_active, must_change_password, last_login, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, NULL, ?7, ?7)",
                rusqlite::params![
                    new.username,
                    new.password_hash,
                    new.role.to_string(),
                    new.full_name,
                    new.email,
                    new.must_change_password,
                    now
                ],
            )?;
            let id = conn.last_insert_rowid();
            let user = fetch(conn, id)?;

            let after = serde_json::to_value(&user)?;
            let _ = AuditRepo::record(
                conn,
                actor_id.unwrap_or(id),
                AuditAction::Create,
                TABLE,
                id,
                None,
                Some(&after),
            )?;
            Ok(user)
        })
    }

    /// Fetch by id. Inactive users are returned; absence is `NotFound`.
    #[instrument(skip(self))]
    pub fn get(&self, id: i64) -> Result<User> {
        self.db.with_conn(|conn| fetch(conn, id))
    }

    /// Fetch by username. This is the login path, so deactivated users are
    /// invisible here; use [`UserRepo::get`] for administrative reads.
    #[instrument(skip(self))]
    pub fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        self.db.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {SELECT_COLUMNS} FROM users WHERE username = ?1 AND is_active = 1"),
                [username],
                |row| Ok(user_from_row(row)),
            )
            .optional()?
            .transpose()
        })
    }

    /// All active users, ordered by username.
    #[instrument(skip(self))]
    pub fn list_active(&self) -> Result<Vec<User>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SELECT_COLUMNS} FROM users WHERE is_active = 1 ORDER BY username"
            ))?;
            let rows = stmt.query_and_then([], |row| user_from_row(row))?;
            rows.collect()
        })
    }

    /// Apply an allow-list update. Unset fields keep their stored value.
    #[instrument(skip(self, update))]
    pub fn update(&self, actor_id: i64, id: i64, update: &UserUpdate) -> Result<User> {
        if update.is_empty() {
            return Err(StoreError::Validation("update contains no fields".into()));
        }

        self.db.with_transaction(|conn| {
            let before = fetch(conn, id)?;
            let before_image = serde_json::to_value(&before)?;

            let merged = User {
                role: update.role.unwrap_or(before.role),
                full_name: update.full_name.clone().unwrap_or(before.full_name),
                email: update.email.clone().unwrap_or(before.email),
                is_active: update.is_active.unwrap_or(before.is_active),
                must_change_password: update
                    .must_change_password
                    .unwrap_or(before.must_change_password),
                ..before
            };

            let now = super::now_rfc3339();
            let changed = conn.execute(
                "UPDATE users SET role = ?1, full_name = ?2, email = ?3,
                                  is_active = ?4, must_change_password = ?5, updated_at = ?6
                 WHERE id = ?7",
                rusqlite::params![
                    merged.role.to_string(),
                    merged.full_name,
                    merged.email,
                    merged.is_active,
                    merged.must_change_password,
                    now,
                    id
                ],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("user {id}")));
            }

            let user = fetch(conn, id)?;
            let after_image = serde_json::to_value(&user)?;
            let _ = AuditRepo::record(
                conn,
                actor_id,
                AuditAction::Update,
                TABLE,
                id,
                Some(&before_image),
                Some(&after_image),
            )?;
            Ok(user)
        })
    }

    /// Replace the password hash and clear the forced-change flag.
    #[instrument(skip(self, new_hash))]
    pub fn update_password(&self, actor_id: i64, id: i64, new_hash: &str) -> Result<()> {
        if new_hash.is_empty() {
            return Err(StoreError::Validation("password hash must not be empty".into()));
        }

        self.db.with_transaction(|conn| {
            let before = fetch(conn, id)?;
            let before_image = serde_json::to_value(&before)?;

            let now = super::now_rfc3339();
            let changed = conn.execute(
                "UPDATE users SET password_hash = ?1, must_change_password = 0, updated_at = ?2
                 WHERE id = ?3",
                rusqlite::params![new_hash, now, id],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("user {id}")));
            }

            let after = fetch(conn, id)?;
            let after_image = serde_json::to_value(&after)?;
            let _ = AuditRepo::record(
                conn,
                actor_id,
                AuditAction::Update,
                TABLE,
                id,
                Some(&before_image),
                Some(&after_image),
            )?;
            Ok(())
        })
    }

    /// Record a successful login. Not audited; login events are not domain
    /// mutations.
    #[instrument(skip(self))]
    pub fn touch_last_login(&self, id: i64) -> Result<()> {
        self.db.with_conn(|conn| {
            let now = super::now_rfc3339();
            let changed = conn.execute(
                "UPDATE users SET last_login = ?1 WHERE id = ?2",
                rusqlite::params![now, id],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("user {id}")));
            }
            Ok(())
        })
    }

    /// Soft delete: flips `is_active` off.
    #[instrument(skip(self))]
    pub fn deactivate(&self, actor_id: i64, id: i64) -> Result<User> {
        self.update(
            actor_id,
            id,
            &UserUpdate {
                is_active: Some(false),
                ..Default::default()
            },
        )
    }

    /// Hard delete. Fails with `Conflict` when the user still owns records.
    #[instrument(skip(self))]
    pub fn delete(&self, actor_id: i64, id: i64) -> Result<()> {
        self.db.with_transaction(|conn| {
            let before = fetch(conn, id)?;
            let before_image = serde_json::to_value(&before)?;

            let _ = AuditRepo::record(
                conn,
                actor_id,
                AuditAction::Delete,
                TABLE,
                id,
                Some(&before_image),
                None,
            )?;
            let changed = conn.execute("DELETE FROM users WHERE id = ?1", [id])?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("user {id}")));
            }
            Ok(())
        })
    }
}

fn fetch(conn: &Connection, id: i64) -> Result<User> {
    conn.query_row(
        &format!("SELECT {SELECT_COLUMNS} FROM users WHERE id = ?1"),
        [id],
        |row| Ok(user_from_row(row)),
    )
    .optional()?
    .transpose()?
    .ok_or_else(|| StoreError::NotFound(format!("user {id}")))
}

fn user_from_row(row: &Row<'_>) -> Result<User> {
    let role_raw: String = row_helpers::get(row, 3, TABLE, "role")?;
    Ok(User {
        id: row_helpers::get(row, 0, TABLE, "id")?,
        username: row_helpers::get(row, 1, TABLE, "username")?,
        password_hash: row_helpers::get(row, 2, TABLE, "password_hash")?,
        role: row_helpers::parse_enum(&role_raw, TABLE, "role")?,
        full_name: row_helpers::get_opt(row, 4, TABLE, "full_name")?,
        email: row_helpers::get_opt(row, 5, TABLE, "email")?,
        is_active: row_helpers::get(row, 6, TABLE, "is_active")?,
        must_change_password: row_helpers::get(row, 7, TABLE, "must_change_password")?,
        last_login: row_helpers::get_opt(row, 8, TABLE, "last_login")?,
        created_at: row_helpers::get(row, 9, TABLE, "created_at")?,
        updated_at: row_helpers::get(row, 10, TABLE, "updated_at")?,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
