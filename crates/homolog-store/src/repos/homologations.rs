//! Homologation record repository.
//!
//! Writes go against the base table with the full field set in both the
//! insert statement and the update allow-list; reads for listing go through
//! the owner-joined view so each row carries its creator and rows owned by
//! deactivated users are excluded. `get` reads the base table directly —
//! exclusion from lists never means absence from the store.

use rusqlite::{Connection, OptionalExtension, Row, types::Value};
use tracing::instrument;

use homolog_core::{
    AuditAction, HomologationFilter, HomologationRecord, HomologationStatus, HomologationUpdate,
    NewHomologation,
};

use crate::database::Database;
use crate::errors::{Result, StoreError};
use crate::repos::audit::AuditRepo;
use crate::row_helpers;

const TABLE: &str = "homologations";
const VIEW: &str = "v_homologations_with_user";

const RECORD_COLUMNS: &str = "id, real_name, logical_name, kb_url, kb_sync, homologation_date, \
                              has_previous_versions, repository_location, details, status, \
                              created_by, created_at, updated_at";

/// A record as returned by list queries: the row plus its owner's identity
/// from the joined view.
#[derive(Clone, Debug, PartialEq)]
pub struct HomologationWithOwner {
    /// The record itself.
    pub record: HomologationRecord,
    /// Owner's login name.
    pub owner_username: String,
    /// Owner's display name, if set.
    pub owner_full_name: Option<String>,
}

/// Typed access to homologation rows.
#[derive(Clone)]
pub struct HomologationRepo {
    db: Database,
}

impl HomologationRepo {
    pub(crate) fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a new record owned by `actor_id`.
    ///
    /// The insert names every persisted field; a `None` status stores the
    /// pending default explicitly rather than relying on the column default.
    #[instrument(skip(self, new), fields(real_name = %new.real_name))]
    pub fn create(&self, actor_id: i64, new: &NewHomologation) -> Result<HomologationRecord> {
        if new.real_name.trim().is_empty() {
            return Err(StoreError::Validation("real_name must not be empty".into()));
        }

        self.db.with_transaction(|conn| {
            let now = super::now_rfc3339();
            let status = new.status.unwrap_or_default();
            let _ = conn.execute(
                "INSERT INTO homologations (real_name, logical_name, kb_url, kb_sync,
                                            homologation_date, has_previous_versions,
                                            repository_location, details, status,
                                            created_by, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)",
                rusqlite::params![
                    new.real_name,
                    new.logical_name,
                    new.kb_url,
                    new.kb_sync,
                    new.homologation_date,
                    new.has_previous_versions,
                    new.repository_location.map(|l| l.to_string()),
                    new.details,
                    status.to_string(),
                    actor_id,
                    now
                ],
            )?;
            let id = conn.last_insert_rowid();
            let record = fetch(conn, id)?;

            let after = serde_json::to_value(&record)?;
            let _ = AuditRepo::record(
                conn,
                actor_id,
                AuditAction::Create,
                TABLE,
                id,
                None,
                Some(&after),
            )?;
            Ok(record)
        })
    }

    /// Fetch by id from the base table. Records owned by inactive users are
    /// returned here even though lists exclude them.
    #[instrument(skip(self))]
    pub fn get(&self, id: i64) -> Result<HomologationRecord> {
        self.db.with_conn(|conn| fetch(conn, id))
    }

    /// Filtered list through the owner-joined view, newest first. Rows whose
    /// owner is deactivated are excluded.
    #[instrument(skip(self, filter))]
    pub fn list(&self, filter: &HomologationFilter) -> Result<Vec<HomologationWithOwner>> {
        let mut conditions = vec!["owner_active = 1".to_string()];
        let mut params: Vec<Value> = Vec::new();

        if let Some(ref name) = filter.real_name {
            params.push(Value::Text(format!("%{}%", row_helpers::escape_like(name))));
            conditions.push(format!("real_name LIKE ?{} ESCAPE '\\'", params.len()));
        }
        if let Some(ref name) = filter.logical_name {
            params.push(Value::Text(format!("%{}%", row_helpers::escape_like(name))));
            conditions.push(format!("logical_name LIKE ?{} ESCAPE '\\'", params.len()));
        }
        if let Some(ref from) = filter.date_from {
            params.push(Value::Text(from.clone()));
            conditions.push(format!("homologation_date >= ?{}", params.len()));
        }
        if let Some(ref to) = filter.date_to {
            params.push(Value::Text(to.clone()));
            conditions.push(format!("homologation_date <= ?{}", params.len()));
        }
        if let Some(location) = filter.repository_location {
            params.push(Value::Text(location.to_string()));
            conditions.push(format!("repository_location = ?{}", params.len()));
        }
        if let Some(status) = filter.status {
            params.push(Value::Text(status.to_string()));
            conditions.push(format!("status = ?{}", params.len()));
        }

        let sql = format!(
            "SELECT {RECORD_COLUMNS}, owner_username, owner_full_name FROM {VIEW}
             WHERE {} ORDER BY created_at DESC, id DESC",
            conditions.join(" AND ")
        );

        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_and_then(
                rusqlite::params_from_iter(params),
                |row| owned_from_row(row),
            )?;
            rows.collect()
        })
    }

    /// Free-text search over name, logical name, details and documentation
    /// link, ranked by where the term matched (real name first).
    #[instrument(skip(self))]
    pub fn search(&self, term: &str) -> Result<Vec<HomologationWithOwner>> {
        let pattern = format!("%{}%", row_helpers::escape_like(term.trim()));
        let sql = format!(
            "SELECT {RECORD_COLUMNS}, owner_username, owner_full_name FROM {VIEW}
             WHERE owner_active = 1
               AND (real_name LIKE ?1 ESCAPE '\\'
                    OR logical_name LIKE ?1 ESCAPE '\\'
                    OR details LIKE ?1 ESCAPE '\\'
                    OR kb_url LIKE ?1 ESCAPE '\\')
             ORDER BY CASE
                 WHEN real_name LIKE ?1 ESCAPE '\\' THEN 0
                 WHEN logical_name LIKE ?1 ESCAPE '\\' THEN 1
                 ELSE 2
             END, created_at DESC, id DESC"
        );

        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_and_then([pattern], |row| owned_from_row(row))?;
            rows.collect()
        })
    }

    /// Record counts per status, visible rows only. Every status appears in
    /// the result, zero included, in display order.
    #[instrument(skip(self))]
    pub fn count_by_status(&self) -> Result<Vec<(HomologationStatus, i64)>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT status, COUNT(*) FROM {VIEW} WHERE owner_active = 1 GROUP BY status"
            ))?;
            let mut counted = std::collections::HashMap::new();
            let mut rows = stmt.query([])?;
            while let Some(row) = rows.next()? {
                let raw: String = row_helpers::get(row, 0, TABLE, "status")?;
                let status: HomologationStatus = row_helpers::parse_enum(&raw, TABLE, "status")?;
                let count: i64 = row_helpers::get(row, 1, TABLE, "count")?;
                counted.insert(status, count);
            }
            Ok(HomologationStatus::ALL
                .iter()
                .map(|status| (*status, counted.get(status).copied().unwrap_or(0)))
                .collect())
        })
    }

    /// Apply an allow-list update: read the full row, merge the set fields,
    /// write the full row back, and audit the before/after images.
    #[instrument(skip(self, update))]
    pub fn update(
        &self,
        actor_id: i64,
        id: i64,
        update: &HomologationUpdate,
    ) -> Result<HomologationRecord> {
        if update.is_empty() {
            return Err(StoreError::Validation("update contains no fields".into()));
        }
        if let Some(ref name) = update.real_name {
            if name.trim().is_empty() {
                return Err(StoreError::Validation("real_name must not be empty".into()));
            }
        }

        self.db.with_transaction(|conn| {
            let before = fetch(conn, id)?;
            let before_image = serde_json::to_value(&before)?;

            let merged = HomologationRecord {
                real_name: update.real_name.clone().unwrap_or(before.real_name.clone()),
                logical_name: update.logical_name.clone().unwrap_or(before.logical_name.clone()),
                kb_url: update.kb_url.clone().unwrap_or(before.kb_url.clone()),
                kb_sync: update.kb_sync.unwrap_or(before.kb_sync),
                homologation_date: update
                    .homologation_date
                    .clone()
                    .unwrap_or(before.homologation_date.clone()),
                has_previous_versions: update
                    .has_previous_versions
                    .unwrap_or(before.has_previous_versions),
                repository_location: update
                    .repository_location
                    .unwrap_or(before.repository_location),
                details: update.details.clone().unwrap_or(before.details.clone()),
                status: update.status.unwrap_or(before.status),
                ..before
            };

            let now = super::now_rfc3339();
            let changed = conn.execute(
                "UPDATE homologations SET real_name = ?1, logical_name = ?2, kb_url = ?3,
                         kb_sync = ?4, homologation_date = ?5, has_previous_versions = ?6,
                         repository_location = ?7, details = ?8, status = ?9, updated_at = ?10
                 WHERE id = ?11",
                rusqlite::params![
                    merged.real_name,
                    merged.logical_name,
                    merged.kb_url,
                    merged.kb_sync,
                    merged.homologation_date,
                    merged.has_previous_versions,
                    merged.repository_location.map(|l| l.to_string()),
                    merged.details,
                    merged.status.to_string(),
                    now,
                    id
                ],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("homologation {id}")));
            }

            let record = fetch(conn, id)?;
            let after_image = serde_json::to_value(&record)?;
            let _ = AuditRepo::record(
                conn,
                actor_id,
                AuditAction::Update,
                TABLE,
                id,
                Some(&before_image),
                Some(&after_image),
            )?;
            Ok(record)
        })
    }

    /// Hard delete with a before-image audit entry.
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
            let changed = conn.execute("DELETE FROM homologations WHERE id = ?1", [id])?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("homologation {id}")));
            }
            Ok(())
        })
    }
}

fn fetch(conn: &Connection, id: i64) -> Result<HomologationRecord> {
    conn.query_row(
        &format!("SELECT {RECORD_COLUMNS} FROM homologations WHERE id = ?1"),
        [id],
        |row| Ok(record_from_row(row)),
    )
    .optional()?
    .transpose()?
    .ok_or_else(|| StoreError::NotFound(format!("homologation {id}")))
}

fn record_from_row(row: &Row<'_>) -> Result<HomologationRecord> {
    let status_raw: String = row_helpers::get(row, 9, TABLE, "status")?;
    let location_raw: Option<String> = row_helpers::get_opt(row, 7, TABLE, "repository_location")?;

    Ok(HomologationRecord {
        id: row_helpers::get(row, 0, TABLE, "id")?,
        real_name: row_helpers::get(row, 1, TABLE, "real_name")?,
        logical_name: row_helpers::get_opt(row, 2, TABLE, "logical_name")?,
        kb_url: row_helpers::get_opt(row, 3, TABLE, "kb_url")?,
        kb_sync: row_helpers::get(row, 4, TABLE, "kb_sync")?,
        homologation_date: row_helpers::get_opt(row, 5, TABLE, "homologation_date")?,
        has_previous_versions: row_helpers::get(row, 6, TABLE, "has_previous_versions")?,
        repository_location: location_raw
            .as_deref()
            .map(|raw| row_helpers::parse_enum(raw, TABLE, "repository_location"))
            .transpose()?,
        details: row_helpers::get_opt(row, 8, TABLE, "details")?,
        status: row_helpers::parse_enum(&status_raw, TABLE, "status")?,
        created_by: row_helpers::get(row, 10, TABLE, "created_by")?,
        created_at: row_helpers::get(row, 11, TABLE, "created_at")?,
        updated_at: row_helpers::get(row, 12, TABLE, "updated_at")?,
    })
}

fn owned_from_row(row: &Row<'_>) -> Result<HomologationWithOwner> {
    Ok(HomologationWithOwner {
        record: record_from_row(row)?,
        owner_username: row_helpers::get(row, 13, VIEW, "owner_username")?,
        owner_full_name: row_helpers::get_opt(row, 14, VIEW, "owner_full_name")?,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use homolog_core::{NewUser, RepositoryLocation, UserRole};

    use crate::migrations;
    use crate::repos::users::UserRepo;

    fn test_repos() -> (UserRepo, HomologationRepo, i64) {
        let db = Database::in_memory().unwrap();
        db.with_conn(|conn| migrations::ensure_schema(conn).map(|_| ())).unwrap();
        let users = UserRepo::new(db.clone());
        let actor = users
            .create(
                None,
                &NewUser {
                    username: "alice".into(),
                    password_hash: "h".into(),
                    role: UserRole::Editor,
                    full_name: Some("Alice".into()),
                    email: None,
                    must_change_password: false,
                },
            )
            .unwrap();
        (users, HomologationRepo::new(db), actor.id)
    }

    #[test]
    fn create_persists_every_field() {
        let (_, repo, actor) = test_repos();
        let new = NewHomologation {
            real_name: "PayrollSync".into(),
            logical_name: Some("payroll-sync".into()),
            kb_url: Some("https://kb.example/payroll".into()),
            kb_sync: true,
            homologation_date: Some("2026-08-01".into()),
            has_previous_versions: true,
            repository_location: Some(RepositoryLocation::A),
            details: Some("Quarterly payroll batch".into()),
            status: Some(HomologationStatus::InProgress),
        };
        let created = repo.create(actor, &new).unwrap();
        let fetched = repo.get(created.id).unwrap();

        assert_eq!(fetched.real_name, "PayrollSync");
        assert_eq!(fetched.logical_name.as_deref(), Some("payroll-sync"));
        assert_eq!(fetched.kb_url.as_deref(), Some("https://kb.example/payroll"));
        assert!(fetched.kb_sync);
        assert_eq!(fetched.homologation_date.as_deref(), Some("2026-08-01"));
        assert!(fetched.has_previous_versions);
        assert_eq!(fetched.repository_location, Some(RepositoryLocation::A));
        assert_eq!(fetched.details.as_deref(), Some("Quarterly payroll batch"));
        // The status supplied at creation must survive the round trip.
        assert_eq!(fetched.status, HomologationStatus::InProgress);
        assert_eq!(fetched.created_by, actor);
    }

    #[test]
    fn create_defaults_status_to_pending() {
        let (_, repo, actor) = test_repos();
        let created = repo.create(actor, &NewHomologation::named("App")).unwrap();
        assert_eq!(created.status, HomologationStatus::Pending);
    }

    #[test]
    fn blank_real_name_is_validation_error() {
        let (_, repo, actor) = test_repos();
        let result = repo.create(actor, &NewHomologation::named("   "));
        assert_matches!(result, Err(StoreError::Validation(_)));
    }

    #[test]
    fn get_missing_is_not_found() {
        let (_, repo, _) = test_repos();
        assert_matches!(repo.get(41), Err(StoreError::NotFound(_)));
    }

    #[test]
    fn update_merges_and_persists_status() {
        let (_, repo, actor) = test_repos();
        let created = repo.create(actor, &NewHomologation::named("App")).unwrap();

        let updated = repo
            .update(
                actor,
                created.id,
                &HomologationUpdate {
                    status: Some(HomologationStatus::Approved),
                    details: Some(Some("Sign-off complete".into())),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.status, HomologationStatus::Approved);
        assert_eq!(updated.details.as_deref(), Some("Sign-off complete"));
        assert_eq!(updated.real_name, "App");

        let fetched = repo.get(created.id).unwrap();
        assert_eq!(fetched.status, HomologationStatus::Approved);
    }

    #[test]
    fn update_can_clear_nullable_fields() {
        let (_, repo, actor) = test_repos();
        let mut new = NewHomologation::named("App");
        new.logical_name = Some("app-alias".into());
        new.repository_location = Some(RepositoryLocation::B);
        let created = repo.create(actor, &new).unwrap();

        let updated = repo
            .update(
                actor,
                created.id,
                &HomologationUpdate {
                    logical_name: Some(None),
                    repository_location: Some(None),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(updated.logical_name.is_none());
        assert!(updated.repository_location.is_none());
    }

    #[test]
    fn empty_update_is_rejected() {
        let (_, repo, actor) = test_repos();
        let created = repo.create(actor, &NewHomologation::named("App")).unwrap();
        let result = repo.update(actor, created.id, &HomologationUpdate::default());
        assert_matches!(result, Err(StoreError::Validation(_)));
    }

    #[test]
    fn list_filters_by_status_and_location() {
        let (_, repo, actor) = test_repos();
        let mut a = NewHomologation::named("Alpha");
        a.repository_location = Some(RepositoryLocation::A);
        a.status = Some(HomologationStatus::Approved);
        let mut b = NewHomologation::named("Beta");
        b.repository_location = Some(RepositoryLocation::B);
        let _ = repo.create(actor, &a).unwrap();
        let _ = repo.create(actor, &b).unwrap();

        let approved = repo
            .list(&HomologationFilter {
                status: Some(HomologationStatus::Approved),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(approved.len(), 1);
        assert_eq!(approved[0].record.real_name, "Alpha");
        assert_eq!(approved[0].owner_username, "alice");

        let in_b = repo
            .list(&HomologationFilter {
                repository_location: Some(RepositoryLocation::B),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(in_b.len(), 1);
        assert_eq!(in_b[0].record.real_name, "Beta");
    }

    #[test]
    fn list_filters_by_date_range() {
        let (_, repo, actor) = test_repos();
        for (name, date) in [("Old", "2025-01-15"), ("Mid", "2026-03-01"), ("New", "2026-08-01")] {
            let mut new = NewHomologation::named(name);
            new.homologation_date = Some(date.into());
            let _ = repo.create(actor, &new).unwrap();
        }

        let mid = repo
            .list(&HomologationFilter {
                date_from: Some("2026-01-01".into()),
                date_to: Some("2026-06-30".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(mid.len(), 1);
        assert_eq!(mid[0].record.real_name, "Mid");
    }

    #[test]
    fn list_name_filter_escapes_like_wildcards() {
        let (_, repo, actor) = test_repos();
        let _ = repo.create(actor, &NewHomologation::named("100% uptime")).unwrap();
        let _ = repo.create(actor, &NewHomologation::named("100x uptime")).unwrap();

        let found = repo
            .list(&HomologationFilter {
                real_name: Some("100%".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].record.real_name, "100% uptime");
    }

    #[test]
    fn list_excludes_records_of_inactive_owners() {
        let (users, repo, actor) = test_repos();
        let bob = users
            .create(
                Some(actor),
                &NewUser {
                    username: "bob".into(),
                    password_hash: "h".into(),
                    role: UserRole::Editor,
                    full_name: None,
                    email: None,
                    must_change_password: false,
                },
            )
            .unwrap();
        let bobs = repo.create(bob.id, &NewHomologation::named("BobApp")).unwrap();
        let _ = repo.create(actor, &NewHomologation::named("AliceApp")).unwrap();

        let _ = users.deactivate(actor, bob.id).unwrap();

        let listed = repo.list(&HomologationFilter::default()).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].record.real_name, "AliceApp");

        // Hidden from lists, still present in the store.
        let direct = repo.get(bobs.id).unwrap();
        assert_eq!(direct.real_name, "BobApp");
    }

    #[test]
    fn search_ranks_real_name_matches_first() {
        let (_, repo, actor) = test_repos();
        let mut in_details = NewHomologation::named("Other");
        in_details.details = Some("mentions payroll in passing".into());
        let _ = repo.create(actor, &in_details).unwrap();
        let mut in_logical = NewHomologation::named("Second");
        in_logical.logical_name = Some("payroll-alias".into());
        let _ = repo.create(actor, &in_logical).unwrap();
        let _ = repo.create(actor, &NewHomologation::named("PayrollSync")).unwrap();

        let found = repo.search("payroll").unwrap();
        assert_eq!(found.len(), 3);
        assert_eq!(found[0].record.real_name, "PayrollSync");
        assert_eq!(found[1].record.real_name, "Second");
        assert_eq!(found[2].record.real_name, "Other");
    }

    #[test]
    fn count_by_status_includes_zero_counts() {
        let (_, repo, actor) = test_repos();
        let created = repo.create(actor, &NewHomologation::named("App")).unwrap();
        let _ = repo
            .update(
                actor,
                created.id,
                &HomologationUpdate {
                    status: Some(HomologationStatus::Approved),
                    ..Default::default()
                },
            )
            .unwrap();

        let counts = repo.count_by_status().unwrap();
        assert_eq!(counts.len(), HomologationStatus::ALL.len());
        let lookup = |s: HomologationStatus| {
            counts.iter().find(|(status, _)| *status == s).map(|(_, n)| *n)
        };
        assert_eq!(lookup(HomologationStatus::Approved), Some(1));
        assert_eq!(lookup(HomologationStatus::Pending), Some(0));
        assert_eq!(lookup(HomologationStatus::Rejected), Some(0));
    }

    #[test]
    fn delete_removes_row_and_audits() {
        let (_, repo, actor) = test_repos();
        let created = repo.create(actor, &NewHomologation::named("App")).unwrap();
        repo.delete(actor, created.id).unwrap();
        assert_matches!(repo.get(created.id), Err(StoreError::NotFound(_)));
        assert_matches!(repo.delete(actor, created.id), Err(StoreError::NotFound(_)));
    }
}
