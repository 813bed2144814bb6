//! Audit trail entries — immutable before/after snapshots of mutations.

use serde::{Deserialize, Serialize};

/// Kind of mutation an audit entry records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Row inserted; carries an after-image only.
    Create,
    /// Row changed; carries both images.
    Update,
    /// Row removed; carries a before-image only.
    Delete,
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

impl std::str::FromStr for AuditAction {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(format!("unknown audit action: {other}")),
        }
    }
}

/// One immutable audit entry. Never updated after insertion; the audit
/// table has no update or delete surface.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Row id (AUTOINCREMENT; insertion order).
    pub id: i64,
    /// Id of the acting user.
    pub actor_id: i64,
    /// Mutation kind.
    pub action: AuditAction,
    /// Mutated table.
    pub table_name: String,
    /// Mutated row id.
    pub record_id: i64,
    /// JSON snapshot before the mutation; absent on create.
    pub before_image: Option<serde_json::Value>,
    /// JSON snapshot after the mutation; absent on delete.
    pub after_image: Option<serde_json::Value>,
    /// RFC 3339 timestamp.
    pub created_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_round_trips_through_strings() {
        for action in [AuditAction::Create, AuditAction::Update, AuditAction::Delete] {
            let parsed: AuditAction = action.to_string().parse().unwrap();
            assert_eq!(parsed, action);
        }
    }

    #[test]
    fn unknown_action_is_rejected() {
        let result: Result<AuditAction, _> = "truncate".parse();
        assert!(result.is_err());
    }

    #[test]
    fn entry_serde_round_trip() {
        let entry = AuditEntry {
            id: 7,
            actor_id: 1,
            action: AuditAction::Update,
            table_name: "homologations".into(),
            record_id: 3,
            before_image: Some(serde_json::json!({"status": "pending"})),
            after_image: Some(serde_json::json!({"status": "approved"})),
            created_at: "2026-01-01T00:00:00Z".into(),
        };
        let json = serde_json::to_string(&entry).unwrap();
        let parsed: AuditEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, entry);
    }
}
