//! Homologation record entity — the approval workflow rows under management.

use serde::{Deserialize, Serialize};

/// Approval status. Stored as lowercase TEXT; new records default to
/// [`HomologationStatus::Pending`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HomologationStatus {
    /// Awaiting review.
    #[default]
    Pending,
    /// Approved for deployment.
    Approved,
    /// Rejected.
    Rejected,
    /// Review under way.
    InProgress,
}

impl HomologationStatus {
    /// All variants, in display order. Used by dashboard-style counts.
    pub const ALL: [Self; 4] = [Self::Pending, Self::Approved, Self::Rejected, Self::InProgress];
}

impl std::fmt::Display for HomologationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Approved => write!(f, "approved"),
            Self::Rejected => write!(f, "rejected"),
            Self::InProgress => write!(f, "in_progress"),
        }
    }
}

impl std::str::FromStr for HomologationStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "in_progress" => Ok(Self::InProgress),
            other => Err(format!("unknown homologation status: {other}")),
        }
    }
}

/// One of the two fixed deployment targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RepositoryLocation {
    /// Primary deployment target.
    A,
    /// Secondary deployment target.
    B,
}

impl std::fmt::Display for RepositoryLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::A => write!(f, "A"),
            Self::B => write!(f, "B"),
        }
    }
}

impl std::str::FromStr for RepositoryLocation {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "A" => Ok(Self::A),
            "B" => Ok(Self::B),
            other => Err(format!("unknown repository location: {other}")),
        }
    }
}

/// A persisted homologation record.
///
/// Every field here must appear in the insert statement, the update
/// allow-list ([`HomologationUpdate`]), and the read view — dropping one
/// from any of the three silently breaks persistence or visibility.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HomologationRecord {
    /// Row id (AUTOINCREMENT).
    pub id: i64,
    /// Real application name (required).
    pub real_name: String,
    /// Optional logical / alias name.
    pub logical_name: Option<String>,
    /// Optional documentation link.
    pub kb_url: Option<String>,
    /// Whether the documentation link is synced.
    pub kb_sync: bool,
    /// Approval date (RFC 3339 date).
    pub homologation_date: Option<String>,
    /// Whether earlier versions of the application exist.
    pub has_previous_versions: bool,
    /// Deployment target.
    pub repository_location: Option<RepositoryLocation>,
    /// Free-text details.
    pub details: Option<String>,
    /// Approval status.
    pub status: HomologationStatus,
    /// Id of the creating user.
    pub created_by: i64,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
    /// RFC 3339 last-update timestamp.
    pub updated_at: String,
}

/// Fields the caller supplies when creating a record.
#[derive(Clone, Debug)]
pub struct NewHomologation {
    /// Real application name (required, non-empty).
    pub real_name: String,
    /// Optional logical / alias name.
    pub logical_name: Option<String>,
    /// Optional documentation link.
    pub kb_url: Option<String>,
    /// Whether the documentation link is synced.
    pub kb_sync: bool,
    /// Approval date.
    pub homologation_date: Option<String>,
    /// Whether earlier versions exist.
    pub has_previous_versions: bool,
    /// Deployment target.
    pub repository_location: Option<RepositoryLocation>,
    /// Free-text details.
    pub details: Option<String>,
    /// Initial status; `None` defaults to pending.
    pub status: Option<HomologationStatus>,
}

impl NewHomologation {
    /// Minimal record with the required name; everything else defaulted.
    pub fn named(real_name: impl Into<String>) -> Self {
        Self {
            real_name: real_name.into(),
            logical_name: None,
            kb_url: None,
            kb_sync: false,
            homologation_date: None,
            has_previous_versions: false,
            repository_location: None,
            details: None,
            status: None,
        }
    }
}

/// Mutable-field allow-list for record updates. Kept in lockstep with the
/// full field set of [`HomologationRecord`] (everything except id, creator
/// and timestamps). `None` leaves a field unchanged; `Some(None)` clears a
/// nullable field.
#[derive(Clone, Debug, Default)]
pub struct HomologationUpdate {
    /// New real name.
    pub real_name: Option<String>,
    /// New logical name (`Some(None)` clears).
    pub logical_name: Option<Option<String>>,
    /// New documentation link (`Some(None)` clears).
    pub kb_url: Option<Option<String>>,
    /// New sync flag.
    pub kb_sync: Option<bool>,
    /// New approval date (`Some(None)` clears).
    pub homologation_date: Option<Option<String>>,
    /// New previous-versions flag.
    pub has_previous_versions: Option<bool>,
    /// New deployment target (`Some(None)` clears).
    pub repository_location: Option<Option<RepositoryLocation>>,
    /// New details (`Some(None)` clears).
    pub details: Option<Option<String>>,
    /// New status.
    pub status: Option<HomologationStatus>,
}

impl HomologationUpdate {
    /// True when no field is set; such an update is a no-op.
    pub fn is_empty(&self) -> bool {
        self.real_name.is_none()
            && self.logical_name.is_none()
            && self.kb_url.is_none()
            && self.kb_sync.is_none()
            && self.homologation_date.is_none()
            && self.has_previous_versions.is_none()
            && self.repository_location.is_none()
            && self.details.is_none()
            && self.status.is_none()
    }
}

/// Retrieval-time filter for record lists. All criteria are ANDed.
#[derive(Clone, Debug, Default)]
pub struct HomologationFilter {
    /// Substring match on the real name.
    pub real_name: Option<String>,
    /// Substring match on the logical name.
    pub logical_name: Option<String>,
    /// Inclusive lower bound on the approval date.
    pub date_from: Option<String>,
    /// Inclusive upper bound on the approval date.
    pub date_to: Option<String>,
    /// Exact deployment target.
    pub repository_location: Option<RepositoryLocation>,
    /// Exact status.
    pub status: Option<HomologationStatus>,
}
