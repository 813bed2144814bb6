//! User entity — identity rows with role and soft-delete flag.

use serde::{Deserialize, Serialize};

/// Fixed role set. Stored as lowercase TEXT.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    /// Full access including user management.
    Admin,
    /// Can create and modify records.
    Editor,
    /// Read-only access.
    Viewer,
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Admin => write!(f, "admin"),
            Self::Editor => write!(f, "editor"),
            Self::Viewer => write!(f, "viewer"),
        }
    }
}

impl std::str::FromStr for UserRole {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "editor" => Ok(Self::Editor),
            "viewer" => Ok(Self::Viewer),
            other => Err(format!("unknown user role: {other}")),
        }
    }
}

/// A user row. `is_active = false` is a soft delete: the row stays, but
/// records owned by the user drop out of list views.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Row id (AUTOINCREMENT).
    pub id: i64,
    /// Unique login name, unique across active and inactive rows.
    pub username: String,
    /// Salted password hash. Hashing itself happens in the auth collaborator.
    pub password_hash: String,
    /// Role drawn from the fixed set.
    pub role: UserRole,
    /// Optional display name.
    pub full_name: Option<String>,
    /// Optional contact address.
    pub email: Option<String>,
    /// Soft-delete flag.
    pub is_active: bool,
    /// Forces a password change on next login.
    pub must_change_password: bool,
    /// RFC 3339 timestamp of the last successful login.
    pub last_login: Option<String>,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
    /// RFC 3339 last-update timestamp.
    pub updated_at: String,
}

/// Fields the caller supplies when creating a user.
#[derive(Clone, Debug)]
pub struct NewUser {
    /// Unique login name.
    pub username: String,
    /// Pre-hashed password.
    pub password_hash: String,
    /// Initial role.
    pub role: UserRole,
    /// Optional display name.
    pub full_name: Option<String>,
    /// Optional contact address.
    pub email: Option<String>,
    /// Whether the first login must change the password.
    pub must_change_password: bool,
}

/// Mutable-field allow-list for user updates. `None` leaves a field
/// unchanged; `Some(None)` on a nullable field clears it.
///
/// Username and password hash are deliberately absent: the username is
/// immutable and password changes go through `update_password`.
#[derive(Clone, Debug, Default)]
pub struct UserUpdate {
    /// New role.
    pub role: Option<UserRole>,
    /// New display name (`Some(None)` clears).
    pub full_name: Option<Option<String>>,
    /// New contact address (`Some(None)` clears).
    pub email: Option<Option<String>>,
    /// New soft-delete state.
    pub is_active: Option<bool>,
    /// New forced-change state.
    pub must_change_password: Option<bool>,
}

impl UserUpdate {
    /// True when no field is set; such an update is a no-op.
    pub fn is_empty(&self) -> bool {
        self.role.is_none()
            && self.full_name.is_none()
            && self.email.is_none()
            && self.is_active.is_none()
            && self.must_change_password.is_none()
    }
}
