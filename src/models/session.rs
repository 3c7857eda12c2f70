//! Session models
//!
//! A `UserSession` is assembled fresh on every request from cached
//! identity data plus the static role table; only the `SessionRecord`
//! (session id → user id) is persisted, in the cache store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{UserProfile, Workspace};

/// Request-scoped aggregate of everything known about the caller
#[derive(Debug, Clone, Serialize)]
pub struct UserSession {
    pub user: UserProfile,
    /// Every workspace the user belongs to
    pub workspaces: Vec<Workspace>,
    /// The selected workspace, absent when the user has no memberships
    pub current_workspace: Option<Workspace>,
    /// Deduplicated union of permissions granted by the user's roles in
    /// the current workspace; recomputed on every resolution, never cached
    pub permissions: Vec<String>,
}

impl UserSession {
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }

    /// Permissions from `required` that this session does not hold
    pub fn missing_permissions(&self, required: &[&str]) -> Vec<String> {
        required
            .iter()
            .filter(|p| !self.has_permission(p))
            .map(|p| p.to_string())
            .collect()
    }

    pub fn current_workspace_id(&self) -> Option<&str> {
        self.current_workspace.as_ref().map(|w| w.id.as_str())
    }
}

/// Payload stored in the cache store under `session:{sid}`, with a
/// sliding-window expiry refreshed on every read
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub user_id: String,
    pub issued_at: DateTime<Utc>,
}
