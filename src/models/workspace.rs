//! Workspace (tenant) models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::UserProfile;

/// A workspace as reported by the identity provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workspace {
    /// Identity-provider organization id
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub branding: Option<WorkspaceBranding>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Optional workspace branding assets
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceBranding {
    #[serde(default)]
    pub logo_url: Option<String>,
    #[serde(default)]
    pub dark_logo_url: Option<String>,
}

/// One membership edge between a user and a workspace.
///
/// Rebuilt wholesale on invalidation; there is no partial update of a
/// user's membership list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceMembership {
    pub workspace_id: String,
    /// Role ids in provider order
    pub role_ids: Vec<String>,
    /// Role names matching `role_ids`
    pub role_names: Vec<String>,
}

impl WorkspaceMembership {
    pub fn has_role(&self, role_name: &str) -> bool {
        self.role_names.iter().any(|r| r == role_name)
    }
}

/// A workspace member with their resolved profile and roles
#[derive(Debug, Clone, Serialize)]
pub struct Member {
    #[serde(flatten)]
    pub profile: UserProfile,
    pub role_names: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateWorkspaceRequest {
    #[validate(length(min = 1, max = 100, message = "must be 1-100 characters"))]
    pub name: String,
    #[validate(length(max = 500, message = "must be at most 500 characters"))]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateWorkspaceRequest {
    #[validate(length(min = 1, max = 100, message = "must be 1-100 characters"))]
    pub name: Option<String>,
    #[validate(length(max = 500, message = "must be at most 500 characters"))]
    pub description: Option<String>,
    pub branding: Option<WorkspaceBranding>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateMemberRolesRequest {
    #[validate(length(min = 1, message = "at least one role is required"))]
    pub role_names: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_membership_has_role() {
        let membership = WorkspaceMembership {
            workspace_id: "org_1".to_string(),
            role_ids: vec!["rol_a".to_string()],
            role_names: vec!["admin".to_string()],
        };
        assert!(membership.has_role("admin"));
        assert!(!membership.has_role("owner"));
    }

    #[test]
    fn test_create_request_validation() {
        let ok = CreateWorkspaceRequest {
            name: "Acme".to_string(),
            description: None,
        };
        assert!(ok.validate().is_ok());

        let empty = CreateWorkspaceRequest {
            name: String::new(),
            description: None,
        };
        assert!(empty.validate().is_err());
    }
}
