//! Roles and permissions
//!
//! Roles are configuration, not data: one static table shared by every
//! workspace, built at startup and injected wherever permissions are
//! computed. Permissions are `<verb>:<resource>` tags derived from role
//! names at read time; they are never stored per user.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Permission tags understood by the application
pub mod permissions {
    pub const READ_WORKSPACE: &str = "read:workspace";
    pub const MANAGE_WORKSPACE: &str = "manage:workspace";
    pub const READ_MEMBERS: &str = "read:members";
    pub const MANAGE_MEMBERS: &str = "manage:members";
    pub const READ_INVITATIONS: &str = "read:invitations";
    pub const MANAGE_INVITATIONS: &str = "manage:invitations";
    pub const READ_API_KEYS: &str = "read:api-keys";
    pub const WRITE_API_KEYS: &str = "write:api-keys";
    pub const READ_WEBHOOKS: &str = "read:webhooks";
    pub const MANAGE_WEBHOOKS: &str = "manage:webhooks";
}

/// Role assigned to the creator of a workspace
pub const OWNER_ROLE: &str = "owner";

/// Role assigned to invited members when none is specified
pub const DEFAULT_MEMBER_ROLE: &str = "member";

/// Role origin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleKind {
    /// Built-in role shipped with the application; per-tenant custom roles
    /// do not exist
    System,
}

/// A role that can be held by workspace members
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    /// Stable role name used in membership records (e.g. "admin")
    pub name: String,
    /// Human-readable display name
    pub display_name: String,
    /// Description of the role
    pub description: String,
    /// Permission tags granted by this role
    pub permissions: Vec<String>,
    /// Role origin
    pub kind: RoleKind,
}

/// Immutable role table shared by all tenants
#[derive(Debug, Clone)]
pub struct RoleTable {
    roles: Vec<Role>,
}

impl RoleTable {
    /// Build the table of built-in roles
    pub fn builtin() -> Self {
        use permissions::*;

        let member_grants = vec![
            READ_WORKSPACE,
            READ_MEMBERS,
            READ_INVITATIONS,
            READ_API_KEYS,
            READ_WEBHOOKS,
        ];
        let admin_grants = [
            member_grants.as_slice(),
            &[
                MANAGE_MEMBERS,
                MANAGE_INVITATIONS,
                WRITE_API_KEYS,
                MANAGE_WEBHOOKS,
            ],
        ]
        .concat();
        let owner_grants = [admin_grants.as_slice(), &[MANAGE_WORKSPACE]].concat();

        let role = |name: &str, display_name: &str, description: &str, grants: &[&str]| Role {
            name: name.to_string(),
            display_name: display_name.to_string(),
            description: description.to_string(),
            permissions: grants.iter().map(|p| p.to_string()).collect(),
            kind: RoleKind::System,
        };

        Self {
            roles: vec![
                role(
                    OWNER_ROLE,
                    "Owner",
                    "Full control of the workspace, including settings and deletion",
                    &owner_grants,
                ),
                role(
                    "admin",
                    "Admin",
                    "Manage members, invitations, API keys and webhooks",
                    &admin_grants,
                ),
                role(
                    DEFAULT_MEMBER_ROLE,
                    "Member",
                    "Read-only access to workspace resources",
                    &member_grants,
                ),
            ],
        }
    }

    /// All roles in the table
    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    /// Look up a role by name
    pub fn get(&self, name: &str) -> Option<&Role> {
        self.roles.iter().find(|r| r.name == name)
    }

    /// Whether a role name exists in the table
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Deduplicated union of permissions granted by the given role names.
    ///
    /// Unknown role names are skipped. The result is sorted, so it is
    /// stable regardless of role-processing order.
    pub fn permissions_for(&self, role_names: &[String]) -> Vec<String> {
        let mut union: BTreeSet<&str> = BTreeSet::new();
        for name in role_names {
            if let Some(role) = self.get(name) {
                union.extend(role.permissions.iter().map(String::as_str));
            }
        }
        union.into_iter().map(String::from).collect()
    }

    /// Whether a scope tag names a known permission; this doubles as the
    /// check for scopes an API key may request
    pub fn is_known_permission(&self, scope: &str) -> bool {
        self.roles
            .iter()
            .any(|r| r.permissions.iter().any(|p| p == scope))
    }
}

impl Default for RoleTable {
    fn default() -> Self {
        Self::builtin()
    }
}
