//! Session storage and resolution
//!
//! Session payloads live in the cache store (not in cookies): the browser
//! holds an opaque session id, the store maps it to the user id with a
//! sliding-window expiry. On every request the full `UserSession` is
//! resolved fresh from cached identity data plus the static role table.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use futures::future::try_join_all;
use rand::{rngs::OsRng, RngCore};
use tracing::warn;

use crate::models::{RoleTable, SessionRecord, UserSession};
use crate::services::cache::{keys, CacheStore};
use crate::services::directory::DirectoryService;
use crate::utils::{AppError, AppResult};

/// Session-id records in the cache store
#[derive(Clone)]
pub struct SessionStore {
    cache: CacheStore,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(cache: CacheStore, ttl: Duration) -> Self {
        Self { cache, ttl }
    }

    /// Create a session record and return its opaque id
    pub async fn create(&self, user_id: &str) -> AppResult<String> {
        let mut sid_bytes = [0u8; 32];
        OsRng.fill_bytes(&mut sid_bytes);
        let sid = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(sid_bytes);

        let record = SessionRecord {
            user_id: user_id.to_string(),
            issued_at: chrono::Utc::now(),
        };
        self.cache
            .set_json(&keys::session(&sid), &record, self.ttl)
            .await
            .map_err(|e| {
                AppError::service_unavailable(format!("Session store unavailable: {}", e))
            })?;

        Ok(sid)
    }

    /// Load a session record, refreshing its sliding expiry on success
    pub async fn load(&self, sid: &str) -> AppResult<Option<SessionRecord>> {
        let key = keys::session(sid);
        let record: Option<SessionRecord> = self.cache.get_json(&key).await.map_err(|e| {
            AppError::service_unavailable(format!("Session store unavailable: {}", e))
        })?;

        if record.is_some() {
            if let Err(e) = self.cache.refresh_expiry(&key, self.ttl).await {
                warn!(error = %e, "Failed to refresh session expiry");
            }
        }

        Ok(record)
    }

    /// Destroy a session record; destroying an absent session is not an
    /// error
    pub async fn destroy(&self, sid: &str) -> AppResult<()> {
        self.cache.delete(&keys::session(sid)).await.map_err(|e| {
            AppError::service_unavailable(format!("Session store unavailable: {}", e))
        })
    }
}

/// Resolves the caller's identity, workspaces and effective permissions
#[derive(Clone)]
pub struct SessionResolver {
    directory: Arc<DirectoryService>,
    roles: Arc<RoleTable>,
}

impl SessionResolver {
    pub fn new(directory: Arc<DirectoryService>, roles: Arc<RoleTable>) -> Self {
        Self { directory, roles }
    }

    /// Assemble a `UserSession` for an authenticated principal.
    ///
    /// `sticky_workspace` is the workspace-selection cookie value; when it
    /// names a workspace the user no longer belongs to it is silently
    /// ignored. A user with zero memberships yields a valid session with
    /// no current workspace and no permissions.
    pub async fn resolve(
        &self,
        user_id: &str,
        sticky_workspace: Option<&str>,
    ) -> AppResult<UserSession> {
        let profile_fut = async {
            match self.directory.user_profile(user_id).await {
                Err(AppError::NotFound(_)) => {
                    Err(AppError::unauthorized("Unknown principal"))
                }
                other => other,
            }
        };
        let memberships_fut = self.directory.memberships(user_id);

        let (profile, memberships) = tokio::try_join!(profile_fut, memberships_fut)?;

        if profile.is_suspended {
            return Err(AppError::unauthorized("Account is suspended"));
        }

        // Workspace details are independent by id; fetch them concurrently
        let workspaces = try_join_all(
            memberships
                .iter()
                .map(|m| self.directory.workspace(&m.workspace_id)),
        )
        .await?;

        let current_index = sticky_workspace
            .and_then(|selected| {
                memberships
                    .iter()
                    .position(|m| m.workspace_id == selected)
            })
            .or(if memberships.is_empty() { None } else { Some(0) });

        let (current_workspace, permissions) = match current_index {
            Some(index) => {
                let permissions = self.roles.permissions_for(&memberships[index].role_names);
                (Some(workspaces[index].clone()), permissions)
            }
            None => (None, vec![]),
        };

        Ok(UserSession {
            user: profile,
            workspaces,
            current_workspace,
            permissions,
        })
    }
}
