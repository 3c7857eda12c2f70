//! Cached identity reads
//!
//! Fetch-or-cache-with-TTL over the identity provider's user, membership
//! and workspace records. Cache failures degrade to direct origin reads;
//! origin failures propagate. Entries are created lazily on first read and
//! deleted explicitly after mutations; user, membership and workspace
//! entries are independently keyed and independently invalidated.

use std::future::Future;
use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::config::CacheConfig;
use crate::models::{UserProfile, Workspace, WorkspaceMembership};
use crate::services::cache::{keys, CacheStore};
use crate::services::identity::IdentityClient;
use crate::utils::AppResult;

#[derive(Clone)]
pub struct DirectoryService {
    identity: IdentityClient,
    cache: CacheStore,
    profile_ttl: Duration,
    membership_ttl: Duration,
    workspace_ttl: Duration,
}

impl DirectoryService {
    pub fn new(identity: IdentityClient, cache: CacheStore, config: &CacheConfig) -> Self {
        Self {
            identity,
            cache,
            profile_ttl: Duration::from_secs(config.profile_ttl_secs),
            membership_ttl: Duration::from_secs(config.membership_ttl_secs),
            workspace_ttl: Duration::from_secs(config.workspace_ttl_secs),
        }
    }

    /// Cache-or-origin read. A cache backend failure is treated as a miss
    /// and the origin result is returned; only origin failures propagate.
    async fn cached<T, F, Fut>(&self, key: &str, ttl: Duration, fetch: F) -> AppResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        match self.cache.get_json::<T>(key).await {
            Ok(Some(value)) => {
                debug!(key, "Cache hit");
                return Ok(value);
            }
            Ok(None) => debug!(key, "Cache miss"),
            Err(e) => warn!(key, error = %e, "Cache read failed, falling back to origin"),
        }

        let value = fetch().await?;

        if let Err(e) = self.cache.set_json(key, &value, ttl).await {
            warn!(key, error = %e, "Cache write failed");
        }

        Ok(value)
    }

    pub async fn user_profile(&self, user_id: &str) -> AppResult<UserProfile> {
        self.cached(&keys::user(user_id), self.profile_ttl, || {
            self.identity.get_user(user_id)
        })
        .await
    }

    /// The user's membership list, rebuilt wholesale on every miss
    pub async fn memberships(&self, user_id: &str) -> AppResult<Vec<WorkspaceMembership>> {
        self.cached(&keys::user_workspaces(user_id), self.membership_ttl, || {
            self.identity.get_user_memberships(user_id)
        })
        .await
    }

    pub async fn workspace(&self, workspace_id: &str) -> AppResult<Workspace> {
        self.cached(&keys::workspace(workspace_id), self.workspace_ttl, || {
            self.identity.get_workspace(workspace_id)
        })
        .await
    }

    // ==================== Invalidation ====================
    //
    // Called after mutations so the next read repopulates from the
    // origin. Failures are logged; the mutation itself already succeeded.

    pub async fn invalidate_user(&self, user_id: &str) {
        if let Err(e) = self.cache.delete(&keys::user(user_id)).await {
            warn!(user_id, error = %e, "Failed to invalidate user cache");
        }
    }

    pub async fn invalidate_memberships(&self, user_id: &str) {
        if let Err(e) = self.cache.delete(&keys::user_workspaces(user_id)).await {
            warn!(user_id, error = %e, "Failed to invalidate membership cache");
        }
    }

    pub async fn invalidate_workspace(&self, workspace_id: &str) {
        if let Err(e) = self.cache.delete(&keys::workspace(workspace_id)).await {
            warn!(workspace_id, error = %e, "Failed to invalidate workspace cache");
        }
    }

    /// Access to the underlying identity client for uncached operations
    pub fn identity(&self) -> &IdentityClient {
        &self.identity
    }
}
