//! Identity provider client
//!
//! Management-API client for the external identity provider, which owns
//! users, workspaces (organizations), memberships, roles and invitations.
//! Requests are authenticated with a client-credentials token cached
//! in-process until shortly before expiry. Origin failures propagate as
//! typed errors; callers do not retry.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::IdentityConfig;
use crate::models::{Member, UserProfile, Workspace, WorkspaceBranding, WorkspaceMembership};
use crate::utils::{AppError, AppResult};

/// Renew the management token this long before it actually expires
const TOKEN_EXPIRY_LEEWAY: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct IdentityClient {
    client: Client,
    base_url: String,
    client_id: String,
    client_secret: String,
    token: Arc<RwLock<Option<CachedToken>>>,
}

#[derive(Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

/// User record as returned by the provider
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProviderUser {
    id: String,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    primary_email: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    avatar: Option<String>,
    #[serde(default)]
    is_suspended: bool,
    /// Milliseconds since the epoch
    #[serde(default)]
    created_at: Option<i64>,
}

impl From<ProviderUser> for UserProfile {
    fn from(user: ProviderUser) -> Self {
        UserProfile {
            id: user.id,
            username: user.username,
            primary_email: user.primary_email,
            name: user.name,
            avatar: user.avatar,
            is_suspended: user.is_suspended,
            created_at: user.created_at.and_then(DateTime::from_timestamp_millis),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProviderOrganization {
    id: String,
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    custom_data: Option<serde_json::Value>,
    /// Milliseconds since the epoch
    #[serde(default)]
    created_at: Option<i64>,
}

impl From<ProviderOrganization> for Workspace {
    fn from(org: ProviderOrganization) -> Self {
        let branding = org.custom_data.as_ref().and_then(|data| {
            serde_json::from_value::<WorkspaceBranding>(data.get("branding")?.clone()).ok()
        });
        Workspace {
            id: org.id,
            name: org.name,
            description: org.description,
            branding,
            created_at: org.created_at.and_then(DateTime::from_timestamp_millis),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProviderRole {
    id: String,
    name: String,
}

/// Membership edge: organization detail plus the caller's roles in it.
///
/// This is the canonical membership representation: structured
/// per-membership role records from the management API, not
/// `"orgId:roleName"` claim strings.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProviderUserOrganization {
    id: String,
    #[serde(default)]
    organization_roles: Vec<ProviderRole>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProviderOrgUser {
    #[serde(flatten)]
    user: ProviderUser,
    #[serde(default)]
    organization_roles: Vec<ProviderRole>,
}

/// Invitation as held by the provider
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderInvitation {
    pub id: String,
    pub invitee: String,
    /// Provider status: "Pending", "Accepted", "Expired", "Revoked"
    pub status: String,
}

impl IdentityClient {
    pub fn new(config: &IdentityConfig) -> AppResult<Self> {
        info!("Initializing identity provider client for {}", config.base_url);

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .use_rustls_tls()
            .build()
            .map_err(|e| AppError::internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            token: Arc::new(RwLock::new(None)),
        })
    }

    /// Get a management-API token, fetching a fresh one when the cached
    /// token is absent or close to expiry
    async fn management_token(&self) -> AppResult<String> {
        {
            let token = self.token.read().await;
            if let Some(cached) = token.as_ref() {
                if cached.expires_at > Instant::now() + TOKEN_EXPIRY_LEEWAY {
                    return Ok(cached.access_token.clone());
                }
            }
        }

        let mut token = self.token.write().await;
        // Another request may have refreshed while we waited for the lock
        if let Some(cached) = token.as_ref() {
            if cached.expires_at > Instant::now() + TOKEN_EXPIRY_LEEWAY {
                return Ok(cached.access_token.clone());
            }
        }

        debug!("Fetching management API token");
        let response = self
            .client
            .post(format!("{}/oidc/token", self.base_url))
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("scope", "all"),
            ])
            .send()
            .await?;
        let response = check_status(response, "management token").await?;
        let parsed: TokenResponse = response.json().await?;

        let access_token = parsed.access_token.clone();
        *token = Some(CachedToken {
            access_token: parsed.access_token,
            expires_at: Instant::now() + Duration::from_secs(parsed.expires_in),
        });

        Ok(access_token)
    }

    async fn get(&self, path: &str) -> AppResult<Response> {
        let token = self.management_token().await?;
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(token)
            .send()
            .await?;
        check_status(response, path).await
    }

    async fn send_json<B: Serialize>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: &B,
    ) -> AppResult<Response> {
        let token = self.management_token().await?;
        let response = self
            .client
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(token)
            .json(body)
            .send()
            .await?;
        check_status(response, path).await
    }

    async fn delete(&self, path: &str) -> AppResult<()> {
        let token = self.management_token().await?;
        let response = self
            .client
            .delete(format!("{}{}", self.base_url, path))
            .bearer_auth(token)
            .send()
            .await?;
        check_status(response, path).await?;
        Ok(())
    }

    // ==================== Users ====================

    pub async fn get_user(&self, user_id: &str) -> AppResult<UserProfile> {
        let response = self.get(&format!("/api/users/{}", user_id)).await?;
        let user: ProviderUser = response.json().await?;
        Ok(user.into())
    }

    /// The user's workspace memberships: one edge per organization, with
    /// the role ids and names held there
    pub async fn get_user_memberships(
        &self,
        user_id: &str,
    ) -> AppResult<Vec<WorkspaceMembership>> {
        let response = self
            .get(&format!("/api/users/{}/organizations", user_id))
            .await?;
        let orgs: Vec<ProviderUserOrganization> = response.json().await?;

        Ok(orgs
            .into_iter()
            .map(|org| WorkspaceMembership {
                workspace_id: org.id,
                role_ids: org.organization_roles.iter().map(|r| r.id.clone()).collect(),
                role_names: org.organization_roles.into_iter().map(|r| r.name).collect(),
            })
            .collect())
    }

    // ==================== Workspaces ====================

    pub async fn get_workspace(&self, workspace_id: &str) -> AppResult<Workspace> {
        let response = self
            .get(&format!("/api/organizations/{}", workspace_id))
            .await?;
        let org: ProviderOrganization = response.json().await?;
        Ok(org.into())
    }

    pub async fn create_workspace(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> AppResult<Workspace> {
        let response = self
            .send_json(
                reqwest::Method::POST,
                "/api/organizations",
                &serde_json::json!({ "name": name, "description": description }),
            )
            .await?;
        let org: ProviderOrganization = response.json().await?;
        Ok(org.into())
    }

    pub async fn update_workspace(
        &self,
        workspace_id: &str,
        patch: &serde_json::Value,
    ) -> AppResult<Workspace> {
        let response = self
            .send_json(
                reqwest::Method::PATCH,
                &format!("/api/organizations/{}", workspace_id),
                patch,
            )
            .await?;
        let org: ProviderOrganization = response.json().await?;
        Ok(org.into())
    }

    pub async fn delete_workspace(&self, workspace_id: &str) -> AppResult<()> {
        self.delete(&format!("/api/organizations/{}", workspace_id))
            .await
    }

    // ==================== Members ====================

    pub async fn list_members(&self, workspace_id: &str) -> AppResult<Vec<Member>> {
        let response = self
            .get(&format!("/api/organizations/{}/users", workspace_id))
            .await?;
        let users: Vec<ProviderOrgUser> = response.json().await?;

        Ok(users
            .into_iter()
            .map(|u| Member {
                profile: u.user.into(),
                role_names: u.organization_roles.into_iter().map(|r| r.name).collect(),
            })
            .collect())
    }

    pub async fn add_member(
        &self,
        workspace_id: &str,
        user_id: &str,
        role_names: &[String],
    ) -> AppResult<()> {
        self.send_json(
            reqwest::Method::POST,
            &format!("/api/organizations/{}/users", workspace_id),
            &serde_json::json!({ "userIds": [user_id] }),
        )
        .await?;
        self.replace_member_roles(workspace_id, user_id, role_names)
            .await
    }

    pub async fn replace_member_roles(
        &self,
        workspace_id: &str,
        user_id: &str,
        role_names: &[String],
    ) -> AppResult<()> {
        self.send_json(
            reqwest::Method::PUT,
            &format!("/api/organizations/{}/users/{}/roles", workspace_id, user_id),
            &serde_json::json!({ "organizationRoleNames": role_names }),
        )
        .await?;
        Ok(())
    }

    pub async fn remove_member(&self, workspace_id: &str, user_id: &str) -> AppResult<()> {
        self.delete(&format!(
            "/api/organizations/{}/users/{}",
            workspace_id, user_id
        ))
        .await
    }

    // ==================== Invitations ====================

    pub async fn create_invitation(
        &self,
        workspace_id: &str,
        inviter_id: &str,
        invitee_email: &str,
        role_name: &str,
    ) -> AppResult<ProviderInvitation> {
        let response = self
            .send_json(
                reqwest::Method::POST,
                "/api/organization-invitations",
                &serde_json::json!({
                    "organizationId": workspace_id,
                    "inviterId": inviter_id,
                    "invitee": invitee_email,
                    "organizationRoleNames": [role_name],
                }),
            )
            .await?;
        Ok(response.json().await?)
    }

    pub async fn list_invitations(
        &self,
        workspace_id: &str,
    ) -> AppResult<Vec<ProviderInvitation>> {
        let response = self
            .get(&format!(
                "/api/organization-invitations?organizationId={}",
                workspace_id
            ))
            .await?;
        Ok(response.json().await?)
    }

    pub async fn delete_invitation(&self, invitation_id: &str) -> AppResult<()> {
        self.delete(&format!("/api/organization-invitations/{}", invitation_id))
            .await
    }

    // ==================== Sign-in ====================

    /// Exchange an authorization code for an access token (sign-in
    /// callback)
    pub async fn exchange_code(&self, code: &str, redirect_uri: &str) -> AppResult<String> {
        let response = self
            .client
            .post(format!("{}/oidc/token", self.base_url))
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", redirect_uri),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await?;
        let response = check_status(response, "code exchange").await?;
        let parsed: TokenResponse = response.json().await?;
        Ok(parsed.access_token)
    }

    /// Resolve the subject of an access token via the userinfo endpoint
    pub async fn userinfo_subject(&self, access_token: &str) -> AppResult<String> {
        #[derive(Deserialize)]
        struct UserInfo {
            sub: String,
        }

        let response = self
            .client
            .get(format!("{}/oidc/me", self.base_url))
            .bearer_auth(access_token)
            .send()
            .await?;
        let response = check_status(response, "userinfo").await?;
        let info: UserInfo = response.json().await?;
        Ok(info.sub)
    }
}

/// Map a provider response status to an application error
async fn check_status(response: Response, what: &str) -> AppResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    warn!(status = %status, what, body = %body, "Identity provider returned an error");

    Err(match status {
        StatusCode::NOT_FOUND => AppError::not_found(format!("{}: not found", what)),
        StatusCode::CONFLICT => AppError::conflict(format!("{}: already exists", what)),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            AppError::bad_request(format!("{}: rejected by identity provider", what))
        }
        s if s.is_server_error() => {
            AppError::service_unavailable("Identity provider is unavailable")
        }
        _ => AppError::internal(format!("Identity provider error: {}", status)),
    })
}
