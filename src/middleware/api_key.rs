//! API key authentication middleware
//!
//! Authenticates the external API surface: the bearer credential is
//! hashed with SHA-256 and matched against stored key records. Handlers
//! enforce their required scopes through `check_scopes`, which reports
//! every missing scope, not just the first. Key usage is recorded by a
//! detached task that never delays or fails the request.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::{
    db::ApiKeyRepository,
    models::ApiKey,
    utils::{AppError, AppResult},
    AppState,
};

/// Prefix carried by every issued key
pub const KEY_PREFIX: &str = "cdk_";

/// The API key record a request authenticated with
#[derive(Debug, Clone)]
pub struct AuthedKey(pub ApiKey);

impl AuthedKey {
    pub fn workspace_id(&self) -> &str {
        &self.0.workspace_id
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.0.scopes.iter().any(|s| s == scope)
    }

    /// Scopes from `required` this key does not hold
    pub fn missing_scopes(&self, required: &[&str]) -> Vec<String> {
        required
            .iter()
            .filter(|s| !self.has_scope(s))
            .map(|s| s.to_string())
            .collect()
    }
}

impl<S> FromRequestParts<S> for AuthedKey
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthedKey>()
            .cloned()
            .ok_or_else(|| AppError::unauthorized("API key required"))
    }
}

/// One-way hash of a plaintext key, as stored in the database
pub fn hash_key(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    auth_header
        .strip_prefix("Bearer ")
        .or_else(|| auth_header.strip_prefix("bearer "))
}

/// API key authentication middleware
pub async fn api_key_auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> AppResult<Response> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(extract_bearer_token)
        .ok_or_else(|| AppError::unauthorized("API key required"))?;

    if !token.starts_with(KEY_PREFIX) {
        return Err(AppError::unauthorized("Invalid API key"));
    }

    let key_hash = hash_key(token);
    let repo = ApiKeyRepository::new(&state.db);
    let api_key = repo
        .find_by_hash(&key_hash)
        .await
        .map_err(|e| {
            warn!(error = %e, "API key lookup failed");
            AppError::internal("Failed to authenticate API key")
        })?
        .ok_or_else(|| AppError::unauthorized("Invalid API key"))?;

    // Record usage without holding up the request; the outcome is only
    // ever logged.
    let pool = state.db.clone();
    let key_id = api_key.id;
    tokio::spawn(async move {
        if let Err(e) = ApiKeyRepository::new(&pool).touch_last_used(key_id).await {
            warn!(api_key_id = %key_id, error = %e, "Failed to record API key usage");
        }
    });

    request.extensions_mut().insert(AuthedKey(api_key));

    Ok(next.run(request).await)
}

/// Check a required scope list against a key, reporting every missing
/// scope
pub fn check_scopes(key: &AuthedKey, required: &[&str]) -> AppResult<()> {
    let missing = key.missing_scopes(required);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(AppError::forbidden(format!(
            "Requires scopes: {}",
            missing.join(", ")
        )))
    }
}
