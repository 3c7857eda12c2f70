//! API key models
//!
//! Keys are the only credential the service stores itself. The plaintext
//! key is returned exactly once at creation; afterwards only the preview
//! and hash-derived metadata are visible.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: Uuid,
    /// Workspace the key is scoped to
    pub workspace_id: String,
    /// Identity-provider id of the creating user
    pub created_by: String,
    pub name: String,
    /// Printable preview of the plaintext key (prefix + last characters)
    pub preview: String,
    /// Granted scope tags
    pub scopes: Vec<String>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateApiKeyRequest {
    #[validate(length(min = 1, max = 100, message = "must be 1-100 characters"))]
    pub name: String,
    #[validate(length(min = 1, message = "at least one scope is required"))]
    pub scopes: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateApiKeyResponse {
    #[serde(flatten)]
    pub api_key: ApiKey,
    /// Plaintext API key, only returned on creation
    pub key: String,
}
