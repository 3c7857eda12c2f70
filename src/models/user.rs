//! User profile model
//!
//! The identity provider is the source of truth for user records; this is
//! the cached projection the dashboard works with.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user profile as reported by the identity provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    /// Identity-provider user id
    pub id: String,
    #[serde(default)]
    pub username: Option<String>,
    /// Primary email address
    #[serde(default)]
    pub primary_email: Option<String>,
    /// Display name
    #[serde(default)]
    pub name: Option<String>,
    /// Avatar image URL
    #[serde(default)]
    pub avatar: Option<String>,
    /// Whether the account is suspended at the provider
    #[serde(default)]
    pub is_suspended: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl UserProfile {
    /// Best human-readable label for this user
    pub fn display_label(&self) -> &str {
        self.name
            .as_deref()
            .or(self.username.as_deref())
            .or(self.primary_email.as_deref())
            .unwrap_or(&self.id)
    }
}
