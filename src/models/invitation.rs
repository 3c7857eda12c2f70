//! Invitation models
//!
//! Invitations live in the identity provider; the service keeps shadow
//! records to list them cheaply and to reconcile status transitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Revoked,
    Expired,
}

impl InvitationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvitationStatus::Pending => "pending",
            InvitationStatus::Accepted => "accepted",
            InvitationStatus::Revoked => "revoked",
            InvitationStatus::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(InvitationStatus::Pending),
            "accepted" => Some(InvitationStatus::Accepted),
            "revoked" => Some(InvitationStatus::Revoked),
            "expired" => Some(InvitationStatus::Expired),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Invitation {
    pub id: Uuid,
    /// Invitation id at the identity provider
    pub provider_id: String,
    pub workspace_id: String,
    pub invitee_email: String,
    /// Role the invitee receives on acceptance
    pub role_name: String,
    /// Identity-provider id of the inviting user
    pub invited_by: String,
    pub status: InvitationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateInvitationsRequest {
    /// Invitee email addresses; each is processed independently
    #[validate(length(min = 1, max = 25, message = "must contain 1-25 addresses"))]
    pub emails: Vec<String>,
    /// Role granted on acceptance, defaults to "member"
    pub role_name: Option<String>,
}

/// Per-email outcome of a multi-invite request
#[derive(Debug, Clone, Serialize)]
pub struct InvitationOutcome {
    pub email: String,
    pub outcome: InviteResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InviteResult {
    Invited,
    AlreadyInvited,
    AlreadyMember,
    Failed,
}
