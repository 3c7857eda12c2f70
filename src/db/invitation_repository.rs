//! Invitation shadow-record repository
//!
//! The identity provider owns the invitation lifecycle; these records
//! exist so the dashboard can list invitations cheaply and reconcile
//! status transitions observed at the provider.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::models::{Invitation, InvitationStatus};

#[derive(Debug, sqlx::FromRow)]
struct InvitationRow {
    id: String,
    provider_id: String,
    workspace_id: String,
    invitee_email: String,
    role_name: String,
    invited_by: String,
    status: String,
    created_at: String,
    updated_at: String,
}

impl InvitationRow {
    fn into_invitation(self) -> Result<Invitation> {
        Ok(Invitation {
            id: Uuid::parse_str(&self.id).context("Invalid invitation id")?,
            provider_id: self.provider_id,
            workspace_id: self.workspace_id,
            invitee_email: self.invitee_email,
            role_name: self.role_name,
            invited_by: self.invited_by,
            status: InvitationStatus::parse(&self.status)
                .with_context(|| format!("Invalid invitation status: {}", self.status))?,
            created_at: parse_db_timestamp(&self.created_at),
            updated_at: parse_db_timestamp(&self.updated_at),
        })
    }
}

const SELECT_COLUMNS: &str = "id, provider_id, workspace_id, invitee_email, role_name, \
                              invited_by, status, created_at, updated_at";

pub struct InvitationRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> InvitationRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, invitation: &Invitation) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO invitations
                (id, provider_id, workspace_id, invitee_email, role_name,
                 invited_by, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(invitation.id.to_string())
        .bind(&invitation.provider_id)
        .bind(&invitation.workspace_id)
        .bind(&invitation.invitee_email)
        .bind(&invitation.role_name)
        .bind(&invitation.invited_by)
        .bind(invitation.status.as_str())
        .bind(invitation.created_at.to_rfc3339())
        .bind(invitation.updated_at.to_rfc3339())
        .execute(self.pool)
        .await
        .context("Failed to insert invitation")?;

        Ok(())
    }

    pub async fn list_for_workspace(&self, workspace_id: &str) -> Result<Vec<Invitation>> {
        let rows = sqlx::query_as::<_, InvitationRow>(&format!(
            "SELECT {} FROM invitations WHERE workspace_id = ? ORDER BY created_at DESC",
            SELECT_COLUMNS
        ))
        .bind(workspace_id)
        .fetch_all(self.pool)
        .await
        .context("Failed to list invitations")?;

        rows.into_iter().map(InvitationRow::into_invitation).collect()
    }

    pub async fn get_by_id(&self, workspace_id: &str, id: Uuid) -> Result<Option<Invitation>> {
        let row = sqlx::query_as::<_, InvitationRow>(&format!(
            "SELECT {} FROM invitations WHERE workspace_id = ? AND id = ?",
            SELECT_COLUMNS
        ))
        .bind(workspace_id)
        .bind(id.to_string())
        .fetch_optional(self.pool)
        .await
        .context("Failed to get invitation")?;

        row.map(InvitationRow::into_invitation).transpose()
    }

    /// A live invitation for this address, if one exists
    pub async fn find_pending_by_email(
        &self,
        workspace_id: &str,
        email: &str,
    ) -> Result<Option<Invitation>> {
        let row = sqlx::query_as::<_, InvitationRow>(&format!(
            "SELECT {} FROM invitations \
             WHERE workspace_id = ? AND invitee_email = ? AND status = 'pending'",
            SELECT_COLUMNS
        ))
        .bind(workspace_id)
        .bind(email)
        .fetch_optional(self.pool)
        .await
        .context("Failed to look up pending invitation")?;

        row.map(InvitationRow::into_invitation).transpose()
    }

    pub async fn update_status(&self, id: Uuid, status: InvitationStatus) -> Result<bool> {
        let result =
            sqlx::query("UPDATE invitations SET status = ?, updated_at = ? WHERE id = ?")
                .bind(status.as_str())
                .bind(Utc::now().to_rfc3339())
                .bind(id.to_string())
                .execute(self.pool)
                .await
                .context("Failed to update invitation status")?;

        Ok(result.rows_affected() > 0)
    }

    /// Reconciliation path: the provider reports status by its own id
    pub async fn update_status_by_provider_id(
        &self,
        provider_id: &str,
        status: InvitationStatus,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE invitations SET status = ?, updated_at = ? WHERE provider_id = ?",
        )
        .bind(status.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(provider_id)
        .execute(self.pool)
        .await
        .context("Failed to reconcile invitation status")?;

        Ok(result.rows_affected() > 0)
    }
}

fn parse_db_timestamp(ts: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(ts) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(ts, "%Y-%m-%d %H:%M:%S") {
        return DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc);
    }
    Utc::now()
}
