//! Invitation endpoints
//!
//! Invitations are created at the identity provider with a shadow record
//! kept locally. Listing reconciles shadow status against the provider's
//! lifecycle; creation fans out over multiple addresses concurrently and
//! reports a per-address outcome.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};
use chrono::Utc;
use futures::future::join_all;
use tracing::{info, warn};
use uuid::Uuid;
use validator::{Validate, ValidateEmail};

use crate::{
    db::InvitationRepository,
    middleware::auth::check_permissions,
    models::{
        permissions, CreateInvitationsRequest, Invitation, InvitationOutcome, InvitationStatus,
        InviteResult, UserSession, DEFAULT_MEMBER_ROLE,
    },
    utils::{AppError, AppResult, Data, FieldErrors},
    AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_invitations).post(create_invitations))
        .route("/{id}", delete(revoke_invitation))
}

fn current_workspace_id(session: &UserSession) -> AppResult<String> {
    session
        .current_workspace_id()
        .map(String::from)
        .ok_or_else(|| AppError::not_found("No workspace selected"))
}

/// Map the provider's invitation status wording onto ours
fn parse_provider_status(status: &str) -> Option<InvitationStatus> {
    InvitationStatus::parse(&status.to_lowercase())
}

/// Invitations for the current workspace, reconciled against the
/// provider's lifecycle. Reconciliation is best-effort; the shadow
/// records still serve the listing when the provider is unreachable.
async fn list_invitations(
    State(state): State<AppState>,
    session: UserSession,
) -> AppResult<Json<Data<Vec<Invitation>>>> {
    check_permissions(&session, &[permissions::READ_INVITATIONS])?;
    let workspace_id = current_workspace_id(&session)?;

    let repo = InvitationRepository::new(&state.db);

    match state.directory.identity().list_invitations(&workspace_id).await {
        Ok(provider_invitations) => {
            for provider_invitation in provider_invitations {
                if let Some(status) = parse_provider_status(&provider_invitation.status) {
                    if let Err(e) = repo
                        .update_status_by_provider_id(&provider_invitation.id, status)
                        .await
                    {
                        warn!(provider_id = %provider_invitation.id, error = %e,
                              "Failed to reconcile invitation status");
                    }
                }
            }
        }
        Err(e) => {
            warn!(workspace_id = %workspace_id, error = %e,
                  "Skipping invitation reconciliation, provider unreachable");
        }
    }

    let invitations = repo.list_for_workspace(&workspace_id).await?;
    Ok(Json(Data::new(invitations)))
}

/// Invite one or more addresses to the current workspace
async fn create_invitations(
    State(state): State<AppState>,
    session: UserSession,
    Json(payload): Json<CreateInvitationsRequest>,
) -> AppResult<(StatusCode, Json<Data<Vec<InvitationOutcome>>>)> {
    check_permissions(&session, &[permissions::MANAGE_INVITATIONS])?;
    payload.validate()?;

    let invalid: Vec<String> = payload
        .emails
        .iter()
        .filter(|e| !e.validate_email())
        .cloned()
        .collect();
    if !invalid.is_empty() {
        let mut field_errors = FieldErrors::new();
        field_errors.insert(
            "emails".to_string(),
            invalid
                .into_iter()
                .map(|e| format!("invalid email address: {}", e))
                .collect(),
        );
        return Err(AppError::Validation(field_errors));
    }

    let role_name = payload
        .role_name
        .unwrap_or_else(|| DEFAULT_MEMBER_ROLE.to_string());
    if !state.roles.contains(&role_name) {
        return Err(AppError::bad_request(format!("Unknown role: {}", role_name)));
    }

    let workspace_id = current_workspace_id(&session)?;

    // Existing members are skipped rather than invited twice
    let member_emails: Vec<String> = state
        .directory
        .identity()
        .list_members(&workspace_id)
        .await?
        .into_iter()
        .filter_map(|m| m.profile.primary_email)
        .map(|e| e.to_lowercase())
        .collect();

    let single = payload.emails.len() == 1;

    let outcomes = join_all(payload.emails.iter().map(|email| {
        let email = email.to_lowercase();
        let workspace_id = workspace_id.clone();
        let role_name = role_name.clone();
        let inviter_id = session.user.id.clone();
        let member_emails = &member_emails;
        let state = &state;

        async move {
            if member_emails.contains(&email) {
                return InvitationOutcome {
                    email,
                    outcome: InviteResult::AlreadyMember,
                    message: Some("User is already a member".to_string()),
                };
            }

            let repo = InvitationRepository::new(&state.db);
            match repo.find_pending_by_email(&workspace_id, &email).await {
                Ok(Some(_)) => {
                    return InvitationOutcome {
                        email,
                        outcome: InviteResult::AlreadyInvited,
                        message: Some("Invitation already exists".to_string()),
                    };
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(email = %email, error = %e, "Pending-invitation lookup failed");
                }
            }

            let created = state
                .directory
                .identity()
                .create_invitation(&workspace_id, &inviter_id, &email, &role_name)
                .await;

            match created {
                Ok(provider_invitation) => {
                    let now = Utc::now();
                    let shadow = Invitation {
                        id: Uuid::new_v4(),
                        provider_id: provider_invitation.id,
                        workspace_id: workspace_id.clone(),
                        invitee_email: email.clone(),
                        role_name: role_name.clone(),
                        invited_by: inviter_id,
                        status: InvitationStatus::Pending,
                        created_at: now,
                        updated_at: now,
                    };
                    if let Err(e) = repo.insert(&shadow).await {
                        warn!(email = %email, error = %e,
                              "Invitation created at provider but shadow insert failed");
                    }
                    InvitationOutcome {
                        email,
                        outcome: InviteResult::Invited,
                        message: None,
                    }
                }
                Err(AppError::Conflict(_)) => InvitationOutcome {
                    email,
                    outcome: InviteResult::AlreadyInvited,
                    message: Some("Invitation already exists".to_string()),
                },
                Err(e) => {
                    warn!(email = %email, error = %e, "Failed to create invitation");
                    InvitationOutcome {
                        email,
                        outcome: InviteResult::Failed,
                        message: Some("Invitation could not be created".to_string()),
                    }
                }
            }
        }
    }))
    .await;

    // A single-address request surfaces its soft failure directly so the
    // form can show it inline
    if single {
        match outcomes[0].outcome {
            InviteResult::AlreadyInvited => {
                return Err(AppError::bad_request("Invitation already exists"));
            }
            InviteResult::AlreadyMember => {
                return Err(AppError::bad_request("User is already a member"));
            }
            _ => {}
        }
    }

    let invited = outcomes
        .iter()
        .filter(|o| o.outcome == InviteResult::Invited)
        .count();
    info!(workspace_id = %workspace_id, invited, total = outcomes.len(), "Invitations processed");

    Ok((StatusCode::CREATED, Json(Data::new(outcomes))))
}

/// Revoke a pending invitation
async fn revoke_invitation(
    State(state): State<AppState>,
    session: UserSession,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    check_permissions(&session, &[permissions::MANAGE_INVITATIONS])?;
    let workspace_id = current_workspace_id(&session)?;

    let invitation_id =
        Uuid::parse_str(&id).map_err(|_| AppError::bad_request("Invalid invitation ID"))?;

    let repo = InvitationRepository::new(&state.db);
    let invitation = repo
        .get_by_id(&workspace_id, invitation_id)
        .await?
        .ok_or_else(|| AppError::not_found("Invitation not found"))?;

    if invitation.status != InvitationStatus::Pending {
        return Err(AppError::bad_request("Invitation is not pending"));
    }

    // The provider may have already expired or dropped it; revoking is
    // still recorded locally
    match state
        .directory
        .identity()
        .delete_invitation(&invitation.provider_id)
        .await
    {
        Ok(()) | Err(AppError::NotFound(_)) => {}
        Err(e) => return Err(e),
    }

    repo.update_status(invitation_id, InvitationStatus::Revoked)
        .await?;

    info!(workspace_id = %workspace_id, invitation_id = %invitation_id, "Invitation revoked");

    Ok(StatusCode::NO_CONTENT)
}
