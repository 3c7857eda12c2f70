//! Member endpoints
//!
//! Members are read from and mutated at the identity provider, relative
//! to the caller's current workspace. Owner protections: only owners may
//! change or remove other owners, and a workspace always retains at
//! least one owner.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, put},
    Json, Router,
};
use tracing::info;
use validator::Validate;

use crate::{
    middleware::auth::check_permissions,
    models::{permissions, Member, UpdateMemberRolesRequest, UserSession, OWNER_ROLE},
    utils::{AppError, AppResult, Data},
    AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_members))
        .route("/{user_id}/roles", put(update_member_roles))
        .route("/{user_id}", delete(remove_member))
}

fn current_workspace_id(session: &UserSession) -> AppResult<String> {
    session
        .current_workspace_id()
        .map(String::from)
        .ok_or_else(|| AppError::not_found("No workspace selected"))
}

fn is_owner(member: &Member) -> bool {
    member.role_names.iter().any(|r| r == OWNER_ROLE)
}

/// Owner-protection checks shared by role updates and removal: `target`
/// must exist, non-owners may not touch owners, and the last owner can
/// neither be demoted nor removed.
fn guard_owner_rules<'a>(
    members: &'a [Member],
    session: &UserSession,
    target_user_id: &str,
    removes_ownership: bool,
) -> AppResult<&'a Member> {
    let target = members
        .iter()
        .find(|m| m.profile.id == target_user_id)
        .ok_or_else(|| AppError::not_found("Member not found"))?;

    if is_owner(target) {
        let caller_is_owner = members
            .iter()
            .any(|m| m.profile.id == session.user.id && is_owner(m));
        if !caller_is_owner {
            return Err(AppError::forbidden("Only owners can modify other owners"));
        }

        if removes_ownership {
            let owner_count = members.iter().filter(|m| is_owner(m)).count();
            if owner_count <= 1 {
                return Err(AppError::bad_request(
                    "Workspace must retain at least one owner",
                ));
            }
        }
    }

    Ok(target)
}

/// Members of the current workspace with profiles and role names
async fn list_members(
    State(state): State<AppState>,
    session: UserSession,
) -> AppResult<Json<Data<Vec<Member>>>> {
    check_permissions(&session, &[permissions::READ_MEMBERS])?;
    let workspace_id = current_workspace_id(&session)?;

    let members = state.directory.identity().list_members(&workspace_id).await?;
    Ok(Json(Data::new(members)))
}

/// Replace a member's role set
async fn update_member_roles(
    State(state): State<AppState>,
    session: UserSession,
    Path(user_id): Path<String>,
    Json(payload): Json<UpdateMemberRolesRequest>,
) -> AppResult<Json<Data<bool>>> {
    check_permissions(&session, &[permissions::MANAGE_MEMBERS])?;
    payload.validate()?;

    for role_name in &payload.role_names {
        if !state.roles.contains(role_name) {
            return Err(AppError::bad_request(format!("Unknown role: {}", role_name)));
        }
    }

    let workspace_id = current_workspace_id(&session)?;
    let members = state.directory.identity().list_members(&workspace_id).await?;

    let removes_ownership = !payload.role_names.iter().any(|r| r == OWNER_ROLE);
    guard_owner_rules(&members, &session, &user_id, removes_ownership)?;

    state
        .directory
        .identity()
        .replace_member_roles(&workspace_id, &user_id, &payload.role_names)
        .await?;

    state.directory.invalidate_memberships(&user_id).await;

    info!(
        workspace_id = %workspace_id,
        target = %user_id,
        actor = %session.user.id,
        "Member roles updated"
    );

    Ok(Json(Data::new(true)))
}

/// Remove a member from the current workspace
async fn remove_member(
    State(state): State<AppState>,
    session: UserSession,
    Path(user_id): Path<String>,
) -> AppResult<StatusCode> {
    check_permissions(&session, &[permissions::MANAGE_MEMBERS])?;

    let workspace_id = current_workspace_id(&session)?;
    let members = state.directory.identity().list_members(&workspace_id).await?;

    guard_owner_rules(&members, &session, &user_id, true)?;

    state
        .directory
        .identity()
        .remove_member(&workspace_id, &user_id)
        .await?;

    state.directory.invalidate_memberships(&user_id).await;

    info!(
        workspace_id = %workspace_id,
        target = %user_id,
        actor = %session.user.id,
        "Member removed"
    );

    Ok(StatusCode::NO_CONTENT)
}
