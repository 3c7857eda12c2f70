//! Workspace endpoints
//!
//! Workspaces live in the identity provider; handlers proxy mutations
//! through and invalidate the affected cache entries so the next session
//! resolution sees fresh data.

use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use tracing::{info, warn};
use validator::Validate;

use crate::{
    middleware::auth::check_permissions,
    models::{
        permissions, CreateWorkspaceRequest, UpdateWorkspaceRequest, UserSession, Workspace,
        OWNER_ROLE,
    },
    utils::{validation::validate_workspace_name, AppError, AppResult, Data},
    AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_workspaces).post(create_workspace))
        .route(
            "/current",
            get(get_current_workspace)
                .patch(update_current_workspace)
                .delete(delete_current_workspace),
        )
}

/// Every workspace the caller belongs to; valid (and empty) for users
/// with no memberships
async fn list_workspaces(session: UserSession) -> Json<Data<Vec<Workspace>>> {
    Json(Data::new(session.workspaces))
}

/// Create a workspace; the creator becomes its owner. Any authenticated
/// user may create a workspace, including one with no memberships yet.
async fn create_workspace(
    State(state): State<AppState>,
    session: UserSession,
    jar: CookieJar,
    Json(payload): Json<CreateWorkspaceRequest>,
) -> AppResult<(StatusCode, CookieJar, Json<Data<Workspace>>)> {
    payload.validate()?;
    if !validate_workspace_name(&payload.name) {
        return Err(AppError::bad_request(
            "Workspace name must not start or end with whitespace",
        ));
    }

    let identity = state.directory.identity();
    let workspace = identity
        .create_workspace(&payload.name, payload.description.as_deref())
        .await?;
    identity
        .add_member(&workspace.id, &session.user.id, &[OWNER_ROLE.to_string()])
        .await?;

    // Relay tenant provisioning is best-effort; destination management
    // retries it on first use
    if let Err(e) = state.relay.upsert_tenant(&workspace.id).await {
        warn!(workspace_id = %workspace.id, error = %e, "Failed to provision relay tenant");
    }

    state.directory.invalidate_memberships(&session.user.id).await;

    info!(workspace_id = %workspace.id, user_id = %session.user.id, "Workspace created");

    // Switch the sticky selection to the new workspace
    let cookie = Cookie::build((
        state.config.session.workspace_cookie_name.clone(),
        workspace.id.clone(),
    ))
    .path("/")
    .http_only(true)
    .secure(state.config.session.cookie_secure)
    .same_site(SameSite::Lax)
    .build();

    Ok((StatusCode::CREATED, jar.add(cookie), Json(Data::new(workspace))))
}

/// Detail of the currently selected workspace
async fn get_current_workspace(session: UserSession) -> AppResult<Json<Data<Workspace>>> {
    check_permissions(&session, &[permissions::READ_WORKSPACE])?;

    let workspace = session
        .current_workspace
        .ok_or_else(|| AppError::not_found("No workspace selected"))?;
    Ok(Json(Data::new(workspace)))
}

/// Rename the current workspace or update its description/branding
async fn update_current_workspace(
    State(state): State<AppState>,
    session: UserSession,
    Json(payload): Json<UpdateWorkspaceRequest>,
) -> AppResult<Json<Data<Workspace>>> {
    check_permissions(&session, &[permissions::MANAGE_WORKSPACE])?;
    payload.validate()?;

    let workspace_id = session
        .current_workspace_id()
        .ok_or_else(|| AppError::not_found("No workspace selected"))?
        .to_string();

    let mut patch = serde_json::Map::new();
    if let Some(name) = payload.name {
        if !validate_workspace_name(&name) {
            return Err(AppError::bad_request(
                "Workspace name must not start or end with whitespace",
            ));
        }
        patch.insert("name".to_string(), name.into());
    }
    if let Some(description) = payload.description {
        patch.insert("description".to_string(), description.into());
    }
    if let Some(branding) = payload.branding {
        patch.insert(
            "customData".to_string(),
            serde_json::json!({ "branding": branding }),
        );
    }
    if patch.is_empty() {
        return Err(AppError::bad_request("Nothing to update"));
    }

    let updated = state
        .directory
        .identity()
        .update_workspace(&workspace_id, &patch.into())
        .await?;

    state.directory.invalidate_workspace(&workspace_id).await;

    Ok(Json(Data::new(updated)))
}

/// Delete the current workspace
async fn delete_current_workspace(
    State(state): State<AppState>,
    session: UserSession,
) -> AppResult<StatusCode> {
    check_permissions(&session, &[permissions::MANAGE_WORKSPACE])?;

    let workspace_id = session
        .current_workspace_id()
        .ok_or_else(|| AppError::not_found("No workspace selected"))?
        .to_string();

    // Capture the member list first so every member's membership cache
    // can be invalidated after the delete
    let members = state
        .directory
        .identity()
        .list_members(&workspace_id)
        .await
        .unwrap_or_default();

    state
        .directory
        .identity()
        .delete_workspace(&workspace_id)
        .await?;

    if let Err(e) = state.relay.delete_tenant(&workspace_id).await {
        warn!(workspace_id = %workspace_id, error = %e, "Failed to remove relay tenant");
    }

    state.directory.invalidate_workspace(&workspace_id).await;
    for member in &members {
        state.directory.invalidate_memberships(&member.profile.id).await;
    }

    info!(workspace_id = %workspace_id, user_id = %session.user.id, "Workspace deleted");

    Ok(StatusCode::NO_CONTENT)
}
