//! Session endpoints
//!
//! The resolved session is what the dashboard shell renders from: the
//! caller's profile, workspaces, current workspace and effective
//! permissions. Workspace selection is a sticky cookie validated against
//! held memberships.

use axum::{
    extract::State,
    routing::{get, put},
    Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;

use crate::{
    models::{UserSession, Workspace},
    utils::{AppError, AppResult, Data},
    AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(get_session))
        .route("/workspace", put(select_workspace))
}

/// The caller's resolved session
async fn get_session(session: UserSession) -> Json<Data<UserSession>> {
    Json(Data::new(session))
}

#[derive(Debug, Deserialize)]
struct SelectWorkspaceRequest {
    workspace_id: String,
}

/// Set the sticky workspace selection
async fn select_workspace(
    State(state): State<AppState>,
    session: UserSession,
    jar: CookieJar,
    Json(payload): Json<SelectWorkspaceRequest>,
) -> AppResult<(CookieJar, Json<Data<Workspace>>)> {
    let workspace = session
        .workspaces
        .iter()
        .find(|w| w.id == payload.workspace_id)
        .cloned()
        .ok_or_else(|| AppError::not_found("Workspace not found"))?;

    let cookie = Cookie::build((
        state.config.session.workspace_cookie_name.clone(),
        workspace.id.clone(),
    ))
    .path("/")
    .http_only(true)
    .secure(state.config.session.cookie_secure)
    .same_site(SameSite::Lax)
    .build();

    Ok((jar.add(cookie), Json(Data::new(workspace))))
}
