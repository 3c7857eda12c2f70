//! Session authentication middleware
//!
//! Resolves the caller's `UserSession` from the session cookie on every
//! request: the cookie holds an opaque id, the session record lives in the
//! cache store with a sliding expiry, and the full session (profile,
//! workspaces, permissions) is assembled fresh by the resolver. Handlers
//! enforce their required permissions through `check_permissions` before
//! touching any other work.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use axum_extra::extract::CookieJar;

use crate::{
    models::UserSession,
    utils::{AppError, AppResult},
    AppState,
};

/// Extractor for the resolved session from request extensions
///
/// Usable as a handler parameter on any route behind
/// `session_auth_middleware`.
impl<S> FromRequestParts<S> for UserSession
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<UserSession>()
            .cloned()
            .ok_or_else(|| AppError::unauthorized("Authentication required"))
    }
}

/// Session authentication middleware
///
/// Loads the session record named by the session cookie (refreshing its
/// sliding expiry), resolves the caller's `UserSession` and injects it
/// into request extensions.
pub async fn session_auth_middleware(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> AppResult<Response> {
    let sid = jar
        .get(&state.config.session.cookie_name)
        .map(|c| c.value().to_string())
        .ok_or_else(|| AppError::unauthorized("Authentication required"))?;

    let record = state
        .sessions
        .load(&sid)
        .await?
        .ok_or_else(|| AppError::unauthorized("Session expired"))?;

    let sticky_workspace = jar
        .get(&state.config.session.workspace_cookie_name)
        .map(|c| c.value().to_string());

    let session = state
        .resolver
        .resolve(&record.user_id, sticky_workspace.as_deref())
        .await?;

    request.extensions_mut().insert(session);

    Ok(next.run(request).await)
}

/// Check a required permission list against a session, failing on the
/// first missing permission
pub fn check_permissions(session: &UserSession, required: &[&str]) -> AppResult<()> {
    for permission in required {
        if !session.has_permission(permission) {
            return Err(AppError::forbidden(format!(
                "Requires permission: {}",
                permission
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserProfile;

    fn session_with(perms: &[&str]) -> UserSession {
        UserSession {
            user: UserProfile {
                id: "usr_1".to_string(),
                username: None,
                primary_email: None,
                name: None,
                avatar: None,
                is_suspended: false,
                created_at: None,
            },
            workspaces: vec![],
            current_workspace: None,
            permissions: perms.iter().map(|p| p.to_string()).collect(),
        }
    }

    #[test]
    fn test_check_permissions_pass() {
        let session = session_with(&["read:members", "manage:members"]);
        assert!(check_permissions(&session, &["read:members"]).is_ok());
        assert!(check_permissions(&session, &["read:members", "manage:members"]).is_ok());
    }

    #[test]
    fn test_check_permissions_fails_on_first_missing() {
        let session = session_with(&["read:members"]);
        let err = check_permissions(&session, &["manage:members", "manage:workspace"])
            .unwrap_err();
        match err {
            AppError::Forbidden(msg) => {
                assert!(msg.contains("manage:members"));
                assert!(!msg.contains("manage:workspace"));
            }
            other => panic!("expected Forbidden, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_requirement_always_passes() {
        let session = session_with(&[]);
        assert!(check_permissions(&session, &[]).is_ok());
    }
}
