//! Authentication endpoints
//!
//! Sign-in is delegated to the identity provider; the callback exchanges
//! the authorization code, resolves the subject and creates a session
//! record in the cache store. The browser only ever holds the opaque
//! session id.

use axum::{extract::State, routing::post, Json, Router};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::Validate;

use crate::{
    utils::{AppError, AppResult, Data},
    AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/callback", post(callback))
        .route("/sign-out", post(sign_out))
}

#[derive(Debug, Deserialize, Validate)]
struct CallbackRequest {
    #[validate(length(min = 1, message = "must not be empty"))]
    code: String,
    #[validate(url(message = "must be a valid URL"))]
    redirect_uri: String,
}

#[derive(Debug, Serialize)]
struct CallbackResponse {
    user_id: String,
}

fn session_cookie(state: &AppState, value: String) -> Cookie<'static> {
    Cookie::build((state.config.session.cookie_name.clone(), value))
        .path("/")
        .http_only(true)
        .secure(state.config.session.cookie_secure)
        .same_site(SameSite::Lax)
        .build()
}

/// Sign-in callback: exchange the authorization code, create a session
async fn callback(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<CallbackRequest>,
) -> AppResult<(CookieJar, Json<Data<CallbackResponse>>)> {
    payload.validate()?;

    let access_token = state
        .directory
        .identity()
        .exchange_code(&payload.code, &payload.redirect_uri)
        .await?;
    let user_id = state
        .directory
        .identity()
        .userinfo_subject(&access_token)
        .await?;

    let sid = state.sessions.create(&user_id).await?;
    info!(user_id = %user_id, "User signed in");

    let jar = jar.add(session_cookie(&state, sid));
    Ok((jar, Json(Data::new(CallbackResponse { user_id }))))
}

/// Destroy the caller's session record and clear the cookie
async fn sign_out(
    State(state): State<AppState>,
    jar: CookieJar,
) -> AppResult<(CookieJar, Json<Data<bool>>)> {
    let Some(cookie) = jar.get(&state.config.session.cookie_name) else {
        return Err(AppError::unauthorized("Not signed in"));
    };

    state.sessions.destroy(cookie.value()).await?;

    let mut removal = Cookie::from(state.config.session.cookie_name.clone());
    removal.set_path("/");
    let jar = jar.remove(removal);

    Ok((jar, Json(Data::new(true))))
}
