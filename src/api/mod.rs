//! API routes and handlers
//!
//! Three route groups: public (health, sign-in), session-authenticated
//! dashboard routes under `/api`, and key-authenticated external routes
//! under `/v1`.

use axum::{routing::get, Router};

use crate::{
    middleware::{
        api_key_auth_middleware, rate_limit_middleware, session_auth_middleware, RateLimitState,
    },
    AppState,
};

mod api_keys;
mod auth;
mod health;
mod invitations;
mod members;
mod session;
mod webhooks;
mod workspaces;

pub use health::*;

/// Session-authenticated dashboard routes
pub fn protected_routes() -> Router<AppState> {
    Router::new()
        .nest("/session", session::routes())
        .nest("/workspaces", workspaces::routes())
        .nest("/members", members::routes())
        .nest("/invitations", invitations::routes())
        .nest("/api-keys", api_keys::routes())
        .nest("/webhooks", webhooks::routes())
}

/// Key-authenticated external routes
pub fn external_routes() -> Router<AppState> {
    Router::new()
        .nest("/api-keys", api_keys::external_routes())
        .merge(webhooks::external_routes())
}

/// Assemble the full application router.
///
/// `rate_limit` guards the sign-in endpoints; pass `None` in tests, where
/// no client socket address is available.
pub fn router(state: AppState, rate_limit: Option<RateLimitState>) -> Router {
    let mut auth_routes = auth::routes();
    if let Some(limiter) = rate_limit {
        auth_routes = auth_routes.route_layer(axum::middleware::from_fn_with_state(
            limiter,
            rate_limit_middleware,
        ));
    }

    let public = Router::new()
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness))
        .nest("/auth", auth_routes);

    let protected = protected_routes().route_layer(axum::middleware::from_fn_with_state(
        state.clone(),
        session_auth_middleware,
    ));

    let external = external_routes().route_layer(axum::middleware::from_fn_with_state(
        state.clone(),
        api_key_auth_middleware,
    ));

    Router::new()
        .nest("/api", public.merge(protected))
        .nest("/v1", external)
        .with_state(state)
}
