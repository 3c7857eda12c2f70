//! Test application setup utilities
//!
//! Builds a full application instance against mock identity and relay
//! servers, with an in-memory database and cache. Requests are driven
//! through the router with `tower::ServiceExt::oneshot`.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Request, Response},
    Router,
};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crewdeck::{
    api,
    config::{
        AppConfig, CacheConfig, DatabaseConfig, IdentityConfig, LoggingConfig, RelayConfig,
        ServerConfig, SessionConfig,
    },
    db,
    models::RoleTable,
    services::{
        CacheStore, DirectoryService, IdentityClient, RelayClient, SessionResolver, SessionStore,
    },
    AppState,
};

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub identity: MockServer,
    pub relay: MockServer,
}

impl TestApp {
    pub async fn new() -> Self {
        let identity = MockServer::start().await;
        let relay = MockServer::start().await;

        // Management token endpoint used by every identity call
        Mock::given(method("POST"))
            .and(path("/oidc/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "test-token",
                "expires_in": 3600,
            })))
            .mount(&identity)
            .await;

        let config = AppConfig {
            server: ServerConfig::default(),
            identity: IdentityConfig {
                base_url: identity.uri(),
                client_id: "test-m2m".to_string(),
                client_secret: "test-secret".to_string(),
                timeout_secs: 5,
            },
            relay: RelayConfig {
                base_url: relay.uri(),
                api_key: Some("relay-admin-key".to_string()),
                timeout_secs: 5,
            },
            database: DatabaseConfig {
                url: "sqlite::memory:".to_string(),
                max_connections: 1,
                min_connections: 1,
                connect_timeout_secs: 5,
                idle_timeout_secs: 600,
            },
            cache: CacheConfig::default(),
            session: SessionConfig {
                cookie_secure: false,
                ..SessionConfig::default()
            },
            logging: LoggingConfig::default(),
        };

        let db = db::init_pool(&config.database)
            .await
            .expect("Failed to initialize test database");
        let cache = CacheStore::memory();
        let identity_client =
            IdentityClient::new(&config.identity).expect("Failed to build identity client");
        let relay_client = RelayClient::new(&config.relay).expect("Failed to build relay client");

        let roles = Arc::new(RoleTable::builtin());
        let directory = Arc::new(DirectoryService::new(
            identity_client,
            cache.clone(),
            &config.cache,
        ));
        let sessions = SessionStore::new(
            cache.clone(),
            std::time::Duration::from_secs(config.session.ttl_secs),
        );
        let resolver = SessionResolver::new(directory.clone(), roles.clone());

        let state = AppState {
            config: config.clone(),
            db,
            cache,
            directory,
            relay: relay_client,
            roles,
            sessions,
            resolver,
        };

        let router = api::router(state.clone(), None);

        Self {
            router,
            state,
            identity,
            relay,
        }
    }

    /// Create a session record directly and return its cookie value
    pub async fn sign_in(&self, user_id: &str) -> String {
        self.state
            .sessions
            .create(user_id)
            .await
            .expect("Failed to create test session")
    }

    /// Mount the identity mocks for a user with the given memberships,
    /// where each membership is `(workspace_id, workspace_name, roles)`
    pub async fn mock_user_with_workspaces(
        &self,
        user_id: &str,
        memberships: &[(&str, &str, &[&str])],
    ) {
        Mock::given(method("GET"))
            .and(path(format!("/api/users/{}", user_id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": user_id,
                "username": user_id,
                "primaryEmail": format!("{}@example.com", user_id),
                "isSuspended": false,
            })))
            .mount(&self.identity)
            .await;

        let orgs: Vec<serde_json::Value> = memberships
            .iter()
            .map(|(id, name, roles)| {
                serde_json::json!({
                    "id": id,
                    "name": name,
                    "organizationRoles": roles
                        .iter()
                        .enumerate()
                        .map(|(i, r)| serde_json::json!({"id": format!("rol_{}", i), "name": r}))
                        .collect::<Vec<_>>(),
                })
            })
            .collect();

        Mock::given(method("GET"))
            .and(path(format!("/api/users/{}/organizations", user_id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(orgs))
            .mount(&self.identity)
            .await;

        for (id, name, _) in memberships {
            Mock::given(method("GET"))
                .and(path(format!("/api/organizations/{}", id)))
                .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "id": id,
                    "name": name,
                })))
                .mount(&self.identity)
                .await;
        }
    }

    /// Send a request without a body
    pub async fn request(
        &self,
        http_method: &str,
        uri: &str,
        cookies: Option<&str>,
        bearer: Option<&str>,
    ) -> Response<Body> {
        let mut builder = Request::builder().method(http_method).uri(uri);
        if let Some(cookies) = cookies {
            builder = builder.header(header::COOKIE, cookies);
        }
        if let Some(token) = bearer {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = builder.body(Body::empty()).expect("Failed to build request");

        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("Request failed")
    }

    /// Send a request with a JSON body
    pub async fn request_json(
        &self,
        http_method: &str,
        uri: &str,
        cookies: Option<&str>,
        bearer: Option<&str>,
        body: serde_json::Value,
    ) -> Response<Body> {
        let mut builder = Request::builder()
            .method(http_method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(cookies) = cookies {
            builder = builder.header(header::COOKIE, cookies);
        }
        if let Some(token) = bearer {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = builder
            .body(Body::from(body.to_string()))
            .expect("Failed to build request");

        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("Request failed")
    }
}

/// Read a response body as JSON
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read response body");
    serde_json::from_slice(&bytes).expect("Response body is not JSON")
}

/// Cookie header value for a session id
pub fn session_cookie(sid: &str) -> String {
    format!("sid={}", sid)
}

/// Cookie header value for a session id plus workspace selection
pub fn session_cookie_with_workspace(sid: &str, workspace_id: &str) -> String {
    format!("sid={}; workspace={}", sid, workspace_id)
}
