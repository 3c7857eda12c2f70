//! End-to-end API tests
//!
//! Drives the full router against mock identity and relay servers.

mod common;

use axum::http::{header, StatusCode};
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

use common::{body_json, session_cookie, session_cookie_with_workspace, TestApp};

// ==================== Health ====================

#[tokio::test]
async fn health_check_is_public() {
    let app = TestApp::new().await;

    let response = app.request("GET", "/api/health", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
}

// ==================== Session resolution ====================

#[tokio::test]
async fn session_requires_authentication() {
    let app = TestApp::new().await;

    let response = app.request("GET", "/api/session", None, None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("Authentication"));
}

#[tokio::test]
async fn unknown_session_id_is_rejected() {
    let app = TestApp::new().await;

    let response = app
        .request("GET", "/api/session", Some(&session_cookie("bogus")), None)
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn zero_membership_session_is_valid_and_empty() {
    let app = TestApp::new().await;
    app.mock_user_with_workspaces("usr_new", &[]).await;
    let sid = app.sign_in("usr_new").await;

    let response = app
        .request("GET", "/api/session", Some(&session_cookie(&sid)), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["data"]["workspaces"], serde_json::json!([]));
    assert_eq!(body["data"]["current_workspace"], serde_json::Value::Null);
    assert_eq!(body["data"]["permissions"], serde_json::json!([]));
}

#[tokio::test]
async fn sticky_workspace_cookie_selects_membership() {
    let app = TestApp::new().await;
    app.mock_user_with_workspaces(
        "usr_1",
        &[
            ("org_a", "Acme", &["owner"]),
            ("org_b", "Beta", &["member"]),
        ],
    )
    .await;
    let sid = app.sign_in("usr_1").await;

    let response = app
        .request(
            "GET",
            "/api/session",
            Some(&session_cookie_with_workspace(&sid, "org_b")),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["data"]["current_workspace"]["id"], "org_b");

    let permissions: Vec<String> = body["data"]["permissions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p.as_str().unwrap().to_string())
        .collect();
    assert!(permissions.contains(&"read:workspace".to_string()));
    assert!(permissions.contains(&"read:members".to_string()));
    assert!(!permissions.contains(&"manage:members".to_string()));
}

#[tokio::test]
async fn stale_workspace_cookie_falls_back_to_first_membership() {
    let app = TestApp::new().await;
    app.mock_user_with_workspaces("usr_1", &[("org_a", "Acme", &["admin"])])
        .await;
    let sid = app.sign_in("usr_1").await;

    let response = app
        .request(
            "GET",
            "/api/session",
            Some(&session_cookie_with_workspace(&sid, "org_gone")),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["data"]["current_workspace"]["id"], "org_a");
}

#[tokio::test]
async fn selecting_a_non_member_workspace_is_rejected() {
    let app = TestApp::new().await;
    app.mock_user_with_workspaces("usr_1", &[("org_a", "Acme", &["member"])])
        .await;
    let sid = app.sign_in("usr_1").await;

    let response = app
        .request_json(
            "PUT",
            "/api/session/workspace",
            Some(&session_cookie(&sid)),
            None,
            serde_json::json!({"workspace_id": "org_other"}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn selecting_a_member_workspace_sets_the_cookie() {
    let app = TestApp::new().await;
    app.mock_user_with_workspaces(
        "usr_1",
        &[
            ("org_a", "Acme", &["member"]),
            ("org_b", "Beta", &["member"]),
        ],
    )
    .await;
    let sid = app.sign_in("usr_1").await;

    let response = app
        .request_json(
            "PUT",
            "/api/session/workspace",
            Some(&session_cookie(&sid)),
            None,
            serde_json::json!({"workspace_id": "org_b"}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .expect("workspace cookie not set")
        .to_str()
        .unwrap()
        .to_string();
    assert!(set_cookie.starts_with("workspace=org_b"));
}

#[tokio::test]
async fn sign_in_callback_creates_a_usable_session() {
    let app = TestApp::new().await;
    app.mock_user_with_workspaces("usr_cb", &[("org_a", "Acme", &["member"])])
        .await;

    // The generic token mock already answers the code exchange
    Mock::given(method("GET"))
        .and(path("/oidc/me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "sub": "usr_cb",
        })))
        .mount(&app.identity)
        .await;

    let response = app
        .request_json(
            "POST",
            "/api/auth/callback",
            None,
            None,
            serde_json::json!({
                "code": "auth-code-1",
                "redirect_uri": "https://dashboard.example.com/callback",
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .expect("session cookie not set")
        .to_str()
        .unwrap()
        .to_string();
    assert!(set_cookie.starts_with("sid="));
    let sid = set_cookie
        .trim_start_matches("sid=")
        .split(';')
        .next()
        .unwrap()
        .to_string();

    let body = body_json(response).await;
    assert_eq!(body["data"]["user_id"], "usr_cb");

    // The issued cookie authenticates subsequent requests
    let response = app
        .request("GET", "/api/session", Some(&session_cookie(&sid)), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn sign_out_destroys_the_session() {
    let app = TestApp::new().await;
    app.mock_user_with_workspaces("usr_1", &[]).await;
    let sid = app.sign_in("usr_1").await;

    let response = app
        .request("POST", "/api/auth/sign-out", Some(&session_cookie(&sid)), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .request("GET", "/api/session", Some(&session_cookie(&sid)), None)
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// ==================== Permissions ====================

#[tokio::test]
async fn member_cannot_create_api_keys() {
    let app = TestApp::new().await;
    app.mock_user_with_workspaces("usr_1", &[("org_a", "Acme", &["member"])])
        .await;
    let sid = app.sign_in("usr_1").await;

    let response = app
        .request_json(
            "POST",
            "/api/api-keys",
            Some(&session_cookie(&sid)),
            None,
            serde_json::json!({"name": "ci", "scopes": ["read:api-keys"]}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let body = body_json(response).await;
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("write:api-keys"));
}

#[tokio::test]
async fn zero_membership_user_cannot_list_members() {
    let app = TestApp::new().await;
    app.mock_user_with_workspaces("usr_new", &[]).await;
    let sid = app.sign_in("usr_new").await;

    let response = app
        .request("GET", "/api/members", Some(&session_cookie(&sid)), None)
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

// ==================== API keys ====================

async fn owner_session(app: &TestApp) -> String {
    app.mock_user_with_workspaces("usr_owner", &[("org_a", "Acme", &["owner"])])
        .await;
    app.sign_in("usr_owner").await
}

#[tokio::test]
async fn api_key_plaintext_is_returned_exactly_once() {
    let app = TestApp::new().await;
    let sid = owner_session(&app).await;
    let cookie = session_cookie(&sid);

    let response = app
        .request_json(
            "POST",
            "/api/api-keys",
            Some(&cookie),
            None,
            serde_json::json!({"name": "ci", "scopes": ["read:api-keys", "write:api-keys"]}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = body_json(response).await;
    let key = body["data"]["key"].as_str().unwrap().to_string();
    assert!(key.starts_with("cdk_"));
    let preview = body["data"]["preview"].as_str().unwrap();
    assert!(preview.contains("..."));

    // Listing never exposes the plaintext again
    let response = app.request("GET", "/api/api-keys", Some(&cookie), None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let listed = body["data"].as_array().unwrap();
    assert_eq!(listed.len(), 1);
    assert!(listed[0].get("key").is_none());
    assert!(!body_string(&body).contains(&key));
}

fn body_string(value: &serde_json::Value) -> String {
    value.to_string()
}

#[tokio::test]
async fn api_key_scopes_cannot_exceed_granter_permissions() {
    let app = TestApp::new().await;
    // Admins hold write:api-keys but not manage:workspace
    app.mock_user_with_workspaces("usr_admin", &[("org_a", "Acme", &["admin"])])
        .await;
    let sid = app.sign_in("usr_admin").await;

    let response = app
        .request_json(
            "POST",
            "/api/api-keys",
            Some(&session_cookie(&sid)),
            None,
            serde_json::json!({"name": "escalator", "scopes": ["manage:workspace"]}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn unknown_scope_is_a_bad_request() {
    let app = TestApp::new().await;
    let sid = owner_session(&app).await;

    let response = app
        .request_json(
            "POST",
            "/api/api-keys",
            Some(&session_cookie(&sid)),
            None,
            serde_json::json!({"name": "ci", "scopes": ["launch:missiles"]}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn empty_key_name_is_a_validation_error() {
    let app = TestApp::new().await;
    let sid = owner_session(&app).await;

    let response = app
        .request_json(
            "POST",
            "/api/api-keys",
            Some(&session_cookie(&sid)),
            None,
            serde_json::json!({"name": "", "scopes": ["read:api-keys"]}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let body = body_json(response).await;
    assert!(body["fieldErrors"]["name"].is_array());
}

// ==================== External surface ====================

/// Issue a key through the dashboard surface and return its plaintext
async fn issue_key(app: &TestApp, sid: &str, name: &str, scopes: &[&str]) -> String {
    let response = app
        .request_json(
            "POST",
            "/api/api-keys",
            Some(&session_cookie(sid)),
            None,
            serde_json::json!({"name": name, "scopes": scopes}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    body["data"]["key"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn external_surface_requires_a_valid_key() {
    let app = TestApp::new().await;

    let response = app.request("GET", "/v1/api-keys", None, None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .request("GET", "/v1/api-keys", None, Some("cdk_not_a_real_key"))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn key_scoped_listing_works() {
    let app = TestApp::new().await;
    let sid = owner_session(&app).await;
    let key = issue_key(&app, &sid, "reader", &["read:api-keys"]).await;

    let response = app.request("GET", "/v1/api-keys", None, Some(&key)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn missing_scopes_are_all_reported() {
    let app = TestApp::new().await;
    let sid = owner_session(&app).await;
    let key = issue_key(&app, &sid, "reader", &["read:api-keys"]).await;

    // Destination creation requires manage:webhooks, which this key lacks
    let response = app
        .request_json(
            "POST",
            "/v1/webhooks/destinations",
            None,
            Some(&key),
            serde_json::json!({"url": "https://example.com/hooks", "topics": ["member.added"]}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("manage:webhooks"));
}

#[tokio::test]
async fn a_key_cannot_delete_itself() {
    let app = TestApp::new().await;
    let sid = owner_session(&app).await;
    let key = issue_key(
        &app,
        &sid,
        "self-destruct",
        &["read:api-keys", "write:api-keys"],
    )
    .await;

    // Find the key's own id through the external listing
    let response = app.request("GET", "/v1/api-keys", None, Some(&key)).await;
    let body = body_json(response).await;
    let key_id = body["data"][0]["id"].as_str().unwrap().to_string();

    let response = app
        .request("DELETE", &format!("/v1/api-keys/{}", key_id), None, Some(&key))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // The key still works afterwards
    let response = app.request("GET", "/v1/api-keys", None, Some(&key)).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn a_key_can_delete_a_different_key() {
    let app = TestApp::new().await;
    let sid = owner_session(&app).await;
    let admin_key = issue_key(
        &app,
        &sid,
        "admin",
        &["read:api-keys", "write:api-keys"],
    )
    .await;
    let _victim = issue_key(&app, &sid, "victim", &["read:api-keys"]).await;

    let response = app
        .request("GET", "/v1/api-keys", None, Some(&admin_key))
        .await;
    let body = body_json(response).await;
    let victim_id = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .find(|k| k["name"] == "victim")
        .unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string();

    let response = app
        .request(
            "DELETE",
            &format!("/v1/api-keys/{}", victim_id),
            None,
            Some(&admin_key),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

// ==================== Invitations ====================

async fn mount_invitation_mocks(app: &TestApp) {
    // No existing members
    Mock::given(method("GET"))
        .and(path("/api/organizations/org_a/users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .mount(&app.identity)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/organization-invitations"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "id": format!("inv_{}", uuid::Uuid::new_v4()),
            "invitee": "someone@example.com",
            "status": "Pending",
        })))
        .mount(&app.identity)
        .await;
}

#[tokio::test]
async fn duplicate_single_invitation_is_a_soft_bad_request() {
    let app = TestApp::new().await;
    let sid = owner_session(&app).await;
    mount_invitation_mocks(&app).await;
    let cookie = session_cookie(&sid);

    let payload = serde_json::json!({"emails": ["new@example.com"]});
    let response = app
        .request_json("POST", "/api/invitations", Some(&cookie), None, payload.clone())
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .request_json("POST", "/api/invitations", Some(&cookie), None, payload)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert_eq!(body["error"], "Bad request: Invitation already exists");
}

#[tokio::test]
async fn multi_invite_reports_per_address_outcomes() {
    let app = TestApp::new().await;
    let sid = owner_session(&app).await;
    mount_invitation_mocks(&app).await;
    let cookie = session_cookie(&sid);

    // Seed one existing invitation
    let response = app
        .request_json(
            "POST",
            "/api/invitations",
            Some(&cookie),
            None,
            serde_json::json!({"emails": ["dup@example.com"]}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .request_json(
            "POST",
            "/api/invitations",
            Some(&cookie),
            None,
            serde_json::json!({"emails": ["dup@example.com", "fresh@example.com"]}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = body_json(response).await;
    let outcomes = body["data"].as_array().unwrap();
    assert_eq!(outcomes.len(), 2);

    let dup = outcomes.iter().find(|o| o["email"] == "dup@example.com").unwrap();
    assert_eq!(dup["outcome"], "already_invited");
    let fresh = outcomes
        .iter()
        .find(|o| o["email"] == "fresh@example.com")
        .unwrap();
    assert_eq!(fresh["outcome"], "invited");
}

#[tokio::test]
async fn invalid_invitee_addresses_are_a_validation_error() {
    let app = TestApp::new().await;
    let sid = owner_session(&app).await;
    mount_invitation_mocks(&app).await;

    let response = app
        .request_json(
            "POST",
            "/api/invitations",
            Some(&session_cookie(&sid)),
            None,
            serde_json::json!({"emails": ["not-an-email"]}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let body = body_json(response).await;
    assert!(body["fieldErrors"]["emails"].is_array());
}

// ==================== Webhooks ====================

#[tokio::test]
async fn destinations_are_proxied_from_the_relay() {
    let app = TestApp::new().await;
    let sid = owner_session(&app).await;

    Mock::given(method("GET"))
        .and(path("/api/v1/tenants/org_a/destinations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"id": "dst_1", "url": "https://example.com/hooks", "topics": ["member.added"]},
        ])))
        .mount(&app.relay)
        .await;

    let response = app
        .request("GET", "/api/webhooks/destinations", Some(&session_cookie(&sid)), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["data"][0]["id"], "dst_1");
}

#[tokio::test]
async fn publish_is_accepted_and_forwarded() {
    let app = TestApp::new().await;
    let sid = owner_session(&app).await;

    Mock::given(method("POST"))
        .and(path("/api/v1/publish"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&app.relay)
        .await;

    let response = app
        .request_json(
            "POST",
            "/api/webhooks/publish",
            Some(&session_cookie(&sid)),
            None,
            serde_json::json!({"topic": "member.added", "payload": {"user": "usr_9"}}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
}

#[tokio::test]
async fn relay_outage_maps_to_service_unavailable() {
    let app = TestApp::new().await;
    let sid = owner_session(&app).await;

    Mock::given(method("GET"))
        .and(path("/api/v1/tenants/org_a/events"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&app.relay)
        .await;

    let response = app
        .request("GET", "/api/webhooks/events", Some(&session_cookie(&sid)), None)
        .await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

// ==================== Workspaces ====================

#[tokio::test]
async fn creating_a_workspace_makes_the_caller_its_owner() {
    let app = TestApp::new().await;
    app.mock_user_with_workspaces("usr_new", &[]).await;
    let sid = app.sign_in("usr_new").await;

    Mock::given(method("POST"))
        .and(path("/api/organizations"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "id": "org_new",
            "name": "Fresh Workspace",
        })))
        .mount(&app.identity)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/organizations/org_new/users"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&app.identity)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/organizations/org_new/users/usr_new/roles"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&app.identity)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/v1/tenants/org_new"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&app.relay)
        .await;

    let response = app
        .request_json(
            "POST",
            "/api/workspaces",
            Some(&session_cookie(&sid)),
            None,
            serde_json::json!({"name": "Fresh Workspace"}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .expect("workspace cookie not set")
        .to_str()
        .unwrap()
        .to_string();
    assert!(set_cookie.starts_with("workspace=org_new"));

    let body = body_json(response).await;
    assert_eq!(body["data"]["id"], "org_new");
}

#[tokio::test]
async fn workspace_rename_invalidates_the_cache() {
    let app = TestApp::new().await;
    let sid = owner_session(&app).await;
    let cookie = session_cookie(&sid);

    // Prime the workspace cache
    let response = app.request("GET", "/api/session", Some(&cookie), None).await;
    assert_eq!(response.status(), StatusCode::OK);

    Mock::given(method("PATCH"))
        .and(path("/api/organizations/org_a"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "org_a",
            "name": "Acme Renamed",
        })))
        .mount(&app.identity)
        .await;

    let response = app
        .request_json(
            "PATCH",
            "/api/workspaces/current",
            Some(&cookie),
            None,
            serde_json::json!({"name": "Acme Renamed"}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    // The cache entry was deleted, so the next read must hit the origin
    let cached: Option<crewdeck::models::Workspace> = app
        .state
        .cache
        .get_json("workspace:org_a")
        .await
        .unwrap();
    assert!(cached.is_none(), "workspace cache entry should be invalidated");
}

#[tokio::test]
async fn member_cannot_rename_the_workspace() {
    let app = TestApp::new().await;
    app.mock_user_with_workspaces("usr_1", &[("org_a", "Acme", &["member"])])
        .await;
    let sid = app.sign_in("usr_1").await;

    let response = app
        .request_json(
            "PATCH",
            "/api/workspaces/current",
            Some(&session_cookie(&sid)),
            None,
            serde_json::json!({"name": "Hijacked"}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("manage:workspace"));
}
