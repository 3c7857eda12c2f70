//! API key endpoints
//!
//! Two surfaces share these handlers' logic: the session-authenticated
//! dashboard routes and the key-authenticated external routes. A key's
//! plaintext is returned exactly once at creation; scope grants can never
//! exceed what the granter itself holds.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};
use base64::Engine;
use chrono::Utc;
use rand::{rngs::OsRng, RngCore};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::ApiKeyRepository,
    middleware::api_key::{check_scopes, hash_key, AuthedKey, KEY_PREFIX},
    middleware::auth::check_permissions,
    models::{permissions, ApiKey, CreateApiKeyRequest, CreateApiKeyResponse, UserSession},
    utils::{
        validation::{validate_key_name, validate_scope_shape},
        AppError, AppResult, Data,
    },
    AppState,
};

/// Session-authenticated dashboard routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_api_keys).post(create_api_key))
        .route("/{id}", delete(delete_api_key))
}

/// Key-authenticated external routes
pub fn external_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(ext_list_api_keys).post(ext_create_api_key))
        .route("/{id}", delete(ext_delete_api_key))
}

/// Generate a fresh key: plaintext, storage hash and printable preview
fn generate_key() -> (String, String, String) {
    let mut secret_bytes = [0u8; 32];
    OsRng.fill_bytes(&mut secret_bytes);
    let key = format!(
        "{}{}",
        KEY_PREFIX,
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(secret_bytes)
    );
    let key_hash = hash_key(&key);
    let preview = format!("{}...{}", &key[..12], &key[key.len() - 4..]);
    (key, key_hash, preview)
}

/// Validate requested scopes and persist a new key.
///
/// `granted` is the authority of whoever is issuing the key (session
/// permissions or the issuing key's scopes); requested scopes must be a
/// subset so a key can never out-privilege its creator.
async fn issue_key(
    state: &AppState,
    workspace_id: &str,
    created_by: &str,
    payload: CreateApiKeyRequest,
    granted: &[String],
) -> AppResult<CreateApiKeyResponse> {
    payload.validate()?;
    if !validate_key_name(&payload.name) {
        return Err(AppError::bad_request(
            "Key name must not start or end with whitespace",
        ));
    }

    for scope in &payload.scopes {
        if !validate_scope_shape(scope) || !state.roles.is_known_permission(scope) {
            return Err(AppError::bad_request(format!("Unknown scope: {}", scope)));
        }
    }
    let out_of_reach: Vec<&String> = payload
        .scopes
        .iter()
        .filter(|s| !granted.contains(s))
        .collect();
    if !out_of_reach.is_empty() {
        return Err(AppError::forbidden(format!(
            "Scopes exceed your own grants: {}",
            out_of_reach
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        )));
    }

    let (key, key_hash, preview) = generate_key();
    let api_key = ApiKey {
        id: Uuid::new_v4(),
        workspace_id: workspace_id.to_string(),
        created_by: created_by.to_string(),
        name: payload.name,
        preview,
        scopes: payload.scopes,
        last_used_at: None,
        created_at: Utc::now(),
    };

    ApiKeyRepository::new(&state.db)
        .create(&api_key, &key_hash)
        .await?;

    info!(workspace_id = %workspace_id, api_key_id = %api_key.id, "API key created");

    Ok(CreateApiKeyResponse { api_key, key })
}

fn current_workspace_id(session: &UserSession) -> AppResult<String> {
    session
        .current_workspace_id()
        .map(String::from)
        .ok_or_else(|| AppError::not_found("No workspace selected"))
}

// ==================== Session surface ====================

async fn list_api_keys(
    State(state): State<AppState>,
    session: UserSession,
) -> AppResult<Json<Data<Vec<ApiKey>>>> {
    check_permissions(&session, &[permissions::READ_API_KEYS])?;
    let workspace_id = current_workspace_id(&session)?;

    let keys = ApiKeyRepository::new(&state.db)
        .list_for_workspace(&workspace_id)
        .await?;
    Ok(Json(Data::new(keys)))
}

async fn create_api_key(
    State(state): State<AppState>,
    session: UserSession,
    Json(payload): Json<CreateApiKeyRequest>,
) -> AppResult<(StatusCode, Json<Data<CreateApiKeyResponse>>)> {
    check_permissions(&session, &[permissions::WRITE_API_KEYS])?;
    let workspace_id = current_workspace_id(&session)?;

    let response = issue_key(
        &state,
        &workspace_id,
        &session.user.id,
        payload,
        &session.permissions,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(Data::new(response))))
}

async fn delete_api_key(
    State(state): State<AppState>,
    session: UserSession,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    check_permissions(&session, &[permissions::WRITE_API_KEYS])?;
    let workspace_id = current_workspace_id(&session)?;

    let api_key_id =
        Uuid::parse_str(&id).map_err(|_| AppError::bad_request("Invalid API key ID"))?;

    let deleted = ApiKeyRepository::new(&state.db)
        .delete(&workspace_id, api_key_id)
        .await?;
    if !deleted {
        return Err(AppError::not_found("API key not found"));
    }

    info!(workspace_id = %workspace_id, api_key_id = %api_key_id, "API key deleted");

    Ok(StatusCode::NO_CONTENT)
}

// ==================== External surface ====================

async fn ext_list_api_keys(
    State(state): State<AppState>,
    key: AuthedKey,
) -> AppResult<Json<Data<Vec<ApiKey>>>> {
    check_scopes(&key, &[permissions::READ_API_KEYS])?;

    let keys = ApiKeyRepository::new(&state.db)
        .list_for_workspace(key.workspace_id())
        .await?;
    Ok(Json(Data::new(keys)))
}

async fn ext_create_api_key(
    State(state): State<AppState>,
    key: AuthedKey,
    Json(payload): Json<CreateApiKeyRequest>,
) -> AppResult<(StatusCode, Json<Data<CreateApiKeyResponse>>)> {
    check_scopes(&key, &[permissions::WRITE_API_KEYS])?;

    let response = issue_key(
        &state,
        key.workspace_id(),
        &key.0.created_by,
        payload,
        &key.0.scopes,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(Data::new(response))))
}

async fn ext_delete_api_key(
    State(state): State<AppState>,
    key: AuthedKey,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    check_scopes(&key, &[permissions::WRITE_API_KEYS])?;

    let api_key_id =
        Uuid::parse_str(&id).map_err(|_| AppError::bad_request("Invalid API key ID"))?;

    // A key may never revoke itself: the credential authenticating this
    // request must survive it
    if api_key_id == key.0.id {
        return Err(AppError::bad_request(
            "Cannot delete the API key used to authenticate this request",
        ));
    }

    let deleted = ApiKeyRepository::new(&state.db)
        .delete(key.workspace_id(), api_key_id)
        .await?;
    if !deleted {
        return Err(AppError::not_found("API key not found"));
    }

    Ok(StatusCode::NO_CONTENT)
}
