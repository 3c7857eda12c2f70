//! Webhook endpoints
//!
//! Thin proxies over the webhook relay, with the tenant pinned to the
//! caller's workspace. The relay owns destinations, events and delivery
//! history; nothing is persisted here.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use tracing::info;
use validator::Validate;

use crate::{
    middleware::api_key::{check_scopes, AuthedKey},
    middleware::auth::check_permissions,
    models::{
        permissions, CreateDestinationRequest, DeliveryAttempt, PublishEventRequest,
        UpdateDestinationRequest, UserSession, WebhookDestination, WebhookEvent,
    },
    utils::{AppError, AppResult, Data},
    AppState,
};

/// Session-authenticated dashboard routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/destinations", get(list_destinations).post(create_destination))
        .route(
            "/destinations/{id}",
            patch(update_destination).delete(delete_destination),
        )
        .route("/events", get(list_events))
        .route("/events/{id}/deliveries", get(list_deliveries))
        .route("/publish", post(publish_event))
}

/// Key-authenticated external routes
pub fn external_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/webhooks/destinations",
            get(ext_list_destinations).post(ext_create_destination),
        )
        .route(
            "/webhooks/destinations/{id}",
            patch(ext_update_destination).delete(ext_delete_destination),
        )
        .route("/events", post(ext_publish_event))
}

fn current_workspace_id(session: &UserSession) -> AppResult<String> {
    session
        .current_workspace_id()
        .map(String::from)
        .ok_or_else(|| AppError::not_found("No workspace selected"))
}

// ==================== Session surface ====================

async fn list_destinations(
    State(state): State<AppState>,
    session: UserSession,
) -> AppResult<Json<Data<Vec<WebhookDestination>>>> {
    check_permissions(&session, &[permissions::READ_WEBHOOKS])?;
    let workspace_id = current_workspace_id(&session)?;

    let destinations = state.relay.list_destinations(&workspace_id).await?;
    Ok(Json(Data::new(destinations)))
}

async fn create_destination(
    State(state): State<AppState>,
    session: UserSession,
    Json(payload): Json<CreateDestinationRequest>,
) -> AppResult<(StatusCode, Json<Data<WebhookDestination>>)> {
    check_permissions(&session, &[permissions::MANAGE_WEBHOOKS])?;
    payload.validate()?;
    let workspace_id = current_workspace_id(&session)?;

    // Tenant provisioning is idempotent; this covers workspaces created
    // while the relay was unreachable
    state.relay.upsert_tenant(&workspace_id).await?;
    let destination = state.relay.create_destination(&workspace_id, &payload).await?;

    info!(workspace_id = %workspace_id, destination_id = %destination.id,
          "Webhook destination created");

    Ok((StatusCode::CREATED, Json(Data::new(destination))))
}

async fn update_destination(
    State(state): State<AppState>,
    session: UserSession,
    Path(id): Path<String>,
    Json(payload): Json<UpdateDestinationRequest>,
) -> AppResult<Json<Data<WebhookDestination>>> {
    check_permissions(&session, &[permissions::MANAGE_WEBHOOKS])?;
    payload.validate()?;
    let workspace_id = current_workspace_id(&session)?;

    let destination = state
        .relay
        .update_destination(&workspace_id, &id, &payload)
        .await?;
    Ok(Json(Data::new(destination)))
}

async fn delete_destination(
    State(state): State<AppState>,
    session: UserSession,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    check_permissions(&session, &[permissions::MANAGE_WEBHOOKS])?;
    let workspace_id = current_workspace_id(&session)?;

    state.relay.delete_destination(&workspace_id, &id).await?;

    info!(workspace_id = %workspace_id, destination_id = %id, "Webhook destination deleted");

    Ok(StatusCode::NO_CONTENT)
}

async fn list_events(
    State(state): State<AppState>,
    session: UserSession,
) -> AppResult<Json<Data<Vec<WebhookEvent>>>> {
    check_permissions(&session, &[permissions::READ_WEBHOOKS])?;
    let workspace_id = current_workspace_id(&session)?;

    let events = state.relay.list_events(&workspace_id).await?;
    Ok(Json(Data::new(events)))
}

async fn list_deliveries(
    State(state): State<AppState>,
    session: UserSession,
    Path(id): Path<String>,
) -> AppResult<Json<Data<Vec<DeliveryAttempt>>>> {
    check_permissions(&session, &[permissions::READ_WEBHOOKS])?;
    let workspace_id = current_workspace_id(&session)?;

    let deliveries = state.relay.list_deliveries(&workspace_id, &id).await?;
    Ok(Json(Data::new(deliveries)))
}

async fn publish_event(
    State(state): State<AppState>,
    session: UserSession,
    Json(payload): Json<PublishEventRequest>,
) -> AppResult<(StatusCode, Json<Data<bool>>)> {
    check_permissions(&session, &[permissions::MANAGE_WEBHOOKS])?;
    payload.validate()?;
    let workspace_id = current_workspace_id(&session)?;

    state
        .relay
        .publish(&workspace_id, &payload.topic, &payload.payload)
        .await?;

    Ok((StatusCode::ACCEPTED, Json(Data::new(true))))
}

// ==================== External surface ====================

async fn ext_list_destinations(
    State(state): State<AppState>,
    key: AuthedKey,
) -> AppResult<Json<Data<Vec<WebhookDestination>>>> {
    check_scopes(&key, &[permissions::READ_WEBHOOKS])?;

    let destinations = state.relay.list_destinations(key.workspace_id()).await?;
    Ok(Json(Data::new(destinations)))
}

async fn ext_create_destination(
    State(state): State<AppState>,
    key: AuthedKey,
    Json(payload): Json<CreateDestinationRequest>,
) -> AppResult<(StatusCode, Json<Data<WebhookDestination>>)> {
    check_scopes(&key, &[permissions::MANAGE_WEBHOOKS])?;
    payload.validate()?;

    state.relay.upsert_tenant(key.workspace_id()).await?;
    let destination = state
        .relay
        .create_destination(key.workspace_id(), &payload)
        .await?;

    Ok((StatusCode::CREATED, Json(Data::new(destination))))
}

async fn ext_update_destination(
    State(state): State<AppState>,
    key: AuthedKey,
    Path(id): Path<String>,
    Json(payload): Json<UpdateDestinationRequest>,
) -> AppResult<Json<Data<WebhookDestination>>> {
    check_scopes(&key, &[permissions::MANAGE_WEBHOOKS])?;
    payload.validate()?;

    let destination = state
        .relay
        .update_destination(key.workspace_id(), &id, &payload)
        .await?;
    Ok(Json(Data::new(destination)))
}

async fn ext_delete_destination(
    State(state): State<AppState>,
    key: AuthedKey,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    check_scopes(&key, &[permissions::MANAGE_WEBHOOKS])?;

    state.relay.delete_destination(key.workspace_id(), &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn ext_publish_event(
    State(state): State<AppState>,
    key: AuthedKey,
    Json(payload): Json<PublishEventRequest>,
) -> AppResult<(StatusCode, Json<Data<bool>>)> {
    check_scopes(&key, &[permissions::MANAGE_WEBHOOKS])?;
    payload.validate()?;

    state
        .relay
        .publish(key.workspace_id(), &payload.topic, &payload.payload)
        .await?;

    Ok((StatusCode::ACCEPTED, Json(Data::new(true))))
}
