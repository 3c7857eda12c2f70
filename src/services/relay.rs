//! Webhook relay client
//!
//! Client for the external webhook delivery service. Destinations, events
//! and deliveries are tenant-scoped; the dashboard maps one workspace to
//! one relay tenant and proxies requests through.

use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::RelayConfig;
use crate::models::{
    CreateDestinationRequest, DeliveryAttempt, UpdateDestinationRequest, WebhookDestination,
    WebhookEvent,
};
use crate::utils::{AppError, AppResult};

#[derive(Clone)]
pub struct RelayClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl RelayClient {
    pub fn new(config: &RelayConfig) -> AppResult<Self> {
        info!("Initializing webhook relay client for {}", config.base_url);

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .use_rustls_tls()
            .build()
            .map_err(|e| AppError::internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        if let Some(ref key) = self.api_key {
            builder = builder.bearer_auth(key);
        }
        builder
    }

    async fn send(&self, builder: reqwest::RequestBuilder, what: &str) -> AppResult<Response> {
        let response = builder.send().await?;
        check_status(response, what).await
    }

    /// Create the relay tenant for a workspace if it does not exist yet;
    /// idempotent on the relay side
    pub async fn upsert_tenant(&self, tenant_id: &str) -> AppResult<()> {
        self.send(
            self.request(
                reqwest::Method::PUT,
                &format!("/api/v1/tenants/{}", tenant_id),
            ),
            "tenant",
        )
        .await?;
        Ok(())
    }

    pub async fn delete_tenant(&self, tenant_id: &str) -> AppResult<()> {
        self.send(
            self.request(
                reqwest::Method::DELETE,
                &format!("/api/v1/tenants/{}", tenant_id),
            ),
            "tenant",
        )
        .await?;
        Ok(())
    }

    // ==================== Destinations ====================

    pub async fn list_destinations(
        &self,
        tenant_id: &str,
    ) -> AppResult<Vec<WebhookDestination>> {
        let response = self
            .send(
                self.request(
                    reqwest::Method::GET,
                    &format!("/api/v1/tenants/{}/destinations", tenant_id),
                ),
                "destinations",
            )
            .await?;
        Ok(response.json().await?)
    }

    pub async fn create_destination(
        &self,
        tenant_id: &str,
        request: &CreateDestinationRequest,
    ) -> AppResult<WebhookDestination> {
        let response = self
            .send(
                self.request(
                    reqwest::Method::POST,
                    &format!("/api/v1/tenants/{}/destinations", tenant_id),
                )
                .json(request),
                "destination",
            )
            .await?;
        Ok(response.json().await?)
    }

    pub async fn update_destination(
        &self,
        tenant_id: &str,
        destination_id: &str,
        request: &UpdateDestinationRequest,
    ) -> AppResult<WebhookDestination> {
        let response = self
            .send(
                self.request(
                    reqwest::Method::PATCH,
                    &format!(
                        "/api/v1/tenants/{}/destinations/{}",
                        tenant_id, destination_id
                    ),
                )
                .json(request),
                "destination",
            )
            .await?;
        Ok(response.json().await?)
    }

    pub async fn delete_destination(
        &self,
        tenant_id: &str,
        destination_id: &str,
    ) -> AppResult<()> {
        self.send(
            self.request(
                reqwest::Method::DELETE,
                &format!(
                    "/api/v1/tenants/{}/destinations/{}",
                    tenant_id, destination_id
                ),
            ),
            "destination",
        )
        .await?;
        Ok(())
    }

    // ==================== Events and deliveries ====================

    pub async fn list_events(&self, tenant_id: &str) -> AppResult<Vec<WebhookEvent>> {
        let response = self
            .send(
                self.request(
                    reqwest::Method::GET,
                    &format!("/api/v1/tenants/{}/events", tenant_id),
                ),
                "events",
            )
            .await?;
        Ok(response.json().await?)
    }

    pub async fn list_deliveries(
        &self,
        tenant_id: &str,
        event_id: &str,
    ) -> AppResult<Vec<DeliveryAttempt>> {
        let response = self
            .send(
                self.request(
                    reqwest::Method::GET,
                    &format!("/api/v1/tenants/{}/events/{}/deliveries", tenant_id, event_id),
                ),
                "deliveries",
            )
            .await?;
        Ok(response.json().await?)
    }

    /// Publish an event into the tenant's stream
    pub async fn publish<T: Serialize>(
        &self,
        tenant_id: &str,
        topic: &str,
        payload: &T,
    ) -> AppResult<()> {
        self.send(
            self.request(reqwest::Method::POST, "/api/v1/publish").json(
                &serde_json::json!({
                    "tenant_id": tenant_id,
                    "topic": topic,
                    "data": payload,
                }),
            ),
            "publish",
        )
        .await?;
        Ok(())
    }
}

/// Map a relay response status to an application error
async fn check_status(response: Response, what: &str) -> AppResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    warn!(status = %status, what, body = %body, "Webhook relay returned an error");

    Err(match status {
        StatusCode::NOT_FOUND => AppError::not_found(format!("{}: not found", what)),
        StatusCode::CONFLICT => AppError::conflict(format!("{}: already exists", what)),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            AppError::bad_request(format!("{}: rejected by webhook relay", what))
        }
        s if s.is_server_error() => {
            AppError::service_unavailable("Webhook relay is unavailable")
        }
        _ => AppError::internal(format!("Webhook relay error: {}", status)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(base_url: &str) -> RelayClient {
        RelayClient::new(&RelayConfig {
            base_url: base_url.to_string(),
            api_key: Some("relay-admin-key".to_string()),
            timeout_secs: 5,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_list_destinations() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/tenants/org_a/destinations"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"id": "dst_1", "url": "https://example.com/hooks",
                 "topics": ["member.added"]},
            ])))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let destinations = client.list_destinations("org_a").await.unwrap();
        assert_eq!(destinations.len(), 1);
        assert_eq!(destinations[0].id, "dst_1");
    }

    #[tokio::test]
    async fn test_publish_wraps_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/publish"))
            .and(body_partial_json(serde_json::json!({
                "tenant_id": "org_a",
                "topic": "member.added",
            })))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        client
            .publish("org_a", "member.added", &serde_json::json!({"user": "usr_1"}))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_missing_destination_maps_to_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/api/v1/tenants/org_a/destinations/dst_9"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let err = client
            .delete_destination("org_a", "dst_9")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
