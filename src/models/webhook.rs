//! Webhook delivery models
//!
//! Destinations, events and deliveries are owned by the webhook relay;
//! these types mirror the slice of its API the dashboard proxies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookDestination {
    pub id: String,
    /// Delivery endpoint URL
    pub url: String,
    /// Event topics routed to this destination
    #[serde(default)]
    pub topics: Vec<String>,
    /// When set, the destination is paused
    #[serde(default)]
    pub disabled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct CreateDestinationRequest {
    #[validate(url(message = "must be a valid URL"))]
    pub url: String,
    #[validate(length(min = 1, message = "at least one topic is required"))]
    pub topics: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct UpdateDestinationRequest {
    #[validate(url(message = "must be a valid URL"))]
    pub url: Option<String>,
    pub topics: Option<Vec<String>>,
    pub disabled: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    pub topic: String,
    #[serde(default)]
    pub time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub successful_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryAttempt {
    pub id: String,
    #[serde(default)]
    pub delivered_at: Option<DateTime<Utc>>,
    /// Relay-reported delivery state (e.g. "success", "failed")
    #[serde(default)]
    pub status: Option<String>,
    /// HTTP status returned by the destination, when available
    #[serde(default)]
    pub response_status: Option<u16>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct PublishEventRequest {
    #[validate(length(min = 1, max = 200, message = "must be 1-200 characters"))]
    pub topic: String,
    pub payload: serde_json::Value,
}
