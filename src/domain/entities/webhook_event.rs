use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use super::{mapping_entity_type::MappingEntityType, payment_provider::PaymentProvider};

/// Canonical, provider-independent webhook event taxonomy.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr, Display, EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum WebhookEventType {
    CheckoutCompleted,
    SubscriptionCreated,
    SubscriptionUpdated,
    SubscriptionCanceled,
    PaymentSucceeded,
    PaymentFailed,
}

/// Event as verified by a gateway adapter, before normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawWebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: JsonValue,
    pub provider: PaymentProvider,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedWebhookEvent {
    pub event_type: WebhookEventType,
    pub provider: PaymentProvider,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<MappingEntityType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    /// Provider-shaped event object; only the provider's payload reader looks inside
    pub data: JsonValue,
    pub idempotency_key: String,
}

/// Build the idempotency key for a raw provider event id.
pub fn idempotency_key(provider: PaymentProvider, raw_event_id: &str) -> String {
    format!("{}:{}", provider.as_ref(), raw_event_id)
}

/// Payload carried on the `payment-webhook` queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookJob {
    #[serde(flatten)]
    pub event: NormalizedWebhookEvent,
    pub raw_event_id: String,
    pub raw_event_type: String,
}

impl WebhookJob {
    pub fn new(event: NormalizedWebhookEvent, raw: &RawWebhookEvent) -> Self {
        Self {
            event,
            raw_event_id: raw.id.clone(),
            raw_event_type: raw.event_type.clone(),
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, Display, EnumString,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum WebhookStatus {
    Pending,
    Processed,
    Failed,
}

/// Audit row for one webhook delivery; doubles as the idempotency ledger.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebhookEventRecord {
    pub id: Uuid,
    pub account_id: Option<Uuid>,
    pub provider: PaymentProvider,
    pub webhook_type: String,
    pub event_name: WebhookEventType,
    pub status: WebhookStatus,
    pub payload: JsonValue,
    pub raw_event_id: String,
    pub idempotency_key: String,
    pub queue_name: String,
    pub attempts: i32,
    pub skip_reason: Option<String>,
    pub error_message: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WebhookEventRecord {
    /// The `metadata` document stored alongside the payload.
    pub fn metadata(&self) -> JsonValue {
        let mut meta = serde_json::json!({
            "rawEventId": self.raw_event_id,
            "idempotencyKey": self.idempotency_key,
        });
        if let Some(reason) = &self.skip_reason {
            meta["skipReason"] = JsonValue::String(reason.clone());
        }
        meta
    }
}

#[derive(Debug, Clone)]
pub struct CreateWebhookEventInput {
    pub account_id: Option<Uuid>,
    pub provider: PaymentProvider,
    pub webhook_type: String,
    pub event_name: WebhookEventType,
    pub payload: JsonValue,
    pub raw_event_id: String,
    pub idempotency_key: String,
    pub queue_name: String,
}
