use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

use crate::{
    app_error::{AppError, AppResult},
    domain::entities::{
        mapping_entity_type::MappingEntityType,
        payment_provider::PaymentProvider,
        webhook_event::{NormalizedWebhookEvent, RawWebhookEvent, WebhookEventType, idempotency_key},
    },
};

// ============================================================================
// Event type tables
// ============================================================================

const STRIPE_EVENT_MAP: &[(&str, WebhookEventType)] = &[
    ("checkout.session.completed", WebhookEventType::CheckoutCompleted),
    ("customer.subscription.created", WebhookEventType::SubscriptionCreated),
    ("customer.subscription.updated", WebhookEventType::SubscriptionUpdated),
    ("customer.subscription.deleted", WebhookEventType::SubscriptionCanceled),
    ("invoice.payment_succeeded", WebhookEventType::PaymentSucceeded),
    ("invoice.payment_failed", WebhookEventType::PaymentFailed),
];

const DUMMY_EVENT_MAP: &[(&str, WebhookEventType)] = &[
    ("checkout.completed", WebhookEventType::CheckoutCompleted),
    ("subscription.created", WebhookEventType::SubscriptionCreated),
    ("subscription.updated", WebhookEventType::SubscriptionUpdated),
    ("subscription.canceled", WebhookEventType::SubscriptionCanceled),
    ("payment.succeeded", WebhookEventType::PaymentSucceeded),
    ("payment.failed", WebhookEventType::PaymentFailed),
];

fn lookup(map: &[(&str, WebhookEventType)], raw_type: &str) -> Option<WebhookEventType> {
    map.iter()
        .find(|(name, _)| *name == raw_type)
        .map(|(_, event_type)| *event_type)
}

// ============================================================================
// Payload readers
// ============================================================================

/// Per-provider access to fields of a provider-shaped event object.
///
/// Every accessor is best-effort: a missing or malformed field is `None`.
pub trait EventPayloadReader: Send + Sync {
    fn provider(&self) -> PaymentProvider;

    /// Canonical type for a raw provider event type
    fn event_type(&self, raw_type: &str) -> Option<WebhookEventType>;

    fn entity_type(&self, data: &JsonValue) -> Option<MappingEntityType>;
    fn entity_id(&self, data: &JsonValue) -> Option<String>;
    fn account_id(&self, data: &JsonValue) -> Option<String>;
    fn plan_code(&self, data: &JsonValue) -> Option<String>;
    /// Id of the event object itself (subscription id on subscription events)
    fn object_id(&self, data: &JsonValue) -> Option<String>;
    /// Provider subscription referenced by a checkout session or invoice
    fn subscription_id(&self, data: &JsonValue) -> Option<String>;
    fn customer_id(&self, data: &JsonValue) -> Option<String>;
    fn price_id(&self, data: &JsonValue) -> Option<String>;
    fn status(&self, data: &JsonValue) -> Option<String>;
    fn current_period_end(&self, data: &JsonValue) -> Option<DateTime<Utc>>;
    /// Period end of the first invoice line
    fn line_period_end(&self, data: &JsonValue) -> Option<DateTime<Utc>>;
    /// Entity that owns the provider customer, as recorded at checkout
    fn billing_entity(&self, data: &JsonValue) -> Option<(MappingEntityType, String)>;
}

/// Field access shared by providers emitting Stripe-shaped objects.
mod stripe_shape {
    use super::*;

    pub fn str_at(data: &JsonValue, pointer: &str) -> Option<String> {
        data.pointer(pointer)
            .and_then(JsonValue::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
    }

    /// A field that is either an id string or an expanded object with an `id`.
    pub fn id_or_object(data: &JsonValue, pointer: &str) -> Option<String> {
        match data.pointer(pointer)? {
            JsonValue::String(s) if !s.is_empty() => Some(s.clone()),
            JsonValue::Object(obj) => obj
                .get("id")
                .and_then(JsonValue::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_owned),
            _ => None,
        }
    }

    pub fn timestamp_at(data: &JsonValue, pointer: &str) -> Option<DateTime<Utc>> {
        data.pointer(pointer)
            .and_then(JsonValue::as_i64)
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
    }

    pub fn entity_type(data: &JsonValue) -> Option<MappingEntityType> {
        str_at(data, "/metadata/entityType")?.parse().ok()
    }

    pub fn account_id(data: &JsonValue) -> Option<String> {
        str_at(data, "/metadata/accountId")
            .or_else(|| str_at(data, "/customer/metadata/accountId"))
            .or_else(|| str_at(data, "/subscription/metadata/accountId"))
            .or_else(|| str_at(data, "/subscription_details/metadata/accountId"))
    }

    pub fn subscription_id(data: &JsonValue) -> Option<String> {
        id_or_object(data, "/subscription")
            .or_else(|| str_at(data, "/parent/subscription_details/subscription"))
    }

    pub fn price_id(data: &JsonValue) -> Option<String> {
        str_at(data, "/line_items/data/0/price/id")
            .or_else(|| str_at(data, "/display_items/0/price/id"))
            .or_else(|| str_at(data, "/metadata/priceId"))
    }

    pub fn current_period_end(data: &JsonValue) -> Option<DateTime<Utc>> {
        timestamp_at(data, "/current_period_end")
            .or_else(|| timestamp_at(data, "/items/data/0/current_period_end"))
    }

    pub fn billing_entity(data: &JsonValue) -> Option<(MappingEntityType, String)> {
        let entity_type = str_at(data, "/metadata/billingEntityType")?.parse().ok()?;
        let entity_id = str_at(data, "/metadata/billingEntityId")?;
        Some((entity_type, entity_id))
    }
}

pub struct StripePayloadReader;

impl EventPayloadReader for StripePayloadReader {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::Stripe
    }

    fn event_type(&self, raw_type: &str) -> Option<WebhookEventType> {
        lookup(STRIPE_EVENT_MAP, raw_type)
    }

    fn entity_type(&self, data: &JsonValue) -> Option<MappingEntityType> {
        stripe_shape::entity_type(data)
    }

    fn entity_id(&self, data: &JsonValue) -> Option<String> {
        stripe_shape::str_at(data, "/metadata/entityId")
    }

    fn account_id(&self, data: &JsonValue) -> Option<String> {
        stripe_shape::account_id(data)
    }

    fn plan_code(&self, data: &JsonValue) -> Option<String> {
        stripe_shape::str_at(data, "/metadata/planCode")
    }

    fn object_id(&self, data: &JsonValue) -> Option<String> {
        stripe_shape::str_at(data, "/id")
    }

    fn subscription_id(&self, data: &JsonValue) -> Option<String> {
        stripe_shape::subscription_id(data)
    }

    fn customer_id(&self, data: &JsonValue) -> Option<String> {
        stripe_shape::id_or_object(data, "/customer")
    }

    fn price_id(&self, data: &JsonValue) -> Option<String> {
        stripe_shape::price_id(data)
    }

    fn status(&self, data: &JsonValue) -> Option<String> {
        stripe_shape::str_at(data, "/status")
    }

    fn current_period_end(&self, data: &JsonValue) -> Option<DateTime<Utc>> {
        stripe_shape::current_period_end(data)
    }

    fn line_period_end(&self, data: &JsonValue) -> Option<DateTime<Utc>> {
        stripe_shape::timestamp_at(data, "/lines/data/0/period/end")
    }

    fn billing_entity(&self, data: &JsonValue) -> Option<(MappingEntityType, String)> {
        stripe_shape::billing_entity(data)
    }
}

/// The dummy gateway emits Stripe-shaped objects under its own event names.
pub struct DummyPayloadReader;

impl EventPayloadReader for DummyPayloadReader {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::Dummy
    }

    fn event_type(&self, raw_type: &str) -> Option<WebhookEventType> {
        lookup(DUMMY_EVENT_MAP, raw_type)
    }

    fn entity_type(&self, data: &JsonValue) -> Option<MappingEntityType> {
        stripe_shape::entity_type(data)
    }

    fn entity_id(&self, data: &JsonValue) -> Option<String> {
        stripe_shape::str_at(data, "/metadata/entityId")
    }

    fn account_id(&self, data: &JsonValue) -> Option<String> {
        stripe_shape::account_id(data)
    }

    fn plan_code(&self, data: &JsonValue) -> Option<String> {
        stripe_shape::str_at(data, "/metadata/planCode")
    }

    fn object_id(&self, data: &JsonValue) -> Option<String> {
        stripe_shape::str_at(data, "/id")
    }

    fn subscription_id(&self, data: &JsonValue) -> Option<String> {
        stripe_shape::id_or_object(data, "/subscription")
    }

    fn customer_id(&self, data: &JsonValue) -> Option<String> {
        stripe_shape::id_or_object(data, "/customer")
    }

    fn price_id(&self, data: &JsonValue) -> Option<String> {
        stripe_shape::price_id(data)
    }

    fn status(&self, data: &JsonValue) -> Option<String> {
        stripe_shape::str_at(data, "/status")
    }

    fn current_period_end(&self, data: &JsonValue) -> Option<DateTime<Utc>> {
        stripe_shape::timestamp_at(data, "/current_period_end")
    }

    fn line_period_end(&self, data: &JsonValue) -> Option<DateTime<Utc>> {
        stripe_shape::timestamp_at(data, "/lines/data/0/period/end")
    }

    fn billing_entity(&self, data: &JsonValue) -> Option<(MappingEntityType, String)> {
        stripe_shape::billing_entity(data)
    }
}

static STRIPE_READER: StripePayloadReader = StripePayloadReader;
static DUMMY_READER: DummyPayloadReader = DummyPayloadReader;

/// Payload reader for a provider.
///
/// # Errors
/// - `UnsupportedProvider` for providers without a reader
pub fn payload_reader(provider: PaymentProvider) -> AppResult<&'static dyn EventPayloadReader> {
    match provider {
        PaymentProvider::Stripe => Ok(&STRIPE_READER),
        PaymentProvider::Dummy => Ok(&DUMMY_READER),
        PaymentProvider::Coinbase => Err(AppError::UnsupportedProvider(provider.to_string())),
    }
}

// ============================================================================
// Normalizer
// ============================================================================

/// Map a verified raw event to the canonical taxonomy.
///
/// # Errors
/// - `UnknownEventType` when the raw type is not mapped; callers ignore it
/// - `UnsupportedProvider` for providers without a reader
pub fn normalize(
    provider: PaymentProvider,
    raw: &RawWebhookEvent,
) -> AppResult<NormalizedWebhookEvent> {
    let reader = payload_reader(provider).inspect_err(|_| {
        tracing::warn!(
            operation = "webhook-normalizer.unsupported-provider",
            provider = %provider,
            raw_event_id = %raw.id,
            "Unsupported provider for webhook normalization"
        );
    })?;

    let Some(event_type) = reader.event_type(&raw.event_type) else {
        tracing::info!(
            operation = "webhook-normalizer.unknown-event",
            provider = %provider,
            raw_event_type = %raw.event_type,
            raw_event_id = %raw.id,
            "Unknown event type, skipping normalization"
        );
        return Err(AppError::UnknownEventType(raw.event_type.clone()));
    };

    Ok(NormalizedWebhookEvent {
        event_type,
        provider,
        entity_type: reader.entity_type(&raw.data),
        entity_id: reader.entity_id(&raw.data),
        account_id: reader.account_id(&raw.data),
        data: raw.data.clone(),
        idempotency_key: idempotency_key(provider, &raw.id),
    })
}
