//! Test data factories for creating valid test fixtures.
//!
//! Each factory builds a complete object with sensible defaults; the closure
//! overrides specific fields.

use chrono::{Duration, Utc};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::{
    application::use_cases::webhook_normalizer::normalize,
    domain::entities::{
        directory::{BillingAccount, BillingUser, BillingWorkspace, Plan, PlanPrice},
        mapping_entity_type::MappingEntityType,
        payment_provider::PaymentProvider,
        provider_mapping::ProviderMapping,
        subscription::{Subscription, SubscriptionStatus},
        webhook_event::{RawWebhookEvent, WebhookEventType, WebhookJob},
    },
};

pub fn user(overrides: impl FnOnce(&mut BillingUser)) -> BillingUser {
    let mut user = BillingUser {
        id: Uuid::new_v4(),
        email: "owner@example.com".to_string(),
        name: Some("Olive Owner".to_string()),
    };
    overrides(&mut user);
    user
}

pub fn account(overrides: impl FnOnce(&mut BillingAccount)) -> BillingAccount {
    let mut account = BillingAccount {
        id: Uuid::new_v4(),
        name: "Acme Inc".to_string(),
        billing_email: Some("billing@example.com".to_string()),
    };
    overrides(&mut account);
    account
}

pub fn workspace(overrides: impl FnOnce(&mut BillingWorkspace)) -> BillingWorkspace {
    let mut workspace = BillingWorkspace {
        id: Uuid::new_v4(),
        account_id: Uuid::new_v4(),
        name: "Main".to_string(),
    };
    overrides(&mut workspace);
    workspace
}

pub fn plan(overrides: impl FnOnce(&mut Plan)) -> Plan {
    let mut plan = Plan {
        id: Uuid::new_v4(),
        code: "pro".to_string(),
        name: "Pro".to_string(),
        is_active: true,
    };
    overrides(&mut plan);
    plan
}

pub fn plan_price(overrides: impl FnOnce(&mut PlanPrice)) -> PlanPrice {
    let mut price = PlanPrice {
        id: Uuid::new_v4(),
        plan_id: Uuid::new_v4(),
        amount_cents: 1900,
        currency: "usd".to_string(),
        interval: "month".to_string(),
        is_current: true,
    };
    overrides(&mut price);
    price
}

/// Active subscription renewing in 30 days.
pub fn subscription(overrides: impl FnOnce(&mut Subscription)) -> Subscription {
    let now = Utc::now();
    let mut subscription = Subscription {
        id: Uuid::new_v4(),
        account_id: Uuid::new_v4(),
        workspace_id: Uuid::new_v4(),
        plan_price_id: Uuid::new_v4(),
        status: SubscriptionStatus::Active,
        current_period_end: Some(now + Duration::days(30)),
        canceled_at: None,
        created_at: now,
        updated_at: now,
    };
    overrides(&mut subscription);
    subscription
}

pub fn mapping(overrides: impl FnOnce(&mut ProviderMapping)) -> ProviderMapping {
    let now = Utc::now();
    let mut mapping = ProviderMapping {
        id: Uuid::new_v4(),
        entity_type: MappingEntityType::Account,
        entity_id: Uuid::new_v4(),
        provider: PaymentProvider::Stripe,
        provider_id: "cus_test".to_string(),
        is_active: true,
        metadata: None,
        created_at: now,
        updated_at: now,
    };
    overrides(&mut mapping);
    mapping
}

/// Raw Stripe event name for a canonical type.
pub fn stripe_event_name(event_type: WebhookEventType) -> &'static str {
    match event_type {
        WebhookEventType::CheckoutCompleted => "checkout.session.completed",
        WebhookEventType::SubscriptionCreated => "customer.subscription.created",
        WebhookEventType::SubscriptionUpdated => "customer.subscription.updated",
        WebhookEventType::SubscriptionCanceled => "customer.subscription.deleted",
        WebhookEventType::PaymentSucceeded => "invoice.payment_succeeded",
        WebhookEventType::PaymentFailed => "invoice.payment_failed",
    }
}

/// Queue job for a Stripe event object, normalized the way ingestion does it.
pub fn webhook_job(
    event_type: WebhookEventType,
    raw_event_id: &str,
    data: JsonValue,
) -> WebhookJob {
    let raw = RawWebhookEvent {
        id: raw_event_id.to_string(),
        event_type: stripe_event_name(event_type).to_string(),
        data,
        provider: PaymentProvider::Stripe,
        received_at: Utc::now(),
    };
    let event = normalize(PaymentProvider::Stripe, &raw).expect("stripe event type is mapped");
    WebhookJob::new(event, &raw)
}
