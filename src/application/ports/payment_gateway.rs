use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

use crate::{
    app_error::AppResult,
    domain::entities::{
        mapping_entity_type::MappingEntityType, payment_provider::PaymentProvider,
        webhook_event::RawWebhookEvent,
    },
};

// ============================================================================
// Port Types - Provider-agnostic gateway types
// ============================================================================

pub type Metadata = HashMap<String, String>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerResult {
    pub id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub metadata: Metadata,
}

/// Partial customer update; `None` fields are left untouched at the provider
#[derive(Debug, Clone, Default)]
pub struct CustomerData {
    pub email: Option<String>,
    pub name: Option<String>,
    pub metadata: Option<Metadata>,
}

/// Parameters for a subscription-mode checkout with a single line item
#[derive(Debug, Clone)]
pub struct CheckoutParams {
    pub customer_id: String,
    pub price_id: String,
    pub entity_id: String,
    pub entity_type: MappingEntityType,
    pub success_url: String,
    pub cancel_url: String,
    pub metadata: Metadata,
}

impl CheckoutParams {
    /// Metadata attached to the session and copied onto the provider subscription.
    /// Caller-provided keys win over the entity keys.
    pub fn session_metadata(&self) -> Metadata {
        let mut meta = Metadata::new();
        meta.insert("entityId".into(), self.entity_id.clone());
        meta.insert("entityType".into(), self.entity_type.as_ref().to_string());
        for (k, v) in &self.metadata {
            meta.insert(k.clone(), v.clone());
        }
        meta
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckoutResult {
    pub url: String,
    pub session_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortalResult {
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct CreateSubscriptionParams {
    pub customer_id: String,
    pub price_id: String,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubscriptionResult {
    pub id: String,
    pub customer_id: String,
    /// Provider status string (e.g. `active`, `incomplete`)
    pub status: String,
    pub current_period_end: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GatewayProduct {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GatewayPrice {
    pub id: String,
    pub product_id: String,
    pub unit_amount: Option<i64>,
    pub currency: String,
    pub interval: Option<String>,
    pub interval_count: Option<i64>,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GatewayHealthResult {
    pub healthy: bool,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

// ============================================================================
// Payment Gateway Port
// ============================================================================

/// Canonical interface over an external payment processor.
#[async_trait]
pub trait PaymentGatewayPort: Send + Sync {
    fn provider(&self) -> PaymentProvider;

    // ========================================================================
    // Customer Management
    // ========================================================================

    async fn create_customer(
        &self,
        email: &str,
        name: Option<&str>,
        metadata: &Metadata,
    ) -> AppResult<CustomerResult>;

    async fn update_customer(
        &self,
        customer_id: &str,
        data: &CustomerData,
    ) -> AppResult<CustomerResult>;

    // ========================================================================
    // Checkout, Portal & Subscriptions
    // ========================================================================

    async fn create_checkout_session(&self, params: &CheckoutParams) -> AppResult<CheckoutResult>;

    async fn create_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> AppResult<PortalResult>;

    async fn create_subscription(
        &self,
        params: &CreateSubscriptionParams,
    ) -> AppResult<SubscriptionResult>;

    async fn cancel_subscription(&self, subscription_id: &str) -> AppResult<SubscriptionResult>;

    // ========================================================================
    // Webhooks
    // ========================================================================

    /// Verify the signature of a raw webhook body and parse it.
    ///
    /// Fails with `SignatureVerification` on mismatch; nothing else may happen
    /// with the payload in that case.
    fn verify_webhook_signature(
        &self,
        payload: &[u8],
        signature: &str,
        secret: &str,
    ) -> AppResult<RawWebhookEvent>;

    // ========================================================================
    // Catalog & Health
    // ========================================================================

    /// Active products only
    async fn list_products(&self) -> AppResult<Vec<GatewayProduct>>;

    /// Active prices of one product
    async fn list_prices(&self, product_id: &str) -> AppResult<Vec<GatewayPrice>>;

    /// Lightweight read-only health check. Never fails; errors are reported as unhealthy.
    async fn health_check(&self) -> GatewayHealthResult;
}
