use async_trait::async_trait;
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use sha2::Sha256;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::payment_gateway::{
        CheckoutParams, CheckoutResult, CreateSubscriptionParams, CustomerData, CustomerResult,
        GatewayHealthResult, GatewayPrice, GatewayProduct, Metadata, PaymentGatewayPort,
        PortalResult, SubscriptionResult,
    },
    domain::entities::{payment_provider::PaymentProvider, webhook_event::RawWebhookEvent},
    infra::stripe_client::constant_time_compare,
};

/// Offline payment gateway for local development.
///
/// Nothing leaves the process: customers and subscriptions live in memory and
/// checkout/portal URLs point back at the frontend. Webhooks are signed with
/// HMAC-SHA256 over the raw body, hex encoded, in `x-webhook-signature`.
pub struct DummyGateway {
    frontend_url: String,
    products: Vec<GatewayProduct>,
    prices: Vec<GatewayPrice>,
    customers: Mutex<HashMap<String, CustomerResult>>,
    subscriptions: Mutex<HashMap<String, SubscriptionResult>>,
}

#[derive(Debug, Deserialize)]
struct DummyEventEnvelope {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    data: DummyEventData,
}

#[derive(Debug, Default, Deserialize)]
struct DummyEventData {
    #[serde(default)]
    object: JsonValue,
}

/// Hex HMAC-SHA256 of `payload`, as expected in `x-webhook-signature`.
pub fn sign_payload(secret: &str, payload: &[u8]) -> AppResult<String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|_| AppError::Internal("HMAC error".into()))?;
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

impl DummyGateway {
    pub fn new(frontend_url: &str) -> Self {
        let product_id = "dummy_prod_pro".to_string();
        Self {
            frontend_url: frontend_url.trim_end_matches('/').to_string(),
            products: vec![GatewayProduct {
                id: product_id.clone(),
                name: "Pro (test)".to_string(),
                description: Some("Offline test product".to_string()),
                active: true,
            }],
            prices: vec![
                GatewayPrice {
                    id: "dummy_price_pro_monthly".to_string(),
                    product_id: product_id.clone(),
                    unit_amount: Some(1900),
                    currency: "usd".to_string(),
                    interval: Some("month".to_string()),
                    interval_count: Some(1),
                    active: true,
                },
                GatewayPrice {
                    id: "dummy_price_pro_yearly".to_string(),
                    product_id,
                    unit_amount: Some(19000),
                    currency: "usd".to_string(),
                    interval: Some("year".to_string()),
                    interval_count: Some(1),
                    active: true,
                },
            ],
            customers: Mutex::new(HashMap::new()),
            subscriptions: Mutex::new(HashMap::new()),
        }
    }

    fn generate_id(prefix: &str) -> String {
        format!("dummy_{}_{}", prefix, Uuid::new_v4().simple())
    }
}

#[async_trait]
impl PaymentGatewayPort for DummyGateway {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::Dummy
    }

    async fn create_customer(
        &self,
        email: &str,
        name: Option<&str>,
        metadata: &Metadata,
    ) -> AppResult<CustomerResult> {
        let customer = CustomerResult {
            id: Self::generate_id("cus"),
            email: Some(email.to_string()),
            name: name.map(str::to_string),
            metadata: metadata.clone(),
        };
        self.customers
            .lock()
            .await
            .insert(customer.id.clone(), customer.clone());
        Ok(customer)
    }

    async fn update_customer(
        &self,
        customer_id: &str,
        data: &CustomerData,
    ) -> AppResult<CustomerResult> {
        let mut customers = self.customers.lock().await;
        let customer = customers
            .get_mut(customer_id)
            .ok_or_else(|| AppError::NotFound(format!("customer {customer_id}")))?;
        if let Some(email) = &data.email {
            customer.email = Some(email.clone());
        }
        if let Some(name) = &data.name {
            customer.name = Some(name.clone());
        }
        if let Some(metadata) = &data.metadata {
            customer.metadata.extend(metadata.clone());
        }
        Ok(customer.clone())
    }

    async fn create_checkout_session(&self, params: &CheckoutParams) -> AppResult<CheckoutResult> {
        if !self.prices.iter().any(|p| p.id == params.price_id) {
            return Err(AppError::InvalidInput(format!(
                "unknown dummy price {}",
                params.price_id
            )));
        }
        let session_id = Self::generate_id("cs");
        Ok(CheckoutResult {
            url: format!(
                "{}/billing/dummy-checkout?session={}",
                self.frontend_url, session_id
            ),
            session_id,
        })
    }

    async fn create_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> AppResult<PortalResult> {
        Ok(PortalResult {
            url: format!(
                "{}/billing/dummy-portal?customer={}&return_url={}",
                self.frontend_url, customer_id, return_url
            ),
        })
    }

    async fn create_subscription(
        &self,
        params: &CreateSubscriptionParams,
    ) -> AppResult<SubscriptionResult> {
        let subscription = SubscriptionResult {
            id: Self::generate_id("sub"),
            customer_id: params.customer_id.clone(),
            status: "active".to_string(),
            current_period_end: Some(Utc::now() + Duration::days(30)),
        };
        self.subscriptions
            .lock()
            .await
            .insert(subscription.id.clone(), subscription.clone());
        Ok(subscription)
    }

    async fn cancel_subscription(&self, subscription_id: &str) -> AppResult<SubscriptionResult> {
        let mut subscriptions = self.subscriptions.lock().await;
        let subscription = subscriptions
            .entry(subscription_id.to_string())
            .or_insert_with(|| SubscriptionResult {
                id: subscription_id.to_string(),
                customer_id: String::new(),
                status: "active".to_string(),
                current_period_end: None,
            });
        subscription.status = "canceled".to_string();
        Ok(subscription.clone())
    }

    fn verify_webhook_signature(
        &self,
        payload: &[u8],
        signature: &str,
        secret: &str,
    ) -> AppResult<RawWebhookEvent> {
        let expected = sign_payload(secret, payload)?;
        let provided = signature.trim();
        let provided = provided.strip_prefix("sha256=").unwrap_or(provided);
        if !constant_time_compare(provided, &expected) {
            return Err(AppError::SignatureVerification("signature mismatch".into()));
        }

        let envelope: DummyEventEnvelope = serde_json::from_slice(payload)
            .map_err(|e| AppError::InvalidInput(format!("malformed dummy event: {}", e)))?;

        Ok(RawWebhookEvent {
            id: envelope.id,
            event_type: envelope.event_type,
            data: envelope.data.object,
            provider: PaymentProvider::Dummy,
            received_at: Utc::now(),
        })
    }

    async fn list_products(&self) -> AppResult<Vec<GatewayProduct>> {
        Ok(self.products.iter().filter(|p| p.active).cloned().collect())
    }

    async fn list_prices(&self, product_id: &str) -> AppResult<Vec<GatewayPrice>> {
        Ok(self
            .prices
            .iter()
            .filter(|p| p.active && p.product_id == product_id)
            .cloned()
            .collect())
    }

    async fn health_check(&self) -> GatewayHealthResult {
        GatewayHealthResult {
            healthy: true,
            latency_ms: 0,
            message: None,
        }
    }
}
