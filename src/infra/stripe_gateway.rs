use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::time::Instant;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::payment_gateway::{
        CheckoutParams, CheckoutResult, CreateSubscriptionParams, CustomerData, CustomerResult,
        GatewayHealthResult, GatewayPrice, GatewayProduct, Metadata, PaymentGatewayPort,
        PortalResult, SubscriptionResult,
    },
    domain::entities::{payment_provider::PaymentProvider, webhook_event::RawWebhookEvent},
    infra::stripe_client::{StripeClient, StripeSubscription},
};

/// Adapter that wraps StripeClient to implement PaymentGatewayPort.
#[derive(Clone)]
pub struct StripeGateway {
    client: StripeClient,
    signature_tolerance_secs: i64,
}

/// Envelope of a Stripe webhook body.
#[derive(Debug, Deserialize)]
struct StripeEventEnvelope {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: StripeEventData,
}

#[derive(Debug, Deserialize)]
struct StripeEventData {
    object: JsonValue,
}

impl StripeGateway {
    pub fn new(client: StripeClient, signature_tolerance_secs: i64) -> Self {
        Self {
            client,
            signature_tolerance_secs,
        }
    }

    fn timestamp_to_datetime(ts: i64) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(ts, 0).single()
    }

    fn subscription_result(sub: StripeSubscription) -> SubscriptionResult {
        SubscriptionResult {
            id: sub.id,
            customer_id: sub.customer,
            status: sub.status,
            current_period_end: sub.current_period_end.and_then(Self::timestamp_to_datetime),
        }
    }
}

#[async_trait]
impl PaymentGatewayPort for StripeGateway {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::Stripe
    }

    // ========================================================================
    // Customer Management
    // ========================================================================

    async fn create_customer(
        &self,
        email: &str,
        name: Option<&str>,
        metadata: &Metadata,
    ) -> AppResult<CustomerResult> {
        let customer = self.client.create_customer(email, name, metadata).await?;
        Ok(CustomerResult {
            id: customer.id,
            email: customer.email,
            name: customer.name,
            metadata: customer.metadata,
        })
    }

    async fn update_customer(
        &self,
        customer_id: &str,
        data: &CustomerData,
    ) -> AppResult<CustomerResult> {
        let customer = self
            .client
            .update_customer(
                customer_id,
                data.email.as_deref(),
                data.name.as_deref(),
                data.metadata.as_ref(),
            )
            .await?;
        Ok(CustomerResult {
            id: customer.id,
            email: customer.email,
            name: customer.name,
            metadata: customer.metadata,
        })
    }

    // ========================================================================
    // Checkout, Portal & Subscriptions
    // ========================================================================

    async fn create_checkout_session(&self, params: &CheckoutParams) -> AppResult<CheckoutResult> {
        let session = self
            .client
            .create_checkout_session(
                &params.customer_id,
                &params.price_id,
                &params.entity_id,
                &params.success_url,
                &params.cancel_url,
                &params.session_metadata(),
            )
            .await?;

        let url = session
            .url
            .ok_or_else(|| AppError::Gateway("Stripe checkout session has no URL".into()))?;
        Ok(CheckoutResult {
            url,
            session_id: session.id,
        })
    }

    async fn create_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> AppResult<PortalResult> {
        let session = self
            .client
            .create_portal_session(customer_id, return_url)
            .await?;
        Ok(PortalResult { url: session.url })
    }

    async fn create_subscription(
        &self,
        params: &CreateSubscriptionParams,
    ) -> AppResult<SubscriptionResult> {
        let sub = self
            .client
            .create_subscription(&params.customer_id, &params.price_id, &params.metadata)
            .await?;
        Ok(Self::subscription_result(sub))
    }

    async fn cancel_subscription(&self, subscription_id: &str) -> AppResult<SubscriptionResult> {
        let sub = self.client.cancel_subscription(subscription_id).await?;
        Ok(Self::subscription_result(sub))
    }

    // ========================================================================
    // Webhooks
    // ========================================================================

    fn verify_webhook_signature(
        &self,
        payload: &[u8],
        signature: &str,
        secret: &str,
    ) -> AppResult<RawWebhookEvent> {
        StripeClient::verify_webhook_signature(
            payload,
            signature,
            secret,
            self.signature_tolerance_secs,
        )?;

        let envelope: StripeEventEnvelope = serde_json::from_slice(payload)
            .map_err(|e| AppError::InvalidInput(format!("malformed Stripe event: {}", e)))?;

        Ok(RawWebhookEvent {
            id: envelope.id,
            event_type: envelope.event_type,
            data: envelope.data.object,
            provider: PaymentProvider::Stripe,
            received_at: Utc::now(),
        })
    }

    // ========================================================================
    // Catalog & Health
    // ========================================================================

    async fn list_products(&self) -> AppResult<Vec<GatewayProduct>> {
        let products = self.client.list_products(100).await?;
        Ok(products
            .into_iter()
            .filter(|p| p.active)
            .map(|p| GatewayProduct {
                id: p.id,
                name: p.name,
                description: p.description,
                active: p.active,
            })
            .collect())
    }

    async fn list_prices(&self, product_id: &str) -> AppResult<Vec<GatewayPrice>> {
        let prices = self.client.list_prices(product_id).await?;
        Ok(prices
            .into_iter()
            .filter(|p| p.active)
            .map(|p| GatewayPrice {
                id: p.id,
                product_id: p.product,
                unit_amount: p.unit_amount,
                currency: p.currency,
                interval: p.recurring.as_ref().map(|r| r.interval.clone()),
                interval_count: p.recurring.as_ref().map(|r| r.interval_count),
                active: p.active,
            })
            .collect())
    }

    async fn health_check(&self) -> GatewayHealthResult {
        let started = Instant::now();
        let result = self.client.list_products(1).await;
        let latency_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(_) => GatewayHealthResult {
                healthy: true,
                latency_ms,
                message: None,
            },
            Err(e) => {
                tracing::warn!(provider = "stripe", error = %e, "Gateway health check failed");
                GatewayHealthResult {
                    healthy: false,
                    latency_ms,
                    message: Some(e.to_string()),
                }
            }
        }
    }
}
