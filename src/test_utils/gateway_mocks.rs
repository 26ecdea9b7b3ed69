//! Configurable payment gateway double that records what it was asked to do.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value as JsonValue, json};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::{
    app_error::{AppError, AppResult},
    application::ports::payment_gateway::{
        CheckoutParams, CheckoutResult, CreateSubscriptionParams, CustomerData, CustomerResult,
        GatewayHealthResult, GatewayPrice, GatewayProduct, Metadata, PaymentGatewayPort,
        PortalResult, SubscriptionResult,
    },
    domain::entities::{payment_provider::PaymentProvider, webhook_event::RawWebhookEvent},
};

pub struct MockGateway {
    provider: PaymentProvider,
    reject_signatures: bool,
    failing: bool,
    healthy: bool,
    webhook_event: Option<(String, String, JsonValue)>,
    products: Vec<GatewayProduct>,
    prices: Vec<GatewayPrice>,
    customers_created: AtomicUsize,
    checkout_calls: Mutex<Vec<CheckoutParams>>,
    portal_return_urls: Mutex<Vec<String>>,
    canceled_subscriptions: Mutex<Vec<String>>,
}

impl MockGateway {
    pub fn new(provider: PaymentProvider) -> Self {
        Self {
            provider,
            reject_signatures: false,
            failing: false,
            healthy: true,
            webhook_event: None,
            products: vec![],
            prices: vec![],
            customers_created: AtomicUsize::new(0),
            checkout_calls: Mutex::new(vec![]),
            portal_return_urls: Mutex::new(vec![]),
            canceled_subscriptions: Mutex::new(vec![]),
        }
    }

    /// Every signature check fails.
    pub fn rejecting_signatures(mut self) -> Self {
        self.reject_signatures = true;
        self
    }

    /// Every remote call fails with a gateway error.
    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    pub fn unhealthy(mut self) -> Self {
        self.healthy = false;
        self
    }

    /// Event returned by signature verification regardless of the body.
    pub fn with_webhook_event(mut self, id: &str, event_type: &str, data: JsonValue) -> Self {
        self.webhook_event = Some((id.to_string(), event_type.to_string(), data));
        self
    }

    pub fn with_product(mut self, id: &str, name: &str) -> Self {
        self.products.push(GatewayProduct {
            id: id.to_string(),
            name: name.to_string(),
            description: None,
            active: true,
        });
        self
    }

    pub fn with_price(mut self, product_id: &str, price_id: &str) -> Self {
        self.prices.push(GatewayPrice {
            id: price_id.to_string(),
            product_id: product_id.to_string(),
            unit_amount: Some(1900),
            currency: "usd".to_string(),
            interval: Some("month".to_string()),
            interval_count: Some(1),
            active: true,
        });
        self
    }

    pub fn customers_created(&self) -> usize {
        self.customers_created.load(Ordering::SeqCst)
    }

    pub fn checkout_calls(&self) -> Vec<CheckoutParams> {
        self.checkout_calls.lock().unwrap().clone()
    }

    pub fn portal_return_urls(&self) -> Vec<String> {
        self.portal_return_urls.lock().unwrap().clone()
    }

    pub fn canceled_subscriptions(&self) -> Vec<String> {
        self.canceled_subscriptions.lock().unwrap().clone()
    }

    fn check_available(&self) -> AppResult<()> {
        if self.failing {
            return Err(AppError::Gateway("mock gateway unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl PaymentGatewayPort for MockGateway {
    fn provider(&self) -> PaymentProvider {
        self.provider
    }

    async fn create_customer(
        &self,
        email: &str,
        name: Option<&str>,
        metadata: &Metadata,
    ) -> AppResult<CustomerResult> {
        self.check_available()?;
        let n = self.customers_created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(CustomerResult {
            id: format!("cus_mock_{n}"),
            email: Some(email.to_string()),
            name: name.map(str::to_string),
            metadata: metadata.clone(),
        })
    }

    async fn update_customer(
        &self,
        customer_id: &str,
        data: &CustomerData,
    ) -> AppResult<CustomerResult> {
        self.check_available()?;
        Ok(CustomerResult {
            id: customer_id.to_string(),
            email: data.email.clone(),
            name: data.name.clone(),
            metadata: data.metadata.clone().unwrap_or_default(),
        })
    }

    async fn create_checkout_session(&self, params: &CheckoutParams) -> AppResult<CheckoutResult> {
        self.check_available()?;
        let mut calls = self.checkout_calls.lock().unwrap();
        calls.push(params.clone());
        let session_id = format!("cs_mock_{}", calls.len());
        Ok(CheckoutResult {
            url: format!("https://checkout.mock/{session_id}"),
            session_id,
        })
    }

    async fn create_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> AppResult<PortalResult> {
        self.check_available()?;
        self.portal_return_urls
            .lock()
            .unwrap()
            .push(return_url.to_string());
        Ok(PortalResult {
            url: format!("https://portal.mock/{customer_id}"),
        })
    }

    async fn create_subscription(
        &self,
        params: &CreateSubscriptionParams,
    ) -> AppResult<SubscriptionResult> {
        self.check_available()?;
        Ok(SubscriptionResult {
            id: "sub_mock".to_string(),
            customer_id: params.customer_id.clone(),
            status: "active".to_string(),
            current_period_end: None,
        })
    }

    async fn cancel_subscription(&self, subscription_id: &str) -> AppResult<SubscriptionResult> {
        self.check_available()?;
        self.canceled_subscriptions
            .lock()
            .unwrap()
            .push(subscription_id.to_string());
        Ok(SubscriptionResult {
            id: subscription_id.to_string(),
            customer_id: "cus_mock".to_string(),
            status: "canceled".to_string(),
            current_period_end: None,
        })
    }

    /// Returns the configured event, otherwise reads `{id, type, data.object}`
    /// from the body.
    fn verify_webhook_signature(
        &self,
        payload: &[u8],
        _signature: &str,
        _secret: &str,
    ) -> AppResult<RawWebhookEvent> {
        if self.reject_signatures {
            return Err(AppError::SignatureVerification("signature mismatch".into()));
        }
        let (id, event_type, data) = match &self.webhook_event {
            Some(event) => event.clone(),
            None => {
                let body: JsonValue = serde_json::from_slice(payload).unwrap_or_else(|_| json!({}));
                (
                    body["id"].as_str().unwrap_or("evt_mock").to_string(),
                    body["type"].as_str().unwrap_or("mock.event").to_string(),
                    body["data"]["object"].clone(),
                )
            }
        };
        Ok(RawWebhookEvent {
            id,
            event_type,
            data,
            provider: self.provider,
            received_at: Utc::now(),
        })
    }

    async fn list_products(&self) -> AppResult<Vec<GatewayProduct>> {
        self.check_available()?;
        Ok(self.products.clone())
    }

    async fn list_prices(&self, product_id: &str) -> AppResult<Vec<GatewayPrice>> {
        self.check_available()?;
        Ok(self
            .prices
            .iter()
            .filter(|p| p.product_id == product_id)
            .cloned()
            .collect())
    }

    async fn health_check(&self) -> GatewayHealthResult {
        GatewayHealthResult {
            healthy: self.healthy && !self.failing,
            latency_ms: 1,
            message: (!self.healthy || self.failing).then(|| "mock gateway unhealthy".to_string()),
        }
    }
}
