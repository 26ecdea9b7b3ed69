use hmac::{Hmac, Mac};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::Sha256;
use std::collections::HashMap;

use crate::app_error::{AppError, AppResult};

const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";

#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    secret_key: SecretString,
}

impl StripeClient {
    pub fn new(client: Client, secret_key: SecretString) -> Self {
        Self { client, secret_key }
    }

    fn auth_header(&self) -> String {
        use base64::Engine;
        let encoded = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:", self.secret_key.expose_secret()));
        format!("Basic {}", encoded)
    }

    async fn post_form<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        params: &[(String, String)],
    ) -> AppResult<T> {
        let response = self
            .client
            .post(format!("{}{}", STRIPE_API_BASE, path))
            .header("Authorization", self.auth_header())
            .form(params)
            .send()
            .await
            .map_err(|e| AppError::Gateway(format!("Stripe request failed: {}", e)))?;

        self.handle_response(response).await
    }

    async fn get<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> AppResult<T> {
        let response = self
            .client
            .get(format!("{}{}", STRIPE_API_BASE, path))
            .header("Authorization", self.auth_header())
            .query(query)
            .send()
            .await
            .map_err(|e| AppError::Gateway(format!("Stripe request failed: {}", e)))?;

        self.handle_response(response).await
    }

    // ========================================================================
    // Customers
    // ========================================================================

    pub async fn create_customer(
        &self,
        email: &str,
        name: Option<&str>,
        metadata: &HashMap<String, String>,
    ) -> AppResult<StripeCustomer> {
        let mut params = vec![("email".to_string(), email.to_string())];
        if let Some(name) = name {
            params.push(("name".to_string(), name.to_string()));
        }
        params.extend(metadata_params("metadata", metadata));

        self.post_form("/customers", &params).await
    }

    pub async fn update_customer(
        &self,
        customer_id: &str,
        email: Option<&str>,
        name: Option<&str>,
        metadata: Option<&HashMap<String, String>>,
    ) -> AppResult<StripeCustomer> {
        let mut params = Vec::new();
        if let Some(email) = email {
            params.push(("email".to_string(), email.to_string()));
        }
        if let Some(name) = name {
            params.push(("name".to_string(), name.to_string()));
        }
        if let Some(metadata) = metadata {
            params.extend(metadata_params("metadata", metadata));
        }

        self.post_form(&format!("/customers/{}", customer_id), &params)
            .await
    }

    // ========================================================================
    // Checkout & Billing Portal
    // ========================================================================

    /// Subscription-mode session with one line item. The metadata is set on the
    /// session and copied onto the subscription it creates.
    pub async fn create_checkout_session(
        &self,
        customer_id: &str,
        price_id: &str,
        client_reference_id: &str,
        success_url: &str,
        cancel_url: &str,
        metadata: &HashMap<String, String>,
    ) -> AppResult<StripeCheckoutSession> {
        let params = checkout_session_params(
            customer_id,
            price_id,
            client_reference_id,
            success_url,
            cancel_url,
            metadata,
        );
        self.post_form("/checkout/sessions", &params).await
    }

    pub async fn create_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> AppResult<StripePortalSession> {
        let params = vec![
            ("customer".to_string(), customer_id.to_string()),
            ("return_url".to_string(), return_url.to_string()),
        ];
        self.post_form("/billing_portal/sessions", &params).await
    }

    // ========================================================================
    // Subscriptions
    // ========================================================================

    pub async fn create_subscription(
        &self,
        customer_id: &str,
        price_id: &str,
        metadata: &HashMap<String, String>,
    ) -> AppResult<StripeSubscription> {
        let mut params = vec![
            ("customer".to_string(), customer_id.to_string()),
            ("items[0][price]".to_string(), price_id.to_string()),
        ];
        params.extend(metadata_params("metadata", metadata));

        self.post_form("/subscriptions", &params).await
    }

    pub async fn cancel_subscription(
        &self,
        subscription_id: &str,
    ) -> AppResult<StripeSubscription> {
        let response = self
            .client
            .delete(format!("{}/subscriptions/{}", STRIPE_API_BASE, subscription_id))
            .header("Authorization", self.auth_header())
            .send()
            .await
            .map_err(|e| AppError::Gateway(format!("Stripe request failed: {}", e)))?;

        self.handle_response(response).await
    }

    // ========================================================================
    // Catalog
    // ========================================================================

    pub async fn list_products(&self, limit: u32) -> AppResult<Vec<StripeProduct>> {
        let list: StripeList<StripeProduct> = self
            .get(
                "/products",
                &[("active", "true".to_string()), ("limit", limit.to_string())],
            )
            .await?;
        Ok(list.data)
    }

    pub async fn list_prices(&self, product_id: &str) -> AppResult<Vec<StripePrice>> {
        let list: StripeList<StripePrice> = self
            .get(
                "/prices",
                &[
                    ("product", product_id.to_string()),
                    ("active", "true".to_string()),
                    ("limit", "100".to_string()),
                ],
            )
            .await?;
        Ok(list.data)
    }

    // ========================================================================
    // Webhook Signature Verification
    // ========================================================================

    /// Verify a `stripe-signature` header (`t=timestamp,v1=signature,...`).
    ///
    /// The signed payload is `{timestamp}.{raw body}`; the timestamp must be
    /// within `tolerance_secs` of now.
    pub fn verify_webhook_signature(
        payload: &[u8],
        signature_header: &str,
        webhook_secret: &str,
        tolerance_secs: i64,
    ) -> AppResult<()> {
        Self::verify_webhook_signature_at(
            payload,
            signature_header,
            webhook_secret,
            tolerance_secs,
            chrono::Utc::now().timestamp(),
        )
    }

    fn verify_webhook_signature_at(
        payload: &[u8],
        signature_header: &str,
        webhook_secret: &str,
        tolerance_secs: i64,
        now: i64,
    ) -> AppResult<()> {
        let mut timestamp: Option<&str> = None;
        let mut signatures: Vec<&str> = Vec::new();

        for part in signature_header.split(',') {
            let Some((key, value)) = part.trim().split_once('=') else {
                continue;
            };
            match key {
                "t" => timestamp = Some(value),
                "v1" => signatures.push(value),
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or_else(|| {
            AppError::SignatureVerification("missing timestamp in signature".into())
        })?;

        if signatures.is_empty() {
            return Err(AppError::SignatureVerification("missing v1 signature".into()));
        }

        let mut mac = Hmac::<Sha256>::new_from_slice(webhook_secret.as_bytes())
            .map_err(|_| AppError::Internal("HMAC error".into()))?;
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(payload);
        let expected = hex::encode(mac.finalize().into_bytes());

        if !signatures.iter().any(|sig| constant_time_compare(sig, &expected)) {
            return Err(AppError::SignatureVerification("signature mismatch".into()));
        }

        let ts: i64 = timestamp
            .parse()
            .map_err(|_| AppError::SignatureVerification("invalid timestamp".into()))?;
        if now.abs_diff(ts) > tolerance_secs.unsigned_abs() {
            return Err(AppError::SignatureVerification(
                "timestamp outside tolerance".into(),
            ));
        }
        Ok(())
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    async fn handle_response<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
    ) -> AppResult<T> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::Gateway(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            tracing::error!(status = %status, body = %body, "Stripe API error");

            if status == reqwest::StatusCode::NOT_FOUND {
                return Err(AppError::NotFound("Stripe resource".into()));
            }

            // Client errors are permanent; everything else may succeed on retry.
            if let Ok(error) = serde_json::from_str::<StripeErrorResponse>(&body)
                && status.is_client_error()
                && status != reqwest::StatusCode::TOO_MANY_REQUESTS
            {
                return Err(AppError::InvalidInput(format!(
                    "Stripe error: {}",
                    error.error.message.unwrap_or(error.error.error_type)
                )));
            }

            return Err(AppError::Gateway(format!("Stripe API error: {}", status)));
        }

        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(body = %body, error = %e, "Failed to parse Stripe response");
            AppError::Gateway(format!("Failed to parse Stripe response: {}", e))
        })
    }
}

/// `prefix[key]=value` form fields.
fn metadata_params(prefix: &str, metadata: &HashMap<String, String>) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = metadata
        .iter()
        .map(|(k, v)| (format!("{}[{}]", prefix, k), v.clone()))
        .collect();
    params.sort();
    params
}

fn checkout_session_params(
    customer_id: &str,
    price_id: &str,
    client_reference_id: &str,
    success_url: &str,
    cancel_url: &str,
    metadata: &HashMap<String, String>,
) -> Vec<(String, String)> {
    let mut params = vec![
        ("mode".to_string(), "subscription".to_string()),
        ("customer".to_string(), customer_id.to_string()),
        ("client_reference_id".to_string(), client_reference_id.to_string()),
        ("line_items[0][price]".to_string(), price_id.to_string()),
        ("line_items[0][quantity]".to_string(), "1".to_string()),
        ("success_url".to_string(), success_url.to_string()),
        ("cancel_url".to_string(), cancel_url.to_string()),
    ];
    params.extend(metadata_params("metadata", metadata));
    params.extend(metadata_params("subscription_data[metadata]", metadata));
    params
}

pub fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}

// ============================================================================
// Stripe Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct StripeList<T> {
    pub data: Vec<T>,
}

#[derive(Debug, Deserialize)]
pub struct StripeCustomer {
    pub id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct StripeCheckoutSession {
    pub id: String,
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StripePortalSession {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct StripeSubscription {
    pub id: String,
    pub customer: String,
    pub status: String,
    pub current_period_end: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct StripeProduct {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub active: bool,
}

#[derive(Debug, Deserialize)]
pub struct StripePrice {
    pub id: String,
    pub product: String,
    pub unit_amount: Option<i64>,
    pub currency: String,
    pub recurring: Option<StripeRecurring>,
    #[serde(default)]
    pub active: bool,
}

#[derive(Debug, Deserialize)]
pub struct StripeRecurring {
    pub interval: String,
    pub interval_count: i64,
}

#[derive(Debug, Deserialize)]
struct StripeErrorResponse {
    error: StripeError,
}

#[derive(Debug, Deserialize)]
struct StripeError {
    #[serde(rename = "type")]
    error_type: String,
    message: Option<String>,
}
