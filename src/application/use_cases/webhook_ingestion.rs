use axum::http::HeaderMap;
use std::sync::Arc;

use crate::{
    app_error::{AppError, AppResult},
    application::{
        ports::job_queue::{JobQueue, PAYMENT_WEBHOOK_QUEUE},
        use_cases::{gateway_factory::PaymentGatewayFactory, webhook_normalizer},
    },
    domain::entities::{payment_provider::PaymentProvider, webhook_event::WebhookJob},
};

/// Generic signature headers, checked in order, for providers without their own.
const FALLBACK_SIGNATURE_HEADERS: &[&str] = &["x-webhook-signature", "x-signature"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestionOutcome {
    Enqueued { job_id: String },
    /// Verified, but of a type we do not process
    Ignored,
}

/// Pick the signature header value for a provider.
pub fn extract_signature(provider: PaymentProvider, headers: &HeaderMap) -> Option<String> {
    let candidates = provider
        .signature_header()
        .into_iter()
        .chain(FALLBACK_SIGNATURE_HEADERS.iter().copied());

    candidates
        .filter_map(|name| headers.get(name))
        .filter_map(|value| value.to_str().ok())
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(str::to_owned)
}

/// Synchronous webhook request path: verify, normalize, enqueue, return.
#[derive(Clone)]
pub struct WebhookIngestionUseCases {
    gateways: Arc<PaymentGatewayFactory>,
    queue: Arc<dyn JobQueue>,
}

impl WebhookIngestionUseCases {
    pub fn new(gateways: Arc<PaymentGatewayFactory>, queue: Arc<dyn JobQueue>) -> Self {
        Self { gateways, queue }
    }

    /// Accept one inbound webhook delivery.
    ///
    /// # Errors
    /// - `UnknownProvider` if `provider` is not a known provider name
    /// - `MissingBody` if the body is empty
    /// - `SignatureVerification` if the signature is missing or wrong
    /// - `UnconfiguredProvider` if the provider has no registered adapter
    pub async fn receive(
        &self,
        provider: &str,
        body: &[u8],
        headers: &HeaderMap,
    ) -> AppResult<IngestionOutcome> {
        let provider: PaymentProvider = provider
            .parse()
            .map_err(|_| AppError::UnknownProvider(provider.to_string()))?;

        if body.is_empty() {
            return Err(AppError::MissingBody);
        }

        let signature = extract_signature(provider, headers).ok_or_else(|| {
            AppError::SignatureVerification("missing signature header".to_string())
        })?;

        let gateway = self.gateways.create(provider)?;
        let secret = self.gateways.webhook_secret(provider)?;
        let raw = gateway
            .verify_webhook_signature(body, &signature, secret)
            .inspect_err(|e| {
                tracing::warn!(
                    operation = "billing.webhook.signature-rejected",
                    provider = %provider,
                    error = %e,
                    "Webhook signature verification failed"
                );
            })?;

        let normalized = match webhook_normalizer::normalize(provider, &raw) {
            Ok(event) => event,
            Err(AppError::UnknownEventType(raw_type)) => {
                tracing::info!(
                    operation = "billing.webhook.ignored",
                    provider = %provider,
                    raw_event_id = %raw.id,
                    raw_event_type = %raw_type,
                    "Ignoring unmapped webhook event type"
                );
                return Ok(IngestionOutcome::Ignored);
            }
            Err(e) => return Err(e),
        };

        let job = WebhookJob::new(normalized, &raw);
        let payload = serde_json::to_value(&job)
            .map_err(|e| AppError::Internal(format!("failed to serialize webhook job: {}", e)))?;
        let job_id = self.queue.enqueue(PAYMENT_WEBHOOK_QUEUE, payload).await?;

        tracing::info!(
            operation = "billing.webhook.enqueued",
            provider = %provider,
            raw_event_id = %raw.id,
            raw_event_type = %raw.event_type,
            job_id = %job_id,
            "Webhook enqueued for processing"
        );

        Ok(IngestionOutcome::Enqueued { job_id })
    }
}
