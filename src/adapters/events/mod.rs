//! Billing event publication.

use async_trait::async_trait;
use std::sync::Arc;

use crate::{
    application::ports::{
        event_publisher::BillingEventPublisher,
        job_queue::{EMAIL_QUEUE, EmailJob, JobQueue},
    },
    domain::entities::billing_event::BillingEvent,
};

/// Logs every billing event and turns customer-facing ones into email jobs.
pub struct NotificationEventPublisher {
    queue: Arc<dyn JobQueue>,
}

impl NotificationEventPublisher {
    pub fn new(queue: Arc<dyn JobQueue>) -> Self {
        Self { queue }
    }
}

/// Email template for an event, if the customer is told about it.
fn email_template(event: &BillingEvent) -> Option<&'static str> {
    match event {
        BillingEvent::PaymentFailed { .. } => Some("payment-failed"),
        BillingEvent::PaymentRecovered { .. } => Some("payment-recovered"),
        BillingEvent::SubscriptionCanceled { .. } => Some("subscription-canceled"),
        BillingEvent::SubscriptionCreated { .. } => Some("subscription-created"),
        BillingEvent::GatewayLinked { .. } | BillingEvent::CheckoutUnattributed { .. } => None,
    }
}

#[async_trait]
impl BillingEventPublisher for NotificationEventPublisher {
    async fn publish(&self, event: BillingEvent) {
        tracing::info!(
            operation = "billing.event.published",
            event = event.name(),
            account_id = ?event.account_id(),
            "Billing event"
        );

        let Some(template) = email_template(&event) else {
            return;
        };

        let data = match serde_json::to_value(&event) {
            Ok(data) => data,
            Err(e) => {
                tracing::error!(
                    event = event.name(),
                    error = %e,
                    "Failed to serialize billing event"
                );
                return;
            }
        };
        let job = EmailJob {
            template: template.to_string(),
            account_id: event.account_id().map(|id| id.to_string()),
            data,
        };

        let payload = match serde_json::to_value(&job) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(template, error = %e, "Failed to serialize email job");
                return;
            }
        };
        if let Err(e) = self.queue.enqueue(EMAIL_QUEUE, payload).await {
            tracing::error!(
                operation = "billing.event.email-enqueue-failed",
                template,
                error = %e,
                "Failed to enqueue notification email"
            );
        }
    }
}
