use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::payment_provider::PaymentProvider;

/// Domain events emitted by billing state changes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BillingEvent {
    SubscriptionCreated {
        subscription_id: Uuid,
        account_id: Uuid,
        workspace_id: Uuid,
        plan_price_id: Uuid,
        provider: PaymentProvider,
    },
    SubscriptionCanceled {
        subscription_id: Uuid,
        account_id: Uuid,
        workspace_id: Uuid,
        /// Set when the cancellation came from dunning escalation
        suspended: bool,
        reason: Option<String>,
        canceled_at: DateTime<Utc>,
    },
    PaymentFailed {
        subscription_id: Uuid,
        account_id: Uuid,
        workspace_id: Uuid,
        failure_count: i32,
    },
    PaymentRecovered {
        subscription_id: Uuid,
        account_id: Uuid,
        workspace_id: Uuid,
    },
    GatewayLinked {
        plan_id: Uuid,
        provider: PaymentProvider,
        provider_product_id: String,
        linked_by: Option<Uuid>,
    },
    /// A paid checkout that could not be attributed to an account or workspace
    CheckoutUnattributed {
        provider: PaymentProvider,
        raw_event_id: String,
        provider_subscription_id: Option<String>,
        reason: String,
    },
}

impl BillingEvent {
    pub fn name(&self) -> &'static str {
        match self {
            BillingEvent::SubscriptionCreated { .. } => "subscription_created",
            BillingEvent::SubscriptionCanceled { .. } => "subscription_canceled",
            BillingEvent::PaymentFailed { .. } => "payment_failed",
            BillingEvent::PaymentRecovered { .. } => "payment_recovered",
            BillingEvent::GatewayLinked { .. } => "gateway_linked",
            BillingEvent::CheckoutUnattributed { .. } => "checkout_unattributed",
        }
    }

    /// Account the event belongs to, if it is tenant-scoped
    pub fn account_id(&self) -> Option<Uuid> {
        match self {
            BillingEvent::SubscriptionCreated { account_id, .. }
            | BillingEvent::SubscriptionCanceled { account_id, .. }
            | BillingEvent::PaymentFailed { account_id, .. }
            | BillingEvent::PaymentRecovered { account_id, .. } => Some(*account_id),
            BillingEvent::GatewayLinked { .. } | BillingEvent::CheckoutUnattributed { .. } => None,
        }
    }
}
