use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use super::payment_provider::PaymentProvider;

/// Internal subscription status.
///
/// Legal moves: `pending -> *`, `active <-> past_due`,
/// `{active, past_due} -> canceled | unpaid`. `canceled` and `unpaid` are terminal.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    AsRefStr,
    Display,
    EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    PastDue,
    Canceled,
    Unpaid,
    #[default]
    Pending,
}

impl SubscriptionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SubscriptionStatus::Canceled | SubscriptionStatus::Unpaid)
    }

    /// Whether the subscription still grants access to the plan
    pub fn has_access(&self) -> bool {
        matches!(self, SubscriptionStatus::Active | SubscriptionStatus::PastDue)
    }

    /// Whether moving from `self` to `next` is a legal state change.
    /// Staying in the same state is always allowed (field refreshes).
    pub fn can_transition_to(&self, next: SubscriptionStatus) -> bool {
        use SubscriptionStatus::*;

        if *self == next {
            return true;
        }
        match self {
            Pending => true,
            Active => matches!(next, PastDue | Canceled | Unpaid),
            PastDue => matches!(next, Active | Canceled | Unpaid),
            Canceled | Unpaid => false,
        }
    }

    /// Map a provider status string onto the internal status.
    ///
    /// Returns `None` for statuses we do not track, which leaves the stored
    /// status untouched.
    pub fn from_provider_status(status: &str) -> Option<Self> {
        match status {
            "active" | "trialing" => Some(SubscriptionStatus::Active),
            "past_due" => Some(SubscriptionStatus::PastDue),
            "canceled" | "unpaid" => Some(SubscriptionStatus::Canceled),
            "incomplete" | "pending" => Some(SubscriptionStatus::Pending),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Subscription {
    pub id: Uuid,
    pub account_id: Uuid,
    pub workspace_id: Uuid,
    pub plan_price_id: Uuid,
    pub status: SubscriptionStatus,
    pub current_period_end: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    /// Stable id for the subscription a provider subscription creates.
    /// Every delivery of the same checkout derives the same row id.
    pub fn id_for_provider_subscription(
        provider: PaymentProvider,
        provider_subscription_id: &str,
    ) -> Uuid {
        let name = format!("{}:{}", provider, provider_subscription_id);
        Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes())
    }
}

#[derive(Debug, Clone)]
pub struct CreateSubscriptionInput {
    pub id: Uuid,
    pub account_id: Uuid,
    pub workspace_id: Uuid,
    pub plan_price_id: Uuid,
    pub status: SubscriptionStatus,
    pub current_period_end: Option<DateTime<Utc>>,
}
