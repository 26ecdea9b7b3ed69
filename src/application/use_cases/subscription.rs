use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    app_error::AppResult,
    domain::entities::subscription::{CreateSubscriptionInput, Subscription, SubscriptionStatus},
};

/// Field changes applied to a subscription; `None` leaves the column as is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubscriptionPatch {
    pub status: Option<SubscriptionStatus>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
}

impl SubscriptionPatch {
    pub fn status(status: SubscriptionStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.current_period_end.is_none() && self.canceled_at.is_none()
    }
}

/// Subscription storage. Writes run in the tenant scope of the subscription's account.
#[async_trait]
pub trait SubscriptionRepoTrait: Send + Sync {
    async fn create(&self, input: CreateSubscriptionInput) -> AppResult<Subscription>;

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Subscription>>;

    /// Most recently created subscription of a workspace
    async fn find_latest_by_workspace_id(&self, workspace_id: Uuid)
    -> AppResult<Option<Subscription>>;

    async fn update(
        &self,
        subscription: &Subscription,
        patch: SubscriptionPatch,
    ) -> AppResult<Subscription>;
}
