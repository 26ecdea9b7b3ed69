use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::{
        ports::event_publisher::BillingEventPublisher,
        use_cases::subscription::{SubscriptionPatch, SubscriptionRepoTrait},
    },
    domain::entities::{
        billing_event::BillingEvent,
        dunning::{DunningPolicy, DunningRecord},
        payment_provider::PaymentProvider,
        subscription::{Subscription, SubscriptionStatus},
    },
};

// ============================================================================
// Repository Traits
// ============================================================================

/// Shared failure counter keyed by subscription id.
#[async_trait]
pub trait DunningRepoTrait: Send + Sync {
    /// Atomically create `{1, at, at}` or increment the count and bump `last_failure_at`.
    /// Repeating the event id of the latest increment returns the record unchanged.
    async fn record_failure(
        &self,
        subscription_id: Uuid,
        event_id: &str,
        at: DateTime<Utc>,
    ) -> AppResult<DunningRecord>;

    async fn get(&self, subscription_id: Uuid) -> AppResult<Option<DunningRecord>>;

    /// Remove the record. Returns whether one existed.
    async fn clear(&self, subscription_id: Uuid) -> AppResult<bool>;

    async fn list(&self) -> AppResult<Vec<DunningRecord>>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GracePeriodSweep {
    pub checked: usize,
    pub suspended: usize,
    /// Escalated records whose subscription was already unpaid, canceled or gone
    pub skipped: usize,
    pub failed: usize,
}

// ============================================================================
// Use Cases
// ============================================================================

#[derive(Clone)]
pub struct DunningUseCases {
    records: Arc<dyn DunningRepoTrait>,
    subscriptions: Arc<dyn SubscriptionRepoTrait>,
    events: Arc<dyn BillingEventPublisher>,
    policy: DunningPolicy,
}

impl DunningUseCases {
    pub fn new(
        records: Arc<dyn DunningRepoTrait>,
        subscriptions: Arc<dyn SubscriptionRepoTrait>,
        events: Arc<dyn BillingEventPublisher>,
        policy: DunningPolicy,
    ) -> Self {
        Self {
            records,
            subscriptions,
            events,
            policy,
        }
    }

    pub fn policy(&self) -> DunningPolicy {
        self.policy
    }

    async fn load(&self, subscription_id: Uuid) -> AppResult<Subscription> {
        self.subscriptions
            .find_by_id(subscription_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("subscription {}", subscription_id)))
    }

    /// Move the subscription to `past_due` and count the failure caused by `event_id`.
    /// Returns the failure count after this failure.
    ///
    /// The counter is written last so a failed status update leaves it untouched,
    /// and a redelivered event id is counted once.
    pub async fn record_failure(&self, subscription_id: Uuid, event_id: &str) -> AppResult<i32> {
        let subscription = self.load(subscription_id).await?;

        if subscription.status != SubscriptionStatus::PastDue {
            if subscription
                .status
                .can_transition_to(SubscriptionStatus::PastDue)
            {
                self.subscriptions
                    .update(&subscription, SubscriptionPatch::status(SubscriptionStatus::PastDue))
                    .await?;
            } else {
                tracing::warn!(
                    operation = "dunning.record-failure.illegal-transition",
                    subscription_id = %subscription_id,
                    status = %subscription.status,
                    "Failure recorded without status change"
                );
            }
        }

        let record = self
            .records
            .record_failure(subscription_id, event_id, Utc::now())
            .await?;

        if record.failure_count == 1 {
            tracing::info!(
                operation = "dunning.first-failure",
                subscription_id = %subscription_id,
                "First payment failure recorded"
            );
        } else {
            tracing::info!(
                operation = "dunning.record-failure",
                subscription_id = %subscription_id,
                failure_count = record.failure_count,
                "Payment failure recorded"
            );
        }

        Ok(record.failure_count)
    }

    /// Forget tracked failures. Idempotent.
    pub async fn record_recovery(&self, subscription_id: Uuid) -> AppResult<()> {
        let existed = self.records.clear(subscription_id).await?;
        tracing::info!(
            operation = "dunning.recovered",
            subscription_id = %subscription_id,
            had_record = existed,
            "Payment recovered, dunning cleared"
        );
        Ok(())
    }

    pub async fn failure_record(&self, subscription_id: Uuid) -> AppResult<Option<DunningRecord>> {
        self.records.get(subscription_id).await
    }

    /// Record the failure and notify.
    pub async fn handle_payment_failed(
        &self,
        subscription_id: Uuid,
        provider: PaymentProvider,
        provider_subscription_id: &str,
        event_id: &str,
    ) -> AppResult<i32> {
        let failure_count = self.record_failure(subscription_id, event_id).await?;
        let subscription = self.load(subscription_id).await?;

        self.events
            .publish(BillingEvent::PaymentFailed {
                subscription_id,
                account_id: subscription.account_id,
                workspace_id: subscription.workspace_id,
                failure_count,
            })
            .await;

        tracing::info!(
            operation = "handle-payment-failed.complete",
            subscription_id = %subscription_id,
            provider = %provider,
            provider_subscription_id = %provider_subscription_id,
            failure_count,
            "Payment failure handled"
        );

        Ok(failure_count)
    }

    /// Move a subscription to `unpaid` and publish a suspension-tagged cancellation.
    pub async fn suspend_subscription(
        &self,
        subscription_id: Uuid,
        reason: &str,
    ) -> AppResult<Subscription> {
        let subscription = self.load(subscription_id).await?;
        if subscription.status.is_terminal()
            || !subscription
                .status
                .can_transition_to(SubscriptionStatus::Unpaid)
        {
            return Err(AppError::Conflict(format!(
                "cannot suspend a {} subscription",
                subscription.status
            )));
        }

        let now = Utc::now();
        let updated = self
            .subscriptions
            .update(
                &subscription,
                SubscriptionPatch {
                    status: Some(SubscriptionStatus::Unpaid),
                    canceled_at: Some(now),
                    ..Default::default()
                },
            )
            .await?;

        self.events
            .publish(BillingEvent::SubscriptionCanceled {
                subscription_id,
                account_id: updated.account_id,
                workspace_id: updated.workspace_id,
                suspended: true,
                reason: Some(format!("Suspended: {}", reason)),
                canceled_at: now,
            })
            .await;

        tracing::info!(
            operation = "suspend-subscription.complete",
            subscription_id = %subscription_id,
            account_id = %updated.account_id,
            reason,
            "Subscription suspended"
        );

        Ok(updated)
    }

    pub async fn check_grace_periods(&self) -> AppResult<GracePeriodSweep> {
        self.check_grace_periods_at(Utc::now()).await
    }

    /// Escalate every tracked record past the grace period or retry ceiling.
    /// Escalated records are removed whatever the suspension outcome.
    pub async fn check_grace_periods_at(&self, now: DateTime<Utc>) -> AppResult<GracePeriodSweep> {
        let records = self.records.list().await?;
        let mut sweep = GracePeriodSweep {
            checked: records.len(),
            ..Default::default()
        };

        for record in records {
            if !self.policy.should_suspend(&record, now) {
                continue;
            }
            let days = record.days_since_first_failure(now);
            tracing::info!(
                operation = "dunning.grace-expired",
                subscription_id = %record.subscription_id,
                days_since_first_failure = days,
                failure_count = record.failure_count,
                "Grace period expired, suspending subscription"
            );

            match self.escalate(&record, days).await {
                Ok(true) => sweep.suspended += 1,
                Ok(false) => sweep.skipped += 1,
                Err(e) => {
                    sweep.failed += 1;
                    tracing::error!(
                        operation = "dunning.suspend-failed",
                        subscription_id = %record.subscription_id,
                        error = %e,
                        "Failed to suspend subscription"
                    );
                }
            }

            if let Err(e) = self.records.clear(record.subscription_id).await {
                tracing::error!(
                    operation = "dunning.clear-failed",
                    subscription_id = %record.subscription_id,
                    error = %e,
                    "Failed to remove dunning record"
                );
            }
        }

        Ok(sweep)
    }

    async fn escalate(&self, record: &DunningRecord, days: i64) -> AppResult<bool> {
        let Some(subscription) = self.subscriptions.find_by_id(record.subscription_id).await? else {
            return Ok(false);
        };
        if subscription.status.is_terminal() {
            return Ok(false);
        }

        let reason = format!(
            "Grace period expired after {} days and {} failures",
            days, record.failure_count
        );
        self.suspend_subscription(record.subscription_id, &reason)
            .await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{
        InMemoryDunningRepo, InMemorySubscriptionRepo, RecordingEventPublisher, factories,
    };
    use chrono::Duration;

    struct Fixture {
        use_cases: DunningUseCases,
        records: Arc<InMemoryDunningRepo>,
        subscriptions: Arc<InMemorySubscriptionRepo>,
        events: Arc<RecordingEventPublisher>,
    }

    fn fixture() -> Fixture {
        let records = Arc::new(InMemoryDunningRepo::new());
        let subscriptions = Arc::new(InMemorySubscriptionRepo::new());
        let events = Arc::new(RecordingEventPublisher::new());
        let use_cases = DunningUseCases::new(
            records.clone(),
            subscriptions.clone(),
            events.clone(),
            DunningPolicy::default(),
        );
        Fixture {
            use_cases,
            records,
            subscriptions,
            events,
        }
    }

    fn seed_failure(f: &Fixture, subscription_id: Uuid, count: i32, days_ago: i64) {
        let first = Utc::now() - Duration::days(days_ago);
        f.records.insert(DunningRecord {
            subscription_id,
            failure_count: count,
            first_failure_at: first,
            last_failure_at: first,
            last_event_id: None,
        });
    }

    #[tokio::test]
    async fn test_first_failure_moves_active_to_past_due() {
        let f = fixture();
        let sub = f.subscriptions.insert(factories::subscription(|_| {}));

        let count = f.use_cases.record_failure(sub.id, "evt_1").await.unwrap();

        assert_eq!(count, 1);
        let stored = f.subscriptions.get(sub.id).unwrap();
        assert_eq!(stored.status, SubscriptionStatus::PastDue);
    }

    #[tokio::test]
    async fn test_repeated_failures_increment() {
        let f = fixture();
        let sub = f.subscriptions.insert(factories::subscription(|_| {}));

        f.use_cases.record_failure(sub.id, "evt_1").await.unwrap();
        f.use_cases.record_failure(sub.id, "evt_2").await.unwrap();
        let count = f.use_cases.record_failure(sub.id, "evt_3").await.unwrap();

        assert_eq!(count, 3);
        let record = f.use_cases.failure_record(sub.id).await.unwrap().unwrap();
        assert!(record.last_failure_at >= record.first_failure_at);
    }

    #[tokio::test]
    async fn test_redelivered_event_counts_once() {
        let f = fixture();
        let sub = f.subscriptions.insert(factories::subscription(|_| {}));

        f.use_cases.record_failure(sub.id, "evt_1").await.unwrap();
        let count = f.use_cases.record_failure(sub.id, "evt_1").await.unwrap();

        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_failed_status_update_leaves_counter_untouched() {
        let f = fixture();
        let sub = f.subscriptions.insert(factories::subscription(|_| {}));

        f.subscriptions.fail_updates(true);
        let err = f.use_cases.record_failure(sub.id, "evt_1").await.unwrap_err();
        assert!(matches!(err, AppError::Database(_)));
        assert!(f.use_cases.failure_record(sub.id).await.unwrap().is_none());

        f.subscriptions.fail_updates(false);
        let count = f.use_cases.record_failure(sub.id, "evt_1").await.unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_record_recovery_is_idempotent() {
        let f = fixture();
        let sub_id = Uuid::new_v4();
        seed_failure(&f, sub_id, 1, 0);

        f.use_cases.record_recovery(sub_id).await.unwrap();
        f.use_cases.record_recovery(sub_id).await.unwrap();

        assert!(f.use_cases.failure_record(sub_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_handle_payment_failed_publishes_count() {
        let f = fixture();
        let sub = f.subscriptions.insert(factories::subscription(|_| {}));

        f.use_cases
            .handle_payment_failed(sub.id, PaymentProvider::Stripe, "sub_abc", "evt_1")
            .await
            .unwrap();

        let events = f.events.events();
        assert!(matches!(
            events.as_slice(),
            [BillingEvent::PaymentFailed { failure_count: 1, .. }]
        ));
    }

    #[tokio::test]
    async fn test_grace_period_escalation_regardless_of_count() {
        let f = fixture();
        let sub = f.subscriptions.insert(factories::subscription(|s| {
            s.status = SubscriptionStatus::PastDue;
        }));
        seed_failure(&f, sub.id, 1, 8);

        let sweep = f.use_cases.check_grace_periods().await.unwrap();

        assert_eq!(sweep.suspended, 1);
        let stored = f.subscriptions.get(sub.id).unwrap();
        assert_eq!(stored.status, SubscriptionStatus::Unpaid);
        assert!(stored.canceled_at.is_some());
        assert!(f.records.is_empty());

        let events = f.events.events();
        assert!(matches!(
            events.as_slice(),
            [BillingEvent::SubscriptionCanceled { suspended: true, .. }]
        ));
    }

    #[tokio::test]
    async fn test_retry_ceiling_escalation_regardless_of_age() {
        let f = fixture();
        let sub = f.subscriptions.insert(factories::subscription(|s| {
            s.status = SubscriptionStatus::PastDue;
        }));
        seed_failure(&f, sub.id, 3, 1);

        let sweep = f.use_cases.check_grace_periods().await.unwrap();

        assert_eq!(sweep.suspended, 1);
        assert_eq!(
            f.subscriptions.get(sub.id).unwrap().status,
            SubscriptionStatus::Unpaid
        );
        assert!(f.records.is_empty());
    }

    #[tokio::test]
    async fn test_young_records_are_kept() {
        let f = fixture();
        let sub = f.subscriptions.insert(factories::subscription(|s| {
            s.status = SubscriptionStatus::PastDue;
        }));
        seed_failure(&f, sub.id, 2, 3);

        let sweep = f.use_cases.check_grace_periods().await.unwrap();

        assert_eq!(sweep, GracePeriodSweep { checked: 1, ..Default::default() });
        assert_eq!(
            f.subscriptions.get(sub.id).unwrap().status,
            SubscriptionStatus::PastDue
        );
        assert!(!f.records.is_empty());
    }

    #[tokio::test]
    async fn test_already_canceled_is_not_suspended_but_record_removed() {
        let f = fixture();
        let sub = f.subscriptions.insert(factories::subscription(|s| {
            s.status = SubscriptionStatus::Canceled;
        }));
        seed_failure(&f, sub.id, 5, 10);

        let sweep = f.use_cases.check_grace_periods().await.unwrap();

        assert_eq!(sweep.skipped, 1);
        assert_eq!(sweep.suspended, 0);
        assert_eq!(
            f.subscriptions.get(sub.id).unwrap().status,
            SubscriptionStatus::Canceled
        );
        assert!(f.records.is_empty());
        assert!(f.events.events().is_empty());
    }

    #[tokio::test]
    async fn test_record_removed_even_when_suspension_fails() {
        let f = fixture();
        let sub = f.subscriptions.insert(factories::subscription(|s| {
            s.status = SubscriptionStatus::PastDue;
        }));
        seed_failure(&f, sub.id, 3, 0);
        f.subscriptions.fail_updates(true);

        let sweep = f.use_cases.check_grace_periods().await.unwrap();

        assert_eq!(sweep.failed, 1);
        assert!(f.records.is_empty());
    }

    #[tokio::test]
    async fn test_suspend_rejects_terminal_subscription() {
        let f = fixture();
        let sub = f.subscriptions.insert(factories::subscription(|s| {
            s.status = SubscriptionStatus::Unpaid;
        }));

        let err = f
            .use_cases
            .suspend_subscription(sub.id, "manual")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert!(f.subscriptions.get(sub.id).unwrap().canceled_at.is_none());
        assert!(f.events.events().is_empty());
    }
}
