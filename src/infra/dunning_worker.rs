//! Periodic grace-period sweep on the `payment-dunning` queue.
//!
//! The scheduler only enqueues; the consumer runs the sweep. Every worker
//! process schedules on its own tick and sweeps are idempotent.

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use serde_json::json;
use tokio::{sync::watch, time::MissedTickBehavior};

use super::webhook_worker::idle;
use crate::{
    app_error::{AppError, AppResult},
    application::{
        ports::job_queue::{DunningJob, JobQueue, PAYMENT_DUNNING_QUEUE, QueuedJob},
        use_cases::dunning::DunningUseCases,
    },
};

/// Enqueue one grace-period check.
pub async fn schedule_grace_period_check(queue: &dyn JobQueue) -> AppResult<String> {
    let job = DunningJob::GracePeriodCheck {
        metadata: json!({ "scheduledAt": Utc::now().to_rfc3339() }),
    };
    let payload = serde_json::to_value(&job)
        .map_err(|e| AppError::Internal(format!("failed to serialize dunning job: {}", e)))?;
    queue.enqueue(PAYMENT_DUNNING_QUEUE, payload).await
}

/// Enqueue a check every `interval`, starting immediately, until shutdown.
pub async fn run_scheduler(
    queue: Arc<dyn JobQueue>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tracing::info!(
        queue = PAYMENT_DUNNING_QUEUE,
        interval_secs = interval.as_secs(),
        "Dunning scheduler started"
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match schedule_grace_period_check(queue.as_ref()).await {
                    Ok(job_id) => tracing::debug!(job_id = %job_id, "Grace period check scheduled"),
                    Err(e) => tracing::error!(error = %e, "Failed to schedule grace period check"),
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    tracing::info!(queue = PAYMENT_DUNNING_QUEUE, "Dunning scheduler stopped");
}

pub struct DunningWorker {
    queue: Arc<dyn JobQueue>,
    dunning: DunningUseCases,
    poll_interval: Duration,
}

impl DunningWorker {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        dunning: DunningUseCases,
        poll_interval: Duration,
    ) -> Self {
        Self {
            queue,
            dunning,
            poll_interval,
        }
    }

    pub async fn run_once(&self) -> AppResult<bool> {
        match self.queue.dequeue(PAYMENT_DUNNING_QUEUE).await? {
            Some(job) => {
                self.handle(job).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Jobs run one at a time.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(queue = PAYMENT_DUNNING_QUEUE, "Dunning worker started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            match self.run_once().await {
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(
                        queue = PAYMENT_DUNNING_QUEUE,
                        error = %e,
                        "Dunning job failed to settle"
                    )
                }
            }
            if idle(&mut shutdown, self.poll_interval).await {
                break;
            }
        }
        tracing::info!(queue = PAYMENT_DUNNING_QUEUE, "Dunning worker stopped");
    }

    pub async fn handle(&self, job: QueuedJob) -> AppResult<()> {
        let dunning_job: DunningJob = match serde_json::from_value(job.payload.clone()) {
            Ok(dunning_job) => dunning_job,
            Err(e) => {
                tracing::error!(job_id = %job.id, error = %e, "Unknown dunning job");
                self.queue
                    .fail(&job, &format!("unknown dunning job: {}", e), false)
                    .await?;
                return Ok(());
            }
        };

        match dunning_job {
            DunningJob::GracePeriodCheck { .. } => {
                match self.dunning.check_grace_periods().await {
                    Ok(sweep) => {
                        tracing::info!(
                            operation = "worker.payment-dunning.grace-period-check",
                            checked = sweep.checked,
                            suspended = sweep.suspended,
                            skipped = sweep.skipped,
                            failed = sweep.failed,
                            "Grace period check complete"
                        );
                        self.queue.complete(&job).await
                    }
                    Err(e) => {
                        let disposition = self
                            .queue
                            .fail(&job, &e.to_string(), e.is_retryable())
                            .await?;
                        tracing::error!(
                            operation = "worker.payment-dunning.grace-period-check",
                            job_id = %job.id,
                            ?disposition,
                            error = %e,
                            "Grace period check failed"
                        );
                        Ok(())
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::entities::{dunning::DunningRecord, subscription::SubscriptionStatus},
        test_utils::{InMemoryJobQueue, TestAppStateBuilder, factories},
    };
    use chrono::Duration as ChronoDuration;

    #[tokio::test]
    async fn scheduled_check_has_wire_type() {
        let queue = InMemoryJobQueue::new();
        schedule_grace_period_check(&queue).await.unwrap();

        let payloads = queue.payloads(PAYMENT_DUNNING_QUEUE);
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0]["type"], "GRACE_PERIOD_CHECK");
        assert!(payloads[0]["metadata"]["scheduledAt"].is_string());
    }

    #[tokio::test]
    async fn grace_period_check_suspends_expired_subscriptions() {
        let builder = TestAppStateBuilder::new();
        let queue = Arc::new(InMemoryJobQueue::new());
        let sub = builder
            .subscriptions
            .insert(factories::subscription(|s| s.status = SubscriptionStatus::PastDue));
        let first_failure = Utc::now() - ChronoDuration::days(10);
        builder.dunning.insert(DunningRecord {
            subscription_id: sub.id,
            failure_count: 1,
            first_failure_at: first_failure,
            last_failure_at: first_failure,
            last_event_id: None,
        });

        let worker = DunningWorker::new(
            queue.clone(),
            builder.dunning_use_cases(),
            Duration::from_millis(10),
        );
        schedule_grace_period_check(queue.as_ref()).await.unwrap();
        assert!(worker.run_once().await.unwrap());

        assert_eq!(builder.subscriptions.get(sub.id).unwrap().status, SubscriptionStatus::Unpaid);
        assert!(builder.dunning.is_empty());
        assert_eq!(queue.in_flight(PAYMENT_DUNNING_QUEUE), 0);
    }

    #[tokio::test]
    async fn unknown_job_type_is_dead_lettered() {
        let builder = TestAppStateBuilder::new();
        let queue = Arc::new(InMemoryJobQueue::new());
        queue
            .enqueue(PAYMENT_DUNNING_QUEUE, json!({ "type": "SEND_REMINDER" }))
            .await
            .unwrap();
        let worker = DunningWorker::new(
            queue.clone(),
            builder.dunning_use_cases(),
            Duration::from_millis(10),
        );

        worker.run_once().await.unwrap();
        assert_eq!(queue.dead_lettered(PAYMENT_DUNNING_QUEUE).len(), 1);
    }

    #[tokio::test]
    async fn scheduler_enqueues_on_first_tick() {
        let queue = Arc::new(InMemoryJobQueue::new());
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(run_scheduler(queue.clone(), Duration::from_secs(3600), rx));
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(queue.len(PAYMENT_DUNNING_QUEUE), 1);
    }
}
