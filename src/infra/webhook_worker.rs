//! Consumer for the `payment-webhook` queue.

use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::sync::{Mutex, OwnedMutexGuard, Semaphore, watch};

use crate::{
    app_error::{AppError, AppResult},
    application::{
        ports::job_queue::{JobQueue, PAYMENT_WEBHOOK_QUEUE, QueuedJob},
        use_cases::webhook_processing::{WebhookProcessingUseCases, ordering_key},
    },
    domain::entities::webhook_event::WebhookJob,
};

/// Per-key async locks. Entries are pruned once nobody holds them.
#[derive(Default)]
struct KeyedLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.entry(key.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }

    async fn prune(&self) {
        self.locks
            .lock()
            .await
            .retain(|_, lock| Arc::strong_count(lock) > 1);
    }
}

/// Wait for `duration` or shutdown. Returns true when shutdown was signalled.
pub(crate) async fn idle(shutdown: &mut watch::Receiver<bool>, duration: Duration) -> bool {
    if *shutdown.borrow() {
        return true;
    }
    tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
    }
}

/// Pulls webhook jobs and applies them.
///
/// Up to `concurrency` jobs run at once. Jobs for the same provider
/// subscription are serialized so their state changes apply in queue order:
/// the dispatcher takes the per-key lock before spawning, so a later job for a
/// busy key waits until the earlier one settles.
pub struct WebhookWorker {
    queue: Arc<dyn JobQueue>,
    processing: WebhookProcessingUseCases,
    concurrency: usize,
    poll_interval: Duration,
    locks: KeyedLocks,
}

impl WebhookWorker {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        processing: WebhookProcessingUseCases,
        concurrency: usize,
        poll_interval: Duration,
    ) -> Self {
        Self {
            queue,
            processing,
            concurrency: concurrency.max(1),
            poll_interval,
            locks: KeyedLocks::default(),
        }
    }

    /// Dequeue and handle a single job inline. Returns false when the queue was empty.
    pub async fn run_once(&self) -> AppResult<bool> {
        match self.queue.dequeue(PAYMENT_WEBHOOK_QUEUE).await? {
            Some(job) => {
                self.handle(job).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Run until `shutdown` flips to true, then wait for in-flight jobs.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            queue = PAYMENT_WEBHOOK_QUEUE,
            concurrency = self.concurrency,
            "Webhook worker started"
        );
        let permits = Arc::new(Semaphore::new(self.concurrency));

        loop {
            if *shutdown.borrow() {
                break;
            }
            let permit = match permits.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };

            match self.queue.dequeue(PAYMENT_WEBHOOK_QUEUE).await {
                Ok(Some(job)) => {
                    let webhook_job = match self.decode(&job).await {
                        Ok(Some(webhook_job)) => webhook_job,
                        Ok(None) => continue,
                        Err(e) => {
                            tracing::error!(
                                queue = PAYMENT_WEBHOOK_QUEUE,
                                error = %e,
                                "Failed to settle webhook job"
                            );
                            continue;
                        }
                    };
                    let guard = self.lock_for(&webhook_job).await;
                    let worker = self.clone();
                    tokio::spawn(async move {
                        if let Err(e) = worker.apply(&job, &webhook_job, guard).await {
                            tracing::error!(
                                queue = PAYMENT_WEBHOOK_QUEUE,
                                error = %e,
                                "Failed to settle webhook job"
                            );
                        }
                        drop(permit);
                    });
                }
                Ok(None) => {
                    drop(permit);
                    if idle(&mut shutdown, self.poll_interval).await {
                        break;
                    }
                }
                Err(e) => {
                    drop(permit);
                    tracing::error!(queue = PAYMENT_WEBHOOK_QUEUE, error = %e, "Dequeue failed");
                    if idle(&mut shutdown, self.poll_interval).await {
                        break;
                    }
                }
            }
        }

        let _ = permits.acquire_many(self.concurrency as u32).await;
        tracing::info!(queue = PAYMENT_WEBHOOK_QUEUE, "Webhook worker stopped");
    }

    /// Process one dequeued job and settle it with the queue.
    pub async fn handle(&self, job: QueuedJob) -> AppResult<()> {
        let Some(webhook_job) = self.decode(&job).await? else {
            return Ok(());
        };
        let guard = self.lock_for(&webhook_job).await;
        self.apply(&job, &webhook_job, guard).await
    }

    /// Parse the payload, dead-lettering it when malformed.
    async fn decode(&self, job: &QueuedJob) -> AppResult<Option<WebhookJob>> {
        match serde_json::from_value(job.payload.clone()) {
            Ok(webhook_job) => Ok(Some(webhook_job)),
            Err(e) => {
                tracing::error!(
                    operation = "worker.payment-webhook.malformed",
                    job_id = %job.id,
                    error = %e,
                    "Malformed webhook job"
                );
                self.queue
                    .fail(job, &format!("malformed job payload: {}", e), false)
                    .await?;
                Ok(None)
            }
        }
    }

    async fn lock_for(&self, webhook_job: &WebhookJob) -> Option<OwnedMutexGuard<()>> {
        match ordering_key(webhook_job) {
            Some(key) => Some(self.locks.acquire(&key).await),
            None => None,
        }
    }

    async fn apply(
        &self,
        job: &QueuedJob,
        webhook_job: &WebhookJob,
        guard: Option<OwnedMutexGuard<()>>,
    ) -> AppResult<()> {
        let keyed = guard.is_some();
        let result = self.processing.process(webhook_job).await;
        drop(guard);
        if keyed {
            self.locks.prune().await;
        }

        match result {
            Ok(outcome) => {
                tracing::debug!(job_id = %job.id, ?outcome, "Webhook job settled");
                self.queue.complete(job).await
            }
            Err(e) => self.settle_failure(job, &e).await,
        }
    }

    async fn settle_failure(&self, job: &QueuedJob, error: &AppError) -> AppResult<()> {
        let disposition = self
            .queue
            .fail(job, &error.to_string(), error.is_retryable())
            .await?;
        tracing::warn!(
            operation = "worker.payment-webhook.failed",
            job_id = %job.id,
            attempts = job.attempts,
            ?disposition,
            error = %error,
            "Webhook job failed"
        );
        Ok(())
    }
}
