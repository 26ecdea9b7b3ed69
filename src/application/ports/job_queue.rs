use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::app_error::AppResult;

pub const PAYMENT_WEBHOOK_QUEUE: &str = "payment-webhook";
pub const PAYMENT_DUNNING_QUEUE: &str = "payment-dunning";
pub const EMAIL_QUEUE: &str = "email";

/// A job handed out by `dequeue`; must be passed back to `complete` or `fail`.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedJob {
    pub id: String,
    pub queue: String,
    /// Delivery attempts so far, including this one
    pub attempts: u32,
    pub payload: JsonValue,
    /// Transport-specific handle identifying the in-flight copy
    pub receipt: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDisposition {
    /// Scheduled for another attempt after a backoff
    Retrying,
    /// Moved to the dead-letter list
    DeadLettered,
}

/// Durable at-least-once job queue.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, queue: &str, payload: JsonValue) -> AppResult<String>;

    /// Next ready job, if any. The job stays in flight until completed or failed.
    async fn dequeue(&self, queue: &str) -> AppResult<Option<QueuedJob>>;

    async fn complete(&self, job: &QueuedJob) -> AppResult<()>;

    /// Record a failed attempt. `retryable = false` dead-letters immediately.
    async fn fail(
        &self,
        job: &QueuedJob,
        error: &str,
        retryable: bool,
    ) -> AppResult<FailureDisposition>;
}

/// Jobs carried on the `payment-dunning` queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DunningJob {
    GracePeriodCheck {
        #[serde(default)]
        metadata: JsonValue,
    },
}

/// Jobs carried on the `email` queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailJob {
    pub template: String,
    pub account_id: Option<String>,
    pub data: JsonValue,
}
