//! Durable job queue on Redis.
//!
//! Per queue `q`:
//! - `queue:{q}:ready`    list, LPUSH to enqueue, consumed from the right
//! - `queue:{q}:inflight` list of jobs handed out and not yet completed
//! - `queue:{q}:delayed`  sorted set of retries scored by ready-at (unix ms)
//! - `queue:{q}:dead`     list of jobs that exhausted their attempts
//!
//! Every element is a JSON `JobEnvelope`. The in-flight element doubles as the
//! job's receipt, so completing or failing removes exactly that copy.

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use redis::{Script, aio::ConnectionManager};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::time::Duration;
use uuid::Uuid;

use super::error::InfraError;
use crate::{
    app_error::{AppError, AppResult},
    application::ports::job_queue::{FailureDisposition, JobQueue, QueuedJob},
};

/// Retry delays never exceed this.
const MAX_BACKOFF: Duration = Duration::from_secs(3600);

/// Move due retries to the ready list, then hand out the oldest ready job.
const DEQUEUE_SCRIPT: &str = r#"
local due = redis.call('ZRANGEBYSCORE', KEYS[3], '-inf', ARGV[1], 'LIMIT', 0, 100)
for _, job in ipairs(due) do
    redis.call('ZREM', KEYS[3], job)
    redis.call('LPUSH', KEYS[1], job)
end
return redis.call('RPOPLPUSH', KEYS[1], KEYS[2])
"#;

/// Put every in-flight job back on the ready list. Returns how many moved.
const REQUEUE_IN_FLIGHT_SCRIPT: &str = r#"
local moved = 0
while redis.call('RPOPLPUSH', KEYS[1], KEYS[2]) do
    moved = moved + 1
end
return moved
"#;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobEnvelope {
    id: String,
    /// Attempts already made before this copy was queued
    attempts: u32,
    payload: JsonValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_error: Option<String>,
}

fn key(queue: &str, part: &str) -> String {
    format!("queue:{}:{}", queue, part)
}

fn queue_err(e: redis::RedisError) -> AppError {
    AppError::Queue(e.to_string())
}

/// Exponential delay before retry number `attempts` (1-based), capped.
pub fn backoff_delay(base: Duration, attempts: u32) -> Duration {
    let exponent = attempts.saturating_sub(1).min(16);
    base.saturating_mul(1u32 << exponent).min(MAX_BACKOFF)
}

#[derive(Clone)]
pub struct RedisJobQueue {
    manager: ConnectionManager,
    max_attempts: u32,
    backoff_base: Duration,
    dequeue_script: Script,
    requeue_script: Script,
}

impl RedisJobQueue {
    pub async fn new(
        redis_url: &str,
        max_attempts: u32,
        backoff_base: Duration,
    ) -> Result<Self, InfraError> {
        let client = redis::Client::open(redis_url).map_err(InfraError::RedisConnection)?;
        let manager = ConnectionManager::new(client)
            .await
            .map_err(InfraError::RedisConnection)?;
        Ok(Self {
            manager,
            max_attempts: max_attempts.max(1),
            backoff_base,
            dequeue_script: Script::new(DEQUEUE_SCRIPT),
            requeue_script: Script::new(REQUEUE_IN_FLIGHT_SCRIPT),
        })
    }

    /// Return jobs left in flight by a crashed worker to the ready list.
    /// Call once per queue before the consumer loop starts.
    pub async fn requeue_in_flight(&self, queue: &str) -> AppResult<u64> {
        let mut conn = self.manager.clone();
        let moved: u64 = self
            .requeue_script
            .key(key(queue, "inflight"))
            .key(key(queue, "ready"))
            .invoke_async(&mut conn)
            .await
            .map_err(queue_err)?;

        if moved > 0 {
            tracing::warn!(queue, moved, "Requeued in-flight jobs from a previous run");
        }
        Ok(moved)
    }

    fn retry_delay(&self, attempts: u32) -> Duration {
        let delay = backoff_delay(self.backoff_base, attempts);
        let jitter_ms = (delay.as_millis() as u64 / 10).max(1);
        delay + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
    }
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn enqueue(&self, queue: &str, payload: JsonValue) -> AppResult<String> {
        let envelope = JobEnvelope {
            id: Uuid::new_v4().to_string(),
            attempts: 0,
            payload,
            last_error: None,
        };
        let raw = serde_json::to_string(&envelope)
            .map_err(|e| AppError::Internal(format!("failed to serialize job: {}", e)))?;

        let mut conn = self.manager.clone();
        redis::cmd("LPUSH")
            .arg(key(queue, "ready"))
            .arg(raw)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(queue_err)?;

        Ok(envelope.id)
    }

    async fn dequeue(&self, queue: &str) -> AppResult<Option<QueuedJob>> {
        let mut conn = self.manager.clone();
        let raw: Option<String> = self
            .dequeue_script
            .key(key(queue, "ready"))
            .key(key(queue, "inflight"))
            .key(key(queue, "delayed"))
            .arg(Utc::now().timestamp_millis())
            .invoke_async(&mut conn)
            .await
            .map_err(queue_err)?;

        let Some(raw) = raw else {
            return Ok(None);
        };

        match serde_json::from_str::<JobEnvelope>(&raw) {
            Ok(envelope) => Ok(Some(QueuedJob {
                id: envelope.id,
                queue: queue.to_string(),
                attempts: envelope.attempts + 1,
                payload: envelope.payload,
                receipt: raw,
            })),
            Err(e) => {
                // Unreadable element: park it so it cannot block the queue.
                tracing::error!(queue, error = %e, "Dropping malformed job to dead-letter list");
                redis::pipe()
                    .atomic()
                    .cmd("LREM")
                    .arg(key(queue, "inflight"))
                    .arg(1)
                    .arg(&raw)
                    .ignore()
                    .cmd("LPUSH")
                    .arg(key(queue, "dead"))
                    .arg(&raw)
                    .ignore()
                    .query_async::<_, ()>(&mut conn)
                    .await
                    .map_err(queue_err)?;
                Ok(None)
            }
        }
    }

    async fn complete(&self, job: &QueuedJob) -> AppResult<()> {
        let mut conn = self.manager.clone();
        redis::cmd("LREM")
            .arg(key(&job.queue, "inflight"))
            .arg(1)
            .arg(&job.receipt)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(queue_err)
    }

    async fn fail(
        &self,
        job: &QueuedJob,
        error: &str,
        retryable: bool,
    ) -> AppResult<FailureDisposition> {
        let envelope = JobEnvelope {
            id: job.id.clone(),
            attempts: job.attempts,
            payload: job.payload.clone(),
            last_error: Some(error.to_string()),
        };
        let raw = serde_json::to_string(&envelope)
            .map_err(|e| AppError::Internal(format!("failed to serialize job: {}", e)))?;

        let disposition = if retryable && job.attempts < self.max_attempts {
            FailureDisposition::Retrying
        } else {
            FailureDisposition::DeadLettered
        };

        let mut pipe = redis::pipe();
        pipe.atomic()
            .cmd("LREM")
            .arg(key(&job.queue, "inflight"))
            .arg(1)
            .arg(&job.receipt)
            .ignore();
        match disposition {
            FailureDisposition::Retrying => {
                let ready_at = Utc::now().timestamp_millis()
                    + self.retry_delay(job.attempts).as_millis() as i64;
                pipe.cmd("ZADD")
                    .arg(key(&job.queue, "delayed"))
                    .arg(ready_at)
                    .arg(&raw)
                    .ignore();
            }
            FailureDisposition::DeadLettered => {
                pipe.cmd("LPUSH")
                    .arg(key(&job.queue, "dead"))
                    .arg(&raw)
                    .ignore();
            }
        }

        let mut conn = self.manager.clone();
        pipe.query_async::<_, ()>(&mut conn)
            .await
            .map_err(queue_err)?;

        Ok(disposition)
    }
}
