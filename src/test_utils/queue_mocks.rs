//! In-memory job queue and event publisher.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::{
        event_publisher::BillingEventPublisher,
        job_queue::{FailureDisposition, JobQueue, QueuedJob},
    },
    domain::entities::billing_event::BillingEvent,
};

// ============================================================================
// InMemoryJobQueue
// ============================================================================

#[derive(Default)]
struct QueueState {
    ready: VecDeque<QueuedJob>,
    in_flight: Vec<QueuedJob>,
    dead: Vec<QueuedJob>,
}

/// Failed retryable jobs go straight back to the ready list (no backoff).
pub struct InMemoryJobQueue {
    queues: Mutex<HashMap<String, QueueState>>,
    max_attempts: u32,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self::with_max_attempts(5)
    }

    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            max_attempts,
        }
    }

    /// Jobs waiting to be dequeued
    pub fn len(&self, queue: &str) -> usize {
        self.queues
            .lock()
            .unwrap()
            .get(queue)
            .map(|q| q.ready.len())
            .unwrap_or(0)
    }

    pub fn payloads(&self, queue: &str) -> Vec<JsonValue> {
        self.queues
            .lock()
            .unwrap()
            .get(queue)
            .map(|q| q.ready.iter().map(|j| j.payload.clone()).collect())
            .unwrap_or_default()
    }

    pub fn in_flight(&self, queue: &str) -> usize {
        self.queues
            .lock()
            .unwrap()
            .get(queue)
            .map(|q| q.in_flight.len())
            .unwrap_or(0)
    }

    pub fn dead_lettered(&self, queue: &str) -> Vec<JsonValue> {
        self.queues
            .lock()
            .unwrap()
            .get(queue)
            .map(|q| q.dead.iter().map(|j| j.payload.clone()).collect())
            .unwrap_or_default()
    }
}

impl Default for InMemoryJobQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, queue: &str, payload: JsonValue) -> AppResult<String> {
        let id = Uuid::new_v4().to_string();
        self.queues
            .lock()
            .unwrap()
            .entry(queue.to_string())
            .or_default()
            .ready
            .push_back(QueuedJob {
                id: id.clone(),
                queue: queue.to_string(),
                attempts: 0,
                payload,
                receipt: String::new(),
            });
        Ok(id)
    }

    async fn dequeue(&self, queue: &str) -> AppResult<Option<QueuedJob>> {
        let mut queues = self.queues.lock().unwrap();
        let Some(state) = queues.get_mut(queue) else {
            return Ok(None);
        };
        let Some(mut job) = state.ready.pop_front() else {
            return Ok(None);
        };
        job.attempts += 1;
        job.receipt = Uuid::new_v4().to_string();
        state.in_flight.push(job.clone());
        Ok(Some(job))
    }

    async fn complete(&self, job: &QueuedJob) -> AppResult<()> {
        let mut queues = self.queues.lock().unwrap();
        let state = queues
            .get_mut(&job.queue)
            .ok_or_else(|| AppError::Queue(format!("unknown queue {}", job.queue)))?;
        state.in_flight.retain(|j| j.receipt != job.receipt);
        Ok(())
    }

    async fn fail(
        &self,
        job: &QueuedJob,
        _error: &str,
        retryable: bool,
    ) -> AppResult<FailureDisposition> {
        let mut queues = self.queues.lock().unwrap();
        let state = queues
            .get_mut(&job.queue)
            .ok_or_else(|| AppError::Queue(format!("unknown queue {}", job.queue)))?;
        state.in_flight.retain(|j| j.receipt != job.receipt);
        if retryable && job.attempts < self.max_attempts {
            state.ready.push_back(job.clone());
            Ok(FailureDisposition::Retrying)
        } else {
            state.dead.push(job.clone());
            Ok(FailureDisposition::DeadLettered)
        }
    }
}

// ============================================================================
// RecordingEventPublisher
// ============================================================================

#[derive(Default)]
pub struct RecordingEventPublisher {
    events: Mutex<Vec<BillingEvent>>,
}

impl RecordingEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<BillingEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl BillingEventPublisher for RecordingEventPublisher {
    async fn publish(&self, event: BillingEvent) {
        self.events.lock().unwrap().push(event);
    }
}
