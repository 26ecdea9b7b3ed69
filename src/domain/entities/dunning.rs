use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Consecutive payment failures tracked for one subscription.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DunningRecord {
    pub subscription_id: Uuid,
    pub failure_count: i32,
    pub first_failure_at: DateTime<Utc>,
    pub last_failure_at: DateTime<Utc>,
    /// Provider event that produced the latest increment
    pub last_event_id: Option<String>,
}

impl DunningRecord {
    /// Whole days elapsed since the first recorded failure
    pub fn days_since_first_failure(&self, now: DateTime<Utc>) -> i64 {
        (now - self.first_failure_at).num_days()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DunningPolicy {
    pub grace_period_days: i64,
    pub max_retries: i32,
}

impl Default for DunningPolicy {
    fn default() -> Self {
        Self {
            grace_period_days: 7,
            max_retries: 3,
        }
    }
}

impl DunningPolicy {
    /// Escalate when the grace period is over or the retry ceiling is hit,
    /// whichever comes first.
    pub fn should_suspend(&self, record: &DunningRecord, now: DateTime<Utc>) -> bool {
        record.days_since_first_failure(now) >= self.grace_period_days
            || record.failure_count >= self.max_retries
    }
}
