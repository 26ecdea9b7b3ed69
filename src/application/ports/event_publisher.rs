use async_trait::async_trait;

use crate::domain::entities::billing_event::BillingEvent;

/// Sink for billing domain events.
///
/// Publishing never fails the caller: implementations log and swallow their
/// own delivery errors so billing state changes are never rolled back by a
/// notification problem.
#[async_trait]
pub trait BillingEventPublisher: Send + Sync {
    async fn publish(&self, event: BillingEvent);
}
