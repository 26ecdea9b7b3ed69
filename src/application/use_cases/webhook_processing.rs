use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use strum::{AsRefStr, Display};
use uuid::Uuid;

use crate::{
    app_error::AppResult,
    application::{
        ports::{event_publisher::BillingEventPublisher, job_queue::PAYMENT_WEBHOOK_QUEUE},
        use_cases::{
            dunning::DunningUseCases,
            provider_mapping::ProviderMappingRepoTrait,
            subscription::{SubscriptionPatch, SubscriptionRepoTrait},
            webhook_normalizer::{EventPayloadReader, payload_reader},
        },
    },
    domain::entities::{
        billing_event::BillingEvent,
        mapping_entity_type::MappingEntityType,
        payment_provider::PaymentProvider,
        provider_mapping::CreateMappingInput,
        subscription::{CreateSubscriptionInput, Subscription, SubscriptionStatus},
        webhook_event::{
            CreateWebhookEventInput, WebhookEventRecord, WebhookEventType, WebhookJob,
            WebhookStatus,
        },
    },
};

// ============================================================================
// Repository Traits
// ============================================================================

#[async_trait]
pub trait WebhookEventRepoTrait: Send + Sync {
    /// Latest audit record for a provider event id (indexed lookup).
    async fn find_by_raw_event_id(
        &self,
        provider: PaymentProvider,
        raw_event_id: &str,
    ) -> AppResult<Option<WebhookEventRecord>>;

    /// Insert a PENDING record with one attempt.
    async fn create(&self, input: CreateWebhookEventInput) -> AppResult<WebhookEventRecord>;

    /// Put an existing PENDING/FAILED record back to PENDING and count the attempt.
    async fn mark_retrying(&self, id: Uuid) -> AppResult<WebhookEventRecord>;

    async fn mark_processed(&self, id: Uuid, skip_reason: Option<&str>) -> AppResult<()>;

    async fn mark_failed(&self, id: Uuid, error_message: &str) -> AppResult<()>;
}

// ============================================================================
// Outcomes
// ============================================================================

/// Why a job was accepted without a state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display)]
#[strum(serialize_all = "snake_case")]
pub enum SkipReason {
    MissingAccount,
    MissingWorkspace,
    MissingSubscriptionId,
    MissingObjectId,
    PlanPriceNotFound,
    MappingNotFound,
    SubscriptionNotFound,
    IllegalTransition,
    AlreadyTerminal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandlerOutcome {
    Applied,
    Skipped(SkipReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Already processed earlier; nothing was done
    Duplicate { existing_id: Uuid },
    Processed { record_id: Uuid },
    Skipped { record_id: Uuid, reason: SkipReason },
}

/// Key that serializes jobs touching the same provider subscription.
pub fn ordering_key(job: &WebhookJob) -> Option<String> {
    let reader = payload_reader(job.event.provider).ok()?;
    let data = &job.event.data;
    let id = match job.event.event_type {
        WebhookEventType::SubscriptionCreated
        | WebhookEventType::SubscriptionUpdated
        | WebhookEventType::SubscriptionCanceled => reader.object_id(data),
        WebhookEventType::CheckoutCompleted
        | WebhookEventType::PaymentSucceeded
        | WebhookEventType::PaymentFailed => reader.subscription_id(data),
    }?;
    Some(format!("{}:{}", job.event.provider.as_ref(), id))
}

// ============================================================================
// Use Cases
// ============================================================================

/// Applies queued webhook jobs to subscription state, exactly once per raw event.
#[derive(Clone)]
pub struct WebhookProcessingUseCases {
    webhook_events: Arc<dyn WebhookEventRepoTrait>,
    subscriptions: Arc<dyn SubscriptionRepoTrait>,
    mappings: Arc<dyn ProviderMappingRepoTrait>,
    dunning: DunningUseCases,
    events: Arc<dyn BillingEventPublisher>,
}

impl WebhookProcessingUseCases {
    pub fn new(
        webhook_events: Arc<dyn WebhookEventRepoTrait>,
        subscriptions: Arc<dyn SubscriptionRepoTrait>,
        mappings: Arc<dyn ProviderMappingRepoTrait>,
        dunning: DunningUseCases,
        events: Arc<dyn BillingEventPublisher>,
    ) -> Self {
        Self {
            webhook_events,
            subscriptions,
            mappings,
            dunning,
            events,
        }
    }

    /// Process one job.
    ///
    /// The audit record is written PENDING before any mutation and finalized
    /// PROCESSED or FAILED after. Errors are returned after the record is
    /// marked FAILED so the queue can retry.
    pub async fn process(&self, job: &WebhookJob) -> AppResult<ProcessOutcome> {
        let event = &job.event;
        tracing::info!(
            operation = "worker.payment-webhook.process",
            event_type = %event.event_type,
            provider = %event.provider,
            raw_event_id = %job.raw_event_id,
            idempotency_key = %event.idempotency_key,
            "Processing payment webhook job"
        );

        let existing = self
            .webhook_events
            .find_by_raw_event_id(event.provider, &job.raw_event_id)
            .await?;

        let record = match existing {
            Some(record) if record.status == WebhookStatus::Processed => {
                tracing::info!(
                    operation = "worker.payment-webhook.idempotent-skip",
                    idempotency_key = %event.idempotency_key,
                    existing_id = %record.id,
                    "Webhook event already processed, skipping"
                );
                return Ok(ProcessOutcome::Duplicate {
                    existing_id: record.id,
                });
            }
            Some(record) => self.webhook_events.mark_retrying(record.id).await?,
            None => {
                self.webhook_events
                    .create(CreateWebhookEventInput {
                        account_id: event.account_id.as_deref().and_then(|s| s.parse().ok()),
                        provider: event.provider,
                        webhook_type: job.raw_event_type.clone(),
                        event_name: event.event_type,
                        payload: event.data.clone(),
                        raw_event_id: job.raw_event_id.clone(),
                        idempotency_key: event.idempotency_key.clone(),
                        queue_name: PAYMENT_WEBHOOK_QUEUE.to_string(),
                    })
                    .await?
            }
        };

        match self.dispatch(job).await {
            Ok(HandlerOutcome::Applied) => {
                self.webhook_events.mark_processed(record.id, None).await?;
                tracing::info!(
                    operation = "worker.payment-webhook.process.success",
                    event_type = %event.event_type,
                    webhook_event_id = %record.id,
                    "Payment webhook processed successfully"
                );
                Ok(ProcessOutcome::Processed {
                    record_id: record.id,
                })
            }
            Ok(HandlerOutcome::Skipped(reason)) => {
                self.webhook_events
                    .mark_processed(record.id, Some(reason.as_ref()))
                    .await?;
                Ok(ProcessOutcome::Skipped {
                    record_id: record.id,
                    reason,
                })
            }
            Err(e) => {
                if let Err(mark_err) = self
                    .webhook_events
                    .mark_failed(record.id, &e.to_string())
                    .await
                {
                    tracing::error!(
                        webhook_event_id = %record.id,
                        error = %mark_err,
                        "Failed to mark webhook event as failed"
                    );
                }
                tracing::error!(
                    operation = "worker.payment-webhook.process.error",
                    event_type = %event.event_type,
                    webhook_event_id = %record.id,
                    error = %e,
                    "Failed to process payment webhook"
                );
                Err(e)
            }
        }
    }

    async fn dispatch(&self, job: &WebhookJob) -> AppResult<HandlerOutcome> {
        let reader = payload_reader(job.event.provider)?;
        match job.event.event_type {
            WebhookEventType::CheckoutCompleted => self.checkout_completed(job, reader).await,
            WebhookEventType::SubscriptionCreated => Ok(self.subscription_created(job, reader)),
            WebhookEventType::SubscriptionUpdated => self.subscription_updated(job, reader).await,
            WebhookEventType::SubscriptionCanceled => {
                self.subscription_canceled(job, reader).await
            }
            WebhookEventType::PaymentSucceeded => self.payment_succeeded(job, reader).await,
            WebhookEventType::PaymentFailed => self.payment_failed(job, reader).await,
        }
    }

    // ========================================================================
    // Handlers
    // ========================================================================

    async fn checkout_completed(
        &self,
        job: &WebhookJob,
        reader: &dyn EventPayloadReader,
    ) -> AppResult<HandlerOutcome> {
        let event = &job.event;
        let data = &event.data;
        let provider = event.provider;
        let provider_subscription_id = reader.subscription_id(data);

        let account_id = event.account_id.as_deref().and_then(|s| s.parse::<Uuid>().ok());
        let workspace_id = reader
            .entity_id(data)
            .or_else(|| event.entity_id.clone())
            .and_then(|s| s.parse::<Uuid>().ok());

        let Some(account_id) = account_id else {
            return Ok(self
                .unattributed(job, provider_subscription_id, SkipReason::MissingAccount)
                .await);
        };
        let Some(workspace_id) = workspace_id else {
            return Ok(self
                .unattributed(job, provider_subscription_id, SkipReason::MissingWorkspace)
                .await);
        };
        let Some(provider_subscription_id) = provider_subscription_id else {
            return Ok(self
                .unattributed(job, None, SkipReason::MissingSubscriptionId)
                .await);
        };

        let plan_price = match reader.price_id(data) {
            Some(price_id) => {
                self.mappings
                    .find_by_provider_id_of_type(provider, &price_id, MappingEntityType::PlanPrice)
                    .await?
            }
            None => None,
        };
        let Some(plan_price) = plan_price else {
            return Ok(self
                .unattributed(
                    job,
                    Some(provider_subscription_id),
                    SkipReason::PlanPriceNotFound,
                )
                .await);
        };

        // A retried checkout finds the row its earlier attempt inserted.
        let subscription_id =
            Subscription::id_for_provider_subscription(provider, &provider_subscription_id);
        let subscription = match self.subscriptions.find_by_id(subscription_id).await? {
            Some(existing) => existing,
            None => {
                self.subscriptions
                    .create(CreateSubscriptionInput {
                        id: subscription_id,
                        account_id,
                        workspace_id,
                        plan_price_id: plan_price.entity_id,
                        status: SubscriptionStatus::Active,
                        current_period_end: None,
                    })
                    .await?
            }
        };

        let mut subscription_mapping = CreateMappingInput::new(
            MappingEntityType::Subscription,
            workspace_id,
            provider,
            provider_subscription_id.clone(),
        );
        subscription_mapping.metadata = Some(serde_json::json!({
            "subscriptionId": subscription.id,
        }));
        self.mappings.replace_active(subscription_mapping).await?;

        if let Some(customer_id) = reader.customer_id(data) {
            self.ensure_customer_mapping(job, reader, &customer_id, account_id)
                .await?;
        }

        self.events
            .publish(BillingEvent::SubscriptionCreated {
                subscription_id: subscription.id,
                account_id,
                workspace_id,
                plan_price_id: subscription.plan_price_id,
                provider,
            })
            .await;

        tracing::info!(
            operation = "worker.payment-webhook.checkout.success",
            subscription_id = %subscription.id,
            workspace_id = %workspace_id,
            account_id = %account_id,
            plan_code = reader.plan_code(data).as_deref().unwrap_or(""),
            "Checkout completed processed"
        );

        Ok(HandlerOutcome::Applied)
    }

    /// Link the provider customer to its billing entity unless the customer is
    /// already known. The lookup goes by provider customer id so a second
    /// workspace checking out under account-level billing reuses the row.
    async fn ensure_customer_mapping(
        &self,
        job: &WebhookJob,
        reader: &dyn EventPayloadReader,
        customer_id: &str,
        account_id: Uuid,
    ) -> AppResult<()> {
        let provider = job.event.provider;
        if self
            .mappings
            .find_by_provider_and_provider_id(provider, customer_id)
            .await?
            .is_some()
        {
            return Ok(());
        }

        let (entity_type, entity_id) = reader
            .billing_entity(&job.event.data)
            .filter(|(entity_type, _)| entity_type.is_billing_entity())
            .and_then(|(entity_type, id)| id.parse::<Uuid>().ok().map(|id| (entity_type, id)))
            .unwrap_or((MappingEntityType::Account, account_id));

        if let Some(existing) = self
            .mappings
            .find_active_by_entity_and_provider(entity_type, entity_id, provider)
            .await?
        {
            tracing::warn!(
                operation = "worker.payment-webhook.checkout.customer-conflict",
                entity_type = %entity_type,
                entity_id = %entity_id,
                existing_customer_id = %existing.provider_id,
                customer_id,
                "Billing entity already linked to another customer"
            );
            return Ok(());
        }

        self.mappings
            .create(CreateMappingInput::new(
                entity_type,
                entity_id,
                provider,
                customer_id,
            ))
            .await?;
        Ok(())
    }

    /// Paid conversion we cannot attribute: not retried, surfaced to operators.
    async fn unattributed(
        &self,
        job: &WebhookJob,
        provider_subscription_id: Option<String>,
        reason: SkipReason,
    ) -> HandlerOutcome {
        tracing::error!(
            operation = "worker.payment-webhook.checkout.unattributed",
            alert = true,
            provider = %job.event.provider,
            raw_event_id = %job.raw_event_id,
            account_id = job.event.account_id.as_deref().unwrap_or(""),
            entity_id = job.event.entity_id.as_deref().unwrap_or(""),
            reason = %reason,
            "Checkout completed but could not be attributed"
        );
        self.events
            .publish(BillingEvent::CheckoutUnattributed {
                provider: job.event.provider,
                raw_event_id: job.raw_event_id.clone(),
                provider_subscription_id,
                reason: reason.to_string(),
            })
            .await;
        HandlerOutcome::Skipped(reason)
    }

    fn subscription_created(
        &self,
        job: &WebhookJob,
        reader: &dyn EventPayloadReader,
    ) -> HandlerOutcome {
        if job.event.account_id.is_none() {
            tracing::warn!(
                operation = "worker.payment-webhook.sub-created.no-account",
                raw_event_id = %job.raw_event_id,
                "Subscription created missing accountId"
            );
            return HandlerOutcome::Skipped(SkipReason::MissingAccount);
        }

        tracing::info!(
            operation = "worker.payment-webhook.sub-created",
            provider = %job.event.provider,
            provider_subscription_id = reader.object_id(&job.event.data).as_deref().unwrap_or(""),
            "Subscription created event processed"
        );
        HandlerOutcome::Applied
    }

    /// Reverse-lookup the internal subscription for a provider subscription id.
    async fn resolve_subscription(
        &self,
        job: &WebhookJob,
        provider_subscription_id: &str,
    ) -> AppResult<Result<Subscription, SkipReason>> {
        let Some(mapping) = self
            .mappings
            .find_by_provider_id_of_type(
                job.event.provider,
                provider_subscription_id,
                MappingEntityType::Subscription,
            )
            .await?
        else {
            tracing::warn!(
                operation = "worker.payment-webhook.no-mapping",
                event_type = %job.event.event_type,
                provider_subscription_id,
                "No mapping found for provider subscription"
            );
            return Ok(Err(SkipReason::MappingNotFound));
        };

        match self
            .subscriptions
            .find_latest_by_workspace_id(mapping.entity_id)
            .await?
        {
            Some(subscription) => Ok(Ok(subscription)),
            None => {
                tracing::warn!(
                    operation = "worker.payment-webhook.no-subscription",
                    workspace_id = %mapping.entity_id,
                    provider_subscription_id,
                    "Mapped workspace has no subscription"
                );
                Ok(Err(SkipReason::SubscriptionNotFound))
            }
        }
    }

    async fn subscription_updated(
        &self,
        job: &WebhookJob,
        reader: &dyn EventPayloadReader,
    ) -> AppResult<HandlerOutcome> {
        let data = &job.event.data;
        let Some(provider_subscription_id) = reader.object_id(data) else {
            return Ok(HandlerOutcome::Skipped(SkipReason::MissingObjectId));
        };
        let subscription = match self.resolve_subscription(job, &provider_subscription_id).await? {
            Ok(subscription) => subscription,
            Err(reason) => return Ok(HandlerOutcome::Skipped(reason)),
        };

        let requested_status = reader
            .status(data)
            .and_then(|s| SubscriptionStatus::from_provider_status(&s));
        let illegal = match requested_status {
            Some(next) if !subscription.status.can_transition_to(next) => {
                tracing::warn!(
                    operation = "worker.payment-webhook.sub-updated.illegal-transition",
                    subscription_id = %subscription.id,
                    from = %subscription.status,
                    to = %next,
                    "Ignoring illegal subscription status change"
                );
                true
            }
            _ => false,
        };

        // An illegal status still lets the period end through.
        let next_status = requested_status.filter(|_| !illegal);
        let patch = SubscriptionPatch {
            status: next_status,
            current_period_end: reader.current_period_end(data),
            canceled_at: None,
        };
        if !patch.is_empty() {
            self.subscriptions.update(&subscription, patch).await?;
        }
        if illegal {
            return Ok(HandlerOutcome::Skipped(SkipReason::IllegalTransition));
        }

        tracing::info!(
            operation = "worker.payment-webhook.sub-updated",
            subscription_id = %subscription.id,
            new_status = next_status.map(|s| s.to_string()).as_deref().unwrap_or("unchanged"),
            "Subscription updated"
        );
        Ok(HandlerOutcome::Applied)
    }

    async fn subscription_canceled(
        &self,
        job: &WebhookJob,
        reader: &dyn EventPayloadReader,
    ) -> AppResult<HandlerOutcome> {
        let Some(provider_subscription_id) = reader.object_id(&job.event.data) else {
            return Ok(HandlerOutcome::Skipped(SkipReason::MissingObjectId));
        };
        let subscription = match self.resolve_subscription(job, &provider_subscription_id).await? {
            Ok(subscription) => subscription,
            Err(reason) => return Ok(HandlerOutcome::Skipped(reason)),
        };

        if subscription.status.is_terminal() {
            self.mappings
                .deactivate_by_entity(MappingEntityType::Subscription, subscription.workspace_id)
                .await?;
            return Ok(HandlerOutcome::Skipped(SkipReason::AlreadyTerminal));
        }

        let now = Utc::now();
        self.subscriptions
            .update(
                &subscription,
                SubscriptionPatch {
                    status: Some(SubscriptionStatus::Canceled),
                    canceled_at: Some(now),
                    ..Default::default()
                },
            )
            .await?;
        self.mappings
            .deactivate_by_entity(MappingEntityType::Subscription, subscription.workspace_id)
            .await?;
        self.dunning.record_recovery(subscription.id).await?;

        self.events
            .publish(BillingEvent::SubscriptionCanceled {
                subscription_id: subscription.id,
                account_id: subscription.account_id,
                workspace_id: subscription.workspace_id,
                suspended: false,
                reason: None,
                canceled_at: now,
            })
            .await;

        tracing::info!(
            operation = "worker.payment-webhook.sub-canceled",
            subscription_id = %subscription.id,
            "Subscription canceled"
        );
        Ok(HandlerOutcome::Applied)
    }

    async fn payment_succeeded(
        &self,
        job: &WebhookJob,
        reader: &dyn EventPayloadReader,
    ) -> AppResult<HandlerOutcome> {
        let data = &job.event.data;
        let Some(provider_subscription_id) = reader.subscription_id(data) else {
            return Ok(HandlerOutcome::Skipped(SkipReason::MissingSubscriptionId));
        };
        let subscription = match self.resolve_subscription(job, &provider_subscription_id).await? {
            Ok(subscription) => subscription,
            Err(reason) => return Ok(HandlerOutcome::Skipped(reason)),
        };

        let recovering = subscription.status == SubscriptionStatus::PastDue;
        let patch = SubscriptionPatch {
            status: recovering.then_some(SubscriptionStatus::Active),
            current_period_end: reader.line_period_end(data),
            canceled_at: None,
        };
        if !patch.is_empty() {
            self.subscriptions.update(&subscription, patch).await?;
        }

        if recovering {
            self.dunning.record_recovery(subscription.id).await?;
            self.events
                .publish(BillingEvent::PaymentRecovered {
                    subscription_id: subscription.id,
                    account_id: subscription.account_id,
                    workspace_id: subscription.workspace_id,
                })
                .await;
        }

        tracing::info!(
            operation = "worker.payment-webhook.payment-succeeded",
            subscription_id = %subscription.id,
            recovered = recovering,
            "Payment succeeded processed"
        );
        Ok(HandlerOutcome::Applied)
    }

    async fn payment_failed(
        &self,
        job: &WebhookJob,
        reader: &dyn EventPayloadReader,
    ) -> AppResult<HandlerOutcome> {
        let Some(provider_subscription_id) = reader.subscription_id(&job.event.data) else {
            return Ok(HandlerOutcome::Skipped(SkipReason::MissingSubscriptionId));
        };
        let subscription = match self.resolve_subscription(job, &provider_subscription_id).await? {
            Ok(subscription) => subscription,
            Err(reason) => return Ok(HandlerOutcome::Skipped(reason)),
        };

        if subscription.status.is_terminal() {
            tracing::warn!(
                operation = "worker.payment-webhook.payment-failed.terminal",
                subscription_id = %subscription.id,
                status = %subscription.status,
                "Ignoring payment failure for ended subscription"
            );
            return Ok(HandlerOutcome::Skipped(SkipReason::AlreadyTerminal));
        }

        self.dunning
            .handle_payment_failed(
                subscription.id,
                job.event.provider,
                &provider_subscription_id,
                &job.raw_event_id,
            )
            .await?;

        tracing::info!(
            operation = "worker.payment-webhook.payment-failed",
            subscription_id = %subscription.id,
            "Payment failure handled"
        );
        Ok(HandlerOutcome::Applied)
    }
}
