use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::{
        ports::{
            event_publisher::BillingEventPublisher,
            payment_gateway::{CheckoutParams, CheckoutResult, Metadata, PortalResult},
        },
        use_cases::{
            directory::{BillingAuthorizer, BillingDirectoryRepoTrait},
            dunning::DunningUseCases,
            gateway_factory::PaymentGatewayFactory,
            provider_mapping::ProviderMappingRepoTrait,
            subscription::{SubscriptionPatch, SubscriptionRepoTrait},
        },
    },
    domain::entities::{
        billing_event::BillingEvent,
        billing_scope::BillingScope,
        directory::{BillingAccount, BillingUser, BillingWorkspace},
        mapping_entity_type::MappingEntityType,
        payment_provider::PaymentProvider,
        provider_mapping::CreateMappingInput,
        subscription::{Subscription, SubscriptionStatus},
    },
};

/// Billing behavior taken from configuration.
#[derive(Debug, Clone)]
pub struct BillingSettings {
    pub scope: BillingScope,
    pub checkout_success_url: String,
    pub checkout_cancel_url: String,
    pub frontend_url: String,
}

impl BillingSettings {
    pub fn portal_return_url(&self) -> String {
        format!("{}/settings/billing", self.frontend_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub workspace_id: Uuid,
    pub plan_code: String,
    #[serde(default)]
    pub provider: Option<PaymentProvider>,
}

/// Portals are processor-hosted UI; only this provider offers one.
const PORTAL_PROVIDER: PaymentProvider = PaymentProvider::Stripe;

/// Checkout, portal and manual cancellation on behalf of a signed-in user.
#[derive(Clone)]
pub struct BillingUseCases {
    directory: Arc<dyn BillingDirectoryRepoTrait>,
    authorizer: Arc<dyn BillingAuthorizer>,
    mappings: Arc<dyn ProviderMappingRepoTrait>,
    subscriptions: Arc<dyn SubscriptionRepoTrait>,
    gateways: Arc<PaymentGatewayFactory>,
    dunning: DunningUseCases,
    events: Arc<dyn BillingEventPublisher>,
    settings: BillingSettings,
}

impl BillingUseCases {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        directory: Arc<dyn BillingDirectoryRepoTrait>,
        authorizer: Arc<dyn BillingAuthorizer>,
        mappings: Arc<dyn ProviderMappingRepoTrait>,
        subscriptions: Arc<dyn SubscriptionRepoTrait>,
        gateways: Arc<PaymentGatewayFactory>,
        dunning: DunningUseCases,
        events: Arc<dyn BillingEventPublisher>,
        settings: BillingSettings,
    ) -> Self {
        Self {
            directory,
            authorizer,
            mappings,
            subscriptions,
            gateways,
            dunning,
            events,
            settings,
        }
    }

    // ========================================================================
    // Shared lookups
    // ========================================================================

    async fn authorized_context(
        &self,
        user_id: Uuid,
        workspace_id: Uuid,
    ) -> AppResult<(BillingUser, BillingWorkspace)> {
        let user = self
            .directory
            .find_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("user".into()))?;
        let workspace = self
            .directory
            .find_workspace(workspace_id)
            .await?
            .ok_or_else(|| AppError::NotFound("workspace".into()))?;
        self.authorizer
            .require_manage_billing(&user, &workspace)
            .await?;
        Ok((user, workspace))
    }

    async fn account_of(&self, workspace: &BillingWorkspace) -> AppResult<BillingAccount> {
        self.directory
            .find_account(workspace.account_id)
            .await?
            .ok_or_else(|| AppError::NotFound("account".into()))
    }

    /// Entity owning the provider customer under the configured billing scope.
    fn billing_entity(
        &self,
        account: &BillingAccount,
        workspace: &BillingWorkspace,
    ) -> (MappingEntityType, Uuid) {
        match self.settings.scope {
            BillingScope::Account => (MappingEntityType::Account, account.id),
            BillingScope::Workspace => (MappingEntityType::Workspace, workspace.id),
        }
    }

    // ========================================================================
    // Checkout
    // ========================================================================

    pub async fn create_checkout_session(
        &self,
        user_id: Uuid,
        request: CheckoutRequest,
    ) -> AppResult<CheckoutResult> {
        let (user, workspace) = self.authorized_context(user_id, request.workspace_id).await?;

        let plan = self
            .directory
            .find_plan_by_code(&request.plan_code)
            .await?
            .filter(|p| p.is_active)
            .ok_or_else(|| {
                AppError::InvalidInput(format!("plan not found: {}", request.plan_code))
            })?;

        let current_plan = self.directory.workspace_plan_code(workspace.id).await?;
        if current_plan.as_deref() == Some(plan.code.as_str()) {
            return Err(AppError::Conflict(format!(
                "workspace already on plan {}",
                plan.code
            )));
        }

        let account = self.account_of(&workspace).await?;
        let provider = request.provider.unwrap_or_default();
        let gateway = self.gateways.create(provider)?;

        let (entity_type, entity_id) = self.billing_entity(&account, &workspace);
        let customer_id = match self
            .mappings
            .find_active_by_entity_and_provider(entity_type, entity_id, provider)
            .await?
        {
            Some(mapping) => mapping.provider_id,
            None => {
                let mut metadata = Metadata::new();
                metadata.insert("entityType".into(), entity_type.to_string());
                metadata.insert("entityId".into(), entity_id.to_string());
                metadata.insert("accountId".into(), account.id.to_string());
                let customer = gateway
                    .create_customer(
                        &user.email,
                        Some(user.name.as_deref().unwrap_or(&user.email)),
                        &metadata,
                    )
                    .await?;
                self.mappings
                    .create(CreateMappingInput::new(
                        entity_type,
                        entity_id,
                        provider,
                        customer.id.clone(),
                    ))
                    .await?;
                tracing::info!(
                    operation = "billing.checkout.customer-created",
                    provider = %provider,
                    entity_type = %entity_type,
                    entity_id = %entity_id,
                    "Created provider customer"
                );
                customer.id
            }
        };

        let price = self
            .directory
            .find_current_price(plan.id)
            .await?
            .ok_or_else(|| {
                AppError::InvalidInput(format!("plan {} has no active price", plan.code))
            })?;
        let price_mapping = self
            .mappings
            .find_active_by_entity_and_provider(MappingEntityType::PlanPrice, price.id, provider)
            .await?
            .ok_or_else(|| {
                AppError::InvalidInput(format!(
                    "plan {} is not linked to gateway {}; link it from the admin panel",
                    plan.code, provider
                ))
            })?;

        let mut metadata = Metadata::new();
        metadata.insert("planCode".into(), plan.code.clone());
        metadata.insert("accountId".into(), account.id.to_string());
        metadata.insert("billingEntityType".into(), entity_type.to_string());
        metadata.insert("billingEntityId".into(), entity_id.to_string());
        metadata.insert("priceId".into(), price_mapping.provider_id.clone());

        let session = gateway
            .create_checkout_session(&CheckoutParams {
                customer_id,
                price_id: price_mapping.provider_id,
                entity_id: workspace.id.to_string(),
                entity_type: MappingEntityType::Workspace,
                success_url: self.settings.checkout_success_url.clone(),
                cancel_url: self.settings.checkout_cancel_url.clone(),
                metadata,
            })
            .await?;

        tracing::info!(
            operation = "billing.checkout.created",
            provider = %provider,
            workspace_id = %workspace.id,
            plan_code = %plan.code,
            session_id = %session.session_id,
            "Checkout session created"
        );

        Ok(session)
    }

    // ========================================================================
    // Portal
    // ========================================================================

    pub async fn create_portal_session(
        &self,
        user_id: Uuid,
        workspace_id: Uuid,
    ) -> AppResult<PortalResult> {
        let (_, workspace) = self.authorized_context(user_id, workspace_id).await?;
        let account = self.account_of(&workspace).await?;
        let gateway = self.gateways.create(PORTAL_PROVIDER)?;

        let (entity_type, entity_id) = self.billing_entity(&account, &workspace);
        let customer = self
            .mappings
            .find_active_by_entity_and_provider(entity_type, entity_id, PORTAL_PROVIDER)
            .await?
            .ok_or_else(|| AppError::InvalidInput("no billing history for this workspace".into()))?;

        gateway
            .create_portal_session(&customer.provider_id, &self.settings.portal_return_url())
            .await
    }

    // ========================================================================
    // Manual cancellation
    // ========================================================================

    pub async fn cancel_subscription(
        &self,
        user_id: Uuid,
        workspace_id: Uuid,
    ) -> AppResult<Subscription> {
        let (user, workspace) = self.authorized_context(user_id, workspace_id).await?;

        let subscription = self
            .subscriptions
            .find_latest_by_workspace_id(workspace.id)
            .await?
            .ok_or_else(|| AppError::NotFound("subscription".into()))?;
        if !subscription.status.has_access() {
            return Err(AppError::Conflict(format!(
                "cannot cancel a {} subscription",
                subscription.status
            )));
        }

        let links = self
            .mappings
            .find_by_entity_type_and_id(MappingEntityType::Subscription, workspace.id)
            .await?;
        for link in links.iter().filter(|m| m.is_active) {
            let gateway = self.gateways.create(link.provider)?;
            gateway.cancel_subscription(&link.provider_id).await?;
        }

        let now = Utc::now();
        let updated = self
            .subscriptions
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
            .deactivate_by_entity(MappingEntityType::Subscription, workspace.id)
            .await?;
        self.dunning.record_recovery(subscription.id).await?;

        self.events
            .publish(BillingEvent::SubscriptionCanceled {
                subscription_id: subscription.id,
                account_id: subscription.account_id,
                workspace_id: subscription.workspace_id,
                suspended: false,
                reason: Some("manual".into()),
                canceled_at: now,
            })
            .await;

        tracing::info!(
            operation = "billing.subscription.canceled",
            subscription_id = %subscription.id,
            canceled_by = %user.id,
            "Subscription canceled manually"
        );

        Ok(updated)
    }
}
