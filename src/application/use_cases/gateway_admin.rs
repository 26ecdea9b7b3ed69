use serde::{Deserialize, Serialize};
use std::{collections::HashSet, sync::Arc};
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::{
        ports::{
            event_publisher::BillingEventPublisher,
            payment_gateway::{GatewayHealthResult, GatewayPrice, GatewayProduct},
        },
        use_cases::{
            directory::BillingDirectoryRepoTrait, gateway_factory::PaymentGatewayFactory,
            provider_mapping::ProviderMappingRepoTrait,
        },
    },
    domain::entities::{
        billing_event::BillingEvent, mapping_entity_type::MappingEntityType,
        payment_provider::PaymentProvider, provider_mapping::CreateMappingInput,
    },
};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewaySummary {
    pub provider: PaymentProvider,
    pub name: &'static str,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceLink {
    pub plan_price_id: Uuid,
    pub provider_price_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkGatewayPlanInput {
    pub provider: PaymentProvider,
    pub provider_product_id: String,
    #[serde(default)]
    pub prices: Vec<PriceLink>,
}

/// Operator-facing gateway introspection and plan linking.
#[derive(Clone)]
pub struct GatewayAdminUseCases {
    gateways: Arc<PaymentGatewayFactory>,
    directory: Arc<dyn BillingDirectoryRepoTrait>,
    mappings: Arc<dyn ProviderMappingRepoTrait>,
    events: Arc<dyn BillingEventPublisher>,
}

impl GatewayAdminUseCases {
    pub fn new(
        gateways: Arc<PaymentGatewayFactory>,
        directory: Arc<dyn BillingDirectoryRepoTrait>,
        mappings: Arc<dyn ProviderMappingRepoTrait>,
        events: Arc<dyn BillingEventPublisher>,
    ) -> Self {
        Self {
            gateways,
            directory,
            mappings,
            events,
        }
    }

    pub fn list_gateways(&self) -> Vec<GatewaySummary> {
        self.gateways
            .available_providers()
            .into_iter()
            .map(|provider| GatewaySummary {
                provider,
                name: provider.display_name(),
            })
            .collect()
    }

    pub async fn list_products(&self, provider: PaymentProvider) -> AppResult<Vec<GatewayProduct>> {
        self.gateways.create(provider)?.list_products().await
    }

    pub async fn list_prices(
        &self,
        provider: PaymentProvider,
        product_id: &str,
    ) -> AppResult<Vec<GatewayPrice>> {
        self.gateways.create(provider)?.list_prices(product_id).await
    }

    pub async fn health_check(&self, provider: PaymentProvider) -> AppResult<GatewayHealthResult> {
        Ok(self.gateways.create(provider)?.health_check().await)
    }

    /// Point a plan and its prices at a provider product and provider prices.
    ///
    /// Everything is validated before the first mapping is written. Each
    /// mapping replaces the previously active one for its entity.
    ///
    /// # Errors
    /// - `NotFound` if the plan, the product or a provider price does not exist
    /// - `InvalidInput` if a plan price does not belong to the plan
    pub async fn link_gateway_plan(
        &self,
        plan_id: Uuid,
        input: LinkGatewayPlanInput,
        linked_by: Option<Uuid>,
    ) -> AppResult<()> {
        let provider = input.provider;
        tracing::info!(
            operation = "manager.link-gateway-plan.start",
            plan_id = %plan_id,
            provider = %provider,
            provider_product_id = %input.provider_product_id,
            "Linking gateway product to plan"
        );

        self.directory
            .find_plan_by_id(plan_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("plan {plan_id}")))?;

        let gateway = self.gateways.create(provider)?;
        let products = gateway.list_products().await?;
        if !products.iter().any(|p| p.id == input.provider_product_id) {
            return Err(AppError::NotFound(format!(
                "product '{}' in gateway '{}'",
                input.provider_product_id, provider
            )));
        }

        if !input.prices.is_empty() {
            let plan_prices: HashSet<Uuid> = self
                .directory
                .list_plan_prices(plan_id)
                .await?
                .into_iter()
                .map(|p| p.id)
                .collect();
            let provider_prices: HashSet<String> = gateway
                .list_prices(&input.provider_product_id)
                .await?
                .into_iter()
                .map(|p| p.id)
                .collect();

            for link in &input.prices {
                if !plan_prices.contains(&link.plan_price_id) {
                    return Err(AppError::InvalidInput(format!(
                        "plan price {} does not belong to plan {}",
                        link.plan_price_id, plan_id
                    )));
                }
                if !provider_prices.contains(&link.provider_price_id) {
                    return Err(AppError::NotFound(format!(
                        "price '{}' of product '{}'",
                        link.provider_price_id, input.provider_product_id
                    )));
                }
            }
        }

        self.mappings
            .replace_active(CreateMappingInput::new(
                MappingEntityType::Plan,
                plan_id,
                provider,
                input.provider_product_id.clone(),
            ))
            .await?;
        for link in &input.prices {
            self.mappings
                .replace_active(CreateMappingInput::new(
                    MappingEntityType::PlanPrice,
                    link.plan_price_id,
                    provider,
                    link.provider_price_id.clone(),
                ))
                .await?;
        }

        tracing::info!(
            operation = "manager.link-gateway-plan.success",
            plan_id = %plan_id,
            provider = %provider,
            price_count = input.prices.len(),
            "Gateway product linked to plan"
        );

        self.events
            .publish(BillingEvent::GatewayLinked {
                plan_id,
                provider,
                provider_product_id: input.provider_product_id,
                linked_by,
            })
            .await;

        Ok(())
    }
}
