use std::sync::Arc;

use crate::{
    infra::config::AppConfig,
    use_cases::{
        billing::BillingUseCases, gateway_admin::GatewayAdminUseCases,
        webhook_ingestion::WebhookIngestionUseCases,
    },
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub webhook_ingestion_use_cases: Arc<WebhookIngestionUseCases>,
    pub billing_use_cases: Arc<BillingUseCases>,
    pub gateway_admin_use_cases: Arc<GatewayAdminUseCases>,
}
