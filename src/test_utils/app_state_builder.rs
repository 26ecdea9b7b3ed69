//! Test app state builder for use-case and HTTP-level testing.
//!
//! `TestAppStateBuilder` wires every use case against in-memory mocks. The
//! mocks are public fields so tests can seed and inspect them.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use secrecy::SecretString;
use url::Url;

use crate::{
    adapters::http::app_state::AppState,
    application::use_cases::{
        billing::{BillingSettings, BillingUseCases},
        dunning::DunningUseCases,
        gateway_admin::GatewayAdminUseCases,
        gateway_factory::PaymentGatewayFactory,
        webhook_ingestion::WebhookIngestionUseCases,
        webhook_processing::WebhookProcessingUseCases,
    },
    domain::entities::{billing_scope::BillingScope, dunning::DunningPolicy},
    infra::config::{AppConfig, RunMode},
    test_utils::{
        InMemoryDirectory, InMemoryDunningRepo, InMemoryJobQueue, InMemoryProviderMappingRepo,
        InMemorySubscriptionRepo, InMemoryWebhookEventRepo, MockGateway, RecordingEventPublisher,
    },
};

pub const TEST_WEBHOOK_SECRET: &str = "whsec_test";
pub const TEST_FRONTEND_URL: &str = "https://app.test";

/// Builder for use cases and `AppState` backed by in-memory mocks.
///
/// # Example
///
/// ```ignore
/// let builder = TestAppStateBuilder::new()
///     .with_gateway(Arc::new(MockGateway::new(PaymentProvider::Stripe)))
///     .with_admin_api_key("admin_secret");
/// let server = TestServer::new(create_router(builder.build())).unwrap();
/// ```
pub struct TestAppStateBuilder {
    pub directory: Arc<InMemoryDirectory>,
    pub mappings: Arc<InMemoryProviderMappingRepo>,
    pub subscriptions: Arc<InMemorySubscriptionRepo>,
    pub dunning: Arc<InMemoryDunningRepo>,
    pub webhook_events: Arc<InMemoryWebhookEventRepo>,
    pub events: Arc<RecordingEventPublisher>,
    pub queue: Arc<InMemoryJobQueue>,
    gateways: Vec<Arc<MockGateway>>,
    scope: BillingScope,
    admin_api_key: Option<String>,
}

impl TestAppStateBuilder {
    pub fn new() -> Self {
        Self {
            directory: Arc::new(InMemoryDirectory::new()),
            mappings: Arc::new(InMemoryProviderMappingRepo::new()),
            subscriptions: Arc::new(InMemorySubscriptionRepo::new()),
            dunning: Arc::new(InMemoryDunningRepo::new()),
            webhook_events: Arc::new(InMemoryWebhookEventRepo::new()),
            events: Arc::new(RecordingEventPublisher::new()),
            queue: Arc::new(InMemoryJobQueue::new()),
            gateways: vec![],
            scope: BillingScope::Account,
            admin_api_key: None,
        }
    }

    /// Register a gateway; its webhook secret is `TEST_WEBHOOK_SECRET`.
    pub fn with_gateway(mut self, gateway: Arc<MockGateway>) -> Self {
        self.gateways.push(gateway);
        self
    }

    pub fn with_billing_scope(mut self, scope: BillingScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_admin_api_key(mut self, key: &str) -> Self {
        self.admin_api_key = Some(key.to_string());
        self
    }

    pub fn gateway_factory(&self) -> Arc<PaymentGatewayFactory> {
        let mut factory = PaymentGatewayFactory::new();
        for gateway in &self.gateways {
            factory.register(
                gateway.clone(),
                SecretString::new(TEST_WEBHOOK_SECRET.into()),
            );
        }
        Arc::new(factory)
    }

    pub fn billing_settings(&self) -> BillingSettings {
        BillingSettings {
            scope: self.scope,
            checkout_success_url: format!("{TEST_FRONTEND_URL}/settings/billing?success=true"),
            checkout_cancel_url: format!("{TEST_FRONTEND_URL}/settings/billing?canceled=true"),
            frontend_url: TEST_FRONTEND_URL.to_string(),
        }
    }

    pub fn dunning_use_cases(&self) -> DunningUseCases {
        DunningUseCases::new(
            self.dunning.clone(),
            self.subscriptions.clone(),
            self.events.clone(),
            DunningPolicy::default(),
        )
    }

    pub fn webhook_ingestion_use_cases(&self) -> WebhookIngestionUseCases {
        WebhookIngestionUseCases::new(self.gateway_factory(), self.queue.clone())
    }

    pub fn webhook_processing_use_cases(&self) -> WebhookProcessingUseCases {
        WebhookProcessingUseCases::new(
            self.webhook_events.clone(),
            self.subscriptions.clone(),
            self.mappings.clone(),
            self.dunning_use_cases(),
            self.events.clone(),
        )
    }

    pub fn billing_use_cases(&self) -> BillingUseCases {
        BillingUseCases::new(
            self.directory.clone(),
            self.directory.clone(),
            self.mappings.clone(),
            self.subscriptions.clone(),
            self.gateway_factory(),
            self.dunning_use_cases(),
            self.events.clone(),
            self.billing_settings(),
        )
    }

    pub fn gateway_admin_use_cases(&self) -> GatewayAdminUseCases {
        GatewayAdminUseCases::new(
            self.gateway_factory(),
            self.directory.clone(),
            self.mappings.clone(),
            self.events.clone(),
        )
    }

    fn config(&self) -> AppConfig {
        AppConfig {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3001)),
            database_url: String::new(),
            database_max_connections: 1,
            redis_url: String::new(),
            frontend_url: Url::parse(TEST_FRONTEND_URL).unwrap(),
            checkout_success_url: self.billing_settings().checkout_success_url,
            checkout_cancel_url: self.billing_settings().checkout_cancel_url,
            billing_scope: self.scope,
            providers: vec![],
            dummy_gateway_enabled: false,
            dummy_webhook_secret: SecretString::new(TEST_WEBHOOK_SECRET.into()),
            admin_api_key: self
                .admin_api_key
                .as_deref()
                .map(|k| SecretString::new(k.into())),
            dunning_policy: DunningPolicy::default(),
            dunning_check_interval: Duration::from_secs(3600),
            webhook_worker_concurrency: 1,
            queue_max_attempts: 5,
            queue_backoff_base: Duration::from_secs(5),
            stripe_signature_tolerance_secs: 300,
            run_mode: RunMode::Api,
        }
    }

    /// Build the AppState with all configured mocks.
    pub fn build(&self) -> AppState {
        AppState {
            config: Arc::new(self.config()),
            webhook_ingestion_use_cases: Arc::new(self.webhook_ingestion_use_cases()),
            billing_use_cases: Arc::new(self.billing_use_cases()),
            gateway_admin_use_cases: Arc::new(self.gateway_admin_use_cases()),
        }
    }
}

impl Default for TestAppStateBuilder {
    fn default() -> Self {
        Self::new()
    }
}
