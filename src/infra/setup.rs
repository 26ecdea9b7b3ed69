use std::{sync::Arc, time::Duration};

use secrecy::ExposeSecret;
use tokio::{sync::watch, task::JoinHandle};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::{
    adapters::{
        events::NotificationEventPublisher, http::app_state::AppState,
        persistence::PostgresPersistence,
    },
    application::ports::{
        event_publisher::BillingEventPublisher,
        job_queue::{JobQueue, PAYMENT_DUNNING_QUEUE, PAYMENT_WEBHOOK_QUEUE},
    },
    domain::entities::payment_provider::PaymentProvider,
    infra::{
        config::AppConfig,
        db::{init_db, run_migrations},
        dummy_gateway::DummyGateway,
        dunning_worker::{DunningWorker, run_scheduler},
        error::InfraError,
        http_client::try_build_client,
        redis_queue::RedisJobQueue,
        stripe_client::StripeClient,
        stripe_gateway::StripeGateway,
        webhook_worker::WebhookWorker,
    },
    use_cases::{
        billing::BillingUseCases, dunning::DunningUseCases, gateway_admin::GatewayAdminUseCases,
        gateway_factory::PaymentGatewayFactory, webhook_ingestion::WebhookIngestionUseCases,
        webhook_processing::WebhookProcessingUseCases,
    },
};

/// Idle wait between polls of an empty queue.
const WORKER_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Everything a process needs, whichever parts of it run.
pub struct Services {
    pub app_state: AppState,
    pub queue: Arc<RedisJobQueue>,
    pub webhook_processing: WebhookProcessingUseCases,
    pub dunning: DunningUseCases,
}

pub fn build_gateway_factory(
    config: &AppConfig,
    http: reqwest::Client,
) -> PaymentGatewayFactory {
    let mut factory = PaymentGatewayFactory::new();

    for credentials in &config.providers {
        match credentials.provider {
            PaymentProvider::Stripe => {
                let client = StripeClient::new(http.clone(), credentials.secret_key.clone());
                factory.register(
                    Arc::new(StripeGateway::new(
                        client,
                        config.stripe_signature_tolerance_secs,
                    )),
                    credentials.webhook_secret.clone(),
                );
            }
            other => {
                tracing::warn!(provider = %other, "Credentials present but no adapter available");
            }
        }
    }

    if config.dummy_gateway_enabled {
        factory.register(
            Arc::new(DummyGateway::new(config.frontend_url.as_str())),
            config.dummy_webhook_secret.clone(),
        );
    }

    factory
}

pub async fn init_services(config: AppConfig) -> Result<Services, InfraError> {
    let pool = init_db(&config.database_url, config.database_max_connections).await?;
    run_migrations(&pool).await?;
    let postgres_arc = Arc::new(PostgresPersistence::new(pool));

    let queue = Arc::new(
        RedisJobQueue::new(
            &config.redis_url,
            config.queue_max_attempts,
            config.queue_backoff_base,
        )
        .await?,
    );
    let queue_arc = queue.clone() as Arc<dyn JobQueue>;
    let events = Arc::new(NotificationEventPublisher::new(queue_arc.clone()))
        as Arc<dyn BillingEventPublisher>;

    let gateways = Arc::new(build_gateway_factory(&config, try_build_client()?));
    if gateways.available_providers().is_empty() {
        tracing::warn!("No payment gateway configured; webhooks and checkout will be rejected");
    }

    let dunning = DunningUseCases::new(
        postgres_arc.clone(),
        postgres_arc.clone(),
        events.clone(),
        config.dunning_policy,
    );

    let webhook_processing = WebhookProcessingUseCases::new(
        postgres_arc.clone(),
        postgres_arc.clone(),
        postgres_arc.clone(),
        dunning.clone(),
        events.clone(),
    );

    let webhook_ingestion_use_cases =
        WebhookIngestionUseCases::new(gateways.clone(), queue_arc.clone());

    let billing_use_cases = BillingUseCases::new(
        postgres_arc.clone(),
        postgres_arc.clone(),
        postgres_arc.clone(),
        postgres_arc.clone(),
        gateways.clone(),
        dunning.clone(),
        events.clone(),
        config.billing_settings(),
    );

    let gateway_admin_use_cases = GatewayAdminUseCases::new(
        gateways,
        postgres_arc.clone(),
        postgres_arc,
        events,
    );

    let app_state = AppState {
        config: Arc::new(config),
        webhook_ingestion_use_cases: Arc::new(webhook_ingestion_use_cases),
        billing_use_cases: Arc::new(billing_use_cases),
        gateway_admin_use_cases: Arc::new(gateway_admin_use_cases),
    };

    Ok(Services {
        app_state,
        queue,
        webhook_processing,
        dunning,
    })
}

/// Start the webhook worker, the dunning worker and the dunning scheduler.
pub async fn spawn_workers(
    services: &Services,
    shutdown: watch::Receiver<bool>,
) -> Result<Vec<JoinHandle<()>>, InfraError> {
    let config = &services.app_state.config;
    for queue in [PAYMENT_WEBHOOK_QUEUE, PAYMENT_DUNNING_QUEUE] {
        services
            .queue
            .requeue_in_flight(queue)
            .await
            .map_err(|e| InfraError::Queue(e.to_string()))?;
    }

    let queue = services.queue.clone() as Arc<dyn JobQueue>;

    let webhook_worker = Arc::new(WebhookWorker::new(
        queue.clone(),
        services.webhook_processing.clone(),
        config.webhook_worker_concurrency,
        WORKER_POLL_INTERVAL,
    ));
    let dunning_worker = DunningWorker::new(
        queue.clone(),
        services.dunning.clone(),
        WORKER_POLL_INTERVAL,
    );

    Ok(vec![
        tokio::spawn(webhook_worker.run(shutdown.clone())),
        tokio::spawn(dunning_worker.run(shutdown.clone())),
        tokio::spawn(run_scheduler(queue, config.dunning_check_interval, shutdown)),
    ])
}

/// Console logs, pretty by default or JSON with `LOG_FORMAT=json`.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "billing_core=info,tower_http=info".into());

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true),
            )
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false).with_level(true).pretty())
            .try_init()
            .ok();
    }
}

/// Log which webhook providers accept traffic without printing secrets.
pub fn log_gateway_summary(config: &AppConfig) {
    for credentials in &config.providers {
        tracing::info!(
            provider = %credentials.provider,
            public_key = credentials.public_key.as_deref().unwrap_or("-"),
            webhook_secret_set = !credentials.webhook_secret.expose_secret().is_empty(),
            "Provider credentials loaded"
        );
    }
}
