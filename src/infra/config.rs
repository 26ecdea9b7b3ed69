use std::{net::SocketAddr, time::Duration};

use env_helpers::get_env_default;
use secrecy::SecretString;
use strum::{AsRefStr, Display, EnumString};
use url::Url;

use crate::{
    application::use_cases::billing::BillingSettings,
    domain::entities::{
        billing_scope::BillingScope, dunning::DunningPolicy, payment_provider::PaymentProvider,
    },
    infra::error::InfraError,
};

/// Which parts of the system this process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, AsRefStr, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum RunMode {
    /// HTTP only; jobs are enqueued for another process
    Api,
    Workers,
    #[default]
    Hybrid,
}

impl RunMode {
    pub fn runs_api(&self) -> bool {
        matches!(self, RunMode::Api | RunMode::Hybrid)
    }

    pub fn runs_workers(&self) -> bool {
        matches!(self, RunMode::Workers | RunMode::Hybrid)
    }
}

pub struct ProviderCredentials {
    pub provider: PaymentProvider,
    pub secret_key: SecretString,
    pub webhook_secret: SecretString,
    pub public_key: Option<String>,
}

pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub database_url: String,
    pub database_max_connections: u32,
    pub redis_url: String,
    pub frontend_url: Url,
    pub checkout_success_url: String,
    pub checkout_cancel_url: String,
    pub billing_scope: BillingScope,
    /// Providers with both a secret key and a webhook secret
    pub providers: Vec<ProviderCredentials>,
    /// Register the offline dummy gateway (local development)
    pub dummy_gateway_enabled: bool,
    /// HMAC key for dummy webhooks (`DUMMY_WEBHOOK_SECRET`)
    pub dummy_webhook_secret: SecretString,
    /// Bearer token for the /manager routes; the routes reject everything when unset
    pub admin_api_key: Option<SecretString>,
    pub dunning_policy: DunningPolicy,
    pub dunning_check_interval: Duration,
    pub webhook_worker_concurrency: usize,
    pub queue_max_attempts: u32,
    pub queue_backoff_base: Duration,
    pub stripe_signature_tolerance_secs: i64,
    pub run_mode: RunMode,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, InfraError> {
        let bind_addr: SocketAddr =
            get_env_default("BIND_ADDR", SocketAddr::from(([127, 0, 0, 1], 3001)));
        let database_url = required("DATABASE_URL")?;
        let database_max_connections: u32 = get_env_default("DATABASE_MAX_CONNECTIONS", 5);
        let redis_url: String = get_env_default("REDIS_URL", "redis://127.0.0.1:6379".to_string());

        let frontend_raw: String =
            get_env_default("FRONTEND_URL", "http://localhost:3000".to_string());
        let frontend_url = Url::parse(&frontend_raw).map_err(|e| InfraError::ConfigInvalid {
            var: "FRONTEND_URL",
            reason: e.to_string(),
        })?;

        let (checkout_success_url, checkout_cancel_url) = checkout_urls(
            &frontend_url,
            optional("CHECKOUT_SUCCESS_URL").or_else(|| optional("STRIPE_SUCCESS_URL")),
            optional("CHECKOUT_CANCEL_URL").or_else(|| optional("STRIPE_CANCEL_URL")),
        );

        let billing_scope = parse_billing_scope(optional("BILLING_SCOPE").as_deref())?;

        let providers = PaymentProvider::all()
            .iter()
            .filter(|p| !p.is_dummy())
            .filter_map(|p| provider_credentials(*p))
            .collect();

        let run_mode = match optional("RUN_MODE") {
            Some(raw) => raw.parse().map_err(|_| InfraError::ConfigInvalid {
                var: "RUN_MODE",
                reason: format!("expected api, workers or hybrid, got '{raw}'"),
            })?,
            None => RunMode::default(),
        };

        let dunning_policy = DunningPolicy {
            grace_period_days: get_env_default("DUNNING_GRACE_PERIOD_DAYS", 7),
            max_retries: get_env_default("DUNNING_MAX_RETRIES", 3),
        };

        Ok(Self {
            bind_addr,
            database_url,
            database_max_connections,
            redis_url,
            frontend_url,
            checkout_success_url,
            checkout_cancel_url,
            billing_scope,
            providers,
            dummy_gateway_enabled: get_env_default("DUMMY_GATEWAY_ENABLED", false),
            dummy_webhook_secret: SecretString::new(
                get_env_default("DUMMY_WEBHOOK_SECRET", "dummy_webhook_secret".to_string()).into(),
            ),
            admin_api_key: optional("ADMIN_API_KEY").map(|k| SecretString::new(k.into())),
            dunning_policy,
            dunning_check_interval: Duration::from_secs(get_env_default(
                "DUNNING_CHECK_INTERVAL_SECS",
                3600,
            )),
            webhook_worker_concurrency: get_env_default("WEBHOOK_WORKER_CONCURRENCY", 4),
            queue_max_attempts: get_env_default("QUEUE_MAX_ATTEMPTS", 5),
            queue_backoff_base: Duration::from_secs(get_env_default("QUEUE_BACKOFF_BASE_SECS", 5)),
            stripe_signature_tolerance_secs: get_env_default(
                "STRIPE_SIGNATURE_TOLERANCE_SECS",
                300,
            ),
            run_mode,
        })
    }

    pub fn credentials(&self, provider: PaymentProvider) -> Option<&ProviderCredentials> {
        self.providers.iter().find(|c| c.provider == provider)
    }

    pub fn billing_settings(&self) -> BillingSettings {
        BillingSettings {
            scope: self.billing_scope,
            checkout_success_url: self.checkout_success_url.clone(),
            checkout_cancel_url: self.checkout_cancel_url.clone(),
            frontend_url: self.frontend_url.as_str().trim_end_matches('/').to_string(),
        }
    }
}

fn optional(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

fn required(var: &'static str) -> Result<String, InfraError> {
    optional(var).ok_or(InfraError::ConfigMissing { var })
}

fn provider_credentials(provider: PaymentProvider) -> Option<ProviderCredentials> {
    let prefix = provider.env_prefix();
    let secret_key = optional(&format!("{prefix}_SECRET_KEY"));
    let webhook_secret = optional(&format!("{prefix}_WEBHOOK_SECRET"));
    match (secret_key, webhook_secret) {
        (Some(secret_key), Some(webhook_secret)) => Some(ProviderCredentials {
            provider,
            secret_key: SecretString::new(secret_key.into()),
            webhook_secret: SecretString::new(webhook_secret.into()),
            public_key: optional(&format!("{prefix}_PUBLIC_KEY")),
        }),
        (Some(_), None) | (None, Some(_)) => {
            tracing::warn!(
                provider = %provider,
                "Provider has only one of {prefix}_SECRET_KEY / {prefix}_WEBHOOK_SECRET, skipping"
            );
            None
        }
        (None, None) => None,
    }
}

fn parse_billing_scope(raw: Option<&str>) -> Result<BillingScope, InfraError> {
    match raw {
        None => Ok(BillingScope::default()),
        Some(raw) => raw.trim().parse().map_err(|_| InfraError::ConfigInvalid {
            var: "BILLING_SCOPE",
            reason: format!("expected 'account' or 'workspace', got '{raw}'"),
        }),
    }
}

/// Explicit URLs win; otherwise both return to the billing settings page.
fn checkout_urls(
    frontend_url: &Url,
    success: Option<String>,
    cancel: Option<String>,
) -> (String, String) {
    let base = format!("{}/settings/billing", frontend_url.as_str().trim_end_matches('/'));
    (
        success.unwrap_or_else(|| format!("{base}?success=true")),
        cancel.unwrap_or_else(|| format!("{base}?canceled=true")),
    )
}
