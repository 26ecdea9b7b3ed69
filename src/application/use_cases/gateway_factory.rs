use secrecy::{ExposeSecret, SecretString};
use std::{collections::HashMap, sync::Arc};

use crate::{
    app_error::{AppError, AppResult},
    application::ports::payment_gateway::PaymentGatewayPort,
    domain::entities::payment_provider::PaymentProvider,
};

struct RegisteredGateway {
    adapter: Arc<dyn PaymentGatewayPort>,
    webhook_secret: SecretString,
}

/// Resolves a provider to its adapter.
///
/// The registry is filled once at startup from configuration; lookups do no I/O
/// and are safe on every request. A provider is "configured" exactly when an
/// adapter is registered for it.
#[derive(Default)]
pub struct PaymentGatewayFactory {
    gateways: HashMap<PaymentProvider, RegisteredGateway>,
}

impl PaymentGatewayFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the adapter for its provider.
    pub fn register(
        &mut self,
        adapter: Arc<dyn PaymentGatewayPort>,
        webhook_secret: SecretString,
    ) -> &mut Self {
        let provider = adapter.provider();
        tracing::info!(provider = %provider, "Registered payment gateway");
        self.gateways.insert(
            provider,
            RegisteredGateway {
                adapter,
                webhook_secret,
            },
        );
        self
    }

    #[cfg(test)]
    pub fn with_gateway(
        mut self,
        adapter: Arc<dyn PaymentGatewayPort>,
        webhook_secret: &str,
    ) -> Self {
        self.register(adapter, SecretString::new(webhook_secret.into()));
        self
    }

    /// Get the adapter for a provider.
    ///
    /// # Errors
    /// - `UnconfiguredProvider` if no adapter is registered for `provider`
    pub fn create(&self, provider: PaymentProvider) -> AppResult<Arc<dyn PaymentGatewayPort>> {
        self.gateways
            .get(&provider)
            .map(|g| g.adapter.clone())
            .ok_or_else(|| AppError::UnconfiguredProvider(provider.to_string()))
    }

    /// Webhook signing secret for a provider.
    pub fn webhook_secret(&self, provider: PaymentProvider) -> AppResult<&str> {
        self.gateways
            .get(&provider)
            .map(|g| g.webhook_secret.expose_secret())
            .ok_or_else(|| AppError::UnconfiguredProvider(provider.to_string()))
    }

    pub fn is_configured(&self, provider: PaymentProvider) -> bool {
        self.gateways.contains_key(&provider)
    }

    /// Registered providers in declaration order.
    pub fn available_providers(&self) -> Vec<PaymentProvider> {
        PaymentProvider::all()
            .iter()
            .copied()
            .filter(|p| self.is_configured(*p))
            .collect()
    }
}
