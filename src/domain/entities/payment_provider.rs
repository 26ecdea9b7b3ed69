use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Payment provider type - the external processor an adapter talks to
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    AsRefStr,
    Display,
    EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum PaymentProvider {
    #[default]
    Stripe,
    Dummy,
    Coinbase,
}

impl PaymentProvider {
    /// Human-readable display name for the provider
    pub fn display_name(&self) -> &'static str {
        match self {
            PaymentProvider::Stripe => "Stripe",
            PaymentProvider::Dummy => "Test Provider",
            PaymentProvider::Coinbase => "Coinbase Commerce",
        }
    }

    /// Prefix of the environment variables holding this provider's credentials
    /// (`{PREFIX}_SECRET_KEY`, `{PREFIX}_WEBHOOK_SECRET`, `{PREFIX}_PUBLIC_KEY`).
    pub fn env_prefix(&self) -> &'static str {
        match self {
            PaymentProvider::Stripe => "STRIPE",
            PaymentProvider::Dummy => "DUMMY",
            PaymentProvider::Coinbase => "COINBASE",
        }
    }

    /// Header carrying the webhook signature for this provider.
    ///
    /// Providers without a dedicated header return `None`; callers fall back to
    /// the generic `x-webhook-signature` / `x-signature` headers.
    pub fn signature_header(&self) -> Option<&'static str> {
        match self {
            PaymentProvider::Stripe => Some("stripe-signature"),
            PaymentProvider::Dummy | PaymentProvider::Coinbase => None,
        }
    }

    /// Whether this provider is the dummy/test provider
    pub fn is_dummy(&self) -> bool {
        matches!(self, PaymentProvider::Dummy)
    }

    /// All known providers, including ones without an adapter
    pub fn all() -> &'static [PaymentProvider] {
        &[
            PaymentProvider::Stripe,
            PaymentProvider::Dummy,
            PaymentProvider::Coinbase,
        ]
    }
}
