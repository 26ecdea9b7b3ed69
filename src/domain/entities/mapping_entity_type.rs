use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Kind of internal entity a provider mapping points at.
///
/// Stored as text in `payment_provider_mappings.entity_type`, guarded by a
/// CHECK constraint listing exactly these values.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MappingEntityType {
    Account,
    Workspace,
    Plan,
    PlanPrice,
    Subscription,
}

impl MappingEntityType {
    /// Entity types that can own a provider customer.
    pub fn is_billing_entity(&self) -> bool {
        matches!(self, MappingEntityType::Account | MappingEntityType::Workspace)
    }
}
