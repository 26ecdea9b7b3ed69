use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use super::mapping_entity_type::MappingEntityType;

/// Which entity owns the provider customer: the whole account or each workspace.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    AsRefStr,
    Display,
    EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum BillingScope {
    #[default]
    Account,
    Workspace,
}

impl BillingScope {
    pub fn entity_type(&self) -> MappingEntityType {
        match self {
            BillingScope::Account => MappingEntityType::Account,
            BillingScope::Workspace => MappingEntityType::Workspace,
        }
    }
}
