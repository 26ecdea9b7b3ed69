use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::{mapping_entity_type::MappingEntityType, payment_provider::PaymentProvider};

/// Link between an internal entity and its identifier at a payment provider.
///
/// Rows are never updated in place except to flip `is_active` off; a re-link
/// inserts a new row so older links remain as history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderMapping {
    pub id: Uuid,
    pub entity_type: MappingEntityType,
    pub entity_id: Uuid,
    pub provider: PaymentProvider,
    pub provider_id: String,
    pub is_active: bool,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateMappingInput {
    pub entity_type: MappingEntityType,
    pub entity_id: Uuid,
    pub provider: PaymentProvider,
    pub provider_id: String,
    pub metadata: Option<serde_json::Value>,
}

impl CreateMappingInput {
    pub fn new(
        entity_type: MappingEntityType,
        entity_id: Uuid,
        provider: PaymentProvider,
        provider_id: impl Into<String>,
    ) -> Self {
        Self {
            entity_type,
            entity_id,
            provider,
            provider_id: provider_id.into(),
            metadata: None,
        }
    }
}
