use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    app_error::AppResult,
    domain::entities::{
        mapping_entity_type::MappingEntityType,
        payment_provider::PaymentProvider,
        provider_mapping::{CreateMappingInput, ProviderMapping},
    },
};

// ============================================================================
// Repository Traits
// ============================================================================

#[async_trait]
pub trait ProviderMappingRepoTrait: Send + Sync {
    /// All mappings of an entity across providers, newest first.
    async fn find_by_entity_type_and_id(
        &self,
        entity_type: MappingEntityType,
        entity_id: Uuid,
    ) -> AppResult<Vec<ProviderMapping>>;

    /// Reverse lookup by provider identifier. Prefers the active row, then the newest.
    async fn find_by_provider_and_provider_id(
        &self,
        provider: PaymentProvider,
        provider_id: &str,
    ) -> AppResult<Option<ProviderMapping>>;

    /// Reverse lookup restricted to one entity type. Active rows only.
    async fn find_by_provider_id_of_type(
        &self,
        provider: PaymentProvider,
        provider_id: &str,
        entity_type: MappingEntityType,
    ) -> AppResult<Option<ProviderMapping>>;

    /// Newest mapping for the tuple, active or not.
    async fn find_by_entity_and_provider(
        &self,
        entity_type: MappingEntityType,
        entity_id: Uuid,
        provider: PaymentProvider,
    ) -> AppResult<Option<ProviderMapping>>;

    async fn find_active_by_entity_and_provider(
        &self,
        entity_type: MappingEntityType,
        entity_id: Uuid,
        provider: PaymentProvider,
    ) -> AppResult<Option<ProviderMapping>>;

    /// Always inserts a new row. Fails with `Conflict` if an active row already
    /// exists for the tuple.
    async fn create(&self, input: CreateMappingInput) -> AppResult<ProviderMapping>;

    /// Deactivate every active mapping of an entity. Returns the number of rows changed.
    async fn deactivate_by_entity(
        &self,
        entity_type: MappingEntityType,
        entity_id: Uuid,
    ) -> AppResult<u64>;

    /// Atomically deactivate the active mapping for the tuple and insert `input`
    /// as the new active one. Readers never observe two active rows.
    async fn replace_active(&self, input: CreateMappingInput) -> AppResult<ProviderMapping>;
}
