use async_trait::async_trait;
use sqlx::{Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    adapters::persistence::{PostgresPersistence, parse_column},
    app_error::{AppError, AppResult},
    application::use_cases::provider_mapping::ProviderMappingRepoTrait,
    domain::entities::{
        mapping_entity_type::MappingEntityType,
        payment_provider::PaymentProvider,
        provider_mapping::{CreateMappingInput, ProviderMapping},
    },
};

const SELECT_COLS: &str = concat!(
    "id, entity_type, entity_id, provider, provider_id, ",
    "is_active, metadata, created_at, updated_at"
);

fn row_to_mapping(row: PgRow) -> AppResult<ProviderMapping> {
    Ok(ProviderMapping {
        id: row.get("id"),
        entity_type: parse_column(&row, "entity_type")?,
        entity_id: row.get("entity_id"),
        provider: parse_column(&row, "provider")?,
        provider_id: row.get("provider_id"),
        is_active: row.get("is_active"),
        metadata: row.get("metadata"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn insert_sql() -> String {
    format!(
        r#"
        INSERT INTO payment_provider_mappings
            (entity_type, entity_id, provider, provider_id, is_active, metadata)
        VALUES ($1, $2, $3, $4, TRUE, $5)
        RETURNING {}
        "#,
        SELECT_COLS
    )
}

#[async_trait]
impl ProviderMappingRepoTrait for PostgresPersistence {
    async fn find_by_entity_type_and_id(
        &self,
        entity_type: MappingEntityType,
        entity_id: Uuid,
    ) -> AppResult<Vec<ProviderMapping>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM payment_provider_mappings
            WHERE entity_type = $1 AND entity_id = $2
            ORDER BY created_at DESC
            "#,
            SELECT_COLS
        ))
        .bind(entity_type.as_ref())
        .bind(entity_id)
        .fetch_all(self.pool())
        .await
        .map_err(AppError::from)?;

        rows.into_iter().map(row_to_mapping).collect()
    }

    async fn find_by_provider_and_provider_id(
        &self,
        provider: PaymentProvider,
        provider_id: &str,
    ) -> AppResult<Option<ProviderMapping>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {} FROM payment_provider_mappings
            WHERE provider = $1 AND provider_id = $2
            ORDER BY is_active DESC, created_at DESC
            LIMIT 1
            "#,
            SELECT_COLS
        ))
        .bind(provider.as_ref())
        .bind(provider_id)
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?;

        row.map(row_to_mapping).transpose()
    }

    async fn find_by_provider_id_of_type(
        &self,
        provider: PaymentProvider,
        provider_id: &str,
        entity_type: MappingEntityType,
    ) -> AppResult<Option<ProviderMapping>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {} FROM payment_provider_mappings
            WHERE provider = $1 AND provider_id = $2 AND entity_type = $3 AND is_active
            ORDER BY created_at DESC
            LIMIT 1
            "#,
            SELECT_COLS
        ))
        .bind(provider.as_ref())
        .bind(provider_id)
        .bind(entity_type.as_ref())
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?;

        row.map(row_to_mapping).transpose()
    }

    async fn find_by_entity_and_provider(
        &self,
        entity_type: MappingEntityType,
        entity_id: Uuid,
        provider: PaymentProvider,
    ) -> AppResult<Option<ProviderMapping>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {} FROM payment_provider_mappings
            WHERE entity_type = $1 AND entity_id = $2 AND provider = $3
            ORDER BY created_at DESC
            LIMIT 1
            "#,
            SELECT_COLS
        ))
        .bind(entity_type.as_ref())
        .bind(entity_id)
        .bind(provider.as_ref())
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?;

        row.map(row_to_mapping).transpose()
    }

    async fn find_active_by_entity_and_provider(
        &self,
        entity_type: MappingEntityType,
        entity_id: Uuid,
        provider: PaymentProvider,
    ) -> AppResult<Option<ProviderMapping>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {} FROM payment_provider_mappings
            WHERE entity_type = $1 AND entity_id = $2 AND provider = $3 AND is_active
            "#,
            SELECT_COLS
        ))
        .bind(entity_type.as_ref())
        .bind(entity_id)
        .bind(provider.as_ref())
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?;

        row.map(row_to_mapping).transpose()
    }

    async fn create(&self, input: CreateMappingInput) -> AppResult<ProviderMapping> {
        let row = sqlx::query(&insert_sql())
            .bind(input.entity_type.as_ref())
            .bind(input.entity_id)
            .bind(input.provider.as_ref())
            .bind(&input.provider_id)
            .bind(&input.metadata)
            .fetch_one(self.pool())
            .await
            .map_err(AppError::from)?;

        row_to_mapping(row)
    }

    async fn deactivate_by_entity(
        &self,
        entity_type: MappingEntityType,
        entity_id: Uuid,
    ) -> AppResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE payment_provider_mappings
            SET is_active = FALSE, updated_at = NOW()
            WHERE entity_type = $1 AND entity_id = $2 AND is_active
            "#,
        )
        .bind(entity_type.as_ref())
        .bind(entity_id)
        .execute(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(result.rows_affected())
    }

    async fn replace_active(&self, input: CreateMappingInput) -> AppResult<ProviderMapping> {
        let mut tx = self.pool().begin().await.map_err(AppError::from)?;

        sqlx::query(
            r#"
            UPDATE payment_provider_mappings
            SET is_active = FALSE, updated_at = NOW()
            WHERE entity_type = $1 AND entity_id = $2 AND provider = $3 AND is_active
            "#,
        )
        .bind(input.entity_type.as_ref())
        .bind(input.entity_id)
        .bind(input.provider.as_ref())
        .execute(&mut *tx)
        .await
        .map_err(AppError::from)?;

        let row = sqlx::query(&insert_sql())
            .bind(input.entity_type.as_ref())
            .bind(input.entity_id)
            .bind(input.provider.as_ref())
            .bind(&input.provider_id)
            .bind(&input.metadata)
            .fetch_one(&mut *tx)
            .await
            .map_err(AppError::from)?;

        tx.commit().await.map_err(AppError::from)?;

        row_to_mapping(row)
    }
}
