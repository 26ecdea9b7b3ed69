use async_trait::async_trait;
use sqlx::{Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    adapters::persistence::{PostgresPersistence, parse_column},
    app_error::{AppError, AppResult},
    application::use_cases::webhook_processing::WebhookEventRepoTrait,
    domain::entities::{
        payment_provider::PaymentProvider,
        webhook_event::{CreateWebhookEventInput, WebhookEventRecord, WebhookStatus},
    },
};

const SELECT_COLS: &str = "id, account_id, provider, webhook_type, event_name, status, payload, \
     raw_event_id, idempotency_key, queue_name, attempts, skip_reason, error_message, \
     processed_at, created_at, updated_at";

fn row_to_record(row: PgRow) -> AppResult<WebhookEventRecord> {
    Ok(WebhookEventRecord {
        id: row.get("id"),
        account_id: row.get("account_id"),
        provider: parse_column(&row, "provider")?,
        webhook_type: row.get("webhook_type"),
        event_name: parse_column(&row, "event_name")?,
        status: parse_column(&row, "status")?,
        payload: row.get("payload"),
        raw_event_id: row.get("raw_event_id"),
        idempotency_key: row.get("idempotency_key"),
        queue_name: row.get("queue_name"),
        attempts: row.get("attempts"),
        skip_reason: row.get("skip_reason"),
        error_message: row.get("error_message"),
        processed_at: row.get("processed_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[async_trait]
impl WebhookEventRepoTrait for PostgresPersistence {
    async fn find_by_raw_event_id(
        &self,
        provider: PaymentProvider,
        raw_event_id: &str,
    ) -> AppResult<Option<WebhookEventRecord>> {
        // A PROCESSED row wins over retries of the same event.
        let row = sqlx::query(&format!(
            r#"
            SELECT {} FROM webhook_events
            WHERE provider = $1 AND raw_event_id = $2
            ORDER BY (status = 'PROCESSED') DESC, created_at DESC
            LIMIT 1
            "#,
            SELECT_COLS
        ))
        .bind(provider.as_ref())
        .bind(raw_event_id)
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?;

        row.map(row_to_record).transpose()
    }

    async fn create(&self, input: CreateWebhookEventInput) -> AppResult<WebhookEventRecord> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO webhook_events
                (account_id, provider, webhook_type, event_name, status, payload,
                 raw_event_id, idempotency_key, queue_name, attempts)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 1)
            RETURNING {}
            "#,
            SELECT_COLS
        ))
        .bind(input.account_id)
        .bind(input.provider.as_ref())
        .bind(&input.webhook_type)
        .bind(input.event_name.as_ref())
        .bind(WebhookStatus::Pending.as_ref())
        .bind(&input.payload)
        .bind(&input.raw_event_id)
        .bind(&input.idempotency_key)
        .bind(&input.queue_name)
        .fetch_one(self.pool())
        .await
        .map_err(AppError::from)?;

        row_to_record(row)
    }

    async fn mark_retrying(&self, id: Uuid) -> AppResult<WebhookEventRecord> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE webhook_events
            SET status = $2, attempts = attempts + 1, error_message = NULL, updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            SELECT_COLS
        ))
        .bind(id)
        .bind(WebhookStatus::Pending.as_ref())
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?
        .ok_or_else(|| AppError::NotFound(format!("webhook event {id}")))?;

        row_to_record(row)
    }

    async fn mark_processed(&self, id: Uuid, skip_reason: Option<&str>) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE webhook_events
            SET status = $2, skip_reason = $3, error_message = NULL,
                processed_at = NOW(), updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(WebhookStatus::Processed.as_ref())
        .bind(skip_reason)
        .execute(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, error_message: &str) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE webhook_events
            SET status = $2, error_message = $3, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(WebhookStatus::Failed.as_ref())
        .bind(error_message)
        .execute(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(())
    }
}
