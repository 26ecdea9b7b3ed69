use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::dunning::DunningRepoTrait,
    domain::entities::dunning::DunningRecord,
};

const SELECT_COLS: &str =
    "subscription_id, failure_count, first_failure_at, last_failure_at, last_event_id";

fn row_to_record(row: PgRow) -> DunningRecord {
    DunningRecord {
        subscription_id: row.get("subscription_id"),
        failure_count: row.get("failure_count"),
        first_failure_at: row.get("first_failure_at"),
        last_failure_at: row.get("last_failure_at"),
        last_event_id: row.get("last_event_id"),
    }
}

#[async_trait]
impl DunningRepoTrait for PostgresPersistence {
    async fn record_failure(
        &self,
        subscription_id: Uuid,
        event_id: &str,
        at: DateTime<Utc>,
    ) -> AppResult<DunningRecord> {
        // A redelivered event keeps the stored count and timestamp.
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO dunning_records
                (subscription_id, failure_count, first_failure_at, last_failure_at, last_event_id)
            VALUES ($1, 1, $2, $2, $3)
            ON CONFLICT (subscription_id) DO UPDATE
            SET failure_count = CASE
                    WHEN dunning_records.last_event_id = EXCLUDED.last_event_id
                    THEN dunning_records.failure_count
                    ELSE dunning_records.failure_count + 1
                END,
                last_failure_at = CASE
                    WHEN dunning_records.last_event_id = EXCLUDED.last_event_id
                    THEN dunning_records.last_failure_at
                    ELSE EXCLUDED.last_failure_at
                END,
                last_event_id = EXCLUDED.last_event_id
            RETURNING {}
            "#,
            SELECT_COLS
        ))
        .bind(subscription_id)
        .bind(at)
        .bind(event_id)
        .fetch_one(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(row_to_record(row))
    }

    async fn get(&self, subscription_id: Uuid) -> AppResult<Option<DunningRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM dunning_records WHERE subscription_id = $1",
            SELECT_COLS
        ))
        .bind(subscription_id)
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(row.map(row_to_record))
    }

    async fn clear(&self, subscription_id: Uuid) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM dunning_records WHERE subscription_id = $1")
            .bind(subscription_id)
            .execute(self.pool())
            .await
            .map_err(AppError::from)?;

        Ok(result.rows_affected() > 0)
    }

    async fn list(&self) -> AppResult<Vec<DunningRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM dunning_records ORDER BY first_failure_at",
            SELECT_COLS
        ))
        .fetch_all(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(rows.into_iter().map(row_to_record).collect())
    }
}
