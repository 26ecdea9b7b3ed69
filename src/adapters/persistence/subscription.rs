use async_trait::async_trait;
use sqlx::{Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    adapters::persistence::{
        PostgresPersistence, parse_column,
        tenant::{begin_admin, begin_tenant},
    },
    app_error::{AppError, AppResult},
    application::use_cases::subscription::{SubscriptionPatch, SubscriptionRepoTrait},
    domain::entities::subscription::{CreateSubscriptionInput, Subscription},
};

const SELECT_COLS: &str = "id, account_id, workspace_id, plan_price_id, status, \
     current_period_end, canceled_at, created_at, updated_at";

fn row_to_subscription(row: PgRow) -> AppResult<Subscription> {
    Ok(Subscription {
        id: row.get("id"),
        account_id: row.get("account_id"),
        workspace_id: row.get("workspace_id"),
        plan_price_id: row.get("plan_price_id"),
        status: parse_column(&row, "status")?,
        current_period_end: row.get("current_period_end"),
        canceled_at: row.get("canceled_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[async_trait]
impl SubscriptionRepoTrait for PostgresPersistence {
    async fn create(&self, input: CreateSubscriptionInput) -> AppResult<Subscription> {
        let mut tx = begin_tenant(self.pool(), input.account_id).await?;

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO subscriptions
                (id, account_id, workspace_id, plan_price_id, status, current_period_end)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            SELECT_COLS
        ))
        .bind(input.id)
        .bind(input.account_id)
        .bind(input.workspace_id)
        .bind(input.plan_price_id)
        .bind(input.status.as_ref())
        .bind(input.current_period_end)
        .fetch_one(&mut *tx)
        .await
        .map_err(AppError::from)?;

        tx.commit().await.map_err(AppError::from)?;
        row_to_subscription(row)
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Subscription>> {
        let mut tx = begin_admin(self.pool()).await?;

        let row = sqlx::query(&format!(
            "SELECT {} FROM subscriptions WHERE id = $1",
            SELECT_COLS
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(AppError::from)?;

        tx.commit().await.map_err(AppError::from)?;
        row.map(row_to_subscription).transpose()
    }

    async fn find_latest_by_workspace_id(
        &self,
        workspace_id: Uuid,
    ) -> AppResult<Option<Subscription>> {
        let mut tx = begin_admin(self.pool()).await?;

        let row = sqlx::query(&format!(
            r#"
            SELECT {} FROM subscriptions
            WHERE workspace_id = $1
            ORDER BY created_at DESC
            LIMIT 1
            "#,
            SELECT_COLS
        ))
        .bind(workspace_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(AppError::from)?;

        tx.commit().await.map_err(AppError::from)?;
        row.map(row_to_subscription).transpose()
    }

    async fn update(
        &self,
        subscription: &Subscription,
        patch: SubscriptionPatch,
    ) -> AppResult<Subscription> {
        if patch.is_empty() {
            return Ok(subscription.clone());
        }

        let mut tx = begin_tenant(self.pool(), subscription.account_id).await?;

        let row = sqlx::query(&format!(
            r#"
            UPDATE subscriptions
            SET status = COALESCE($2, status),
                current_period_end = COALESCE($3, current_period_end),
                canceled_at = COALESCE($4, canceled_at),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            SELECT_COLS
        ))
        .bind(subscription.id)
        .bind(patch.status.map(|s| s.as_ref().to_string()))
        .bind(patch.current_period_end)
        .bind(patch.canceled_at)
        .fetch_optional(&mut *tx)
        .await
        .map_err(AppError::from)?
        .ok_or_else(|| AppError::NotFound(format!("subscription {}", subscription.id)))?;

        tx.commit().await.map_err(AppError::from)?;
        row_to_subscription(row)
    }
}
