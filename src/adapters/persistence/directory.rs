use async_trait::async_trait;
use sqlx::{Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::directory::{BillingAuthorizer, BillingDirectoryRepoTrait},
    domain::entities::directory::{BillingAccount, BillingUser, BillingWorkspace, Plan, PlanPrice},
};

/// Account roles allowed to manage billing.
const BILLING_ROLES: &[&str] = &["owner", "admin", "billing"];

const PLAN_COLS: &str = "id, code, name, is_active";
const PRICE_COLS: &str = "id, plan_id, amount_cents, currency, interval, is_current";

fn row_to_plan(row: PgRow) -> Plan {
    Plan {
        id: row.get("id"),
        code: row.get("code"),
        name: row.get("name"),
        is_active: row.get("is_active"),
    }
}

fn row_to_price(row: PgRow) -> PlanPrice {
    PlanPrice {
        id: row.get("id"),
        plan_id: row.get("plan_id"),
        amount_cents: row.get("amount_cents"),
        currency: row.get("currency"),
        interval: row.get("interval"),
        is_current: row.get("is_current"),
    }
}

#[async_trait]
impl BillingDirectoryRepoTrait for PostgresPersistence {
    async fn find_user(&self, user_id: Uuid) -> AppResult<Option<BillingUser>> {
        let row = sqlx::query("SELECT id, email, name FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(self.pool())
            .await
            .map_err(AppError::from)?;

        Ok(row.map(|row| BillingUser {
            id: row.get("id"),
            email: row.get("email"),
            name: row.get("name"),
        }))
    }

    async fn find_account(&self, account_id: Uuid) -> AppResult<Option<BillingAccount>> {
        let row = sqlx::query("SELECT id, name, billing_email FROM accounts WHERE id = $1")
            .bind(account_id)
            .fetch_optional(self.pool())
            .await
            .map_err(AppError::from)?;

        Ok(row.map(|row| BillingAccount {
            id: row.get("id"),
            name: row.get("name"),
            billing_email: row.get("billing_email"),
        }))
    }

    async fn find_workspace(&self, workspace_id: Uuid) -> AppResult<Option<BillingWorkspace>> {
        let row = sqlx::query("SELECT id, account_id, name FROM workspaces WHERE id = $1")
            .bind(workspace_id)
            .fetch_optional(self.pool())
            .await
            .map_err(AppError::from)?;

        Ok(row.map(|row| BillingWorkspace {
            id: row.get("id"),
            account_id: row.get("account_id"),
            name: row.get("name"),
        }))
    }

    async fn find_plan_by_code(&self, code: &str) -> AppResult<Option<Plan>> {
        let row = sqlx::query(&format!("SELECT {} FROM plans WHERE code = $1", PLAN_COLS))
            .bind(code)
            .fetch_optional(self.pool())
            .await
            .map_err(AppError::from)?;

        Ok(row.map(row_to_plan))
    }

    async fn find_plan_by_id(&self, plan_id: Uuid) -> AppResult<Option<Plan>> {
        let row = sqlx::query(&format!("SELECT {} FROM plans WHERE id = $1", PLAN_COLS))
            .bind(plan_id)
            .fetch_optional(self.pool())
            .await
            .map_err(AppError::from)?;

        Ok(row.map(row_to_plan))
    }

    async fn find_current_price(&self, plan_id: Uuid) -> AppResult<Option<PlanPrice>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {} FROM plan_prices
            WHERE plan_id = $1 AND is_current
            ORDER BY created_at DESC
            LIMIT 1
            "#,
            PRICE_COLS
        ))
        .bind(plan_id)
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(row.map(row_to_price))
    }

    async fn list_plan_prices(&self, plan_id: Uuid) -> AppResult<Vec<PlanPrice>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM plan_prices WHERE plan_id = $1 ORDER BY created_at",
            PRICE_COLS
        ))
        .bind(plan_id)
        .fetch_all(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(rows.into_iter().map(row_to_price).collect())
    }

    async fn workspace_plan_code(&self, workspace_id: Uuid) -> AppResult<Option<String>> {
        let row = sqlx::query(
            r#"
            SELECT p.code
            FROM subscriptions s
            JOIN plan_prices pp ON pp.id = s.plan_price_id
            JOIN plans p ON p.id = pp.plan_id
            WHERE s.workspace_id = $1 AND s.status IN ('active', 'past_due')
            ORDER BY s.created_at DESC
            LIMIT 1
            "#,
        )
        .bind(workspace_id)
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(row.map(|row| row.get("code")))
    }
}

#[async_trait]
impl BillingAuthorizer for PostgresPersistence {
    async fn require_manage_billing(
        &self,
        user: &BillingUser,
        workspace: &BillingWorkspace,
    ) -> AppResult<()> {
        let roles: Vec<String> = BILLING_ROLES.iter().map(|r| r.to_string()).collect();
        let allowed: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM account_members
                WHERE account_id = $1 AND user_id = $2 AND role = ANY($3)
            )
            "#,
        )
        .bind(workspace.account_id)
        .bind(user.id)
        .bind(&roles)
        .fetch_one(self.pool())
        .await
        .map_err(AppError::from)?;

        if !allowed {
            tracing::warn!(
                user_id = %user.id,
                workspace_id = %workspace.id,
                "User may not manage billing for workspace"
            );
            return Err(AppError::Forbidden);
        }
        Ok(())
    }
}
