//! Row-level-security scoping.
//!
//! Tenant-owned tables are protected by policies reading the
//! `app.current_account_id` and `app.is_admin` settings. Both are set with
//! `set_config(.., true)`, so they last only until the transaction ends and
//! never leak onto a pooled connection.

use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::app_error::{AppError, AppResult};

/// Open a transaction scoped to one account.
pub async fn begin_tenant(
    pool: &PgPool,
    account_id: Uuid,
) -> AppResult<Transaction<'static, Postgres>> {
    let mut tx = pool.begin().await.map_err(AppError::from)?;
    sqlx::query("SELECT set_config('app.current_account_id', $1, true)")
        .bind(account_id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(AppError::from)?;
    Ok(tx)
}

/// Open a transaction allowed to see every tenant (worker and system reads).
pub async fn begin_admin(pool: &PgPool) -> AppResult<Transaction<'static, Postgres>> {
    let mut tx = pool.begin().await.map_err(AppError::from)?;
    sqlx::query("SELECT set_config('app.is_admin', 'true', true)")
        .execute(&mut *tx)
        .await
        .map_err(AppError::from)?;
    Ok(tx)
}
