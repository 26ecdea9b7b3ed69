use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    app_error::AppResult,
    domain::entities::directory::{BillingAccount, BillingUser, BillingWorkspace, Plan, PlanPrice},
};

/// Read access to platform entities billing depends on but does not own.
#[async_trait]
pub trait BillingDirectoryRepoTrait: Send + Sync {
    async fn find_user(&self, user_id: Uuid) -> AppResult<Option<BillingUser>>;

    async fn find_account(&self, account_id: Uuid) -> AppResult<Option<BillingAccount>>;

    async fn find_workspace(&self, workspace_id: Uuid) -> AppResult<Option<BillingWorkspace>>;

    async fn find_plan_by_code(&self, code: &str) -> AppResult<Option<Plan>>;

    async fn find_plan_by_id(&self, plan_id: Uuid) -> AppResult<Option<Plan>>;

    async fn find_current_price(&self, plan_id: Uuid) -> AppResult<Option<PlanPrice>>;

    async fn list_plan_prices(&self, plan_id: Uuid) -> AppResult<Vec<PlanPrice>>;

    /// Code of the plan the workspace is on through a live subscription, if any
    async fn workspace_plan_code(&self, workspace_id: Uuid) -> AppResult<Option<String>>;
}

#[async_trait]
pub trait BillingAuthorizer: Send + Sync {
    /// Fails with `Forbidden` unless `user` may manage billing of `workspace`.
    async fn require_manage_billing(
        &self,
        user: &BillingUser,
        workspace: &BillingWorkspace,
    ) -> AppResult<()>;
}
