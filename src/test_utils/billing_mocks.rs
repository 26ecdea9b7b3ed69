//! In-memory mock implementations for billing repository traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::use_cases::{
        directory::{BillingAuthorizer, BillingDirectoryRepoTrait},
        dunning::DunningRepoTrait,
        provider_mapping::ProviderMappingRepoTrait,
        subscription::{SubscriptionPatch, SubscriptionRepoTrait},
        webhook_processing::WebhookEventRepoTrait,
    },
    domain::entities::{
        directory::{BillingAccount, BillingUser, BillingWorkspace, Plan, PlanPrice},
        dunning::DunningRecord,
        mapping_entity_type::MappingEntityType,
        payment_provider::PaymentProvider,
        provider_mapping::{CreateMappingInput, ProviderMapping},
        subscription::{CreateSubscriptionInput, Subscription},
        webhook_event::{CreateWebhookEventInput, WebhookEventRecord, WebhookStatus},
    },
};

// ============================================================================
// InMemoryProviderMappingRepo
// ============================================================================

/// Rows are kept in insertion order; "newest" means inserted last.
#[derive(Default)]
pub struct InMemoryProviderMappingRepo {
    pub mappings: Mutex<Vec<ProviderMapping>>,
    fail_replace: AtomicBool,
}

impl InMemoryProviderMappingRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `replace_active` fail with a database error until switched off.
    pub fn fail_replace(&self, fail: bool) {
        self.fail_replace.store(fail, Ordering::SeqCst);
    }

    pub fn all(&self) -> Vec<ProviderMapping> {
        self.mappings.lock().unwrap().clone()
    }

    fn insert_row(rows: &mut Vec<ProviderMapping>, input: CreateMappingInput) -> ProviderMapping {
        let now = Utc::now();
        let mapping = ProviderMapping {
            id: Uuid::new_v4(),
            entity_type: input.entity_type,
            entity_id: input.entity_id,
            provider: input.provider,
            provider_id: input.provider_id,
            is_active: true,
            metadata: input.metadata,
            created_at: now,
            updated_at: now,
        };
        rows.push(mapping.clone());
        mapping
    }
}

#[async_trait]
impl ProviderMappingRepoTrait for InMemoryProviderMappingRepo {
    async fn find_by_entity_type_and_id(
        &self,
        entity_type: MappingEntityType,
        entity_id: Uuid,
    ) -> AppResult<Vec<ProviderMapping>> {
        Ok(self
            .mappings
            .lock()
            .unwrap()
            .iter()
            .rev()
            .filter(|m| m.entity_type == entity_type && m.entity_id == entity_id)
            .cloned()
            .collect())
    }

    async fn find_by_provider_and_provider_id(
        &self,
        provider: PaymentProvider,
        provider_id: &str,
    ) -> AppResult<Option<ProviderMapping>> {
        let rows = self.mappings.lock().unwrap();
        let mut matching = rows
            .iter()
            .rev()
            .filter(|m| m.provider == provider && m.provider_id == provider_id);
        let newest = matching.clone().next().cloned();
        Ok(matching.find(|m| m.is_active).cloned().or(newest))
    }

    async fn find_by_provider_id_of_type(
        &self,
        provider: PaymentProvider,
        provider_id: &str,
        entity_type: MappingEntityType,
    ) -> AppResult<Option<ProviderMapping>> {
        Ok(self
            .mappings
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|m| {
                m.is_active
                    && m.provider == provider
                    && m.provider_id == provider_id
                    && m.entity_type == entity_type
            })
            .cloned())
    }

    async fn find_by_entity_and_provider(
        &self,
        entity_type: MappingEntityType,
        entity_id: Uuid,
        provider: PaymentProvider,
    ) -> AppResult<Option<ProviderMapping>> {
        Ok(self
            .mappings
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|m| {
                m.entity_type == entity_type && m.entity_id == entity_id && m.provider == provider
            })
            .cloned())
    }

    async fn find_active_by_entity_and_provider(
        &self,
        entity_type: MappingEntityType,
        entity_id: Uuid,
        provider: PaymentProvider,
    ) -> AppResult<Option<ProviderMapping>> {
        Ok(self
            .mappings
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|m| {
                m.is_active
                    && m.entity_type == entity_type
                    && m.entity_id == entity_id
                    && m.provider == provider
            })
            .cloned())
    }

    async fn create(&self, input: CreateMappingInput) -> AppResult<ProviderMapping> {
        let mut rows = self.mappings.lock().unwrap();
        let taken = rows.iter().any(|m| {
            m.is_active
                && m.entity_type == input.entity_type
                && m.entity_id == input.entity_id
                && m.provider == input.provider
        });
        if taken {
            return Err(AppError::Conflict("active mapping already exists".into()));
        }
        Ok(Self::insert_row(&mut rows, input))
    }

    async fn deactivate_by_entity(
        &self,
        entity_type: MappingEntityType,
        entity_id: Uuid,
    ) -> AppResult<u64> {
        let mut rows = self.mappings.lock().unwrap();
        let mut changed = 0;
        for m in rows
            .iter_mut()
            .filter(|m| m.is_active && m.entity_type == entity_type && m.entity_id == entity_id)
        {
            m.is_active = false;
            m.updated_at = Utc::now();
            changed += 1;
        }
        Ok(changed)
    }

    async fn replace_active(&self, input: CreateMappingInput) -> AppResult<ProviderMapping> {
        if self.fail_replace.load(Ordering::SeqCst) {
            return Err(AppError::Database("connection reset".into()));
        }
        let mut rows = self.mappings.lock().unwrap();
        for m in rows.iter_mut().filter(|m| {
            m.is_active
                && m.entity_type == input.entity_type
                && m.entity_id == input.entity_id
                && m.provider == input.provider
        }) {
            m.is_active = false;
            m.updated_at = Utc::now();
        }
        Ok(Self::insert_row(&mut rows, input))
    }
}

// ============================================================================
// InMemorySubscriptionRepo
// ============================================================================

#[derive(Default)]
pub struct InMemorySubscriptionRepo {
    pub subscriptions: Mutex<Vec<Subscription>>,
    fail_updates: AtomicBool,
}

impl InMemorySubscriptionRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, subscription: Subscription) -> Subscription {
        self.subscriptions.lock().unwrap().push(subscription.clone());
        subscription
    }

    pub fn get(&self, id: Uuid) -> Option<Subscription> {
        self.subscriptions
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.id == id)
            .cloned()
    }

    pub fn all(&self) -> Vec<Subscription> {
        self.subscriptions.lock().unwrap().clone()
    }

    /// Make every `update` fail with a database error until switched off.
    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl SubscriptionRepoTrait for InMemorySubscriptionRepo {
    async fn create(&self, input: CreateSubscriptionInput) -> AppResult<Subscription> {
        let now = Utc::now();
        if self.get(input.id).is_some() {
            return Err(AppError::Conflict("subscription already exists".into()));
        }
        Ok(self.insert(Subscription {
            id: input.id,
            account_id: input.account_id,
            workspace_id: input.workspace_id,
            plan_price_id: input.plan_price_id,
            status: input.status,
            current_period_end: input.current_period_end,
            canceled_at: None,
            created_at: now,
            updated_at: now,
        }))
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Subscription>> {
        Ok(self.get(id))
    }

    async fn find_latest_by_workspace_id(
        &self,
        workspace_id: Uuid,
    ) -> AppResult<Option<Subscription>> {
        Ok(self
            .subscriptions
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|s| s.workspace_id == workspace_id)
            .cloned())
    }

    async fn update(
        &self,
        subscription: &Subscription,
        patch: SubscriptionPatch,
    ) -> AppResult<Subscription> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(AppError::Database("connection reset".into()));
        }
        let mut rows = self.subscriptions.lock().unwrap();
        let row = rows
            .iter_mut()
            .find(|s| s.id == subscription.id)
            .ok_or_else(|| AppError::NotFound("subscription".into()))?;
        if let Some(status) = patch.status {
            row.status = status;
        }
        if let Some(end) = patch.current_period_end {
            row.current_period_end = Some(end);
        }
        if let Some(at) = patch.canceled_at {
            row.canceled_at = Some(at);
        }
        row.updated_at = Utc::now();
        Ok(row.clone())
    }
}

// ============================================================================
// InMemoryDunningRepo
// ============================================================================

#[derive(Default)]
pub struct InMemoryDunningRepo {
    pub records: Mutex<HashMap<Uuid, DunningRecord>>,
}

impl InMemoryDunningRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: DunningRecord) {
        self.records
            .lock()
            .unwrap()
            .insert(record.subscription_id, record);
    }

    pub fn get_record(&self, subscription_id: Uuid) -> Option<DunningRecord> {
        self.records.lock().unwrap().get(&subscription_id).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().unwrap().is_empty()
    }
}

#[async_trait]
impl DunningRepoTrait for InMemoryDunningRepo {
    async fn record_failure(
        &self,
        subscription_id: Uuid,
        event_id: &str,
        at: DateTime<Utc>,
    ) -> AppResult<DunningRecord> {
        let mut records = self.records.lock().unwrap();
        let record = records
            .entry(subscription_id)
            .and_modify(|r| {
                if r.last_event_id.as_deref() != Some(event_id) {
                    r.failure_count += 1;
                    r.last_failure_at = at;
                    r.last_event_id = Some(event_id.to_string());
                }
            })
            .or_insert(DunningRecord {
                subscription_id,
                failure_count: 1,
                first_failure_at: at,
                last_failure_at: at,
                last_event_id: Some(event_id.to_string()),
            });
        Ok(record.clone())
    }

    async fn get(&self, subscription_id: Uuid) -> AppResult<Option<DunningRecord>> {
        Ok(self.get_record(subscription_id))
    }

    async fn clear(&self, subscription_id: Uuid) -> AppResult<bool> {
        Ok(self.records.lock().unwrap().remove(&subscription_id).is_some())
    }

    async fn list(&self) -> AppResult<Vec<DunningRecord>> {
        let mut records: Vec<_> = self.records.lock().unwrap().values().cloned().collect();
        records.sort_by_key(|r| r.first_failure_at);
        Ok(records)
    }
}

// ============================================================================
// InMemoryWebhookEventRepo
// ============================================================================

#[derive(Default)]
pub struct InMemoryWebhookEventRepo {
    pub records: Mutex<Vec<WebhookEventRecord>>,
}

impl InMemoryWebhookEventRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<WebhookEventRecord> {
        self.records.lock().unwrap().clone()
    }

    fn modify(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut WebhookEventRecord),
    ) -> AppResult<WebhookEventRecord> {
        let mut records = self.records.lock().unwrap();
        let record = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| AppError::NotFound("webhook event".into()))?;
        f(record);
        record.updated_at = Utc::now();
        Ok(record.clone())
    }
}

#[async_trait]
impl WebhookEventRepoTrait for InMemoryWebhookEventRepo {
    async fn find_by_raw_event_id(
        &self,
        provider: PaymentProvider,
        raw_event_id: &str,
    ) -> AppResult<Option<WebhookEventRecord>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|r| r.provider == provider && r.raw_event_id == raw_event_id)
            .cloned())
    }

    async fn create(&self, input: CreateWebhookEventInput) -> AppResult<WebhookEventRecord> {
        let now = Utc::now();
        let record = WebhookEventRecord {
            id: Uuid::new_v4(),
            account_id: input.account_id,
            provider: input.provider,
            webhook_type: input.webhook_type,
            event_name: input.event_name,
            status: WebhookStatus::Pending,
            payload: input.payload,
            raw_event_id: input.raw_event_id,
            idempotency_key: input.idempotency_key,
            queue_name: input.queue_name,
            attempts: 1,
            skip_reason: None,
            error_message: None,
            processed_at: None,
            created_at: now,
            updated_at: now,
        };
        self.records.lock().unwrap().push(record.clone());
        Ok(record)
    }

    async fn mark_retrying(&self, id: Uuid) -> AppResult<WebhookEventRecord> {
        self.modify(id, |r| {
            r.status = WebhookStatus::Pending;
            r.attempts += 1;
        })
    }

    async fn mark_processed(&self, id: Uuid, skip_reason: Option<&str>) -> AppResult<()> {
        self.modify(id, |r| {
            r.status = WebhookStatus::Processed;
            r.skip_reason = skip_reason.map(str::to_string);
            r.error_message = None;
            r.processed_at = Some(Utc::now());
        })
        .map(|_| ())
    }

    async fn mark_failed(&self, id: Uuid, error_message: &str) -> AppResult<()> {
        self.modify(id, |r| {
            r.status = WebhookStatus::Failed;
            r.error_message = Some(error_message.to_string());
        })
        .map(|_| ())
    }
}

// ============================================================================
// InMemoryDirectory
// ============================================================================

/// Users, accounts, workspaces and the plan catalog, plus a deny list for
/// billing authorization.
#[derive(Default)]
pub struct InMemoryDirectory {
    users: Mutex<HashMap<Uuid, BillingUser>>,
    accounts: Mutex<HashMap<Uuid, BillingAccount>>,
    workspaces: Mutex<HashMap<Uuid, BillingWorkspace>>,
    plans: Mutex<Vec<Plan>>,
    prices: Mutex<Vec<PlanPrice>>,
    workspace_plans: Mutex<HashMap<Uuid, String>>,
    denied: Mutex<HashSet<Uuid>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, user: BillingUser) -> BillingUser {
        self.users.lock().unwrap().insert(user.id, user.clone());
        user
    }

    pub fn add_account(&self, account: BillingAccount) -> BillingAccount {
        self.accounts.lock().unwrap().insert(account.id, account.clone());
        account
    }

    pub fn add_workspace(&self, workspace: BillingWorkspace) -> BillingWorkspace {
        self.workspaces
            .lock()
            .unwrap()
            .insert(workspace.id, workspace.clone());
        workspace
    }

    pub fn add_plan(&self, plan: Plan) -> Plan {
        self.plans.lock().unwrap().push(plan.clone());
        plan
    }

    pub fn add_price(&self, price: PlanPrice) -> PlanPrice {
        self.prices.lock().unwrap().push(price.clone());
        price
    }

    pub fn set_workspace_plan(&self, workspace_id: Uuid, plan_code: &str) {
        self.workspace_plans
            .lock()
            .unwrap()
            .insert(workspace_id, plan_code.to_string());
    }

    /// Refuse billing management to this user.
    pub fn deny_user(&self, user_id: Uuid) {
        self.denied.lock().unwrap().insert(user_id);
    }
}

#[async_trait]
impl BillingDirectoryRepoTrait for InMemoryDirectory {
    async fn find_user(&self, user_id: Uuid) -> AppResult<Option<BillingUser>> {
        Ok(self.users.lock().unwrap().get(&user_id).cloned())
    }

    async fn find_account(&self, account_id: Uuid) -> AppResult<Option<BillingAccount>> {
        Ok(self.accounts.lock().unwrap().get(&account_id).cloned())
    }

    async fn find_workspace(&self, workspace_id: Uuid) -> AppResult<Option<BillingWorkspace>> {
        Ok(self.workspaces.lock().unwrap().get(&workspace_id).cloned())
    }

    async fn find_plan_by_code(&self, code: &str) -> AppResult<Option<Plan>> {
        Ok(self
            .plans
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.code == code)
            .cloned())
    }

    async fn find_plan_by_id(&self, plan_id: Uuid) -> AppResult<Option<Plan>> {
        Ok(self
            .plans
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.id == plan_id)
            .cloned())
    }

    async fn find_current_price(&self, plan_id: Uuid) -> AppResult<Option<PlanPrice>> {
        Ok(self
            .prices
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.plan_id == plan_id && p.is_current)
            .cloned())
    }

    async fn list_plan_prices(&self, plan_id: Uuid) -> AppResult<Vec<PlanPrice>> {
        Ok(self
            .prices
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.plan_id == plan_id)
            .cloned()
            .collect())
    }

    async fn workspace_plan_code(&self, workspace_id: Uuid) -> AppResult<Option<String>> {
        Ok(self.workspace_plans.lock().unwrap().get(&workspace_id).cloned())
    }
}

#[async_trait]
impl BillingAuthorizer for InMemoryDirectory {
    async fn require_manage_billing(
        &self,
        user: &BillingUser,
        _workspace: &BillingWorkspace,
    ) -> AppResult<()> {
        if self.denied.lock().unwrap().contains(&user.id) {
            return Err(AppError::Forbidden);
        }
        Ok(())
    }
}
