use serde::Serialize;
use uuid::Uuid;

// Read-only views of entities owned by the rest of the platform.

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BillingUser {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BillingAccount {
    pub id: Uuid,
    pub name: String,
    pub billing_email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BillingWorkspace {
    pub id: Uuid,
    pub account_id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Plan {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanPrice {
    pub id: Uuid,
    pub plan_id: Uuid,
    pub amount_cents: i64,
    pub currency: String,
    pub interval: String,
    pub is_current: bool,
}
