use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
    response::IntoResponse,
    routing::post,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    adapters::http::{app_state::AppState, middleware::ActingUser},
    app_error::AppResult,
    application::use_cases::{billing::CheckoutRequest, webhook_ingestion::IngestionOutcome},
    domain::entities::subscription::SubscriptionStatus,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/webhook/{provider}", post(receive_webhook))
        .route("/checkout", post(create_checkout))
        .route("/portal", post(create_portal))
        .route("/cancel", post(cancel_subscription))
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Serialize)]
struct WebhookAck {
    received: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckoutResponse {
    url: String,
    session_id: String,
}

#[derive(Serialize)]
struct PortalResponse {
    url: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WorkspacePayload {
    workspace_id: Uuid,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CancelResponse {
    subscription_id: Uuid,
    status: SubscriptionStatus,
    canceled_at: Option<chrono::DateTime<chrono::Utc>>,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /billing/webhook/{provider}
/// Verifies and enqueues a provider webhook. Processing happens in the worker.
async fn receive_webhook(
    State(app_state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<impl IntoResponse> {
    let outcome = app_state
        .webhook_ingestion_use_cases
        .receive(&provider, &body, &headers)
        .await?;

    if let IngestionOutcome::Enqueued { job_id } = &outcome {
        tracing::debug!(provider = %provider, job_id = %job_id, "Webhook accepted");
    }

    Ok(Json(WebhookAck { received: true }))
}

/// POST /billing/checkout
async fn create_checkout(
    State(app_state): State<AppState>,
    ActingUser(user_id): ActingUser,
    Json(request): Json<CheckoutRequest>,
) -> AppResult<impl IntoResponse> {
    let session = app_state
        .billing_use_cases
        .create_checkout_session(user_id, request)
        .await?;

    Ok(Json(CheckoutResponse {
        url: session.url,
        session_id: session.session_id,
    }))
}

/// POST /billing/portal
async fn create_portal(
    State(app_state): State<AppState>,
    ActingUser(user_id): ActingUser,
    Json(payload): Json<WorkspacePayload>,
) -> AppResult<impl IntoResponse> {
    let portal = app_state
        .billing_use_cases
        .create_portal_session(user_id, payload.workspace_id)
        .await?;

    Ok(Json(PortalResponse { url: portal.url }))
}

/// POST /billing/cancel
async fn cancel_subscription(
    State(app_state): State<AppState>,
    ActingUser(user_id): ActingUser,
    Json(payload): Json<WorkspacePayload>,
) -> AppResult<impl IntoResponse> {
    let subscription = app_state
        .billing_use_cases
        .cancel_subscription(user_id, payload.workspace_id)
        .await?;

    Ok(Json(CancelResponse {
        subscription_id: subscription.id,
        status: subscription.status,
        canceled_at: subscription.canceled_at,
    }))
}
