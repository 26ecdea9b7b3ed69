use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
};
use uuid::Uuid;

use crate::{
    adapters::http::{app_state::AppState, middleware::ACTING_USER_HEADER},
    app_error::{AppError, AppResult},
    application::use_cases::gateway_admin::LinkGatewayPlanInput,
    domain::entities::payment_provider::PaymentProvider,
};

/// Returns the operator router.
/// Note: The admin_auth middleware is applied in mod.rs when nesting this router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/gateways", get(list_gateways))
        .route("/gateways/{provider}/products", get(list_products))
        .route(
            "/gateways/{provider}/products/{product_id}/prices",
            get(list_prices),
        )
        .route("/gateways/{provider}/health", get(health_check))
        .route("/plans/{plan_id}/link-gateway", post(link_gateway_plan))
}

fn parse_provider(raw: &str) -> AppResult<PaymentProvider> {
    raw.parse()
        .map_err(|_| AppError::UnknownProvider(raw.to_string()))
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /manager/gateways
async fn list_gateways(State(app_state): State<AppState>) -> impl IntoResponse {
    Json(app_state.gateway_admin_use_cases.list_gateways())
}

/// GET /manager/gateways/{provider}/products
async fn list_products(
    State(app_state): State<AppState>,
    Path(provider): Path<String>,
) -> AppResult<impl IntoResponse> {
    let products = app_state
        .gateway_admin_use_cases
        .list_products(parse_provider(&provider)?)
        .await?;
    Ok(Json(products))
}

/// GET /manager/gateways/{provider}/products/{product_id}/prices
async fn list_prices(
    State(app_state): State<AppState>,
    Path((provider, product_id)): Path<(String, String)>,
) -> AppResult<impl IntoResponse> {
    let prices = app_state
        .gateway_admin_use_cases
        .list_prices(parse_provider(&provider)?, &product_id)
        .await?;
    Ok(Json(prices))
}

/// GET /manager/gateways/{provider}/health
async fn health_check(
    State(app_state): State<AppState>,
    Path(provider): Path<String>,
) -> AppResult<impl IntoResponse> {
    let health = app_state
        .gateway_admin_use_cases
        .health_check(parse_provider(&provider)?)
        .await?;
    Ok(Json(health))
}

/// POST /manager/plans/{plan_id}/link-gateway
/// The optional `x-user-id` header is recorded as the operator who linked it.
async fn link_gateway_plan(
    State(app_state): State<AppState>,
    Path(plan_id): Path<Uuid>,
    headers: HeaderMap,
    Json(input): Json<LinkGatewayPlanInput>,
) -> AppResult<StatusCode> {
    let linked_by = headers
        .get(ACTING_USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v.trim()).ok());

    app_state
        .gateway_admin_use_cases
        .link_gateway_plan(plan_id, input, linked_by)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
