use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};
use secrecy::ExposeSecret;
use uuid::Uuid;

use crate::{
    adapters::http::app_state::AppState, app_error::AppError,
    infra::stripe_client::constant_time_compare,
};

/// Header carrying the authenticated user id, set by the upstream auth proxy.
pub const ACTING_USER_HEADER: &str = "x-user-id";

/// Guards the /manager routes with the `ADMIN_API_KEY` bearer token.
/// Without a configured key every request is rejected.
pub async fn admin_auth(
    State(app_state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(expected) = app_state.config.admin_api_key.as_ref() else {
        tracing::warn!(
            operation = "http.admin-auth.disabled",
            "Admin route called but ADMIN_API_KEY is not set"
        );
        return Err(AppError::Unauthorized);
    };

    let provided = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .ok_or(AppError::Unauthorized)?;

    if !constant_time_compare(provided, expected.expose_secret()) {
        return Err(AppError::Unauthorized);
    }

    Ok(next.run(request).await)
}

/// The user on whose behalf a billing command runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActingUser(pub Uuid);

impl<S: Send + Sync> FromRequestParts<S> for ActingUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(ACTING_USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| Uuid::parse_str(v.trim()).ok())
            .map(ActingUser)
            .ok_or(AppError::Unauthorized)
    }
}
