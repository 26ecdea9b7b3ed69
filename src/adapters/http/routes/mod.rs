pub mod billing;
pub mod gateway;

use axum::{Router, middleware};

use crate::adapters::http::{app_state::AppState, middleware::admin_auth};

pub fn router(app_state: AppState) -> Router<AppState> {
    Router::new()
        .nest("/billing", billing::router())
        .nest(
            "/manager",
            gateway::router().layer(middleware::from_fn_with_state(app_state, admin_auth)),
        )
}
