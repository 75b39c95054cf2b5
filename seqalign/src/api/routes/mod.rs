//! API route modules.

pub mod health;
pub mod jobs;
pub mod logging;

use axum::Router;

use crate::api::server::AppState;

/// Create the router with all API routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(jobs::router())
        .merge(health::router())
        .nest("/logging", logging::router())
        .with_state(state)
}
