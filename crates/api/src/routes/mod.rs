pub mod health;
pub mod history;

use axum::Router;

use crate::middleware;
use crate::state::AppState;

/// Assemble the full router with all route groups and middleware.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(health::routes())
        .merge(history::routes())
        .layer(middleware::request_tracing::trace_layer())
        .layer(middleware::cors::cors_layer())
        .with_state(state)
}
