use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/sync", post(handlers::trigger_sync))
        .route("/status", get(handlers::get_status))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
