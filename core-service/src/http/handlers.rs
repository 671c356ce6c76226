use super::state::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use core_sync::RunStatus;
use tracing::info;

/// POST /sync
/// Start a sync run unless one is already in progress
pub async fn trigger_sync(State(state): State<AppState>) -> impl IntoResponse {
    let was_running = state.orchestrator.is_running();
    let summary = state.orchestrator.trigger();

    if was_running {
        info!("Manual sync requested while a run is in progress");
    } else if summary.status == RunStatus::Running {
        info!(run_id = ?summary.run_id, "Manual sync started");
    }

    (StatusCode::ACCEPTED, Json(summary))
}

/// GET /status
pub async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.orchestrator.sync_status())
}

/// GET /health
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
