//! HTTP trigger surface
//!
//! Thin adapter over the orchestrator:
//! - POST /sync - Start a run in the background (202 with the current summary)
//! - GET /status - Summary of the current or last run
//! - GET /health - Liveness probe

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
