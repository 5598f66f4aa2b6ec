//! HTTP API module for the publisher agent.

pub mod health;
pub mod job_tracker;
pub mod jobs;

use axum::{routing::get, Router};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub ws_state: Arc<RwLock<crate::ws::WsState>>,
    pub job_tracker: job_tracker::JobTracker,
}

/// Create shared application state.
pub fn create_app_state() -> AppState {
    AppState {
        ws_state: Arc::new(RwLock::new(crate::ws::WsState::new())),
        job_tracker: job_tracker::JobTracker::new(),
    }
}

/// Create the API router with all endpoints.
pub fn create_router() -> Router {
    create_router_with_state(create_app_state())
}

/// Create the API router with a pre-existing state (allows sharing state
/// with the reverse WebSocket client).
pub fn create_router_with_state(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/version", get(health::version))
        .route("/jobs", get(jobs::list))
        .route("/ws", get(crate::ws::ws_handler))
        .with_state(state)
}
