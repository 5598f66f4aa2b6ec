//! `/jobs` introspection endpoint, useful for operators without requiring
//! the external queue.

use axum::{extract::State, response::IntoResponse, Json};
use serde_json::json;

use super::AppState;

/// GET /jobs - list currently running publish jobs.
pub async fn list(State(state): State<AppState>) -> impl IntoResponse {
    let job_ids = state.job_tracker.job_ids().await;
    Json(json!({ "running": job_ids }))
}
