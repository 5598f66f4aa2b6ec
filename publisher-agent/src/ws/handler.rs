//! Local WebSocket command handlers (operator dashboard commands received
//! over this agent's own `/ws` endpoint).

use super::WsCommand;
use crate::api::AppState;
use tracing::{info, warn};

/// Handle a WebSocket command from a locally connected client.
pub async fn handle_command(command: WsCommand, app_state: &AppState) {
    match command {
        WsCommand::CancelPublish { job_id } => {
            handle_cancel_publish(&job_id, app_state).await;
        }
        WsCommand::GetStatus => {
            handle_get_status(app_state).await;
        }
    }
}

async fn handle_cancel_publish(job_id: &str, app_state: &AppState) {
    info!("Received cancel command for job: {}", job_id);
    if app_state.job_tracker.cancel(job_id).await {
        info!("Job {} cancellation requested", job_id);
    } else {
        warn!("Job {} not found or already completed", job_id);
    }
}

async fn handle_get_status(app_state: &AppState) {
    let active_jobs = app_state.job_tracker.running_count().await;
    let status = if active_jobs > 0 { "running" } else { "idle" };
    let ws_state = app_state.ws_state.read().await;
    ws_state.broadcast(super::WsEvent::AgentStatus(super::AgentStatusPayload {
        status: status.to_string(),
        active_jobs,
        uptime_secs: 0,
    }));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_handle_cancel_command_on_unknown_job() {
        let app_state = crate::api::create_app_state();
        handle_command(
            WsCommand::CancelPublish { job_id: "test-job".to_string() },
            &app_state,
        )
        .await;
    }

    #[tokio::test]
    async fn test_handle_get_status_command() {
        let app_state = crate::api::create_app_state();
        handle_command(WsCommand::GetStatus, &app_state).await;
    }
}
