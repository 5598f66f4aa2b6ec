//! WebSocket server for real-time progress streaming.
//!
//! This module provides bidirectional communication between the agent and
//! the external job queue:
//! - Agent -> queue: progress updates, status changes, logs
//! - Queue -> agent: control commands (cancel, status)

pub mod client;
pub mod handler;

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, error, info, warn};

/// Maximum number of queued messages per subscriber.
const BROADCAST_CAPACITY: usize = 1000;

/// WebSocket event types sent from agent to queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum WsEvent {
    /// Publish job started.
    #[serde(rename = "publish:started")]
    PublishStarted { job_id: String },

    /// Publish job progress update: `(state, percent, msg, eta_seconds)` as
    /// delivered synchronously from the engine's phase loop.
    #[serde(rename = "publish:progress")]
    PublishProgress(PublishProgressPayload),

    /// Publish job completed successfully.
    #[serde(rename = "publish:completed")]
    PublishCompleted { job_id: String },

    /// Publish job failed. `retryable` mirrors the engine's no-retry vs.
    /// retry distinction so the queue knows whether to reschedule it.
    /// When `retryable` is set, `recovery` carries the opaque resume blob
    /// the queue must hand back unchanged as the retried job's `recovery`
    /// field.
    #[serde(rename = "publish:failed")]
    PublishFailed {
        job_id: String,
        error: String,
        retryable: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        recovery: Option<Vec<u8>>,
    },

    /// Agent status update.
    #[serde(rename = "agent:status")]
    AgentStatus(AgentStatusPayload),

    /// Log message.
    #[serde(rename = "agent:log")]
    LogMessage { level: String, message: String },
}

/// Progress information for a publish job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishProgressPayload {
    pub job_id: String,
    pub state: String,
    pub percent: Option<f64>,
    pub msg: Option<String>,
    pub eta_seconds: Option<f64>,
}

/// Agent status information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStatusPayload {
    pub status: String, // "idle", "running"
    pub active_jobs: usize,
    pub uptime_secs: u64,
}

/// WebSocket command types received locally (e.g. from an operator
/// dashboard connected to this agent's own `/ws` endpoint).
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum WsCommand {
    /// Cancel a publish job.
    #[serde(rename = "publish:cancel")]
    CancelPublish { job_id: String },

    /// Request agent status.
    #[serde(rename = "agent:status")]
    GetStatus,
}

/// Shared WebSocket state.
#[derive(Clone)]
pub struct WsState {
    /// Broadcast channel for sending events to all connected clients.
    pub tx: broadcast::Sender<WsEvent>,
}

impl WsState {
    /// Create a new WebSocket state.
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(BROADCAST_CAPACITY);
        Self { tx }
    }

    /// Broadcast an event to all connected WebSocket clients.
    pub fn broadcast(&self, event: WsEvent) {
        match self.tx.send(event.clone()) {
            Ok(count) => {
                debug!("Broadcast event to {} client(s): {:?}", count, event);
            }
            Err(e) => {
                warn!("Failed to broadcast event (no receivers): {:?}", e);
            }
        }
    }

    /// Subscribe to events (for new WebSocket connections).
    pub fn subscribe(&self) -> broadcast::Receiver<WsEvent> {
        self.tx.subscribe()
    }
}

impl Default for WsState {
    fn default() -> Self {
        Self::new()
    }
}

/// WebSocket upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    axum::extract::State(app_state): axum::extract::State<crate::api::AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state))
}

/// Handle a WebSocket connection.
async fn handle_socket(socket: WebSocket, app_state: crate::api::AppState) {
    info!("New WebSocket client connected");

    let (mut sender, mut receiver) = socket.split();

    let state_read = app_state.ws_state.read().await;
    let mut rx = state_read.subscribe();
    drop(state_read);

    let mut send_task = tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => {
                    if sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    error!("Failed to serialize event: {:?}", e);
                }
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                match serde_json::from_str::<WsCommand>(&text) {
                    Ok(command) => {
                        handler::handle_command(command, &app_state).await;
                    }
                    Err(e) => {
                        warn!("Failed to parse WebSocket command: {:?}", e);
                    }
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    info!("WebSocket client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ws_state_creation() {
        let state = WsState::new();
        state.broadcast(WsEvent::AgentStatus(AgentStatusPayload {
            status: "idle".to_string(),
            active_jobs: 0,
            uptime_secs: 0,
        }));
    }

    #[test]
    fn test_event_serialization() {
        let event = WsEvent::PublishProgress(PublishProgressPayload {
            job_id: "test-job".to_string(),
            state: "UPLOAD_FILES".to_string(),
            percent: Some(0.5),
            msg: None,
            eta_seconds: Some(12.0),
        });

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("publish:progress"));
        assert!(json.contains("test-job"));
    }

    #[test]
    fn test_command_deserialization() {
        let json = r#"{"type":"publish:cancel","payload":{"job_id":"test"}}"#;
        let command: WsCommand = serde_json::from_str(json).unwrap();

        match command {
            WsCommand::CancelPublish { job_id } => {
                assert_eq!(job_id, "test");
            }
            _ => panic!("Wrong command type"),
        }
    }
}
