//! Reverse WebSocket client - connects to the external job queue.
//!
//! The agent initiates and maintains a persistent WebSocket connection to
//! the queue at `ws://{queue_url}/ws/agent`. This is the primary
//! communication channel for:
//! - Registration handshake (agent identity)
//! - Receiving publish jobs (start, cancel)
//! - Forwarding local WsEvent broadcasts to the queue (progress, completion)

use crate::api::AppState;
use crate::backend::factory;
use crate::backend::legacy::DefaultLegacyDetector;
use crate::config::{Config, DestinationConfig};
use crate::engine::{self, EngineError, RunOptions};
use crate::ws::{PublishProgressPayload, WsEvent};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Commands received from the job queue via WebSocket.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ServerCommand {
    #[serde(rename = "publish:start")]
    StartPublish(PublishJobPayload),

    #[serde(rename = "publish:cancel")]
    CancelPublish { job_id: String },

    /// Registration acknowledgment from the queue.
    #[serde(rename = "agent:register:ok")]
    RegisterOk { server_id: String },

    #[serde(rename = "agent:register:error")]
    RegisterError { error: String },
}

/// A publish job dispatch: identifies the job, the archive to stage, and
/// the destination profile to synchronize it to.
#[derive(Debug, Clone, Deserialize)]
pub struct PublishJobPayload {
    pub job_id: String,
    /// URL the site archive can be downloaded from.
    pub archive_url: String,
    /// Name of an entry in `config.destinations` to publish to.
    pub destination: String,
    #[serde(default)]
    pub writeable_list: Vec<String>,
    #[serde(default)]
    pub cache_list: Vec<String>,
    /// Opaque recovery blob from a previous failed attempt at this job, if
    /// any.
    #[serde(default)]
    pub recovery: Option<Vec<u8>>,
}

/// Reverse WebSocket client that connects to the job queue.
pub struct AgentWsClient {
    server_url: String,
    server_id: Option<String>,
    agent_id: String,
    app_state: AppState,
    config: Arc<Config>,
    shutdown: CancellationToken,
}

impl AgentWsClient {
    pub fn new(
        server_url: String,
        server_id: Option<String>,
        agent_id: String,
        app_state: AppState,
        config: Arc<Config>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            server_url,
            server_id,
            agent_id,
            app_state,
            config,
            shutdown,
        }
    }

    /// Run the WebSocket client with automatic reconnection.
    pub async fn run(&self) {
        let mut backoff_ms: u64 = 1000;
        let max_backoff_ms: u64 = 30000;

        loop {
            if self.shutdown.is_cancelled() {
                info!("WS client shutting down");
                return;
            }

            match self.connect_and_run().await {
                Ok(()) => {
                    info!("WS client connection closed normally");
                    backoff_ms = 1000; // Reset backoff on clean disconnect
                }
                Err(e) => {
                    warn!("WS client connection error: {}", e);
                }
            }

            if self.shutdown.is_cancelled() {
                return;
            }

            info!("Reconnecting in {}ms...", backoff_ms);
            tokio::select! {
                _ = tokio::time::sleep(tokio::time::Duration::from_millis(backoff_ms)) => {}
                _ = self.shutdown.cancelled() => return,
            }

            backoff_ms = (backoff_ms * 2).min(max_backoff_ms);
        }
    }

    async fn connect_and_run(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let ws_url = self.server_url.replace("http://", "ws://").replace("https://", "wss://");
        let url = format!("{}/ws/agent", ws_url);

        info!("Connecting to queue WebSocket: {}", url);

        let (ws_stream, _) = connect_async(&url).await?;
        let (mut write, mut read) = ws_stream.split();

        info!("Connected to queue WebSocket");

        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown".to_string());

        let register_msg = serde_json::json!({
            "type": "agent:register",
            "payload": {
                "hostname": hostname,
                "version": env!("CARGO_PKG_VERSION"),
                "server_id": self.server_id,
                "agent_id": self.agent_id,
            }
        });

        write.send(Message::Text(register_msg.to_string().into())).await?;
        info!("Registration handshake sent");

        let ws_state = self.app_state.ws_state.read().await;
        let mut rx = ws_state.tx.subscribe();
        drop(ws_state);

        let app_state = self.app_state.clone();
        let config = self.config.clone();
        let shutdown = self.shutdown.clone();

        loop {
            tokio::select! {
                // Forward local events to the queue
                event = rx.recv() => {
                    match event {
                        Ok(ws_event) => {
                            if let Ok(json) = serde_json::to_string(&ws_event) {
                                if write.send(Message::Text(json.into())).await.is_err() {
                                    break;
                                }
                            }
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            warn!("WS client lagged by {} messages", n);
                        }
                        Err(_) => break,
                    }
                }

                // Handle incoming messages from the queue
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            handle_server_message(&text, &app_state, &config).await;
                        }
                        Some(Ok(Message::Ping(data))) => {
                            if write.send(Message::Pong(data)).await.is_err() {
                                break;
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            info!("Queue closed WebSocket connection");
                            break;
                        }
                        Some(Err(e)) => {
                            error!("WebSocket read error: {}", e);
                            break;
                        }
                        _ => {}
                    }
                }

                _ = shutdown.cancelled() => {
                    info!("Shutdown signal received, closing WS client");
                    let _ = write.send(Message::Close(None)).await;
                    break;
                }
            }
        }

        Ok(())
    }
}

/// Handle a message received from the job queue.
async fn handle_server_message(text: &str, app_state: &AppState, config: &Arc<Config>) {
    let parsed: Result<ServerCommand, _> = serde_json::from_str(text);

    match parsed {
        Ok(ServerCommand::StartPublish(payload)) => {
            handle_start_publish(payload, app_state, config).await;
        }
        Ok(ServerCommand::CancelPublish { job_id }) => {
            handle_cancel_publish(&job_id, app_state).await;
        }
        Ok(ServerCommand::RegisterOk { server_id }) => {
            info!("Registration confirmed for server_id: {}", server_id);
        }
        Ok(ServerCommand::RegisterError { error }) => {
            error!("Registration failed: {}", error);
        }
        Err(e) => {
            warn!("Failed to parse server command: {} (raw: {})", e, text);
        }
    }
}

async fn handle_start_publish(payload: PublishJobPayload, app_state: &AppState, config: &Arc<Config>) {
    info!("Received publish:start command for job: {}", payload.job_id);

    let Some(destination) = config.destinations.get(&payload.destination).cloned() else {
        warn!("Unknown destination '{}' for job {}", payload.destination, payload.job_id);
        broadcast_failed(app_state, &payload.job_id, format!("unknown destination '{}'", payload.destination), false, None).await;
        return;
    };

    let working_dir = config.agent.data_dir.join("jobs").join(&payload.job_id);
    if let Err(e) = std::fs::create_dir_all(&working_dir) {
        broadcast_failed(app_state, &payload.job_id, format!("could not create workspace: {e}"), false, None).await;
        return;
    }

    let http_client = reqwest::Client::new();
    if let Err(e) = crate::collector::collect(&http_client, &payload.archive_url, &working_dir).await {
        broadcast_failed(app_state, &payload.job_id, e.to_string(), !e.is_no_retry(), None).await;
        return;
    }

    let ws_state = app_state.ws_state.clone();
    ws_state.read().await.broadcast(WsEvent::PublishStarted { job_id: payload.job_id.clone() });

    let cancel_token = CancellationToken::new();
    let job_cancel = cancel_token.clone();
    let tracker = app_state.job_tracker.clone();
    let job_id = payload.job_id.clone();

    let handle = tokio::spawn(async move {
        let result = run_publish_job(destination, &working_dir, &payload, ws_state.clone(), &job_cancel).await;
        let _ = std::fs::remove_dir_all(&working_dir);

        match result {
            Ok(()) => {
                ws_state.read().await.broadcast(WsEvent::PublishCompleted { job_id: job_id.clone() });
            }
            Err(EngineError::NoRetry(e)) => {
                error!("Publish job {} failed (no-retry): {}", job_id, e);
                ws_state.read().await.broadcast(WsEvent::PublishFailed {
                    job_id: job_id.clone(),
                    error: e.to_string(),
                    retryable: false,
                    recovery: None,
                });
            }
            Err(EngineError::Retry { error, recovery }) => {
                warn!("Publish job {} failed (retryable): {}", job_id, error);
                ws_state.read().await.broadcast(WsEvent::PublishFailed {
                    job_id: job_id.clone(),
                    error: error.to_string(),
                    retryable: true,
                    recovery: Some(recovery),
                });
            }
        }
        tracker.complete(&job_id).await;
    });

    app_state.job_tracker.register(payload.job_id, handle.abort_handle(), cancel_token).await;
}

/// Runs the publish engine (or, for a `live_hosting` destination, the
/// lighter-weight rsync mirror) and forwards phase progress as
/// `WsEvent::PublishProgress`.
async fn run_publish_job(
    destination: DestinationConfig,
    working_dir: &std::path::Path,
    payload: &PublishJobPayload,
    ws_state: Arc<tokio::sync::RwLock<crate::ws::WsState>>,
    cancel: &CancellationToken,
) -> Result<(), EngineError> {
    if let DestinationConfig::LiveHosting(cfg) = &destination {
        let mut manager = factory::build_live_hosting_manager(cfg);
        return manager
            .start(working_dir, &payload.writeable_list, &payload.cache_list)
            .await
            .map_err(EngineError::NoRetry);
    }

    let mut backend = factory::build_backend(&destination).map_err(EngineError::NoRetry)?;
    let legacy = DefaultLegacyDetector;
    let job_id = payload.job_id.clone();

    let opts = RunOptions {
        working_dir,
        writeable_list: &payload.writeable_list,
        cache_list: &payload.cache_list,
        recovery: payload.recovery.as_deref(),
        cancel: Some(cancel),
    };

    engine::run(&mut backend, &legacy, opts, move |state, percent, msg, eta| {
        // `try_read` rather than spawning a task per update: the lock is
        // never held for long, and spawning here would let progress
        // events race each other out of order on the wire.
        let Ok(guard) = ws_state.try_read() else {
            return;
        };
        guard.broadcast(WsEvent::PublishProgress(PublishProgressPayload {
            job_id: job_id.clone(),
            state: state.to_string(),
            percent,
            msg: msg.map(str::to_string),
            eta_seconds: eta,
        }));
    })
    .await
}

async fn broadcast_failed(app_state: &AppState, job_id: &str, error: String, retryable: bool, recovery: Option<Vec<u8>>) {
    let job_id = job_id.to_string();
    app_state.ws_state.read().await.broadcast(WsEvent::PublishFailed { job_id, error, retryable, recovery });
}

async fn handle_cancel_publish(job_id: &str, app_state: &AppState) {
    info!("Received publish:cancel command for job: {}", job_id);
    let cancelled = app_state.job_tracker.cancel(job_id).await;
    if cancelled {
        info!("Job {} cancellation requested", job_id);
    } else {
        warn!("Job {} not found or already completed", job_id);
    }
}
