//! Socket Mode listener for collection form submissions.
//!
//! Slack delivers interactive payloads over a WebSocket opened with an app
//! token. Every envelope is acknowledged immediately; `block_actions` for the
//! submit button are parsed into [`SubmissionEvent`]s and forwarded on a
//! channel so the intake runs outside the socket task.

use std::time::Duration;

use backoff::ExponentialBackoff;
use backoff::backoff::Backoff;
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use confetti_core::MessageHandle;

use crate::SlackClient;
use crate::blocks::{
    DESCRIPTION_ACTION, DESCRIPTION_BLOCK, MEDIA_ACTION, MEDIA_BLOCK, MESSAGE_ACTION,
    MESSAGE_BLOCK, SUBMIT_ACTION_ID,
};
use crate::error::SocketError;

/// A contributor pressed Submit on a collection form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionEvent {
    /// Empty when the button carried no celebrant.
    pub celebrant_id: String,
    pub sender_id: String,
    pub message: Option<String>,
    pub description: Option<String>,
    pub media_url: Option<String>,
    /// The form message itself, so it can be removed afterwards.
    pub form: Option<MessageHandle>,
}

fn state_value(payload: &Value, block: &str, action: &str) -> Option<String> {
    payload
        .get("state")
        .and_then(|s| s.get("values"))
        .and_then(|v| v.get(block))
        .and_then(|b| b.get(action))
        .and_then(|a| a.get("value"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Extract a submission from an interactive payload.
///
/// Returns `None` for anything other than a `block_actions` press of the
/// collection form's submit button.
pub fn parse_submission(payload: &Value) -> Option<SubmissionEvent> {
    if payload.get("type").and_then(Value::as_str) != Some("block_actions") {
        return None;
    }

    let action = payload
        .get("actions")
        .and_then(Value::as_array)?
        .iter()
        .find(|a| a.get("action_id").and_then(Value::as_str) == Some(SUBMIT_ACTION_ID))?;

    let sender_id = payload.pointer("/user/id").and_then(Value::as_str)?;
    let celebrant_id = action
        .get("value")
        .and_then(Value::as_str)
        .unwrap_or_default();

    let form = match (
        payload.pointer("/channel/id").and_then(Value::as_str),
        payload.pointer("/message/ts").and_then(Value::as_str),
    ) {
        (Some(channel), Some(ts)) => Some(MessageHandle {
            channel: channel.to_string(),
            id: ts.to_string(),
        }),
        _ => None,
    };

    Some(SubmissionEvent {
        celebrant_id: celebrant_id.to_string(),
        sender_id: sender_id.to_string(),
        message: state_value(payload, MESSAGE_BLOCK, MESSAGE_ACTION),
        description: state_value(payload, DESCRIPTION_BLOCK, DESCRIPTION_ACTION),
        media_url: state_value(payload, MEDIA_BLOCK, MEDIA_ACTION),
        form,
    })
}

/// Socket Mode connection manager.
pub struct SocketModeListener {
    client: SlackClient,
}

impl SocketModeListener {
    /// `app_client` must carry the app-level (`xapp-`) token.
    pub fn new(app_client: SlackClient) -> Self {
        Self { client: app_client }
    }

    /// Receive submissions until shutdown, reconnecting with backoff.
    pub async fn run(
        &self,
        events: mpsc::Sender<SubmissionEvent>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> Result<(), SocketError> {
        let mut backoff = ExponentialBackoff {
            initial_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(60),
            max_elapsed_time: None,
            ..Default::default()
        };

        loop {
            if *shutdown_rx.borrow() {
                info!("socket mode listener shutting down");
                return Ok(());
            }

            match self
                .connect_and_process(&events, &mut shutdown_rx, &mut backoff)
                .await
            {
                Ok(()) => return Ok(()),
                Err(SocketError::Disconnected(reason)) => {
                    info!(reason = %reason, "slack requested reconnect");
                }
                Err(e) => {
                    error!(error = %e, "socket mode connection error, reconnecting");
                    let wait = backoff.next_backoff().unwrap_or(Duration::from_secs(60));
                    tokio::select! {
                        changed = shutdown_rx.changed() => {
                            if changed.is_err() || *shutdown_rx.borrow() {
                                return Ok(());
                            }
                        }
                        _ = tokio::time::sleep(wait) => {}
                    }
                }
            }
        }
    }

    async fn open_connection(&self) -> Result<String, SocketError> {
        let body = self
            .client
            .api_post("apps.connections.open", &json!({}))
            .await?;
        body.get("url")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| SocketError::WebSocket("no URL in apps.connections.open".to_string()))
    }

    /// One connection's lifetime. `Ok` only on shutdown.
    async fn connect_and_process(
        &self,
        events: &mpsc::Sender<SubmissionEvent>,
        shutdown_rx: &mut watch::Receiver<bool>,
        backoff: &mut ExponentialBackoff,
    ) -> Result<(), SocketError> {
        let url = self.open_connection().await?;
        let (ws_stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| SocketError::WebSocket(format!("connection failed: {}", e)))?;
        let (mut write, mut read) = ws_stream.split();

        info!("socket mode connected");
        backoff.reset();

        loop {
            let msg = tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        let _ = write.send(Message::Close(None)).await;
                        return Ok(());
                    }
                    continue;
                }
                msg = read.next() => msg,
            };

            let msg = match msg {
                Some(Ok(m)) => m,
                Some(Err(e)) => return Err(SocketError::WebSocket(e.to_string())),
                None => return Err(SocketError::WebSocket("stream ended".to_string())),
            };

            match msg {
                Message::Text(text) => {
                    let envelope: Value = match serde_json::from_str(&text) {
                        Ok(v) => v,
                        Err(e) => {
                            warn!(error = %e, "failed to parse socket mode envelope");
                            continue;
                        }
                    };

                    if let Some(envelope_id) = envelope.get("envelope_id").and_then(Value::as_str)
                    {
                        let ack = json!({ "envelope_id": envelope_id }).to_string();
                        if let Err(e) = write.send(Message::Text(ack)).await {
                            warn!(error = %e, "failed to ack envelope");
                        }
                    }

                    match envelope.get("type").and_then(Value::as_str) {
                        Some("disconnect") => {
                            let reason = envelope
                                .get("reason")
                                .and_then(Value::as_str)
                                .unwrap_or("unknown");
                            return Err(SocketError::Disconnected(reason.to_string()));
                        }
                        Some("hello") => debug!("socket mode hello received"),
                        Some("interactive") => {
                            let Some(event) = envelope.get("payload").and_then(parse_submission)
                            else {
                                continue;
                            };
                            debug!(
                                celebrant = %event.celebrant_id,
                                sender = %event.sender_id,
                                "collection form submitted"
                            );
                            if events.send(event).await.is_err() {
                                warn!("submission receiver dropped, closing socket");
                                return Ok(());
                            }
                        }
                        other => debug!(envelope_type = ?other, "ignoring envelope"),
                    }
                }
                Message::Ping(data) => {
                    let _ = write.send(Message::Pong(data)).await;
                }
                Message::Close(_) => {
                    return Err(SocketError::WebSocket("closed by server".to_string()));
                }
                _ => {}
            }
        }
    }
}
