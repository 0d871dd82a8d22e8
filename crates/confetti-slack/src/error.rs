//! Socket Mode errors.

use confetti_core::DeliveryError;
use thiserror::Error;

/// Errors that end a Socket Mode connection.
#[derive(Debug, Error)]
pub enum SocketError {
    /// `apps.connections.open` failed.
    #[error("failed to open socket connection: {0}")]
    Open(#[from] DeliveryError),

    /// WebSocket transport failure.
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Slack asked us to reconnect.
    #[error("disconnect requested: {0}")]
    Disconnected(String),
}
