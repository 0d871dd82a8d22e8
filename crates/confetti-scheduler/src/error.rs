//! Error types for the engine.

use confetti_core::{DeliveryError, GenerationError, StoreError, ValidationError};
use thiserror::Error;

/// Errors raised inside an engine operation.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed or insufficient input.
    #[error("invalid input: {0}")]
    Validation(#[from] ValidationError),

    /// Unknown celebrant or recipient.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Messaging or directory failure.
    #[error("delivery failed: {0}")]
    Delivery(#[from] DeliveryError),

    /// Record store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Generation(#[from] GenerationError),
}

impl EngineError {
    /// Text to show the contributor or command issuer, for errors they can fix.
    pub fn user_message(&self) -> Option<String> {
        match self {
            Self::Validation(ValidationError::EmptySubmission) => Some(
                "Please enter either a birthday message or a description before submitting!"
                    .to_string(),
            ),
            Self::Validation(e) => Some(format!("Sorry, that didn't work: {}", e)),
            Self::NotFound { kind, id } => Some(format!("Sorry, I couldn't find {} {}.", kind, id)),
            _ => None,
        }
    }
}
