//! Error types shared across Confetti.

use std::path::PathBuf;

use thiserror::Error;

/// A birth date string could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BirthDateError {
    /// Not in `DD-MM` form.
    #[error("invalid birth date '{0}', expected DD-MM (e.g. 11-02 for February 11th)")]
    Format(String),

    /// Well-formed but no such calendar day.
    #[error("no such day: {day:02}-{month:02}")]
    OutOfRange { day: u32, month: u32 },
}

/// Malformed or insufficient input from a contributor or command issuer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Neither a message nor a description was supplied.
    #[error("a birthday message or a description is required")]
    EmptySubmission,

    /// The submission did not name a celebrant.
    #[error("celebrant id is missing")]
    MissingCelebrant,

    /// Invalid birth date.
    #[error(transparent)]
    BirthDate(#[from] BirthDateError),
}

/// Failure reported by the messaging or directory collaborator.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The recipient does not accept direct messages.
    #[error("direct messages are closed for {user}")]
    DirectMessagesClosed { user: String },

    /// The platform answered with an error code.
    #[error("{method} failed: {error}")]
    Api { method: String, error: String },

    /// Transport-level failure.
    #[error("HTTP error: {0}")]
    Http(String),

    /// Rate limited.
    #[error("rate limited{}", retry_after_secs.map(|s| format!(" (retry after {}s)", s)).unwrap_or_default())]
    RateLimited {
        /// Seconds to wait before retrying (from Retry-After header, optional).
        retry_after_secs: Option<u64>,
    },

    /// Response could not be understood.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Poem generation failed. Always recovered with a fallback by the caller.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// No generation service configured.
    #[error("poem generation is not configured")]
    NotConfigured,

    /// The service call failed.
    #[error("poem generation failed: {0}")]
    Failed(String),
}

/// Errors from the record store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend failure (I/O, SQL, lock poisoning).
    #[error("storage error: {0}")]
    Backend(String),

    /// A stored row could not be decoded.
    #[error("corrupt record {id}: {reason}")]
    Corrupt { id: String, reason: String },
}

/// Invalid engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A required value is empty.
    #[error("missing configuration value: {0}")]
    Missing(&'static str),

    /// A value is present but unusable.
    #[error("invalid configuration value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Holiday file could not be loaded.
#[derive(Debug, Error)]
pub enum HolidayError {
    /// Reading the file failed.
    #[error("failed to read holiday file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not a JSON array of strings.
    #[error("holiday file is not a JSON array of dates: {0}")]
    Json(#[from] serde_json::Error),

    /// An entry is not an ISO date.
    #[error("invalid holiday date: {0}")]
    InvalidDate(String),
}
