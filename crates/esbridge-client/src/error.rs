//! Error types for the search client.

use thiserror::Error;

/// Errors returned by [`crate::SearchClient`] calls.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Network failure or per-call timeout
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The engine answered with a non-success status
    #[error("Engine returned status {status}: {reason}")]
    Status { status: u16, reason: String },

    /// The engine answered with a body that does not match the protocol
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// The request cannot be expressed for this engine version
    #[error("Unsupported request: {0}")]
    Unsupported(String),

    /// The client could not be constructed from its settings
    #[error("Invalid client configuration: {0}")]
    Config(String),
}

/// Errors raised while encoding a record into bulk units.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// Insert and upsert need a document to write
    #[error("record has no payload to write")]
    MissingPayload,

    /// Raw payload bytes are not a JSON document
    #[error("payload is not valid JSON: {0}")]
    InvalidPayload(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
