//! Error types for the writer.

use esbridge_client::{ClientError, EncodeError};
use esbridge_types::Operation;
use thiserror::Error;

/// Errors raised while building, sending or interpreting a bulk request.
#[derive(Debug, Error)]
pub enum DestinationError {
    /// A keyed record carries an operation the writer cannot map
    #[error("operation {operation} on record with key={key} not supported")]
    UnsupportedOperation { key: String, operation: Operation },

    /// The engine rejected an item of the bulk request
    #[error("item with key={key} {action} failure: {detail}")]
    PartialBulkFailure {
        key: String,
        action: String,
        detail: String,
    },

    /// The bulk response body could not be read
    #[error("bulk response failure: {0}")]
    MalformedResponse(String),

    #[error("bulk request failure: {0}")]
    Transport(#[from] ClientError),

    #[error("failed to encode record: {0}")]
    Encode(#[from] EncodeError),

    /// No static index is configured and the record names no collection
    #[error("record has no target index")]
    MissingIndex,
}

/// A failed write, with the number of leading records that did succeed.
#[derive(Debug, Error)]
#[error("{error} ({written} records written)")]
pub struct WriteError {
    pub written: usize,
    #[source]
    pub error: DestinationError,
}

impl WriteError {
    pub fn new(written: usize, error: DestinationError) -> Self {
        Self { written, error }
    }
}

impl From<DestinationError> for WriteError {
    fn from(error: DestinationError) -> Self {
        Self::new(0, error)
    }
}
