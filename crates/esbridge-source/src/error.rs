//! Error types for the reader.

use esbridge_client::ClientError;
use thiserror::Error;

/// Errors returned by the reader and its position store.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Resume position bytes could not be decoded
    #[error("Malformed position: {0}")]
    MalformedPosition(String),

    /// The reader was not opened, or has been torn down
    #[error("Reader is not open")]
    NotOpen,

    /// Every poller has stopped and the queue is drained
    #[error("Record queue closed")]
    QueueClosed,

    #[error("Reader is already open")]
    AlreadyOpen,

    /// The engine could not be reached or rejected a request
    #[error("Client error: {0}")]
    Client(#[from] ClientError),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        SourceError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SourceError::MalformedPosition("expected value at line 1".to_string());
        assert_eq!(
            err.to_string(),
            "Malformed position: expected value at line 1"
        );
        assert_eq!(SourceError::NotOpen.to_string(), "Reader is not open");
        assert_eq!(SourceError::QueueClosed.to_string(), "Record queue closed");

        let err = SourceError::from(ClientError::Config("bad host".to_string()));
        assert_eq!(
            err.to_string(),
            "Client error: Invalid client configuration: bad host"
        );
    }
}
