//! Search engine client for esbridge.
//!
//! This crate is the boundary between the connector core and the search
//! engine. It provides:
//!
//! - [`SearchClient`]: capability trait for `ping`, `search` and `bulk`
//! - [`HttpClient`]: reqwest-backed implementation speaking the engine's
//!   REST API for versions 5 through 8
//! - [`OperationEncoder`]: per-version encoding of insert/upsert/delete
//!   bulk actions ([`V5Encoder`], [`V6Encoder`], [`V7Encoder`], [`V8Encoder`])
//! - [`MockSearchClient`]: scripted in-memory client for tests
//!
//! Version-specific behavior is selected once, at construction, through
//! [`connect`] and [`encoder_for`].

mod api;
mod encoder;
mod error;
mod http;
mod mock;

use std::sync::Arc;

use async_trait::async_trait;

use esbridge_types::{ConnectionSettings, EngineVersion};

pub use api::{Hit, Hits, SearchRequest, SearchResponse};
pub use encoder::{
    BulkUnits, OperationEncoder, V5Encoder, V6Encoder, V7Encoder, V8Encoder, RETRY_ON_CONFLICT,
};
pub use error::{ClientError, EncodeError};
pub use http::HttpClient;
pub use mock::MockSearchClient;

/// Capabilities the connector needs from a search engine.
///
/// Implementations must bound every call in time; a timed-out call is
/// reported as [`ClientError::Transport`].
#[async_trait]
pub trait SearchClient: Send + Sync {
    /// Check that the engine is reachable.
    async fn ping(&self) -> Result<(), ClientError>;

    /// Fetch one page of documents sorted by the requested field.
    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, ClientError>;

    /// Submit a newline-delimited bulk payload and return the raw response body.
    async fn bulk(&self, payload: Vec<u8>) -> Result<Vec<u8>, ClientError>;
}

/// Build the HTTP client for the configured engine version.
pub fn connect(settings: &ConnectionSettings) -> Result<Arc<dyn SearchClient>, ClientError> {
    Ok(Arc::new(HttpClient::new(settings)?))
}

/// Select the bulk operation encoder for an engine version.
///
/// `index_type` is only honored by versions that still have mapping types.
pub fn encoder_for(
    version: EngineVersion,
    index_type: Option<String>,
) -> Arc<dyn OperationEncoder> {
    match version {
        EngineVersion::V5 => Arc::new(V5Encoder::new(index_type)),
        EngineVersion::V6 => Arc::new(V6Encoder::new(index_type)),
        EngineVersion::V7 => Arc::new(V7Encoder),
        EngineVersion::V8 => Arc::new(V8Encoder),
    }
}
