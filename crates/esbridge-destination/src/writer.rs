//! Writer facade: batches of records in, one bulk request out.

use std::sync::Arc;

use tracing::{debug, info, warn};

use esbridge_client::{OperationEncoder, SearchClient};
use esbridge_types::{ChangeRecord, DestinationSettings};

use crate::bulk::{BulkRequestBuilder, IndexTarget};
use crate::error::{DestinationError, WriteError};
use crate::response::BulkResponse;

/// Writes record batches to the engine with the bulk API.
///
/// Calls to [`Writer::write`] are expected to be sequential; the writer
/// keeps no state between batches.
pub struct Writer {
    client: Arc<dyn SearchClient>,
    builder: BulkRequestBuilder,
}

impl Writer {
    pub fn new(
        client: Arc<dyn SearchClient>,
        encoder: Arc<dyn OperationEncoder>,
        settings: &DestinationSettings,
    ) -> Self {
        let target = IndexTarget::from_setting(settings.index.as_deref());
        debug!(?target, version = %encoder.version(), "Writer configured");
        Self {
            client,
            builder: BulkRequestBuilder::new(encoder, target),
        }
    }

    /// Check that the engine is reachable.
    pub async fn open(&self) -> Result<(), DestinationError> {
        self.client.ping().await?;
        info!("Writer opened");
        Ok(())
    }

    /// Write a batch and return how many records were written.
    ///
    /// # Errors
    ///
    /// On failure `WriteError::written` counts the leading records the
    /// engine accepted before the first failing item; it is 0 when the
    /// batch could not be built or sent.
    pub async fn write(&self, records: &[ChangeRecord]) -> Result<usize, WriteError> {
        let payload = self.builder.build(records)?;
        if payload.is_empty() {
            debug!("No operations to execute in bulk, skipping");
            return Ok(0);
        }

        let operations = payload.len();
        let body = self
            .client
            .bulk(payload.into_bytes())
            .await
            .map_err(DestinationError::from)?;
        let response = BulkResponse::parse(&body)?;

        match response.interpret() {
            (written, Some(error)) => {
                warn!(written, operations, error = %error, "Bulk write partially failed");
                Err(WriteError::new(written, error))
            }
            (_, None) => {
                debug!(operations, "Bulk write succeeded");
                Ok(records.len())
            }
        }
    }

    pub async fn teardown(&self) {
        info!("Writer torn down");
    }
}
