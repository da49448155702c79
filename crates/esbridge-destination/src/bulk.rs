//! Bulk request building.
//!
//! Records are classified into insert, upsert or delete operations, encoded
//! through the version-specific [`OperationEncoder`] and joined into one
//! newline-delimited payload, in record order.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use esbridge_client::{EncodeError, OperationEncoder};
use esbridge_types::{ChangeRecord, Operation};

use crate::error::DestinationError;

/// Where records are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexTarget {
    /// Every record goes to one index
    Static(String),
    /// Each record goes to the index named by its collection metadata
    Collection,
}

impl IndexTarget {
    /// A configured, non-empty index name is static; otherwise route by
    /// collection.
    pub fn from_setting(index: Option<&str>) -> Self {
        match index.map(str::trim) {
            Some(name) if !name.is_empty() => IndexTarget::Static(name.to_string()),
            _ => IndexTarget::Collection,
        }
    }

    fn resolve<'a>(&'a self, record: &'a ChangeRecord) -> Result<&'a str, DestinationError> {
        match self {
            IndexTarget::Static(name) => Ok(name),
            IndexTarget::Collection => record
                .collection()
                .filter(|name| !name.is_empty())
                .ok_or(DestinationError::MissingIndex),
        }
    }
}

/// Logical bulk operation for one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BulkOperation {
    Insert,
    Upsert { key: String },
    Delete { key: String },
}

impl BulkOperation {
    /// Map a record to its operation. Records without a key are always
    /// inserted.
    pub fn classify(record: &ChangeRecord) -> Result<Self, DestinationError> {
        let Some(key) = record.key_string() else {
            return Ok(BulkOperation::Insert);
        };

        match record.operation {
            Operation::Create | Operation::Snapshot | Operation::Update => {
                Ok(BulkOperation::Upsert { key })
            }
            Operation::Delete => Ok(BulkOperation::Delete { key }),
            Operation::Unknown => Err(DestinationError::UnsupportedOperation {
                key,
                operation: record.operation,
            }),
        }
    }
}

/// A ready-to-send bulk body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkPayload {
    bytes: Vec<u8>,
    operations: usize,
}

impl BulkPayload {
    /// Number of operations in the payload.
    pub fn len(&self) -> usize {
        self.operations
    }

    pub fn is_empty(&self) -> bool {
        self.operations == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    fn push_line(&mut self, value: &Value) -> Result<(), DestinationError> {
        serde_json::to_writer(&mut self.bytes, value).map_err(EncodeError::from)?;
        self.bytes.push(b'\n');
        Ok(())
    }
}

/// Turns record batches into bulk payloads.
pub struct BulkRequestBuilder {
    encoder: Arc<dyn OperationEncoder>,
    target: IndexTarget,
}

impl BulkRequestBuilder {
    pub fn new(encoder: Arc<dyn OperationEncoder>, target: IndexTarget) -> Self {
        Self { encoder, target }
    }

    /// Build the payload for a batch. Any record that cannot be mapped
    /// aborts the whole batch.
    pub fn build(&self, records: &[ChangeRecord]) -> Result<BulkPayload, DestinationError> {
        let mut payload = BulkPayload::default();

        for record in records {
            let index = self.target.resolve(record)?;
            let units = match BulkOperation::classify(record)? {
                BulkOperation::Insert => self.encoder.encode_insert(record, index)?,
                BulkOperation::Upsert { key } => self.encoder.encode_upsert(&key, record, index)?,
                BulkOperation::Delete { key } => self.encoder.encode_delete(&key, index)?,
            };

            payload.push_line(&units.action)?;
            if let Some(source) = &units.source {
                payload.push_line(source)?;
            }
            payload.operations += 1;
        }

        debug!(
            operations = payload.operations,
            bytes = payload.bytes.len(),
            version = %self.encoder.version(),
            "Bulk payload built"
        );
        Ok(payload)
    }
}
