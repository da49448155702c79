//! Bulk operation encoders, one per engine version.
//!
//! Each encoder turns a record into the action-and-metadata unit and the
//! optional source unit of the bulk API. Version differences live here:
//! versions 5 and 6 still carry a mapping `_type`, and every version from 6
//! on asks the engine to retry version conflicts on update.

use serde::Serialize;
use serde_json::Value;

use esbridge_types::{ChangeRecord, Data, EngineVersion};

use crate::error::EncodeError;

/// Retry count sent with update actions on engines that support it.
pub const RETRY_ON_CONFLICT: u32 = 3;

/// The wire units for one bulk operation.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkUnits {
    /// Action and metadata line
    pub action: Value,
    /// Document line; absent for deletes
    pub source: Option<Value>,
}

/// Encodes logical bulk operations into a specific engine version's syntax.
pub trait OperationEncoder: Send + Sync {
    /// The engine version this encoder targets.
    fn version(&self) -> EngineVersion;

    /// Index a document without an explicit id.
    fn encode_insert(&self, record: &ChangeRecord, index: &str) -> Result<BulkUnits, EncodeError>;

    /// Create or replace-merge the document with the given id.
    fn encode_upsert(
        &self,
        key: &str,
        record: &ChangeRecord,
        index: &str,
    ) -> Result<BulkUnits, EncodeError>;

    /// Delete the document with the given id.
    fn encode_delete(&self, key: &str, index: &str) -> Result<BulkUnits, EncodeError>;
}

#[derive(Serialize)]
#[serde(rename_all = "snake_case")]
enum Action<'a> {
    Index(ActionMetadata<'a>),
    Update(ActionMetadata<'a>),
    Delete(ActionMetadata<'a>),
}

#[derive(Serialize)]
struct ActionMetadata<'a> {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    id: Option<&'a str>,
    #[serde(rename = "_index")]
    index: &'a str,
    #[serde(rename = "_type", skip_serializing_if = "Option::is_none")]
    doc_type: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_on_conflict: Option<u32>,
}

#[derive(Serialize)]
struct UpsertSource {
    doc: Value,
    doc_as_upsert: bool,
}

/// Per-version parameters of the action shape.
pub trait VersionShape {
    const VERSION: EngineVersion;

    fn shape(&self) -> Shape<'_>;
}

/// Shape parameters shared by all versions.
pub struct Shape<'a> {
    doc_type: Option<&'a str>,
    retry_on_conflict: Option<u32>,
}

impl Shape<'_> {
    fn insert(&self, record: &ChangeRecord, index: &str) -> Result<BulkUnits, EncodeError> {
        let action = Action::Index(ActionMetadata {
            id: None,
            index,
            doc_type: self.doc_type,
            retry_on_conflict: None,
        });
        Ok(BulkUnits {
            action: serde_json::to_value(action)?,
            source: Some(document(record)?),
        })
    }

    fn upsert(
        &self,
        key: &str,
        record: &ChangeRecord,
        index: &str,
    ) -> Result<BulkUnits, EncodeError> {
        let action = Action::Update(ActionMetadata {
            id: Some(key),
            index,
            doc_type: self.doc_type,
            retry_on_conflict: self.retry_on_conflict,
        });
        let source = UpsertSource {
            doc: document(record)?,
            doc_as_upsert: true,
        };
        Ok(BulkUnits {
            action: serde_json::to_value(action)?,
            source: Some(serde_json::to_value(source)?),
        })
    }

    fn delete(&self, key: &str, index: &str) -> Result<BulkUnits, EncodeError> {
        let action = Action::Delete(ActionMetadata {
            id: Some(key),
            index,
            doc_type: self.doc_type,
            retry_on_conflict: None,
        });
        Ok(BulkUnits {
            action: serde_json::to_value(action)?,
            source: None,
        })
    }
}

/// The record's after-image as a JSON document. Raw payloads are trusted
/// to hold JSON and are only parsed, not transformed.
fn document(record: &ChangeRecord) -> Result<Value, EncodeError> {
    match &record.payload.after {
        Some(Data::Structured(map)) => Ok(Value::Object(map.clone())),
        Some(Data::Raw(bytes)) => {
            serde_json::from_slice(bytes).map_err(|e| EncodeError::InvalidPayload(e.to_string()))
        }
        None => Err(EncodeError::MissingPayload),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Version 5: mapping types, no conflict retries.
#[derive(Debug, Clone, Default)]
pub struct V5Encoder {
    index_type: Option<String>,
}

impl V5Encoder {
    pub fn new(index_type: Option<String>) -> Self {
        Self {
            index_type: non_empty(index_type),
        }
    }
}

/// Version 6: mapping types with conflict retries on update.
#[derive(Debug, Clone, Default)]
pub struct V6Encoder {
    index_type: Option<String>,
}

impl V6Encoder {
    pub fn new(index_type: Option<String>) -> Self {
        Self {
            index_type: non_empty(index_type),
        }
    }
}

/// Version 7: typeless.
#[derive(Debug, Clone, Copy, Default)]
pub struct V7Encoder;

/// Version 8: typeless, same action shape as version 7.
#[derive(Debug, Clone, Copy, Default)]
pub struct V8Encoder;

const TYPELESS: Shape<'static> = Shape {
    doc_type: None,
    retry_on_conflict: Some(RETRY_ON_CONFLICT),
};

impl VersionShape for V5Encoder {
    const VERSION: EngineVersion = EngineVersion::V5;

    fn shape(&self) -> Shape<'_> {
        Shape {
            doc_type: self.index_type.as_deref(),
            retry_on_conflict: None,
        }
    }
}

impl VersionShape for V6Encoder {
    const VERSION: EngineVersion = EngineVersion::V6;

    fn shape(&self) -> Shape<'_> {
        Shape {
            doc_type: self.index_type.as_deref(),
            retry_on_conflict: Some(RETRY_ON_CONFLICT),
        }
    }
}

impl VersionShape for V7Encoder {
    const VERSION: EngineVersion = EngineVersion::V7;

    fn shape(&self) -> Shape<'_> {
        TYPELESS
    }
}

impl VersionShape for V8Encoder {
    const VERSION: EngineVersion = EngineVersion::V8;

    fn shape(&self) -> Shape<'_> {
        TYPELESS
    }
}

impl<T: VersionShape + Send + Sync> OperationEncoder for T {
    fn version(&self) -> EngineVersion {
        T::VERSION
    }

    fn encode_insert(&self, record: &ChangeRecord, index: &str) -> Result<BulkUnits, EncodeError> {
        self.shape().insert(record, index)
    }

    fn encode_upsert(
        &self,
        key: &str,
        record: &ChangeRecord,
        index: &str,
    ) -> Result<BulkUnits, EncodeError> {
        self.shape().upsert(key, record, index)
    }

    fn encode_delete(&self, key: &str, index: &str) -> Result<BulkUnits, EncodeError> {
        self.shape().delete(key, index)
    }
}
