//! Change record model shared by the reader and the writer.
//!
//! A [`ChangeRecord`] is the unit exchanged with the host record stream.
//! The reader emits create records for every new document it discovers;
//! the writer accepts any mix of operations and maps each to a bulk action.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Metadata key carrying the origin/target index (collection) name.
pub const METADATA_COLLECTION: &str = "opencdc.collection";

/// Metadata key carrying the record creation time as Unix nanoseconds.
pub const METADATA_CREATED_AT: &str = "opencdc.createdAt";

/// Record metadata, string keys to string values.
pub type Metadata = BTreeMap<String, String>;

/// Kind of change a record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// A document was created
    Create,
    /// A document was updated
    Update,
    /// A document was deleted
    Delete,
    /// A document was read as part of an initial snapshot
    Snapshot,
    /// An operation this connector does not recognize
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Create => write!(f, "create"),
            Operation::Update => write!(f, "update"),
            Operation::Delete => write!(f, "delete"),
            Operation::Snapshot => write!(f, "snapshot"),
            Operation::Unknown => write!(f, "unknown"),
        }
    }
}

/// Record key or payload contents.
///
/// Structured data is a JSON object; raw data is an opaque byte string
/// (for payloads it is expected to hold a JSON document). Raw data is
/// written to JSON as a string when it is valid UTF-8 and as a byte array
/// otherwise; both forms are accepted when reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Data {
    /// A JSON object
    Structured(Map<String, Value>),
    /// Opaque bytes
    Raw(
        #[serde(serialize_with = "raw_bytes::serialize")]
        #[serde(deserialize_with = "raw_bytes::deserialize")]
        Vec<u8>,
    ),
}

mod raw_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        match std::str::from_utf8(bytes) {
            Ok(text) => serializer.serialize_str(text),
            Err(_) => serializer.collect_seq(bytes),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Text(String),
            Bytes(Vec<u8>),
        }

        Ok(match Repr::deserialize(deserializer)? {
            Repr::Text(text) => text.into_bytes(),
            Repr::Bytes(bytes) => bytes,
        })
    }
}

impl Data {
    /// Byte representation; structured data is rendered as compact JSON.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Data::Structured(map) => Value::Object(map.clone()).to_string().into_bytes(),
            Data::Raw(bytes) => bytes.clone(),
        }
    }
}

impl From<Map<String, Value>> for Data {
    fn from(map: Map<String, Value>) -> Self {
        Data::Structured(map)
    }
}

impl From<Vec<u8>> for Data {
    fn from(bytes: Vec<u8>) -> Self {
        Data::Raw(bytes)
    }
}

/// Document state before and after the change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<Data>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<Data>,
}

/// One unit of change flowing between the record stream and the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// What happened to the document
    pub operation: Operation,

    /// Document identifier; absent keys are always written as inserts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<Data>,

    #[serde(default)]
    pub payload: Payload,

    #[serde(default)]
    pub metadata: Metadata,

    /// Opaque resume position attached by the reader
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Vec<u8>>,
}

impl ChangeRecord {
    /// Create an empty record of the given kind.
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            key: None,
            payload: Payload::default(),
            metadata: Metadata::new(),
            position: None,
        }
    }

    pub fn with_key(mut self, key: impl Into<Data>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_before(mut self, before: impl Into<Data>) -> Self {
        self.payload.before = Some(before.into());
        self
    }

    pub fn with_after(mut self, after: impl Into<Data>) -> Self {
        self.payload.after = Some(after.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_position(mut self, position: Vec<u8>) -> Self {
        self.position = Some(position);
        self
    }

    /// Whether the record carries a key.
    pub fn has_key(&self) -> bool {
        self.key.is_some()
    }

    /// Key rendered as a string, as used for document ids.
    pub fn key_string(&self) -> Option<String> {
        self.key
            .as_ref()
            .map(|key| String::from_utf8_lossy(&key.to_bytes()).into_owned())
    }

    /// The collection (index) name from metadata, if present.
    pub fn collection(&self) -> Option<&str> {
        self.metadata.get(METADATA_COLLECTION).map(String::as_str)
    }

    /// Set the creation time metadata.
    pub fn set_created_at(&mut self, at: DateTime<Utc>) {
        if let Some(nanos) = at.timestamp_nanos_opt() {
            self.metadata
                .insert(METADATA_CREATED_AT.to_string(), nanos.to_string());
        }
    }

    /// Creation time from metadata, if present and well formed.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.metadata
            .get(METADATA_CREATED_AT)
            .and_then(|raw| raw.parse::<i64>().ok())
            .map(DateTime::from_timestamp_nanos)
    }
}
