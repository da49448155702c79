//! # esbridge-types
//!
//! Shared domain types for the esbridge connector.
//!
//! This crate defines the data structures used by both directions of the
//! connector:
//! - [`ChangeRecord`]: one unit of change flowing between the record stream
//!   and the search engine
//! - [`Settings`]: layered configuration for connection, reader and writer
//!
//! ## Usage
//!
//! ```rust
//! use esbridge_types::{ChangeRecord, Data, Operation};
//!
//! let record = ChangeRecord::new(Operation::Create)
//!     .with_key(Data::Raw(b"doc-1".to_vec()))
//!     .with_after(Data::Raw(br#"{"title":"hello"}"#.to_vec()));
//! assert!(record.has_key());
//! ```

pub mod error;
pub mod record;
pub mod settings;

pub use error::SettingsError;
pub use record::{
    ChangeRecord, Data, Metadata, Operation, Payload, METADATA_COLLECTION, METADATA_CREATED_AT,
};
pub use settings::{
    ConnectionSettings, DestinationSettings, EngineVersion, IndexSettings, Settings,
    SortOrder, SourceSettings, MAX_BATCH_SIZE,
};
