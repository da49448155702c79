//! Writer side of esbridge.
//!
//! - [`BulkRequestBuilder`]: maps records to insert/upsert/delete actions
//!   and encodes them as one newline-delimited bulk body
//! - [`BulkResponse`]: finds the first failed item of a bulk response
//! - [`Writer`]: open/write/teardown facade tying both to a client

pub mod bulk;
pub mod error;
pub mod response;
pub mod writer;

pub use bulk::{BulkOperation, BulkPayload, BulkRequestBuilder, IndexTarget};
pub use error::{DestinationError, WriteError};
pub use response::{BulkResponse, BulkResponseItem, ItemError, ItemResult};
pub use writer::Writer;
