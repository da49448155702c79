//! Reader side of esbridge.
//!
//! Streams documents from one or more indexes as create records:
//!
//! - [`PositionStore`]: per-index resume cursors, encoded into every record
//! - [`IndexPoller`]: one background task per index, paging by sort value
//! - [`Reader`]: open/read/acknowledge/teardown facade over the pollers and
//!   the bounded record queue they share

pub mod error;
pub mod poller;
pub mod position;
pub mod reader;

pub use error::SourceError;
pub use poller::{IndexPoller, PollSettings, PollerExit};
pub use position::PositionStore;
pub use reader::Reader;
