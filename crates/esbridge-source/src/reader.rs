//! Reader facade over the per-index pollers.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use esbridge_client::SearchClient;
use esbridge_types::{ChangeRecord, SourceSettings};

use crate::error::SourceError;
use crate::poller::{IndexPoller, PollSettings, PollerExit};
use crate::position::PositionStore;

/// State that exists only between `open` and `teardown`.
struct Session {
    records: Mutex<mpsc::Receiver<ChangeRecord>>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
    positions: Arc<PositionStore>,
}

/// Streams new documents from the configured indexes as create records.
///
/// One poller task runs per index; all of them feed a single bounded queue
/// whose capacity is the configured batch size.
pub struct Reader {
    client: Arc<dyn SearchClient>,
    settings: SourceSettings,
    session: RwLock<Option<Arc<Session>>>,
}

impl Reader {
    pub fn new(client: Arc<dyn SearchClient>, settings: SourceSettings) -> Self {
        Self {
            client,
            settings,
            session: RwLock::new(None),
        }
    }

    fn current(&self) -> Option<Arc<Session>> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Start polling, resuming from a previously emitted position.
    ///
    /// # Errors
    ///
    /// Returns `SourceError::AlreadyOpen` if called twice without teardown,
    /// `SourceError::MalformedPosition` for an undecodable position, and
    /// `SourceError::Client` when the engine cannot be pinged.
    pub async fn open(&self, resume: Option<&[u8]>) -> Result<(), SourceError> {
        if self.current().is_some() {
            return Err(SourceError::AlreadyOpen);
        }

        let positions = Arc::new(match resume {
            Some(bytes) => PositionStore::decode(bytes)?,
            None => PositionStore::new(),
        });
        self.client.ping().await?;

        let (tx, rx) = mpsc::channel(self.settings.batch_size.max(1));
        let shutdown = CancellationToken::new();
        let tracker = TaskTracker::new();
        let poll = PollSettings {
            batch_size: self.settings.batch_size,
            polling_period: self.settings.polling_period(),
            retries: self.settings.retries,
        };

        let session = Arc::new(Session {
            records: Mutex::new(rx),
            shutdown: shutdown.clone(),
            tracker: tracker.clone(),
            positions: positions.clone(),
        });
        {
            let mut slot = self.session.write().unwrap_or_else(PoisonError::into_inner);
            if slot.is_some() {
                return Err(SourceError::AlreadyOpen);
            }
            *slot = Some(session);
        }

        for index in &self.settings.indexes {
            let poller = IndexPoller::new(
                self.client.clone(),
                positions.clone(),
                tx.clone(),
                shutdown.clone(),
                index.clone(),
                poll,
            );
            let name = index.name.clone();
            tracker.spawn(async move {
                if poller.run().await == PollerExit::RetriesExhausted {
                    warn!(index = %name, "Index is no longer polled");
                }
            });
        }
        // Only pollers hold senders; the queue closes once they all exit
        drop(tx);

        info!(
            indexes = self.settings.indexes.len(),
            resumed = !positions.is_empty(),
            "Reader opened"
        );
        Ok(())
    }

    /// Wait for the next record.
    ///
    /// # Errors
    ///
    /// `SourceError::NotOpen` before `open` or after `teardown`;
    /// `SourceError::QueueClosed` once every poller has stopped and the
    /// queue is drained.
    pub async fn read_next(&self) -> Result<ChangeRecord, SourceError> {
        let session = self.current().ok_or(SourceError::NotOpen)?;
        let mut records = session.records.lock().await;
        let next = tokio::select! {
            biased;
            record = records.recv() => record,
            _ = session.shutdown.cancelled() => return Err(SourceError::NotOpen),
        };
        next.ok_or(SourceError::QueueClosed)
    }

    /// Accept a downstream acknowledgment. Positions are not validated.
    pub fn acknowledge(&self, position: &[u8]) {
        debug!(position = %String::from_utf8_lossy(position), "Position acknowledged");
    }

    /// Current per-index cursors, empty when not open.
    pub fn positions(&self) -> BTreeMap<String, i64> {
        self.current()
            .map(|session| session.positions.snapshot())
            .unwrap_or_default()
    }

    pub fn is_open(&self) -> bool {
        self.current().is_some()
    }

    /// Stop every poller and close the queue. Safe to call more than once.
    pub async fn teardown(&self) {
        let session = self
            .session
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(session) = session else {
            debug!("Reader not open, nothing to tear down");
            return;
        };

        info!("Tearing down reader");
        session.shutdown.cancel();
        session.tracker.close();
        session.tracker.wait().await;
        session.records.lock().await.close();
        info!("Reader stopped");
    }
}
