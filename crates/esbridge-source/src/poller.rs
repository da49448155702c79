//! Background poller for a single index.
//!
//! A poller pages through its index in sort order, turning every hit into a
//! create record and pushing it onto the shared record queue. It moves
//! through these states:
//!
//! ```text
//! Initializing -> Polling -> (Backoff <-> Polling) -> Stopped
//! ```
//!
//! Every suspension point (search, queue push, backoff wait) races the
//! shutdown token, so a poller never pushes after shutdown is observed and
//! never stays blocked on a full queue once shutdown is requested.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use esbridge_client::{Hit, SearchClient, SearchRequest};
use esbridge_types::{ChangeRecord, Data, IndexSettings, Operation, METADATA_COLLECTION};

use crate::error::SourceError;
use crate::position::PositionStore;

/// Why a poller stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerExit {
    /// Shutdown was requested or the queue was dropped
    Shutdown,
    /// A search failed with no retries left
    RetriesExhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Backoff {
    Idle,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PollerState {
    Initializing,
    Polling,
    Backoff(Backoff),
    Stopped(PollerExit),
}

/// Poll settings shared by every index of a reader.
#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    pub batch_size: usize,
    pub polling_period: Duration,
    pub retries: u8,
}

/// Pages one index into the record queue.
pub struct IndexPoller {
    client: Arc<dyn SearchClient>,
    positions: Arc<PositionStore>,
    records: mpsc::Sender<ChangeRecord>,
    shutdown: CancellationToken,
    index: IndexSettings,
    settings: PollSettings,
    /// Sort value of the last pushed record; `None` reads from the start
    cursor: Option<i64>,
    /// Search errors still tolerated before stopping
    budget: u8,
}

impl IndexPoller {
    pub fn new(
        client: Arc<dyn SearchClient>,
        positions: Arc<PositionStore>,
        records: mpsc::Sender<ChangeRecord>,
        shutdown: CancellationToken,
        index: IndexSettings,
        settings: PollSettings,
    ) -> Self {
        Self {
            client,
            positions,
            records,
            shutdown,
            index,
            budget: settings.retries,
            settings,
            cursor: None,
        }
    }

    /// Run until shutdown or until the retry budget is exhausted.
    pub async fn run(mut self) -> PollerExit {
        let mut state = PollerState::Initializing;
        loop {
            state = match state {
                PollerState::Initializing => self.initialize(),
                PollerState::Polling => self.poll().await,
                PollerState::Backoff(reason) => self.wait(reason).await,
                PollerState::Stopped(exit) => {
                    debug!(index = %self.index.name, ?exit, "Poller stopped");
                    return exit;
                }
            };
        }
    }

    fn initialize(&mut self) -> PollerState {
        self.cursor = self.positions.get(&self.index.name);
        info!(
            index = %self.index.name,
            cursor = ?self.cursor,
            sort_by = %self.index.sort_by,
            "Poller started"
        );
        PollerState::Polling
    }

    fn request(&self) -> SearchRequest {
        SearchRequest {
            index: self.index.name.clone(),
            size: self.settings.batch_size,
            sort_by: self.index.sort_by.clone(),
            order: self.index.sort_order,
            search_after: self.cursor,
        }
    }

    async fn poll(&mut self) -> PollerState {
        let request = self.request();
        let result = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return PollerState::Stopped(PollerExit::Shutdown),
            result = self.client.search(&request) => result,
        };

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                if self.budget == 0 {
                    error!(index = %self.index.name, error = %e, "Search failed, no retries left");
                    return PollerState::Stopped(PollerExit::RetriesExhausted);
                }
                self.budget -= 1;
                warn!(
                    index = %self.index.name,
                    error = %e,
                    retries_left = self.budget,
                    "Search failed"
                );
                return PollerState::Backoff(Backoff::Error);
            }
        };

        self.budget = self.settings.retries;
        if response.is_empty() {
            return PollerState::Backoff(Backoff::Idle);
        }

        let count = response.hits.hits.len();
        for hit in response.hits.hits {
            let Some(cursor) = hit.cursor() else {
                warn!(index = %self.index.name, id = %hit.id, "Hit has no sort value, skipping");
                continue;
            };

            let record = match self.record_for(&hit) {
                Ok(record) => record,
                Err(e) => {
                    warn!(index = %self.index.name, id = %hit.id, error = %e, "Skipping hit");
                    continue;
                }
            };

            let permit = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return PollerState::Stopped(PollerExit::Shutdown),
                permit = self.records.reserve() => match permit {
                    Ok(permit) => permit,
                    Err(_) => return PollerState::Stopped(PollerExit::Shutdown),
                },
            };

            // The slot is already ours, so the store only moves once the record
            // is guaranteed to land in the queue.
            let advanced = self.positions.advance(&self.index.name, cursor, |position| {
                permit.send(record.with_position(position));
            });
            if let Err(e) = advanced {
                warn!(index = %self.index.name, id = %hit.id, error = %e, "Skipping hit");
                continue;
            }
            self.cursor = Some(cursor);
        }

        debug!(index = %self.index.name, count, cursor = ?self.cursor, "Page pushed");
        PollerState::Polling
    }

    async fn wait(&self, reason: Backoff) -> PollerState {
        debug!(index = %self.index.name, ?reason, "Waiting before next poll");
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => PollerState::Stopped(PollerExit::Shutdown),
            _ = tokio::time::sleep(self.settings.polling_period) => PollerState::Polling,
        }
    }

    /// Build the create record for a hit. The position is attached when the
    /// record is enqueued.
    fn record_for(&self, hit: &Hit) -> Result<ChangeRecord, SourceError> {
        let payload = serde_json::to_vec(&hit.source)?;

        let mut key = Map::new();
        key.insert("id".to_string(), Value::String(hit.id.clone()));

        let mut record = ChangeRecord::new(Operation::Create)
            .with_key(key)
            .with_after(Data::Raw(payload))
            .with_metadata(METADATA_COLLECTION, hit.index.as_str());
        record.set_created_at(Utc::now());
        Ok(record)
    }
}
