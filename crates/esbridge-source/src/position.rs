//! Per-index resume positions.
//!
//! The store maps each index name to the sort value of the last document
//! handed to the record stream. Every emitted record carries an encoded copy
//! of the whole store, so resuming from any single record restores all
//! indexes at once.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use crate::error::SourceError;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Encoded {
    #[serde(default)]
    index_positions: Option<BTreeMap<String, i64>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EncodedRef<'a> {
    index_positions: &'a BTreeMap<String, i64>,
}

fn encode_map(positions: &BTreeMap<String, i64>) -> Result<Vec<u8>, SourceError> {
    Ok(serde_json::to_vec(&EncodedRef {
        index_positions: positions,
    })?)
}

/// Shared map of index name to last emitted cursor.
#[derive(Debug, Default)]
pub struct PositionStore {
    positions: Mutex<BTreeMap<String, i64>>,
}

impl PositionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, i64>> {
        self.positions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Last cursor recorded for an index, `None` if it was never read.
    pub fn get(&self, index: &str) -> Option<i64> {
        self.lock().get(index).copied()
    }

    /// Record the cursor of the latest emitted document for an index.
    pub fn update(&self, index: &str, cursor: i64) {
        self.lock().insert(index.to_string(), cursor);
    }

    /// Encode as `{"indexPositions":{...}}` with keys in sorted order.
    pub fn encode(&self) -> Result<Vec<u8>, SourceError> {
        encode_map(&self.lock())
    }

    /// Set the cursor for an index and hand the encoded store to `emit`
    /// while the lock is still held.
    ///
    /// Positions seen by concurrent pollers are therefore ordered the same
    /// way as their emits: no encoded position covers a cursor whose record
    /// has not been emitted yet. On an encoding failure the store is left
    /// unchanged and `emit` is not called.
    pub fn advance<F>(&self, index: &str, cursor: i64, emit: F) -> Result<(), SourceError>
    where
        F: FnOnce(Vec<u8>),
    {
        let mut positions = self.lock();
        let previous = positions.insert(index.to_string(), cursor);
        match encode_map(&positions) {
            Ok(position) => {
                emit(position);
                Ok(())
            }
            Err(e) => {
                match previous {
                    Some(cursor) => positions.insert(index.to_string(), cursor),
                    None => positions.remove(index),
                };
                Err(e)
            }
        }
    }

    /// Decode a resume position.
    ///
    /// Empty input and a `null` mapping both mean "nothing read yet".
    pub fn decode(bytes: &[u8]) -> Result<Self, SourceError> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::new());
        }

        let encoded: Encoded = serde_json::from_slice(bytes)
            .map_err(|e| SourceError::MalformedPosition(e.to_string()))?;
        Ok(Self {
            positions: Mutex::new(encoded.index_positions.unwrap_or_default()),
        })
    }

    /// Copy of the current mapping.
    pub fn snapshot(&self) -> BTreeMap<String, i64> {
        self.lock().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
