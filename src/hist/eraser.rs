// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>
//
// Rollback view of a historized store.

use std::collections::HashMap;

use async_trait::async_trait;
use tracing::debug;

use crate::error::StorageError;
use crate::rollback::RollbackableIndex;
use crate::store::Store;

use super::{
    head_key, is_tombstone, revision_key, split_revision_key, strip_head_marker, Revision,
    HEAD_MARKER,
};

/// Maximal number of keys to process at the same time during head
/// recovery. This limit is required to avoid out of memory for large
/// values.
const REFRESH_BATCH_SIZE: usize = 100;

/// Erases all history recorded after a given revision.
///
/// Rolling back to revision `t` deletes every versioned slot with revision
/// greater than `t` and recomputes each key's head slot from its greatest
/// remaining version: the surviving value becomes the new head, a surviving
/// tombstone or an empty history deletes the head. Rolling back to a
/// revision at or after the latest write is a no-op; rolling back before
/// the first write empties the store.
pub struct HistoryEraserStore<S: Store> {
    /// The shared physical store.
    inner: S,
}

impl<S: Store> HistoryEraserStore<S> {
    /// Create a rollback view over the physical store.
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    /// Refreshes the head slots for a batch of surviving keys.
    async fn refresh_heads(
        &self,
        batch: &[(Vec<u8>, Revision)],
        to_delete: &mut Vec<Vec<u8>>,
    ) -> Result<(), StorageError> {
        let version_keys: Vec<Vec<u8>> = batch
            .iter()
            .map(|(key, revision)| revision_key(key, *revision))
            .collect();
        let values = self.inner.multi_get(&version_keys).await?;

        let mut new_heads = Vec::new();
        for ((key, revision), value) in batch.iter().zip(values) {
            let value = value.ok_or_else(|| {
                StorageError::CorruptedData(format!(
                    "versioned slot vanished during rollback (revision {revision})"
                ))
            })?;
            if is_tombstone(&value) {
                to_delete.push(head_key(key));
            } else {
                new_heads.push((head_key(key), value));
            }
        }
        self.inner.batch_put(&new_heads).await
    }
}

#[async_trait]
impl<S: Store> RollbackableIndex for HistoryEraserStore<S> {
    async fn perform_rollback(&self, timestamp: Revision) -> Result<(), StorageError> {
        // One key-only pass over the whole physical store classifies every
        // slot: head slots are remembered, versioned slots after the
        // rollback point are marked for deletion, the rest feed the
        // latest-surviving-revision map.
        let mut head_keys: Vec<Vec<u8>> = Vec::new();
        let mut to_delete: Vec<Vec<u8>> = Vec::new();
        let mut latest_change: HashMap<Vec<u8>, Revision> = HashMap::new();

        self.inner
            .scan_keys_prefix(b"", &mut |raw| {
                if raw.starts_with(HEAD_MARKER) {
                    head_keys.push(strip_head_marker(raw).to_vec());
                    return Ok(());
                }
                let (logical, revision) = split_revision_key(raw).ok_or_else(|| {
                    StorageError::CorruptedData(format!(
                        "malformed versioned slot key ({} bytes)",
                        raw.len()
                    ))
                })?;
                if revision > timestamp {
                    to_delete.push(raw.to_vec());
                } else {
                    let latest = latest_change.entry(logical.to_vec()).or_insert(revision);
                    if revision > *latest {
                        *latest = revision;
                    }
                }
                Ok(())
            })
            .await?;

        // Keys whose entire history lies after the rollback point lose
        // their head slot entirely.
        for key in &head_keys {
            if !latest_change.contains_key(key) {
                to_delete.push(head_key(key));
            }
        }

        let survivors: Vec<(Vec<u8>, Revision)> = latest_change.into_iter().collect();
        for batch in survivors.chunks(REFRESH_BATCH_SIZE) {
            self.refresh_heads(batch, &mut to_delete).await?;
        }

        debug!(
            erased = to_delete.len(),
            surviving = survivors.len(),
            timestamp,
            "historized store rollback"
        );
        self.inner.batch_remove(&to_delete).await
    }
}
