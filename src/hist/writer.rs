// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>
//
// Revision-recording writing view of a historized store.

use async_trait::async_trait;

use crate::error::StorageError;
use crate::store::{KeyValueVisitor, Store};

use super::head::{head_get, head_multi_get, head_scan, head_scan_prefix};
use super::{head_key, revision_key, Revision, TOMBSTONE};

/// Records every write against a fixed revision while keeping the head
/// slots current.
///
/// On `put`, the value lands in both the key's versioned slot for this
/// revision and its head slot; on `remove`, the versioned slot receives the
/// tombstone and the head slot is deleted. Writing the same key twice at
/// the same revision collapses to the latest write. Reads behave like the
/// head reading view.
pub struct RevisionWriterStore<S: Store> {
    /// The shared physical store.
    inner: S,
    /// The revision all writes are recorded against.
    revision: Revision,
}

impl<S: Store> RevisionWriterStore<S> {
    /// Create a writing view that records changes at `revision`.
    pub fn new(inner: S, revision: Revision) -> Self {
        Self { inner, revision }
    }

    /// The revision this view records changes against.
    pub fn revision(&self) -> Revision {
        self.revision
    }
}

#[async_trait]
impl<S: Store> Store for RevisionWriterStore<S> {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        head_get(&self.inner, key).await
    }

    async fn multi_get(&self, keys: &[Vec<u8>]) -> Result<Vec<Option<Vec<u8>>>, StorageError> {
        head_multi_get(&self.inner, keys).await
    }

    async fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        // One batch, so head and versioned slot move together where the
        // backend writes batches atomically.
        self.inner
            .batch_put(&[
                (revision_key(key, self.revision), value.to_vec()),
                (head_key(key), value.to_vec()),
            ])
            .await
    }

    async fn batch_put(&self, entries: &[(Vec<u8>, Vec<u8>)]) -> Result<(), StorageError> {
        let mut slots = Vec::with_capacity(entries.len() * 2);
        for (key, value) in entries {
            slots.push((revision_key(key, self.revision), value.clone()));
            slots.push((head_key(key), value.clone()));
        }
        self.inner.batch_put(&slots).await
    }

    async fn remove(&self, key: &[u8]) -> Result<(), StorageError> {
        self.inner
            .put(&revision_key(key, self.revision), TOMBSTONE)
            .await?;
        self.inner.remove(&head_key(key)).await
    }

    async fn batch_remove(&self, keys: &[Vec<u8>]) -> Result<(), StorageError> {
        let tombstones: Vec<(Vec<u8>, Vec<u8>)> = keys
            .iter()
            .map(|key| (revision_key(key, self.revision), TOMBSTONE.to_vec()))
            .collect();
        self.inner.batch_put(&tombstones).await?;

        let head_keys: Vec<Vec<u8>> = keys.iter().map(|key| head_key(key)).collect();
        self.inner.batch_remove(&head_keys).await
    }

    async fn scan(
        &self,
        begin: &[u8],
        end: &[u8],
        visitor: &mut KeyValueVisitor<'_>,
    ) -> Result<(), StorageError> {
        head_scan(&self.inner, begin, end, visitor).await
    }

    async fn scan_prefix(
        &self,
        prefix: &[u8],
        visitor: &mut KeyValueVisitor<'_>,
    ) -> Result<(), StorageError> {
        head_scan_prefix(&self.inner, prefix, visitor).await
    }

    fn name(&self) -> &str {
        "historized-writer"
    }
}
