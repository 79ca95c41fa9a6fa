// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>
//
// Transactional store for the Quarry persistence core.
//
// Buffers all mutations in an overlay over a main store: a change store
// holding pending new/updated values and a deletion store holding
// tombstones for pending removals. The buffered edits are written to the
// main store as one change on commit, or discarded on rollback.
//
// A single instance represents one logical transaction; concurrent use of
// one instance is caller error and gets no internal locking.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;

use crate::error::StorageError;
use crate::memory::InMemoryStore;
use crate::store::{KeyValueVisitor, KeyVisitor, Store};
use crate::util;

/// Marker used as value in the deletion store.
const DELETION_MARKER: &[u8] = &[1];

/// A store wrapper that buffers edits until [`commit`](Self::commit) or
/// [`rollback`](Self::rollback).
///
/// Reads resolve with the precedence change > deletion > main: a pending
/// change wins, a pending deletion hides the main store, anything else
/// falls through to the main store. The main store is never touched before
/// commit.
///
/// # Example
///
/// ```rust
/// use quarry_storage::memory::InMemoryStore;
/// use quarry_storage::store::Store;
/// use quarry_storage::transaction::TransactionalStore;
///
/// # tokio_test::block_on(async {
/// let main = InMemoryStore::new();
/// main.put(b"foo", b"A").await.unwrap();
///
/// let txn = TransactionalStore::new(main.clone());
/// txn.remove(b"foo").await.unwrap();
/// txn.put(b"bar", b"B").await.unwrap();
///
/// // Buffered view, main store unchanged.
/// assert_eq!(txn.get(b"foo").await.unwrap(), None);
/// assert_eq!(main.get(b"foo").await.unwrap(), Some(b"A".to_vec()));
///
/// txn.commit().await.unwrap();
/// assert_eq!(main.get(b"foo").await.unwrap(), None);
/// assert_eq!(main.get(b"bar").await.unwrap(), Some(b"B".to_vec()));
/// # });
/// ```
pub struct TransactionalStore<M: Store, O: Store = InMemoryStore> {
    /// The main store that is modified on commit.
    main: M,
    /// The overlay store holding all pending changes.
    change: O,
    /// The overlay store holding all pending deletions.
    deletion: O,
}

impl<M: Store> TransactionalStore<M, InMemoryStore> {
    /// Create a transaction over `main` using in-memory overlay stores.
    pub fn new(main: M) -> Self {
        Self::with_overlays(main, InMemoryStore::new(), InMemoryStore::new())
    }
}

impl<M: Store, O: Store> TransactionalStore<M, O> {
    /// Create a transaction with caller-supplied overlay stores.
    ///
    /// The overlays must be empty and private to this transaction.
    pub fn with_overlays(main: M, change: O, deletion: O) -> Self {
        Self {
            main,
            change,
            deletion,
        }
    }

    /// Return a reference to the main store.
    pub fn main(&self) -> &M {
        &self.main
    }

    /// Writes all buffered edits into the main store, then clears the
    /// overlay.
    ///
    /// The change store is drained into one batched put and the deletion
    /// store into one batched remove. The overlay is only cleared after
    /// both batches have succeeded, so a failed commit leaves the
    /// transaction intact for retry or explicit rollback.
    pub async fn commit(&self) -> Result<(), StorageError> {
        let mut pending = Vec::new();
        self.change
            .scan_prefix(b"", &mut |key, value| {
                pending.push((key.to_vec(), value.to_vec()));
                Ok(())
            })
            .await?;

        let deleted = util::list_keys(&self.deletion).await?;

        self.main.batch_put(&pending).await?;
        self.main.batch_remove(&deleted).await?;

        self.rollback().await
    }

    /// Discards all buffered edits without touching the main store.
    ///
    /// Afterwards both overlay stores are empty and a fresh transaction
    /// resumes from the main store only.
    pub async fn rollback(&self) -> Result<(), StorageError> {
        util::clear_store(&self.change).await?;
        util::clear_store(&self.deletion).await
    }

    /// Merges the three per-store scans of the closed range `[begin, end]`
    /// into one ordered map: main entries first, then deletion suppression,
    /// then change overrides.
    async fn merged_range(
        &self,
        begin: &[u8],
        end: &[u8],
    ) -> Result<BTreeMap<Vec<u8>, Vec<u8>>, StorageError> {
        let mut entries = BTreeMap::new();
        self.main
            .scan(begin, end, &mut |key, value| {
                entries.insert(key.to_vec(), value.to_vec());
                Ok(())
            })
            .await?;
        self.deletion
            .scan_keys(begin, end, &mut |key| {
                entries.remove(key);
                Ok(())
            })
            .await?;
        self.change
            .scan(begin, end, &mut |key, value| {
                entries.insert(key.to_vec(), value.to_vec());
                Ok(())
            })
            .await?;
        Ok(entries)
    }

    /// Prefix variant of [`Self::merged_range`].
    async fn merged_prefix(
        &self,
        prefix: &[u8],
    ) -> Result<BTreeMap<Vec<u8>, Vec<u8>>, StorageError> {
        let mut entries = BTreeMap::new();
        self.main
            .scan_prefix(prefix, &mut |key, value| {
                entries.insert(key.to_vec(), value.to_vec());
                Ok(())
            })
            .await?;
        self.deletion
            .scan_keys_prefix(prefix, &mut |key| {
                entries.remove(key);
                Ok(())
            })
            .await?;
        self.change
            .scan_prefix(prefix, &mut |key, value| {
                entries.insert(key.to_vec(), value.to_vec());
                Ok(())
            })
            .await?;
        Ok(entries)
    }

    fn replay(
        entries: BTreeMap<Vec<u8>, Vec<u8>>,
        visitor: &mut KeyValueVisitor<'_>,
    ) -> Result<(), StorageError> {
        for (key, value) in entries {
            visitor(&key, &value)?;
        }
        Ok(())
    }

    fn replay_keys(
        keys: BTreeSet<Vec<u8>>,
        visitor: &mut KeyVisitor<'_>,
    ) -> Result<(), StorageError> {
        for key in keys {
            visitor(&key)?;
        }
        Ok(())
    }
}

#[async_trait]
impl<M: Store, O: Store> Store for TransactionalStore<M, O> {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        if let Some(value) = self.change.get(key).await? {
            return Ok(Some(value));
        }
        if self.deletion.get(key).await?.is_some() {
            return Ok(None);
        }
        self.main.get(key).await
    }

    async fn multi_get(&self, keys: &[Vec<u8>]) -> Result<Vec<Option<Vec<u8>>>, StorageError> {
        let mut result = self.main.multi_get(keys).await?;

        let deleted = self.deletion.multi_get(keys).await?;
        for (slot, tombstone) in result.iter_mut().zip(deleted) {
            if tombstone.is_some() {
                *slot = None;
            }
        }

        let changes = self.change.multi_get(keys).await?;
        for (slot, change) in result.iter_mut().zip(changes) {
            if change.is_some() {
                *slot = change;
            }
        }

        Ok(result)
    }

    async fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        self.deletion.remove(key).await?;
        self.change.put(key, value).await
    }

    async fn batch_put(&self, entries: &[(Vec<u8>, Vec<u8>)]) -> Result<(), StorageError> {
        let keys: Vec<Vec<u8>> = entries.iter().map(|(k, _)| k.clone()).collect();
        self.deletion.batch_remove(&keys).await?;
        self.change.batch_put(entries).await
    }

    async fn remove(&self, key: &[u8]) -> Result<(), StorageError> {
        self.change.remove(key).await?;
        self.deletion.put(key, DELETION_MARKER).await
    }

    async fn batch_remove(&self, keys: &[Vec<u8>]) -> Result<(), StorageError> {
        self.change.batch_remove(keys).await?;
        let tombstones: Vec<(Vec<u8>, Vec<u8>)> = keys
            .iter()
            .map(|key| (key.clone(), DELETION_MARKER.to_vec()))
            .collect();
        self.deletion.batch_put(&tombstones).await
    }

    async fn scan(
        &self,
        begin: &[u8],
        end: &[u8],
        visitor: &mut KeyValueVisitor<'_>,
    ) -> Result<(), StorageError> {
        let entries = self.merged_range(begin, end).await?;
        Self::replay(entries, visitor)
    }

    async fn scan_prefix(
        &self,
        prefix: &[u8],
        visitor: &mut KeyValueVisitor<'_>,
    ) -> Result<(), StorageError> {
        let entries = self.merged_prefix(prefix).await?;
        Self::replay(entries, visitor)
    }

    async fn scan_keys(
        &self,
        begin: &[u8],
        end: &[u8],
        visitor: &mut KeyVisitor<'_>,
    ) -> Result<(), StorageError> {
        let mut keys = BTreeSet::new();
        self.main
            .scan_keys(begin, end, &mut |key| {
                keys.insert(key.to_vec());
                Ok(())
            })
            .await?;
        self.deletion
            .scan_keys(begin, end, &mut |key| {
                keys.remove(key);
                Ok(())
            })
            .await?;
        self.change
            .scan_keys(begin, end, &mut |key| {
                keys.insert(key.to_vec());
                Ok(())
            })
            .await?;
        Self::replay_keys(keys, visitor)
    }

    async fn scan_keys_prefix(
        &self,
        prefix: &[u8],
        visitor: &mut KeyVisitor<'_>,
    ) -> Result<(), StorageError> {
        let mut keys = BTreeSet::new();
        self.main
            .scan_keys_prefix(prefix, &mut |key| {
                keys.insert(key.to_vec());
                Ok(())
            })
            .await?;
        self.deletion
            .scan_keys_prefix(prefix, &mut |key| {
                keys.remove(key);
                Ok(())
            })
            .await?;
        self.change
            .scan_keys_prefix(prefix, &mut |key| {
                keys.insert(key.to_vec());
                Ok(())
            })
            .await?;
        Self::replay_keys(keys, visitor)
    }

    fn name(&self) -> &str {
        "transactional"
    }
}
