// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>
//
// Fixed-revision reading view of a historized store.
//
// Reading from a given revision is more expensive than reading from the
// head: every lookup resolves the greatest recorded version at or before
// the view's revision.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::StorageError;
use crate::store::{KeyValueVisitor, Store};

use super::{is_tombstone, revision_key, split_revision_key, Revision, HEAD_MARKER};

/// Reads the state of a historized store as of a fixed revision.
///
/// For every key the view resolves the versioned slot with the greatest
/// revision `r <= T` and suppresses tombstones. A view constructed with a
/// revision at or beyond the highest revision ever written is
/// observationally identical to the head reading view. Write operations
/// fail with [`StorageError::ReadOnly`].
pub struct RevisionReaderStore<S: Store> {
    /// The shared physical store.
    inner: S,
    /// The revision this view reads as of.
    revision: Revision,
}

impl<S: Store> RevisionReaderStore<S> {
    /// Create a reading view fixed at `revision`.
    pub fn new(inner: S, revision: Revision) -> Self {
        Self { inner, revision }
    }

    /// The revision this view reads as of.
    pub fn revision(&self) -> Revision {
        self.revision
    }

    /// Resolves the versioned slots found by a raw scan into the per-key
    /// state as of this view's revision.
    ///
    /// Raw entries arrive in ascending key order, so within one logical key
    /// the last accepted version is the greatest one; tombstones stay in
    /// the map until replay to shadow earlier values.
    fn accept(
        &self,
        resolved: &mut BTreeMap<Vec<u8>, Vec<u8>>,
        raw: &[u8],
        value: &[u8],
        mut included: impl FnMut(&[u8]) -> bool,
    ) {
        if raw.starts_with(HEAD_MARKER) {
            return;
        }
        if let Some((logical, revision)) = split_revision_key(raw) {
            if revision <= self.revision && included(logical) {
                resolved.insert(logical.to_vec(), value.to_vec());
            }
        }
    }

    fn replay(
        resolved: BTreeMap<Vec<u8>, Vec<u8>>,
        visitor: &mut KeyValueVisitor<'_>,
    ) -> Result<(), StorageError> {
        for (key, value) in resolved {
            if !is_tombstone(&value) {
                visitor(&key, &value)?;
            }
        }
        Ok(())
    }
}

fn read_only() -> StorageError {
    StorageError::ReadOnly("historized revision reader".to_string())
}

#[async_trait]
impl<S: Store> Store for RevisionReaderStore<S> {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        let begin = revision_key(key, 0);
        let end = revision_key(key, self.revision);

        // Ascending scan order makes the last matching slot the greatest
        // version at or before this view's revision.
        let mut latest: Option<Vec<u8>> = None;
        self.inner
            .scan(&begin, &end, &mut |raw, value| {
                if let Some((logical, _)) = split_revision_key(raw) {
                    if logical == key {
                        latest = Some(value.to_vec());
                    }
                }
                Ok(())
            })
            .await?;

        Ok(latest.filter(|value| !is_tombstone(value)))
    }

    async fn multi_get(&self, keys: &[Vec<u8>]) -> Result<Vec<Option<Vec<u8>>>, StorageError> {
        // Each key needs its own version resolution; batching buys nothing
        // in the historized case.
        let mut result = Vec::with_capacity(keys.len());
        for key in keys {
            result.push(self.get(key).await?);
        }
        Ok(result)
    }

    async fn put(&self, _key: &[u8], _value: &[u8]) -> Result<(), StorageError> {
        Err(read_only())
    }

    async fn batch_put(&self, _entries: &[(Vec<u8>, Vec<u8>)]) -> Result<(), StorageError> {
        Err(read_only())
    }

    async fn remove(&self, _key: &[u8]) -> Result<(), StorageError> {
        Err(read_only())
    }

    async fn batch_remove(&self, _keys: &[Vec<u8>]) -> Result<(), StorageError> {
        Err(read_only())
    }

    async fn scan(
        &self,
        begin: &[u8],
        end: &[u8],
        visitor: &mut KeyValueVisitor<'_>,
    ) -> Result<(), StorageError> {
        if begin > end {
            return Ok(());
        }
        let raw_end = revision_key(end, self.revision);

        let mut resolved = BTreeMap::new();
        self.inner
            .scan(begin, &raw_end, &mut |raw, value| {
                self.accept(&mut resolved, raw, value, |logical| {
                    logical >= begin && logical <= end
                });
                Ok(())
            })
            .await?;

        Self::replay(resolved, visitor)
    }

    async fn scan_prefix(
        &self,
        prefix: &[u8],
        visitor: &mut KeyValueVisitor<'_>,
    ) -> Result<(), StorageError> {
        let mut resolved = BTreeMap::new();
        self.inner
            .scan_prefix(prefix, &mut |raw, value| {
                self.accept(&mut resolved, raw, value, |logical| {
                    logical.starts_with(prefix)
                });
                Ok(())
            })
            .await?;

        Self::replay(resolved, visitor)
    }

    fn name(&self) -> &str {
        "historized-revision"
    }
}

#[cfg(test)]
mod tests {
    use super::super::writer::RevisionWriterStore;
    use super::*;
    use crate::memory::InMemoryStore;

    /// Builds the scenario used across the historizing tests: three keys
    /// inserted at revision 12, mixed changes at 27 and 42.
    async fn scenario_store() -> InMemoryStore {
        let physical = InMemoryStore::new();

        let rev12 = RevisionWriterStore::new(physical.clone(), 12);
        rev12
            .batch_put(&[
                (b"key1".to_vec(), vec![1]),
                (b"key2".to_vec(), vec![2]),
                (b"key3".to_vec(), vec![3]),
            ])
            .await
            .unwrap();

        let rev27 = RevisionWriterStore::new(physical.clone(), 27);
        rev27.remove(b"key2").await.unwrap();
        rev27.put(b"key4", &[4]).await.unwrap();
        rev27.put(b"key1", &[5]).await.unwrap();

        let rev42 = RevisionWriterStore::new(physical.clone(), 42);
        rev42.remove(b"key1").await.unwrap();
        rev42.put(b"key2", &[6]).await.unwrap();
        rev42.put(b"key4", &[7]).await.unwrap();

        physical
    }

    async fn scan_all<S: Store>(store: &S) -> Vec<(Vec<u8>, Vec<u8>)> {
        let mut entries = Vec::new();
        store
            .scan_prefix(b"", &mut |k, v| {
                entries.push((k.to_vec(), v.to_vec()));
                Ok(())
            })
            .await
            .unwrap();
        entries
    }

    #[tokio::test]
    async fn test_get_resolves_greatest_version() {
        let physical = scenario_store().await;
        let rev30 = RevisionReaderStore::new(physical, 30);

        assert_eq!(rev30.get(b"key1").await.unwrap(), Some(vec![5]));
        assert_eq!(rev30.get(b"key2").await.unwrap(), None); // removed at 27
        assert_eq!(rev30.get(b"key3").await.unwrap(), Some(vec![3]));
        assert_eq!(rev30.get(b"key4").await.unwrap(), Some(vec![4]));
    }

    #[tokio::test]
    async fn test_scan_reconstructs_state_as_of_revision() {
        let physical = scenario_store().await;
        let rev30 = RevisionReaderStore::new(physical, 30);

        assert_eq!(
            scan_all(&rev30).await,
            vec![
                (b"key1".to_vec(), vec![5]),
                (b"key3".to_vec(), vec![3]),
                (b"key4".to_vec(), vec![4]),
            ]
        );

        let mut keys = Vec::new();
        rev30
            .scan(b"key1", b"key3", &mut |k, _| {
                keys.push(k.to_vec());
                Ok(())
            })
            .await
            .unwrap();
        assert_eq!(keys, vec![b"key1".to_vec(), b"key3".to_vec()]);
    }

    #[tokio::test]
    async fn test_late_revision_matches_head_reader() {
        let physical = scenario_store().await;
        let head = super::super::head::HeadReaderStore::new(physical.clone());

        for revision in [42, 100, u64::MAX] {
            let reader = RevisionReaderStore::new(physical.clone(), revision);
            assert_eq!(scan_all(&reader).await, scan_all(&head).await);
            for key in [&b"key1"[..], b"key2", b"key3", b"key4", b"missing"] {
                assert_eq!(
                    reader.get(key).await.unwrap(),
                    head.get(key).await.unwrap(),
                );
            }
        }
    }

    #[tokio::test]
    async fn test_revision_before_first_write_sees_nothing() {
        let physical = scenario_store().await;
        let reader = RevisionReaderStore::new(physical, 1);

        assert_eq!(reader.get(b"key1").await.unwrap(), None);
        assert!(scan_all(&reader).await.is_empty());
    }

    #[tokio::test]
    async fn test_multi_get_resolves_per_key() {
        let physical = scenario_store().await;
        let rev30 = RevisionReaderStore::new(physical, 30);

        let values = rev30
            .multi_get(&[b"key1".to_vec(), b"key2".to_vec(), b"missing".to_vec()])
            .await
            .unwrap();
        assert_eq!(values, vec![Some(vec![5]), None, None]);
    }

    #[tokio::test]
    async fn test_writes_rejected() {
        let reader = RevisionReaderStore::new(InMemoryStore::new(), 10);
        assert!(matches!(
            reader.put(b"k", b"v").await,
            Err(StorageError::ReadOnly(_))
        ));
        assert!(matches!(reader.remove(b"k").await, Err(StorageError::ReadOnly(_))));
    }
}
