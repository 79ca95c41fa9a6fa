// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>
//
// Head-only reading view of a historized store.

use async_trait::async_trait;

use crate::error::StorageError;
use crate::store::{KeyValueVisitor, KeyVisitor, Store};

use super::{head_key, strip_head_marker, HEAD_MARKER};

/// Reads the most recent state of a historized store.
///
/// All operations work purely against the head keyspace: a key without a
/// head slot is treated as nonexistent regardless of its version history.
/// Write operations fail with [`StorageError::ReadOnly`].
pub struct HeadReaderStore<S: Store> {
    /// The shared physical store.
    inner: S,
}

impl<S: Store> HeadReaderStore<S> {
    /// Create a head reading view over the physical store.
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

fn read_only() -> StorageError {
    StorageError::ReadOnly("historized head reader".to_string())
}

pub(super) async fn head_get<S: Store + ?Sized>(
    store: &S,
    key: &[u8],
) -> Result<Option<Vec<u8>>, StorageError> {
    store.get(&head_key(key)).await
}

pub(super) async fn head_multi_get<S: Store + ?Sized>(
    store: &S,
    keys: &[Vec<u8>],
) -> Result<Vec<Option<Vec<u8>>>, StorageError> {
    let head_keys: Vec<Vec<u8>> = keys.iter().map(|key| head_key(key)).collect();
    store.multi_get(&head_keys).await
}

pub(super) async fn head_scan<S: Store + ?Sized>(
    store: &S,
    begin: &[u8],
    end: &[u8],
    visitor: &mut KeyValueVisitor<'_>,
) -> Result<(), StorageError> {
    let mut stripping = |raw: &[u8], value: &[u8]| {
        // Versioned slots of reserved keys may interleave; only head slots
        // belong to this view.
        if raw.starts_with(HEAD_MARKER) {
            visitor(strip_head_marker(raw), value)
        } else {
            Ok(())
        }
    };
    store.scan(&head_key(begin), &head_key(end), &mut stripping).await
}

pub(super) async fn head_scan_prefix<S: Store + ?Sized>(
    store: &S,
    prefix: &[u8],
    visitor: &mut KeyValueVisitor<'_>,
) -> Result<(), StorageError> {
    let mut stripping = |raw: &[u8], value: &[u8]| {
        if raw.starts_with(HEAD_MARKER) {
            visitor(strip_head_marker(raw), value)
        } else {
            Ok(())
        }
    };
    store.scan_prefix(&head_key(prefix), &mut stripping).await
}

pub(super) async fn head_scan_keys<S: Store + ?Sized>(
    store: &S,
    begin: &[u8],
    end: &[u8],
    visitor: &mut KeyVisitor<'_>,
) -> Result<(), StorageError> {
    let mut stripping = |raw: &[u8]| {
        if raw.starts_with(HEAD_MARKER) {
            visitor(strip_head_marker(raw))
        } else {
            Ok(())
        }
    };
    store
        .scan_keys(&head_key(begin), &head_key(end), &mut stripping)
        .await
}

pub(super) async fn head_scan_keys_prefix<S: Store + ?Sized>(
    store: &S,
    prefix: &[u8],
    visitor: &mut KeyVisitor<'_>,
) -> Result<(), StorageError> {
    let mut stripping = |raw: &[u8]| {
        if raw.starts_with(HEAD_MARKER) {
            visitor(strip_head_marker(raw))
        } else {
            Ok(())
        }
    };
    store.scan_keys_prefix(&head_key(prefix), &mut stripping).await
}

#[async_trait]
impl<S: Store> Store for HeadReaderStore<S> {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        head_get(&self.inner, key).await
    }

    async fn multi_get(&self, keys: &[Vec<u8>]) -> Result<Vec<Option<Vec<u8>>>, StorageError> {
        head_multi_get(&self.inner, keys).await
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
        head_scan(&self.inner, begin, end, visitor).await
    }

    async fn scan_prefix(
        &self,
        prefix: &[u8],
        visitor: &mut KeyValueVisitor<'_>,
    ) -> Result<(), StorageError> {
        head_scan_prefix(&self.inner, prefix, visitor).await
    }

    async fn scan_keys(
        &self,
        begin: &[u8],
        end: &[u8],
        visitor: &mut KeyVisitor<'_>,
    ) -> Result<(), StorageError> {
        head_scan_keys(&self.inner, begin, end, visitor).await
    }

    async fn scan_keys_prefix(
        &self,
        prefix: &[u8],
        visitor: &mut KeyVisitor<'_>,
    ) -> Result<(), StorageError> {
        head_scan_keys_prefix(&self.inner, prefix, visitor).await
    }

    fn name(&self) -> &str {
        "historized-head"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStore;

    #[tokio::test]
    async fn test_writes_rejected() {
        let store = HeadReaderStore::new(InMemoryStore::new());
        assert!(matches!(
            store.put(b"k", b"v").await,
            Err(StorageError::ReadOnly(_))
        ));
        assert!(matches!(store.remove(b"k").await, Err(StorageError::ReadOnly(_))));
        assert!(matches!(
            store.batch_put(&[(b"k".to_vec(), b"v".to_vec())]).await,
            Err(StorageError::ReadOnly(_))
        ));
        assert!(matches!(
            store.batch_remove(&[b"k".to_vec()]).await,
            Err(StorageError::ReadOnly(_))
        ));
    }

    #[tokio::test]
    async fn test_reads_only_head_keyspace() {
        let physical = InMemoryStore::new();
        // A head slot and an unrelated versioned slot.
        physical.put(b"#_HEAD_#key1", b"current").await.unwrap();
        physical
            .put(&super::super::revision_key(b"key1", 7), b"old")
            .await
            .unwrap();

        let head = HeadReaderStore::new(physical);
        assert_eq!(head.get(b"key1").await.unwrap(), Some(b"current".to_vec()));

        let mut entries = Vec::new();
        head.scan_prefix(b"", &mut |k, v| {
            entries.push((k.to_vec(), v.to_vec()));
            Ok(())
        })
        .await
        .unwrap();
        assert_eq!(entries, vec![(b"key1".to_vec(), b"current".to_vec())]);
    }

    #[tokio::test]
    async fn test_key_without_head_slot_is_missing() {
        let physical = InMemoryStore::new();
        physical
            .put(&super::super::revision_key(b"gone", 3), b"history-only")
            .await
            .unwrap();

        let head = HeadReaderStore::new(physical);
        assert_eq!(head.get(b"gone").await.unwrap(), None);
        assert_eq!(
            head.multi_get(&[b"gone".to_vec()]).await.unwrap(),
            vec![None]
        );
    }
}
