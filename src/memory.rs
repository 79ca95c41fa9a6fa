// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>
//
// In-memory store for the Quarry persistence core.
//
// Uses a `BTreeMap` wrapped in a tokio `RwLock` for thread-safe, ordered
// key-value storage. The BTreeMap ordering enables efficient range and
// prefix scanning. Used for testing, transaction overlays, and small
// ephemeral datasets.

use std::collections::BTreeMap;
use std::ops::Bound::{Included, Unbounded};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::StorageError;
use crate::store::{KeyValueVisitor, Store};

/// An in-memory store backed by a sorted `BTreeMap`.
///
/// All data lives in process memory and is lost on drop. Thread-safe via
/// `Arc<RwLock<...>>`; cloning shares the underlying map, which is how a
/// storage system hands out multiple handles to the same store.
///
/// # Example
///
/// ```rust
/// use quarry_storage::memory::InMemoryStore;
/// use quarry_storage::store::Store;
///
/// # tokio_test::block_on(async {
/// let store = InMemoryStore::new();
/// store.put(b"hello", b"world").await.unwrap();
/// let val = store.get(b"hello").await.unwrap();
/// assert_eq!(val, Some(b"world".to_vec()));
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct InMemoryStore {
    /// The underlying sorted map, protected by a read-write lock.
    data: Arc<RwLock<BTreeMap<Vec<u8>, Vec<u8>>>>,
    /// Set by the owning storage system on close; a standalone store's flag
    /// is never set.
    closed: Arc<AtomicBool>,
}

impl InMemoryStore {
    /// Create a new, empty in-memory store.
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(BTreeMap::new())),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Create a store whose liveness is controlled by the given flag.
    pub(crate) fn with_closed_flag(closed: Arc<AtomicBool>) -> Self {
        Self {
            data: Arc::new(RwLock::new(BTreeMap::new())),
            closed,
        }
    }

    /// Return the number of keys currently stored.
    pub async fn len(&self) -> usize {
        self.data.read().await.len()
    }

    /// Return true if the store contains no keys.
    pub async fn is_empty(&self) -> bool {
        self.data.read().await.is_empty()
    }

    fn check_open(&self) -> Result<(), StorageError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StorageError::SystemClosed);
        }
        Ok(())
    }

    /// Collects the entries of the closed interval `[begin, end]`.
    ///
    /// The snapshot is taken under the read lock and replayed to the
    /// visitor after the lock is released, so visitors can never observe
    /// concurrent mutations mid-scan.
    async fn snapshot_range(&self, begin: &[u8], end: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
        if begin > end {
            return Vec::new();
        }
        let map = self.data.read().await;
        map.range::<[u8], _>((Included(begin), Included(end)))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    async fn snapshot_prefix(&self, prefix: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
        let map = self.data.read().await;
        map.range::<[u8], _>((Included(prefix), Unbounded))
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        self.check_open()?;
        let map = self.data.read().await;
        Ok(map.get(key).cloned())
    }

    async fn multi_get(&self, keys: &[Vec<u8>]) -> Result<Vec<Option<Vec<u8>>>, StorageError> {
        self.check_open()?;
        let map = self.data.read().await;
        Ok(keys.iter().map(|key| map.get(key.as_slice()).cloned()).collect())
    }

    async fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        self.check_open()?;
        let mut map = self.data.write().await;
        map.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    async fn batch_put(&self, entries: &[(Vec<u8>, Vec<u8>)]) -> Result<(), StorageError> {
        self.check_open()?;
        // Single lock acquisition keeps the batch indivisible for readers.
        let mut map = self.data.write().await;
        for (key, value) in entries {
            map.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    async fn remove(&self, key: &[u8]) -> Result<(), StorageError> {
        self.check_open()?;
        let mut map = self.data.write().await;
        map.remove(key);
        Ok(())
    }

    async fn batch_remove(&self, keys: &[Vec<u8>]) -> Result<(), StorageError> {
        self.check_open()?;
        let mut map = self.data.write().await;
        for key in keys {
            map.remove(key.as_slice());
        }
        Ok(())
    }

    async fn scan(
        &self,
        begin: &[u8],
        end: &[u8],
        visitor: &mut KeyValueVisitor<'_>,
    ) -> Result<(), StorageError> {
        self.check_open()?;
        for (key, value) in self.snapshot_range(begin, end).await {
            visitor(&key, &value)?;
        }
        Ok(())
    }

    async fn scan_prefix(
        &self,
        prefix: &[u8],
        visitor: &mut KeyValueVisitor<'_>,
    ) -> Result<(), StorageError> {
        self.check_open()?;
        for (key, value) in self.snapshot_prefix(prefix).await {
            visitor(&key, &value)?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "in-memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn collect_scan(store: &InMemoryStore, begin: &[u8], end: &[u8]) -> Vec<Vec<u8>> {
        let mut keys = Vec::new();
        store
            .scan(begin, end, &mut |k, _| {
                keys.push(k.to_vec());
                Ok(())
            })
            .await
            .unwrap();
        keys
    }

    #[tokio::test]
    async fn test_basic_crud() {
        let store = InMemoryStore::new();

        // Initially empty.
        assert!(store.is_empty().await);
        assert_eq!(store.get(b"key1").await.unwrap(), None);

        // Put and get.
        store.put(b"key1", b"value1").await.unwrap();
        assert_eq!(store.get(b"key1").await.unwrap(), Some(b"value1".to_vec()));
        assert_eq!(store.len().await, 1);

        // Overwrite.
        store.put(b"key1", b"updated").await.unwrap();
        assert_eq!(store.get(b"key1").await.unwrap(), Some(b"updated".to_vec()));
        assert_eq!(store.len().await, 1);

        // Remove existing key.
        store.remove(b"key1").await.unwrap();
        assert_eq!(store.get(b"key1").await.unwrap(), None);
        assert!(store.is_empty().await);

        // Removing a missing key is not an error.
        store.remove(b"nonexistent").await.unwrap();
    }

    #[tokio::test]
    async fn test_multi_get_preserves_order() {
        let store = InMemoryStore::new();
        store.put(b"a", b"1").await.unwrap();
        store.put(b"c", b"3").await.unwrap();

        let results = store
            .multi_get(&[b"a".to_vec(), b"missing".to_vec(), b"c".to_vec()])
            .await
            .unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(results[0], Some(b"1".to_vec()));
        assert_eq!(results[1], None);
        assert_eq!(results[2], Some(b"3".to_vec()));
    }

    #[tokio::test]
    async fn test_batch_put_and_remove() {
        let store = InMemoryStore::new();

        store
            .batch_put(&[
                (b"x".to_vec(), b"10".to_vec()),
                (b"y".to_vec(), b"20".to_vec()),
                (b"z".to_vec(), b"30".to_vec()),
            ])
            .await
            .unwrap();
        assert_eq!(store.len().await, 3);

        store.batch_remove(&[b"x".to_vec(), b"z".to_vec()]).await.unwrap();
        assert_eq!(store.len().await, 1);
        assert_eq!(store.get(b"y").await.unwrap(), Some(b"20".to_vec()));
    }

    #[tokio::test]
    async fn test_scan_closed_interval() {
        let store = InMemoryStore::new();
        for key in [&b"aaa"[..], b"aaaa", b"aab", b"aac", b"abc"] {
            store.put(key, b"").await.unwrap();
        }

        // Both bounds inclusive.
        assert_eq!(
            collect_scan(&store, b"aaa", b"aab").await,
            vec![b"aaa".to_vec(), b"aaaa".to_vec(), b"aab".to_vec()]
        );

        // Single-key interval.
        assert_eq!(collect_scan(&store, b"aaa", b"aaa").await, vec![b"aaa".to_vec()]);

        // Empty interval visits nothing.
        assert!(collect_scan(&store, b"aab", b"aaa").await.is_empty());
    }

    #[tokio::test]
    async fn test_scan_prefix() {
        let store = InMemoryStore::new();
        store.put(b"user:1:name", b"Alice").await.unwrap();
        store.put(b"user:1:age", b"30").await.unwrap();
        store.put(b"user:2:name", b"Bob").await.unwrap();
        store.put(b"post:1:title", b"Hello").await.unwrap();

        let mut keys = Vec::new();
        store
            .scan_prefix(b"user:1:", &mut |k, _| {
                keys.push(k.to_vec());
                Ok(())
            })
            .await
            .unwrap();
        // BTreeMap ordering: "user:1:age" < "user:1:name".
        assert_eq!(keys, vec![b"user:1:age".to_vec(), b"user:1:name".to_vec()]);

        // Empty prefix visits everything.
        let mut count = 0usize;
        store
            .scan_prefix(b"", &mut |_, _| {
                count += 1;
                Ok(())
            })
            .await
            .unwrap();
        assert_eq!(count, 4);
    }

    #[tokio::test]
    async fn test_scan_prefix_trailing_0xff() {
        let store = InMemoryStore::new();
        let key = [17u8, 18, 19, 0xff];
        store.put(&key, &key).await.unwrap();

        let mut count = 0usize;
        store
            .scan_prefix(&key, &mut |_, _| {
                count += 1;
                Ok(())
            })
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_scan_prefixes_overlapping_visit_once() {
        let store = InMemoryStore::new();
        for key in [
            &b"/root/foo"[..],
            b"/root/bar",
            b"/root/baz",
            b"/some/other/file",
            b"/a/different/file",
        ] {
            store.put(key, b"").await.unwrap();
        }

        let mut keys = Vec::new();
        store
            .scan_prefixes(&[b"/roo".to_vec(), b"/root/f".to_vec()], &mut |k, _| {
                keys.push(k.to_vec());
                Ok(())
            })
            .await
            .unwrap();
        assert_eq!(keys.len(), 3);

        keys.clear();
        store
            .scan_prefixes(&[b"/roo".to_vec(), b"/a/di".to_vec()], &mut |k, _| {
                keys.push(k.to_vec());
                Ok(())
            })
            .await
            .unwrap();
        assert_eq!(keys.len(), 4);

        keys.clear();
        store
            .scan_prefixes(&[], &mut |k, _| {
                keys.push(k.to_vec());
                Ok(())
            })
            .await
            .unwrap();
        assert!(keys.is_empty());
    }

    #[tokio::test]
    async fn test_scan_keys_variant() {
        let store = InMemoryStore::new();
        store.put(b"k1", b"v1").await.unwrap();
        store.put(b"k2", b"v2").await.unwrap();

        let mut keys = Vec::new();
        store
            .scan_keys(b"k1", b"k2", &mut |k| {
                keys.push(k.to_vec());
                Ok(())
            })
            .await
            .unwrap();
        assert_eq!(keys, vec![b"k1".to_vec(), b"k2".to_vec()]);
    }

    #[tokio::test]
    async fn test_visitor_error_aborts_scan() {
        let store = InMemoryStore::new();
        store.put(b"a", b"1").await.unwrap();
        store.put(b"b", b"2").await.unwrap();
        store.put(b"c", b"3").await.unwrap();

        let mut seen = 0usize;
        let result = store
            .scan(b"a", b"c", &mut |_, _| {
                seen += 1;
                if seen == 2 {
                    return Err(StorageError::Backend("stop".to_string()));
                }
                Ok(())
            })
            .await;
        assert!(result.is_err());
        assert_eq!(seen, 2);

        // The store is still usable after an aborted scan.
        assert_eq!(store.get(b"c").await.unwrap(), Some(b"3".to_vec()));
    }

    #[tokio::test]
    async fn test_scan_yields_strictly_ascending_keys() {
        let store = InMemoryStore::new();
        // Insertion order deliberately shuffled.
        for key in [&b"mm"[..], b"a", b"zz", b"m", b"ab", b"z"] {
            store.put(key, b"x").await.unwrap();
        }

        let keys = collect_scan(&store, b"", b"\xff\xff\xff").await;
        assert_eq!(keys.len(), 6);
        for pair in keys.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[tokio::test]
    async fn test_clone_shares_state() {
        let store = InMemoryStore::new();
        let clone = store.clone();

        store.put(b"shared", b"data").await.unwrap();
        assert_eq!(clone.get(b"shared").await.unwrap(), Some(b"data".to_vec()));
    }
}
