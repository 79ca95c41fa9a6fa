// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>
//
// Compressing store decorator for the Quarry persistence core.
//
// Wraps any `Store` and transparently LZ4-compresses values on write and
// decompresses them on read. Keys are never transformed, so ordering and
// scan semantics of the inner store are preserved unchanged.

use async_trait::async_trait;

use crate::error::StorageError;
use crate::store::{KeyValueVisitor, Store};

/// A store decorator that transparently compresses the value arrays.
///
/// Transparent across single, batch and scan operations; stacking other
/// decorators on top sees only uncompressed values.
///
/// # Example
///
/// ```rust
/// use quarry_storage::compress::CompressingStore;
/// use quarry_storage::memory::InMemoryStore;
/// use quarry_storage::store::Store;
///
/// # tokio_test::block_on(async {
/// let store = CompressingStore::new(InMemoryStore::new());
/// store.put(b"k", b"some value worth compressing").await.unwrap();
/// assert_eq!(
///     store.get(b"k").await.unwrap(),
///     Some(b"some value worth compressing".to_vec())
/// );
/// # });
/// ```
pub struct CompressingStore<S: Store> {
    /// The store to delegate to.
    inner: S,
}

impl<S: Store> CompressingStore<S> {
    /// Wrap `inner` with transparent value compression.
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    /// Return a reference to the inner store.
    pub fn inner(&self) -> &S {
        &self.inner
    }
}

fn compress(value: &[u8]) -> Vec<u8> {
    lz4_flex::compress_prepend_size(value)
}

fn decompress(value: &[u8]) -> Result<Vec<u8>, StorageError> {
    lz4_flex::decompress_size_prepended(value)
        .map_err(|e| StorageError::CorruptedData(format!("failed to decompress value: {e}")))
}

#[async_trait]
impl<S: Store> Store for CompressingStore<S> {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        match self.inner.get(key).await? {
            Some(value) => Ok(Some(decompress(&value)?)),
            None => Ok(None),
        }
    }

    async fn multi_get(&self, keys: &[Vec<u8>]) -> Result<Vec<Option<Vec<u8>>>, StorageError> {
        let values = self.inner.multi_get(keys).await?;
        let mut result = Vec::with_capacity(values.len());
        for value in values {
            result.push(match value {
                Some(v) => Some(decompress(&v)?),
                None => None,
            });
        }
        Ok(result)
    }

    async fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        self.inner.put(key, &compress(value)).await
    }

    async fn batch_put(&self, entries: &[(Vec<u8>, Vec<u8>)]) -> Result<(), StorageError> {
        let compressed: Vec<(Vec<u8>, Vec<u8>)> = entries
            .iter()
            .map(|(k, v)| (k.clone(), compress(v)))
            .collect();
        self.inner.batch_put(&compressed).await
    }

    async fn remove(&self, key: &[u8]) -> Result<(), StorageError> {
        self.inner.remove(key).await
    }

    async fn batch_remove(&self, keys: &[Vec<u8>]) -> Result<(), StorageError> {
        self.inner.batch_remove(keys).await
    }

    async fn scan(
        &self,
        begin: &[u8],
        end: &[u8],
        visitor: &mut KeyValueVisitor<'_>,
    ) -> Result<(), StorageError> {
        let mut decompressing = |key: &[u8], value: &[u8]| visitor(key, &decompress(value)?);
        self.inner.scan(begin, end, &mut decompressing).await
    }

    async fn scan_prefix(
        &self,
        prefix: &[u8],
        visitor: &mut KeyValueVisitor<'_>,
    ) -> Result<(), StorageError> {
        let mut decompressing = |key: &[u8], value: &[u8]| visitor(key, &decompress(value)?);
        self.inner.scan_prefix(prefix, &mut decompressing).await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStore;

    #[tokio::test]
    async fn test_round_trip() {
        let inner = InMemoryStore::new();
        let store = CompressingStore::new(inner.clone());

        let value = b"a value that is long enough to actually shrink under lz4 \
                      because it repeats repeats repeats repeats repeats";
        store.put(b"k", value).await.unwrap();
        assert_eq!(store.get(b"k").await.unwrap(), Some(value.to_vec()));

        // The physical value differs from the logical one.
        let raw = inner.get(b"k").await.unwrap().unwrap();
        assert_ne!(raw, value.to_vec());
    }

    #[tokio::test]
    async fn test_keys_are_untouched() {
        let inner = InMemoryStore::new();
        let store = CompressingStore::new(inner.clone());

        store.put(b"exact-key", b"v").await.unwrap();
        assert_eq!(inner.get(b"exact-key").await.unwrap().is_some(), true);
    }

    #[tokio::test]
    async fn test_batch_and_multi_get() {
        let store = CompressingStore::new(InMemoryStore::new());

        store
            .batch_put(&[
                (b"a".to_vec(), b"value-a".to_vec()),
                (b"b".to_vec(), b"value-b".to_vec()),
            ])
            .await
            .unwrap();

        let values = store
            .multi_get(&[b"a".to_vec(), b"missing".to_vec(), b"b".to_vec()])
            .await
            .unwrap();
        assert_eq!(
            values,
            vec![Some(b"value-a".to_vec()), None, Some(b"value-b".to_vec())]
        );

        store.batch_remove(&[b"a".to_vec()]).await.unwrap();
        assert_eq!(store.get(b"a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_scan_decompresses_values() {
        let store = CompressingStore::new(InMemoryStore::new());
        store.put(b"p:1", b"one").await.unwrap();
        store.put(b"p:2", b"two").await.unwrap();

        let mut entries = Vec::new();
        store
            .scan_prefix(b"p:", &mut |k, v| {
                entries.push((k.to_vec(), v.to_vec()));
                Ok(())
            })
            .await
            .unwrap();
        assert_eq!(
            entries,
            vec![
                (b"p:1".to_vec(), b"one".to_vec()),
                (b"p:2".to_vec(), b"two".to_vec())
            ]
        );
    }

    #[tokio::test]
    async fn test_undecompressable_value_is_corrupted_data() {
        let inner = InMemoryStore::new();
        let store = CompressingStore::new(inner.clone());

        // Write raw bytes directly past the decorator.
        inner.put(b"broken", b"not-compressed").await.unwrap();

        match store.get(b"broken").await {
            Err(StorageError::CorruptedData(_)) => {}
            other => panic!("expected CorruptedData, got: {other:?}"),
        }
    }
}
