// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>
//
// Core store contract for the Quarry persistence core.
//
// Defines the `Store` trait that all physical backends, overlays and
// decorators implement. The trait provides an ordered key-value interface
// with batch operations and visitor-based range/prefix scanning. Stores are
// expected to be thread-safe (`Send + Sync`) and fully asynchronous.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::StorageError;

/// Visitor invoked once per entry during a scan, in ascending key order.
///
/// Returning an `Err` aborts the scan; the error propagates out of the scan
/// call after the backend iterator has been released.
pub type KeyValueVisitor<'a> = dyn FnMut(&[u8], &[u8]) -> Result<(), StorageError> + Send + 'a;

/// Visitor invoked once per key during a key-only scan.
pub type KeyVisitor<'a> = dyn FnMut(&[u8]) -> Result<(), StorageError> + Send + 'a;

/// A named, independent ordered mapping from byte keys to byte values.
///
/// Keys and values are opaque byte slices; keys are totally ordered by
/// unsigned lexicographic comparison, and every scan honors that order.
/// Implementations must be safe to share across threads and tokio tasks.
///
/// All operations may fail with a [`StorageError`]; batch operations are
/// all-or-nothing and never report partial success.
#[async_trait]
pub trait Store: Send + Sync {
    /// Retrieve the value associated with `key`.
    ///
    /// Returns `Ok(None)` if the key does not exist, rather than an error.
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError>;

    /// Retrieve multiple keys in a single call.
    ///
    /// The returned vector has the same length and order as `keys`, with
    /// `None` for any key that was not found.
    async fn multi_get(&self, keys: &[Vec<u8>]) -> Result<Vec<Option<Vec<u8>>>, StorageError>;

    /// Store a key-value pair, overwriting any previous value for `key`.
    async fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError>;

    /// Write multiple key-value pairs.
    ///
    /// Backends with write-batch support apply the whole batch atomically;
    /// atomicity must not be assumed across decorated compositions of
    /// backends that lack it.
    async fn batch_put(&self, entries: &[(Vec<u8>, Vec<u8>)]) -> Result<(), StorageError>;

    /// Delete the value associated with `key`. Removing a missing key is
    /// not an error.
    async fn remove(&self, key: &[u8]) -> Result<(), StorageError>;

    /// Delete multiple keys in a single call.
    async fn batch_remove(&self, keys: &[Vec<u8>]) -> Result<(), StorageError>;

    /// Visit every entry with `begin <= key <= end` (closed interval) in
    /// ascending key order. An empty interval (`begin > end`) visits
    /// nothing.
    ///
    /// The scan observes a snapshot taken no later than iteration start:
    /// entries mutated by the same call after iteration begins are not
    /// visited. Backend iterators are released on every exit path,
    /// including an `Err` raised from inside the visitor.
    async fn scan(
        &self,
        begin: &[u8],
        end: &[u8],
        visitor: &mut KeyValueVisitor<'_>,
    ) -> Result<(), StorageError>;

    /// Visit every entry whose key starts with `prefix`, in ascending key
    /// order. An empty prefix visits the whole store.
    async fn scan_prefix(
        &self,
        prefix: &[u8],
        visitor: &mut KeyValueVisitor<'_>,
    ) -> Result<(), StorageError>;

    /// Visit every entry whose key starts with one of `prefixes`.
    ///
    /// Each key is visited at most once even for overlapping prefixes, in
    /// ascending order within each prefix group, groups ordered by prefix.
    async fn scan_prefixes(
        &self,
        prefixes: &[Vec<u8>],
        visitor: &mut KeyValueVisitor<'_>,
    ) -> Result<(), StorageError> {
        for prefix in disjoint_prefixes(prefixes) {
            self.scan_prefix(prefix, visitor).await?;
        }
        Ok(())
    }

    /// Range scan variant that only reports keys.
    ///
    /// The default delegates to [`Store::scan`]; backends may override to
    /// skip value loading entirely.
    async fn scan_keys(
        &self,
        begin: &[u8],
        end: &[u8],
        visitor: &mut KeyVisitor<'_>,
    ) -> Result<(), StorageError> {
        let mut forward = |key: &[u8], _value: &[u8]| visitor(key);
        self.scan(begin, end, &mut forward).await
    }

    /// Prefix scan variant that only reports keys.
    async fn scan_keys_prefix(
        &self,
        prefix: &[u8],
        visitor: &mut KeyVisitor<'_>,
    ) -> Result<(), StorageError> {
        let mut forward = |key: &[u8], _value: &[u8]| visitor(key);
        self.scan_prefix(prefix, &mut forward).await
    }

    /// A human-readable name for this store, used in logging and profiling.
    fn name(&self) -> &str;
}

/// Reduces a prefix list to a sorted set of non-nested prefixes.
///
/// Two scan prefixes overlap exactly when one is a prefix of the other, so
/// dropping nested prefixes after sorting guarantees each key is visited at
/// most once across the per-prefix scans.
fn disjoint_prefixes(prefixes: &[Vec<u8>]) -> Vec<&Vec<u8>> {
    let mut sorted: Vec<&Vec<u8>> = prefixes.iter().collect();
    sorted.sort();
    let mut result: Vec<&Vec<u8>> = Vec::with_capacity(sorted.len());
    for prefix in sorted {
        match result.last() {
            Some(last) if prefix.starts_with(last) => {}
            _ => result.push(prefix),
        }
    }
    result
}

// Stores are handed around as `Arc<dyn Store>` once opened through a
// storage system; forwarding the contract through `Arc` lets decorators
// wrap opened stores and stack freely.
#[async_trait]
impl<S: Store + ?Sized> Store for Arc<S> {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        (**self).get(key).await
    }

    async fn multi_get(&self, keys: &[Vec<u8>]) -> Result<Vec<Option<Vec<u8>>>, StorageError> {
        (**self).multi_get(keys).await
    }

    async fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        (**self).put(key, value).await
    }

    async fn batch_put(&self, entries: &[(Vec<u8>, Vec<u8>)]) -> Result<(), StorageError> {
        (**self).batch_put(entries).await
    }

    async fn remove(&self, key: &[u8]) -> Result<(), StorageError> {
        (**self).remove(key).await
    }

    async fn batch_remove(&self, keys: &[Vec<u8>]) -> Result<(), StorageError> {
        (**self).batch_remove(keys).await
    }

    async fn scan(
        &self,
        begin: &[u8],
        end: &[u8],
        visitor: &mut KeyValueVisitor<'_>,
    ) -> Result<(), StorageError> {
        (**self).scan(begin, end, visitor).await
    }

    async fn scan_prefix(
        &self,
        prefix: &[u8],
        visitor: &mut KeyValueVisitor<'_>,
    ) -> Result<(), StorageError> {
        (**self).scan_prefix(prefix, visitor).await
    }

    async fn scan_prefixes(
        &self,
        prefixes: &[Vec<u8>],
        visitor: &mut KeyValueVisitor<'_>,
    ) -> Result<(), StorageError> {
        (**self).scan_prefixes(prefixes, visitor).await
    }

    async fn scan_keys(
        &self,
        begin: &[u8],
        end: &[u8],
        visitor: &mut KeyVisitor<'_>,
    ) -> Result<(), StorageError> {
        (**self).scan_keys(begin, end, visitor).await
    }

    async fn scan_keys_prefix(
        &self,
        prefix: &[u8],
        visitor: &mut KeyVisitor<'_>,
    ) -> Result<(), StorageError> {
        (**self).scan_keys_prefix(prefix, visitor).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disjoint_prefixes_drops_nested() {
        let prefixes = vec![b"/root/f".to_vec(), b"/roo".to_vec()];
        let result = disjoint_prefixes(&prefixes);
        assert_eq!(result, vec![&b"/roo".to_vec()]);
    }

    #[test]
    fn test_disjoint_prefixes_keeps_distinct() {
        let prefixes = vec![b"/roo".to_vec(), b"/a/di".to_vec()];
        let result = disjoint_prefixes(&prefixes);
        assert_eq!(result, vec![&b"/a/di".to_vec(), &b"/roo".to_vec()]);
    }

    #[test]
    fn test_disjoint_prefixes_empty() {
        let prefixes: Vec<Vec<u8>> = Vec::new();
        assert!(disjoint_prefixes(&prefixes).is_empty());
    }

    #[test]
    fn test_disjoint_prefixes_empty_prefix_covers_all() {
        let prefixes = vec![b"abc".to_vec(), Vec::new(), b"xyz".to_vec()];
        let result = disjoint_prefixes(&prefixes);
        assert_eq!(result, vec![&Vec::<u8>::new()]);
    }
}
