// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>
//
// Profiling store decorator for the Quarry persistence core.
//
// Wraps a `Store` (or a whole `StorageSystem`) and accumulates call counts,
// wall-clock time and byte transfer totals into a shared counter object.
// The counted time includes time spent inside caller-provided scan
// visitors: the counters answer "how much wall-clock did storage usage
// cost", not "how much did the backend alone cost". Store creation and
// closing are not counted.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use crate::error::StorageError;
use crate::store::{KeyValueVisitor, KeyVisitor, Store};
use crate::system::StorageSystem;

/// Shared, monotonically increasing performance counters.
///
/// One `ProfileCounters` may be shared by any number of profiling stores;
/// all updates are plain atomic increments.
#[derive(Debug, Default)]
pub struct ProfileCounters {
    /// Number of calls to any contract method of a decorated store.
    calls: AtomicU64,
    /// Accumulated wall-clock nanoseconds spent in those calls.
    nanos: AtomicU64,
    /// Total value/entry bytes delivered by reads and scans.
    bytes_read: AtomicU64,
    /// Total value bytes accepted by writes.
    bytes_written: AtomicU64,
}

/// A point-in-time copy of [`ProfileCounters`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileStats {
    /// Number of calls to any contract method of a decorated store.
    pub calls: u64,
    /// Accumulated wall-clock nanoseconds.
    pub nanos: u64,
    /// Total bytes delivered by reads and scans.
    pub bytes_read: u64,
    /// Total bytes accepted by writes.
    pub bytes_written: u64,
}

impl ProfileCounters {
    /// Create a fresh set of zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of calls to any method of decorated stores.
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    /// Time spent in decorated stores, rounded to milliseconds.
    pub fn time_millis(&self) -> u64 {
        (self.nanos.load(Ordering::Relaxed) + 500_000) / 1_000_000
    }

    /// Return a snapshot of all counters.
    pub fn snapshot(&self) -> ProfileStats {
        ProfileStats {
            calls: self.calls.load(Ordering::Relaxed),
            nanos: self.nanos.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
        }
    }

    /// Reports one finished call relative to its start instant.
    fn record_call(&self, start: Instant) {
        self.nanos
            .fetch_add(start.elapsed().as_nanos() as u64, Ordering::Relaxed);
        self.calls.fetch_add(1, Ordering::Relaxed);
    }

    fn add_bytes_read(&self, n: u64) {
        self.bytes_read.fetch_add(n, Ordering::Relaxed);
    }

    fn add_bytes_written(&self, n: u64) {
        self.bytes_written.fetch_add(n, Ordering::Relaxed);
    }
}

/// A store decorator that reports every contract call to a shared
/// [`ProfileCounters`].
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use quarry_storage::memory::InMemoryStore;
/// use quarry_storage::profile::{ProfileCounters, ProfilingStore};
/// use quarry_storage::store::Store;
///
/// # tokio_test::block_on(async {
/// let counters = Arc::new(ProfileCounters::new());
/// let store = ProfilingStore::new(InMemoryStore::new(), Arc::clone(&counters));
///
/// store.put(b"key", b"value").await.unwrap();
/// store.get(b"key").await.unwrap();
///
/// assert_eq!(counters.call_count(), 2);
/// # });
/// ```
pub struct ProfilingStore<S: Store> {
    /// The wrapped store that performs the actual operations.
    inner: S,
    /// Shared counter object, updated on every call.
    counters: Arc<ProfileCounters>,
}

impl<S: Store> ProfilingStore<S> {
    /// Wrap `inner`, reporting into `counters`.
    pub fn new(inner: S, counters: Arc<ProfileCounters>) -> Self {
        Self { inner, counters }
    }

    /// Return a reference to the inner store.
    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: Store> Store for ProfilingStore<S> {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        let start = Instant::now();
        let result = self.inner.get(key).await;
        self.counters.record_call(start);
        if let Ok(Some(ref value)) = result {
            self.counters.add_bytes_read(value.len() as u64);
        }
        result
    }

    async fn multi_get(&self, keys: &[Vec<u8>]) -> Result<Vec<Option<Vec<u8>>>, StorageError> {
        let start = Instant::now();
        let result = self.inner.multi_get(keys).await;
        self.counters.record_call(start);
        if let Ok(ref values) = result {
            let bytes: u64 = values
                .iter()
                .filter_map(|v| v.as_ref())
                .map(|v| v.len() as u64)
                .sum();
            self.counters.add_bytes_read(bytes);
        }
        result
    }

    async fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        let start = Instant::now();
        let result = self.inner.put(key, value).await;
        self.counters.record_call(start);
        if result.is_ok() {
            self.counters.add_bytes_written(value.len() as u64);
        }
        result
    }

    async fn batch_put(&self, entries: &[(Vec<u8>, Vec<u8>)]) -> Result<(), StorageError> {
        let start = Instant::now();
        let result = self.inner.batch_put(entries).await;
        self.counters.record_call(start);
        if result.is_ok() {
            let bytes: u64 = entries.iter().map(|(_, v)| v.len() as u64).sum();
            self.counters.add_bytes_written(bytes);
        }
        result
    }

    async fn remove(&self, key: &[u8]) -> Result<(), StorageError> {
        let start = Instant::now();
        let result = self.inner.remove(key).await;
        self.counters.record_call(start);
        result
    }

    async fn batch_remove(&self, keys: &[Vec<u8>]) -> Result<(), StorageError> {
        let start = Instant::now();
        let result = self.inner.batch_remove(keys).await;
        self.counters.record_call(start);
        result
    }

    async fn scan(
        &self,
        begin: &[u8],
        end: &[u8],
        visitor: &mut KeyValueVisitor<'_>,
    ) -> Result<(), StorageError> {
        let start = Instant::now();
        let counters = &self.counters;
        let mut counting = |key: &[u8], value: &[u8]| {
            counters.add_bytes_read((key.len() + value.len()) as u64);
            visitor(key, value)
        };
        let result = self.inner.scan(begin, end, &mut counting).await;
        self.counters.record_call(start);
        result
    }

    async fn scan_prefix(
        &self,
        prefix: &[u8],
        visitor: &mut KeyValueVisitor<'_>,
    ) -> Result<(), StorageError> {
        let start = Instant::now();
        let counters = &self.counters;
        let mut counting = |key: &[u8], value: &[u8]| {
            counters.add_bytes_read((key.len() + value.len()) as u64);
            visitor(key, value)
        };
        let result = self.inner.scan_prefix(prefix, &mut counting).await;
        self.counters.record_call(start);
        result
    }

    async fn scan_keys(
        &self,
        begin: &[u8],
        end: &[u8],
        visitor: &mut KeyVisitor<'_>,
    ) -> Result<(), StorageError> {
        let start = Instant::now();
        let result = self.inner.scan_keys(begin, end, visitor).await;
        self.counters.record_call(start);
        result
    }

    async fn scan_keys_prefix(
        &self,
        prefix: &[u8],
        visitor: &mut KeyVisitor<'_>,
    ) -> Result<(), StorageError> {
        let start = Instant::now();
        let result = self.inner.scan_keys_prefix(prefix, visitor).await;
        self.counters.record_call(start);
        result
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

/// A storage system decorator that profiles every store it opens.
///
/// Opening, removing and closing themselves are not timed.
pub struct ProfilingStorageSystem<Y: StorageSystem> {
    inner: Y,
    counters: Arc<ProfileCounters>,
}

impl<Y: StorageSystem> ProfilingStorageSystem<Y> {
    /// Decorate `inner` so that every opened store reports into `counters`.
    pub fn new(inner: Y, counters: Arc<ProfileCounters>) -> Self {
        Self { inner, counters }
    }

    /// The shared counters all opened stores report into.
    pub fn counters(&self) -> &Arc<ProfileCounters> {
        &self.counters
    }
}

#[async_trait]
impl<Y: StorageSystem> StorageSystem for ProfilingStorageSystem<Y> {
    async fn open_store(&self, name: &str) -> Result<Arc<dyn Store>, StorageError> {
        let store = self.inner.open_store(name).await?;
        Ok(Arc::new(ProfilingStore::new(store, Arc::clone(&self.counters))))
    }

    async fn remove_store(&self, name: &str) -> Result<(), StorageError> {
        self.inner.remove_store(name).await
    }

    async fn close(&self) -> Result<(), StorageError> {
        self.inner.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStore;
    use crate::system::InMemoryStorageSystem;

    fn profiled() -> (ProfilingStore<InMemoryStore>, Arc<ProfileCounters>) {
        let counters = Arc::new(ProfileCounters::new());
        let store = ProfilingStore::new(InMemoryStore::new(), Arc::clone(&counters));
        (store, counters)
    }

    #[tokio::test]
    async fn test_calls_are_counted() {
        let (store, counters) = profiled();

        store.put(b"k", b"v").await.unwrap();
        store.get(b"k").await.unwrap();
        store.get(b"missing").await.unwrap();
        store.remove(b"k").await.unwrap();

        assert_eq!(counters.call_count(), 4);
    }

    #[tokio::test]
    async fn test_bytes_written_and_read() {
        let (store, counters) = profiled();

        store.put(b"a", b"hello").await.unwrap(); // 5 bytes written
        store
            .batch_put(&[(b"b".to_vec(), b"world!".to_vec())]) // 6 bytes written
            .await
            .unwrap();
        store.get(b"a").await.unwrap(); // 5 bytes read

        let stats = counters.snapshot();
        assert_eq!(stats.bytes_written, 11);
        assert_eq!(stats.bytes_read, 5);
    }

    #[tokio::test]
    async fn test_scan_counts_one_call_and_entry_bytes() {
        let (store, counters) = profiled();
        store.put(b"pfx:a", b"11").await.unwrap(); // key 5 + value 2
        store.put(b"pfx:b", b"22").await.unwrap(); // key 5 + value 2

        let before = counters.call_count();
        let mut seen = 0usize;
        store
            .scan_prefix(b"pfx:", &mut |_, _| {
                seen += 1;
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(seen, 2);
        assert_eq!(counters.call_count(), before + 1);
        assert_eq!(counters.snapshot().bytes_read, 14);
    }

    #[tokio::test]
    async fn test_time_includes_visitor_time() {
        let (store, counters) = profiled();
        store.put(b"k", b"v").await.unwrap();

        store
            .scan(b"k", b"k", &mut |_, _| {
                std::thread::sleep(std::time::Duration::from_millis(5));
                Ok(())
            })
            .await
            .unwrap();

        assert!(counters.time_millis() >= 5);
    }

    #[tokio::test]
    async fn test_failed_calls_still_counted() {
        let (store, counters) = profiled();
        store.put(b"k", b"v").await.unwrap();

        let result = store
            .scan(b"k", b"k", &mut |_, _| Err(StorageError::Backend("stop".to_string())))
            .await;
        assert!(result.is_err());
        assert_eq!(counters.call_count(), 2);
    }

    #[tokio::test]
    async fn test_system_decoration() {
        let counters = Arc::new(ProfileCounters::new());
        let system =
            ProfilingStorageSystem::new(InMemoryStorageSystem::new(), Arc::clone(&counters));

        let store = system.open_store("test").await.unwrap();
        store.put(b"k", b"v").await.unwrap();
        store.get(b"k").await.unwrap();

        // Opening the store itself is not counted.
        assert_eq!(counters.call_count(), 2);

        // Both stores report into the same counters.
        let other = system.open_store("other").await.unwrap();
        other.put(b"k", b"v").await.unwrap();
        assert_eq!(counters.call_count(), 3);
    }
}
