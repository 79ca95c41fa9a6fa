// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>
//
// Storage system abstraction for the Quarry persistence core.
//
// A storage system owns a set of named, independent stores over one
// physical resource. Opening the same name twice returns independent
// handles to the same underlying data.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::error::StorageError;
use crate::memory::InMemoryStore;
use crate::store::Store;

/// A registry of named stores sharing one physical backend resource.
#[async_trait]
pub trait StorageSystem: Send + Sync {
    /// Open (creating if necessary) the store bound to `name`.
    ///
    /// Multiple calls with the same name return independent handles to the
    /// same underlying data, not necessarily the same object.
    async fn open_store(&self, name: &str) -> Result<Arc<dyn Store>, StorageError>;

    /// Delete the named store and all of its data.
    async fn remove_store(&self, name: &str) -> Result<(), StorageError>;

    /// Release all backend resources exactly once.
    ///
    /// After `close`, any use of the system or of stores obtained from it
    /// fails with [`StorageError::SystemClosed`] rather than silently
    /// corrupting data.
    async fn close(&self) -> Result<(), StorageError>;
}

/// A storage system keeping every store in process memory.
///
/// # Example
///
/// ```rust
/// use quarry_storage::system::{InMemoryStorageSystem, StorageSystem};
///
/// # tokio_test::block_on(async {
/// let system = InMemoryStorageSystem::new();
/// let store = system.open_store("entities").await.unwrap();
/// store.put(b"k", b"v").await.unwrap();
///
/// // A second handle sees the same data.
/// let again = system.open_store("entities").await.unwrap();
/// assert_eq!(again.get(b"k").await.unwrap(), Some(b"v".to_vec()));
/// # });
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStorageSystem {
    stores: tokio::sync::RwLock<HashMap<String, InMemoryStore>>,
    closed: Arc<AtomicBool>,
}

impl InMemoryStorageSystem {
    /// Create a new storage system with no stores.
    pub fn new() -> Self {
        Self::default()
    }

    fn check_open(&self) -> Result<(), StorageError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StorageError::SystemClosed);
        }
        Ok(())
    }
}

#[async_trait]
impl StorageSystem for InMemoryStorageSystem {
    async fn open_store(&self, name: &str) -> Result<Arc<dyn Store>, StorageError> {
        self.check_open()?;
        let mut stores = self.stores.write().await;
        let store = stores
            .entry(name.to_string())
            .or_insert_with(|| InMemoryStore::with_closed_flag(Arc::clone(&self.closed)));
        Ok(Arc::new(store.clone()))
    }

    async fn remove_store(&self, name: &str) -> Result<(), StorageError> {
        self.check_open()?;
        self.stores.write().await.remove(name);
        debug!(store = name, "removed in-memory store");
        Ok(())
    }

    async fn close(&self) -> Result<(), StorageError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(StorageError::SystemClosed);
        }
        self.stores.write().await.clear();
        debug!("closed in-memory storage system");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_independent_stores() {
        let system = InMemoryStorageSystem::new();
        let store = system.open_store("test").await.unwrap();
        let other = system.open_store("other").await.unwrap();

        store.put(b"my_key", b"my_value").await.unwrap();
        assert_eq!(store.get(b"my_key").await.unwrap(), Some(b"my_value".to_vec()));
        assert_eq!(other.get(b"my_key").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_same_name_shares_data() {
        let system = InMemoryStorageSystem::new();
        let first = system.open_store("test").await.unwrap();
        first.put(b"k", b"v").await.unwrap();

        let second = system.open_store("test").await.unwrap();
        assert_eq!(second.get(b"k").await.unwrap(), Some(b"v".to_vec()));
    }

    #[tokio::test]
    async fn test_remove_store_drops_data() {
        let system = InMemoryStorageSystem::new();
        let store = system.open_store("test").await.unwrap();
        store.put(b"my_key", b"my_value").await.unwrap();

        system.remove_store("test").await.unwrap();
        let store = system.open_store("test").await.unwrap();
        assert_eq!(store.get(b"my_key").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_use_after_close_fails_loudly() {
        let system = InMemoryStorageSystem::new();
        let store = system.open_store("test").await.unwrap();
        store.put(b"k", b"v").await.unwrap();

        system.close().await.unwrap();

        assert!(matches!(
            system.open_store("test").await,
            Err(StorageError::SystemClosed)
        ));
        assert!(matches!(store.get(b"k").await, Err(StorageError::SystemClosed)));
        assert!(matches!(store.put(b"k", b"w").await, Err(StorageError::SystemClosed)));
    }

    #[tokio::test]
    async fn test_double_close_fails() {
        let system = InMemoryStorageSystem::new();
        system.close().await.unwrap();
        assert!(matches!(system.close().await, Err(StorageError::SystemClosed)));
    }
}
