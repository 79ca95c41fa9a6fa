// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>
//
// redb-backed persistent storage system for the Quarry persistence core.
//
// Uses redb (pure Rust, B-tree, ACID, single-file database) to provide
// durable key-value storage. No C/C++ dependencies.
//
// # Design
//
// - One redb `Database` file per storage system, shared by all stores
//   opened from it; each named store maps to one redb table.
// - Read transactions for all read operations (concurrent, lock-free).
// - Write transactions for put/remove/batch; a batch is one transaction,
//   so batches are atomic at this backend.
// - Scans materialize the matching range inside the blocking task and
//   replay it to the visitor, which also yields the required
//   snapshot-at-scan-start isolation.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use redb::{Database, ReadableDatabase, TableDefinition};
use tracing::debug;

use crate::error::StorageError;
use crate::store::{KeyValueVisitor, Store};
use crate::system::StorageSystem;

/// A persistent storage system powered by redb.
///
/// redb is a pure-Rust embedded database with ACID transactions and
/// copy-on-write B-tree storage. Each `RedbStorageSystem` wraps a single
/// database file whose handle is shared by every store opened from it;
/// closing the system invalidates all of those stores.
///
/// # Example
///
/// ```rust,no_run
/// use quarry_storage::redb_store::RedbStorageSystem;
/// use quarry_storage::system::StorageSystem;
///
/// # tokio_test::block_on(async {
/// let system = RedbStorageSystem::open("/tmp/quarry-test.redb").unwrap();
/// let store = system.open_store("entities").await.unwrap();
/// store.put(b"hello", b"world").await.unwrap();
/// assert_eq!(store.get(b"hello").await.unwrap(), Some(b"world".to_vec()));
/// # });
/// ```
pub struct RedbStorageSystem {
    /// The shared redb database handle.
    db: Arc<Database>,
    /// Path to the database file (for diagnostics).
    path: PathBuf,
    /// Shared with every opened store; set on close.
    closed: Arc<AtomicBool>,
}

impl RedbStorageSystem {
    /// Open or create a redb database at the given path.
    ///
    /// Creates the file and parent directories if they don't exist. Store
    /// tables are created on first write.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(StorageError::Io)?;
        }

        let db = Database::create(&path).map_err(|e| {
            StorageError::Backend(format!("failed to open redb at {}: {}", path.display(), e))
        })?;

        debug!(path = %path.display(), "opened redb storage system");

        Ok(Self {
            db: Arc::new(db),
            path,
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Return the filesystem path of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn check_open(&self) -> Result<(), StorageError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StorageError::SystemClosed);
        }
        Ok(())
    }
}

impl std::fmt::Debug for RedbStorageSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStorageSystem")
            .field("path", &self.path)
            .finish()
    }
}

#[async_trait]
impl StorageSystem for RedbStorageSystem {
    async fn open_store(&self, name: &str) -> Result<Arc<dyn Store>, StorageError> {
        self.check_open()?;
        Ok(Arc::new(RedbStore {
            db: Arc::clone(&self.db),
            name: name.to_string(),
            closed: Arc::clone(&self.closed),
        }))
    }

    async fn remove_store(&self, name: &str) -> Result<(), StorageError> {
        self.check_open()?;
        let db = Arc::clone(&self.db);
        let table_name = name.to_string();

        tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
            let txn = db
                .begin_write()
                .map_err(|e| StorageError::Backend(format!("write txn: {e}")))?;
            txn.delete_table(TableDefinition::<&[u8], &[u8]>::new(&table_name))
                .map_err(|e| StorageError::Backend(format!("delete table: {e}")))?;
            txn.commit()
                .map_err(|e| StorageError::CorruptedData(format!("commit: {e}")))?;
            Ok(())
        })
        .await
        .map_err(|e| StorageError::Backend(format!("task join: {e}")))??;

        debug!(store = name, "removed redb store table");
        Ok(())
    }

    async fn close(&self) -> Result<(), StorageError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(StorageError::SystemClosed);
        }
        // The file handle is released when the last Arc to the Database is
        // dropped; the flag makes stores fail loudly in the meantime.
        debug!(path = %self.path.display(), "closed redb storage system");
        Ok(())
    }
}

/// One named store within a [`RedbStorageSystem`], backed by a redb table.
pub struct RedbStore {
    db: Arc<Database>,
    name: String,
    closed: Arc<AtomicBool>,
}

impl RedbStore {
    fn check_open(&self) -> Result<(), StorageError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StorageError::SystemClosed);
        }
        Ok(())
    }

    /// Runs a blocking closure over the shared database on the blocking
    /// thread pool.
    async fn run_blocking<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(Arc<Database>, String) -> Result<T, StorageError> + Send + 'static,
    {
        self.check_open()?;
        let db = Arc::clone(&self.db);
        let name = self.name.clone();
        tokio::task::spawn_blocking(move || f(db, name))
            .await
            .map_err(|e| StorageError::Backend(format!("task join: {e}")))?
    }
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore").field("name", &self.name).finish()
    }
}

#[async_trait]
impl Store for RedbStore {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        let key = key.to_vec();
        self.run_blocking(move |db, name| {
            let txn = db
                .begin_read()
                .map_err(|e| StorageError::Backend(format!("read txn: {e}")))?;
            let table = match txn.open_table(TableDefinition::<&[u8], &[u8]>::new(&name)) {
                Ok(t) => t,
                // Table doesn't exist yet, so no data has been written.
                Err(_) => return Ok(None),
            };
            match table.get(key.as_slice()) {
                Ok(Some(value)) => Ok(Some(value.value().to_vec())),
                Ok(None) => Ok(None),
                Err(e) => Err(StorageError::CorruptedData(format!("get: {e}"))),
            }
        })
        .await
    }

    async fn multi_get(&self, keys: &[Vec<u8>]) -> Result<Vec<Option<Vec<u8>>>, StorageError> {
        let keys = keys.to_vec();
        self.run_blocking(move |db, name| {
            let txn = db
                .begin_read()
                .map_err(|e| StorageError::Backend(format!("read txn: {e}")))?;
            let table = match txn.open_table(TableDefinition::<&[u8], &[u8]>::new(&name)) {
                Ok(t) => t,
                Err(_) => return Ok(keys.iter().map(|_| None).collect()),
            };
            let mut results = Vec::with_capacity(keys.len());
            for key in &keys {
                match table.get(key.as_slice()) {
                    Ok(Some(v)) => results.push(Some(v.value().to_vec())),
                    Ok(None) => results.push(None),
                    Err(e) => return Err(StorageError::CorruptedData(format!("multi_get: {e}"))),
                }
            }
            Ok(results)
        })
        .await
    }

    async fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        let entries = vec![(key.to_vec(), value.to_vec())];
        self.batch_put(&entries).await
    }

    async fn batch_put(&self, entries: &[(Vec<u8>, Vec<u8>)]) -> Result<(), StorageError> {
        let entries = entries.to_vec();
        self.run_blocking(move |db, name| {
            let txn = db
                .begin_write()
                .map_err(|e| StorageError::Backend(format!("write txn: {e}")))?;
            {
                let mut table = txn
                    .open_table(TableDefinition::<&[u8], &[u8]>::new(&name))
                    .map_err(|e| StorageError::Backend(format!("open table: {e}")))?;
                for (key, value) in &entries {
                    table
                        .insert(key.as_slice(), value.as_slice())
                        .map_err(|e| StorageError::CorruptedData(format!("insert: {e}")))?;
                }
            }
            txn.commit()
                .map_err(|e| StorageError::CorruptedData(format!("commit: {e}")))?;
            Ok(())
        })
        .await
    }

    async fn remove(&self, key: &[u8]) -> Result<(), StorageError> {
        let keys = vec![key.to_vec()];
        self.batch_remove(&keys).await
    }

    async fn batch_remove(&self, keys: &[Vec<u8>]) -> Result<(), StorageError> {
        let keys = keys.to_vec();
        self.run_blocking(move |db, name| {
            let txn = db
                .begin_write()
                .map_err(|e| StorageError::Backend(format!("write txn: {e}")))?;
            {
                let mut table = txn
                    .open_table(TableDefinition::<&[u8], &[u8]>::new(&name))
                    .map_err(|e| StorageError::Backend(format!("open table: {e}")))?;
                for key in &keys {
                    table
                        .remove(key.as_slice())
                        .map_err(|e| StorageError::CorruptedData(format!("remove: {e}")))?;
                }
            }
            txn.commit()
                .map_err(|e| StorageError::CorruptedData(format!("commit: {e}")))?;
            Ok(())
        })
        .await
    }

    async fn scan(
        &self,
        begin: &[u8],
        end: &[u8],
        visitor: &mut KeyValueVisitor<'_>,
    ) -> Result<(), StorageError> {
        if begin > end {
            self.check_open()?;
            return Ok(());
        }
        let begin = begin.to_vec();
        let end = end.to_vec();
        let entries = self
            .run_blocking(move |db, name| {
                let txn = db
                    .begin_read()
                    .map_err(|e| StorageError::Backend(format!("read txn: {e}")))?;
                let table = match txn.open_table(TableDefinition::<&[u8], &[u8]>::new(&name)) {
                    Ok(t) => t,
                    Err(_) => return Ok(Vec::new()),
                };
                let iter = table
                    .range::<&[u8]>(begin.as_slice()..=end.as_slice())
                    .map_err(|e| StorageError::CorruptedData(format!("range scan: {e}")))?;
                let mut entries = Vec::new();
                for entry in iter {
                    let entry =
                        entry.map_err(|e| StorageError::CorruptedData(format!("scan entry: {e}")))?;
                    entries.push((entry.0.value().to_vec(), entry.1.value().to_vec()));
                }
                Ok(entries)
            })
            .await?;

        for (key, value) in entries {
            visitor(&key, &value)?;
        }
        Ok(())
    }

    async fn scan_prefix(
        &self,
        prefix: &[u8],
        visitor: &mut KeyValueVisitor<'_>,
    ) -> Result<(), StorageError> {
        let prefix = prefix.to_vec();
        let entries = self
            .run_blocking(move |db, name| {
                let txn = db
                    .begin_read()
                    .map_err(|e| StorageError::Backend(format!("read txn: {e}")))?;
                let table = match txn.open_table(TableDefinition::<&[u8], &[u8]>::new(&name)) {
                    Ok(t) => t,
                    Err(_) => return Ok(Vec::new()),
                };
                // Scan from the prefix key onward; stop when keys no longer
                // match.
                let iter = table
                    .range::<&[u8]>(prefix.as_slice()..)
                    .map_err(|e| StorageError::CorruptedData(format!("range scan: {e}")))?;
                let mut entries = Vec::new();
                for entry in iter {
                    let entry =
                        entry.map_err(|e| StorageError::CorruptedData(format!("scan entry: {e}")))?;
                    let k = entry.0.value().to_vec();
                    if !k.starts_with(&prefix) {
                        break;
                    }
                    entries.push((k, entry.1.value().to_vec()));
                }
                Ok(entries)
            })
            .await?;

        for (key, value) in entries {
            visitor(&key, &value)?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
