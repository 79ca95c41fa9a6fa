// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>
//
// Quarry Persistence Core
//
// This crate is the storage engine of the Quarry code-analysis platform:
// an ordered byte-key/byte-value store layering transactions, multi-version
// history with point-in-time rollback, and cross-cutting instrumentation
// and compression on top of interchangeable physical backends.
//
// # Modules
//
// - [`store`] -- The `Store` trait defining the ordered key-value contract.
// - [`error`] -- The `StorageError` enum covering all failure modes.
// - [`system`] -- The `StorageSystem` registry of named stores, plus the
//   in-memory implementation.
// - [`redb_store`] -- The redb-backed persistent storage system
//   (feature `redb-backend`).
// - [`transaction`] -- Overlay-buffered transactions with commit/rollback.
// - [`hist`] -- The historizing store family: revision writer, head
//   reader, fixed-revision reader and rollback eraser.
// - [`schema`] -- Store schema, index registry and schema-aware opening.
// - [`rollback`] -- Whole-system rollback orchestration and the
//   rollbackable-index capability.
// - [`compress`] -- Transparent LZ4 value compression decorator.
// - [`profile`] -- Call/latency/byte profiling decorator.
// - [`typed`] -- A serde-based typed value index.
// - [`util`] -- Key listing, bulk clearing and store export/import.
//
// # Example
//
// ```rust
// use quarry_storage::memory::InMemoryStore;
// use quarry_storage::store::Store;
// use quarry_storage::transaction::TransactionalStore;
//
// # tokio_test::block_on(async {
// let main = InMemoryStore::new();
// main.put(b"foo", b"A").await.unwrap();
//
// // Buffer edits in a transaction, then commit them as one change.
// let txn = TransactionalStore::new(main.clone());
// txn.remove(b"foo").await.unwrap();
// txn.put(b"bar", b"B").await.unwrap();
// txn.commit().await.unwrap();
//
// assert_eq!(main.get(b"foo").await.unwrap(), None);
// assert_eq!(main.get(b"bar").await.unwrap(), Some(b"B".to_vec()));
// # });
// ```

pub mod compress;
pub mod error;
pub mod hist;
pub mod memory;
pub mod profile;
pub mod rollback;
pub mod schema;
pub mod store;
pub mod system;
pub mod transaction;
pub mod typed;
pub mod util;

// The persistent backend can be compiled out for purely in-memory use.
#[cfg(feature = "redb-backend")]
pub mod redb_store;

// Re-export the most commonly used types at the crate root for convenience.
pub use compress::CompressingStore;
pub use error::StorageError;
pub use hist::eraser::HistoryEraserStore;
pub use hist::head::HeadReaderStore;
pub use hist::revision::RevisionReaderStore;
pub use hist::writer::RevisionWriterStore;
pub use hist::{HistoryAccess, Revision};
pub use memory::InMemoryStore;
pub use profile::{ProfileCounters, ProfileStats, ProfilingStorageSystem, ProfilingStore};
pub use rollback::RollbackableIndex;
pub use schema::{IndexRegistry, IndexSchema, SchemaEntry, SchemaStorage, StorageOption, StoreIndex};
pub use store::{KeyValueVisitor, KeyVisitor, Store};
pub use system::{InMemoryStorageSystem, StorageSystem};
pub use transaction::TransactionalStore;
pub use typed::ValueIndex;

#[cfg(feature = "redb-backend")]
pub use redb_store::{RedbStorageSystem, RedbStore};
