// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>
//
// Whole-system rollback orchestration for the Quarry persistence core.
//
// At restore time the orchestrator walks every schema entry of a storage
// system and dispatches the applicable per-store rollback path: historized
// stores are rolled back through the history eraser, other stores through
// their registered rollbackable index. A store offering neither path is a
// fatal configuration error.

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::StorageError;
use crate::hist::eraser::HistoryEraserStore;
use crate::hist::Revision;
use crate::schema::{IndexRegistry, SchemaEntry, SchemaStorage, StorageOption};
use crate::system::StorageSystem;

/// Capability of an index to restore its store to a prior point in time.
///
/// Custom index types participate in whole-system rollback by implementing
/// this trait and being registered as rollbackable in the
/// [`IndexRegistry`].
#[async_trait]
pub trait RollbackableIndex: Send + Sync {
    /// Restore the index's visible state to what it was as of `timestamp`,
    /// erasing all later history.
    async fn perform_rollback(&self, timestamp: Revision) -> Result<(), StorageError>;
}

/// Returns whether a store with this schema entry can take part in a
/// whole-system rollback.
///
/// True for `NoRollback` (rollback is a no-op) and `Historized` entries;
/// otherwise true only if the entry's index type is registered with
/// rollback support.
pub fn supports_rollback(entry: &SchemaEntry, registry: &IndexRegistry) -> bool {
    entry.uses_option(StorageOption::NoRollback)
        || entry.uses_option(StorageOption::Historized)
        || registry.supports_rollback(entry.index_type())
}

/// Rolls every store of the storage system back to `timestamp`.
///
/// Stores marked `NoRollback` are skipped. The first faulting store aborts
/// the run with its error, leaving the system-level rollback incomplete;
/// there is no silent best-effort continuation.
pub async fn perform_rollback<Y: StorageSystem>(
    storage: &SchemaStorage<Y>,
    timestamp: Revision,
) -> Result<(), StorageError> {
    let names: Vec<String> = storage.schema().entry_names().map(str::to_string).collect();
    info!(timestamp, stores = names.len(), "starting storage system rollback");

    for name in names {
        let Some(entry) = storage.schema().entry(&name).cloned() else {
            continue;
        };
        if entry.uses_option(StorageOption::NoRollback) {
            debug!(store = %name, "skipping store without rollback");
            continue;
        }

        let store = storage.open_raw(&name).await?;
        if entry.uses_option(StorageOption::Historized) {
            debug!(store = %name, "rolling back historized store");
            HistoryEraserStore::new(store).perform_rollback(timestamp).await?;
        } else if let Some(index) = storage.registry().rollback_index(entry.index_type(), store) {
            debug!(store = %name, index_type = entry.index_type(), "rolling back via index");
            index.perform_rollback(timestamp).await?;
        } else {
            return Err(StorageError::RollbackUnsupported(name));
        }
    }

    info!(timestamp, "storage system rollback complete");
    Ok(())
}
