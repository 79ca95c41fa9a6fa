// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>
//
// Index schema and schema-aware storage for the Quarry persistence core.
//
// The schema describes the structure laid over the raw stores: one entry
// per store naming its index type and structural options (compression,
// historization, rollback exclusion). Index types are resolved through a
// static registry of type tags to factory functions, populated at
// startup; an index type's rollback capability is declared at registration
// time rather than discovered at runtime.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::compress::CompressingStore;
use crate::error::StorageError;
use crate::hist::HistoryAccess;
use crate::rollback::RollbackableIndex;
use crate::store::Store;
use crate::system::StorageSystem;

/// Name of the store holding the persisted schema.
const META_STORE: &str = "__meta__";

/// Key of the schema record within the meta store.
const SCHEMA_KEY: &[u8] = b"index-schema";

/// Structural options of a store, declared in its schema entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StorageOption {
    /// The store's content cannot be restored to a prior point in time
    /// (derived or cache data); rollback skips it.
    NoRollback,
    /// The store is managed by the historizing store family and rolls back
    /// via timestamp-scoped erasure.
    Historized,
    /// Values are transparently compressed on disk.
    Compressed,
}

/// Per-store metadata: the index type laid over the store and its
/// structural options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaEntry {
    index_type: String,
    options: BTreeSet<StorageOption>,
}

impl SchemaEntry {
    /// Create an entry for the given index type tag with no options.
    pub fn new(index_type: &str) -> Self {
        Self {
            index_type: index_type.to_string(),
            options: BTreeSet::new(),
        }
    }

    /// Add a structural option to the entry.
    pub fn with_option(mut self, option: StorageOption) -> Self {
        self.options.insert(option);
        self
    }

    /// The type tag of the index laid over this store.
    pub fn index_type(&self) -> &str {
        &self.index_type
    }

    /// Returns whether the entry declares the given option.
    pub fn uses_option(&self, option: StorageOption) -> bool {
        self.options.contains(&option)
    }
}

/// The schema of a storage system: a mapping from store name to
/// [`SchemaEntry`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSchema {
    entries: BTreeMap<String, SchemaEntry>,
}

impl IndexSchema {
    /// Create an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or changes an entry. Passing `None` deletes the entry.
    pub fn update_entry(&mut self, store_name: &str, entry: Option<SchemaEntry>) {
        match entry {
            Some(entry) => {
                self.entries.insert(store_name.to_string(), entry);
            }
            None => {
                self.entries.remove(store_name);
            }
        }
    }

    /// Returns the entry for the given store, if any.
    pub fn entry(&self, store_name: &str) -> Option<&SchemaEntry> {
        self.entries.get(store_name)
    }

    /// Returns the names of all entries in this schema.
    pub fn entry_names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Loads the schema persisted in the given storage system.
    ///
    /// Fails with [`StorageError::SchemaMissing`] if none was saved.
    pub async fn load<Y: StorageSystem>(system: &Y) -> Result<Self, StorageError> {
        let store = system.open_store(META_STORE).await?;
        let bytes = store
            .get(SCHEMA_KEY)
            .await?
            .ok_or(StorageError::SchemaMissing)?;
        serde_json::from_slice(&bytes).map_err(|err| {
            StorageError::Serialization(format!("failed to deserialize schema: {err}"))
        })
    }

    /// Saves this schema to the meta store of the given storage system.
    pub async fn save<Y: StorageSystem>(&self, system: &Y) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec(self).map_err(|err| {
            StorageError::Serialization(format!("failed to serialize schema: {err}"))
        })?;
        let store = system.open_store(META_STORE).await?;
        store.put(SCHEMA_KEY, &bytes).await
    }
}

/// Constructor contract for typed indexes built on top of a raw store.
pub trait StoreIndex: Send + Sync + Sized {
    /// The type tag matching this index in schema entries and the
    /// registry.
    fn type_tag() -> &'static str;

    /// Builds the index over an opened store.
    fn open(store: Arc<dyn Store>) -> Self;
}

type RollbackFactory = Box<dyn Fn(Arc<dyn Store>) -> Box<dyn RollbackableIndex> + Send + Sync>;

/// Static registry of index types, keyed by type tag.
///
/// Populated once at startup; an entry's rollback factory is present
/// exactly when the index type was registered as rollbackable.
#[derive(Default)]
pub struct IndexRegistry {
    entries: HashMap<String, Option<RollbackFactory>>,
}

impl IndexRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an index type without rollback support.
    pub fn register<I: StoreIndex + 'static>(&mut self) {
        self.entries.insert(I::type_tag().to_string(), None);
    }

    /// Register an index type that participates in whole-system rollback.
    pub fn register_rollbackable<I: StoreIndex + RollbackableIndex + 'static>(&mut self) {
        self.entries.insert(
            I::type_tag().to_string(),
            Some(Box::new(|store| Box::new(I::open(store)))),
        );
    }

    /// Returns whether the type tag is known to the registry.
    pub fn is_registered(&self, type_tag: &str) -> bool {
        self.entries.contains_key(type_tag)
    }

    /// Returns whether the type tag was registered as rollbackable.
    pub fn supports_rollback(&self, type_tag: &str) -> bool {
        matches!(self.entries.get(type_tag), Some(Some(_)))
    }

    /// Builds the rollbackable index of the given type over a store, if
    /// the type was registered with rollback support.
    pub(crate) fn rollback_index(
        &self,
        type_tag: &str,
        store: Arc<dyn Store>,
    ) -> Option<Box<dyn RollbackableIndex>> {
        match self.entries.get(type_tag) {
            Some(Some(factory)) => Some(factory(store)),
            _ => None,
        }
    }
}

impl std::fmt::Debug for IndexRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexRegistry")
            .field("type_tags", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// A storage system paired with its schema and index registry.
///
/// Stores opened through this wrapper get their schema options applied:
/// value compression first, then the requested history access mode, so
/// that historized slots hold the compressed representation.
pub struct SchemaStorage<Y: StorageSystem> {
    system: Y,
    schema: IndexSchema,
    registry: IndexRegistry,
}

impl<Y: StorageSystem> SchemaStorage<Y> {
    /// Bundle a storage system with its schema and registry.
    pub fn new(system: Y, schema: IndexSchema, registry: IndexRegistry) -> Self {
        Self {
            system,
            schema,
            registry,
        }
    }

    /// The schema describing the stores of this system.
    pub fn schema(&self) -> &IndexSchema {
        &self.schema
    }

    /// The index type registry.
    pub fn registry(&self) -> &IndexRegistry {
        &self.registry
    }

    /// The underlying storage system.
    pub fn system(&self) -> &Y {
        &self.system
    }

    /// Opens the named store with all schema options applied, checking
    /// that the caller's expected index type matches the schema.
    ///
    /// For historized stores a history access mode is required; for
    /// non-historized stores it must be absent.
    pub async fn open_store_checked(
        &self,
        name: &str,
        requested_type: &str,
        history: Option<HistoryAccess>,
    ) -> Result<Arc<dyn Store>, StorageError> {
        let entry = self
            .schema
            .entry(name)
            .ok_or_else(|| StorageError::MissingSchemaEntry(name.to_string()))?;

        if entry.index_type() != requested_type {
            return Err(StorageError::IndexTypeMismatch {
                store: name.to_string(),
                declared: entry.index_type().to_string(),
                requested: requested_type.to_string(),
            });
        }

        let store = self.system.open_store(name).await?;
        apply_store_options(entry, store, name, history)
    }

    /// Opens the named store with only its physical options applied
    /// (compression, no history view). Used by the rollback orchestrator,
    /// which operates on the physical key encoding itself.
    pub async fn open_raw(&self, name: &str) -> Result<Arc<dyn Store>, StorageError> {
        let entry = self
            .schema
            .entry(name)
            .ok_or_else(|| StorageError::MissingSchemaEntry(name.to_string()))?;
        let store = self.system.open_store(name).await?;
        Ok(apply_compression(entry, store))
    }

    /// Opens the typed index laid over the named store.
    pub async fn open_index<I: StoreIndex>(
        &self,
        name: &str,
        history: Option<HistoryAccess>,
    ) -> Result<I, StorageError> {
        let store = self.open_store_checked(name, I::type_tag(), history).await?;
        Ok(I::open(store))
    }
}

fn apply_compression(entry: &SchemaEntry, store: Arc<dyn Store>) -> Arc<dyn Store> {
    if entry.uses_option(StorageOption::Compressed) {
        Arc::new(CompressingStore::new(store))
    } else {
        store
    }
}

/// Applies the entry's options to an opened store.
fn apply_store_options(
    entry: &SchemaEntry,
    store: Arc<dyn Store>,
    name: &str,
    history: Option<HistoryAccess>,
) -> Result<Arc<dyn Store>, StorageError> {
    let store = apply_compression(entry, store);

    if entry.uses_option(StorageOption::Historized) {
        let access = history.ok_or_else(|| StorageError::HistoryAccessMismatch(name.to_string()))?;
        Ok(access.create_store(store))
    } else if history.is_some() {
        Err(StorageError::HistoryAccessMismatch(name.to_string()))
    } else {
        Ok(store)
    }
}
