// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>
//
// Typed value index for the Quarry persistence core.
//
// Provides a higher-level, serde-based interface on top of any store:
// string keys and JSON-serialized values. This is the standard index type
// laid over stores whose values are structured rather than opaque bytes.

use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StorageError;
use crate::schema::StoreIndex;
use crate::store::Store;

/// An index storing single serializable values under string keys.
///
/// Values are serialized to JSON on write and deserialized on read. The
/// index works over any [`Store`], so it composes with decorators and the
/// historizing views.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use quarry_storage::memory::InMemoryStore;
/// use quarry_storage::typed::ValueIndex;
///
/// # tokio_test::block_on(async {
/// let index: ValueIndex<u32> = ValueIndex::new(Arc::new(InMemoryStore::new()));
/// index.set_value("answer", &42).await.unwrap();
/// assert_eq!(index.value("answer").await.unwrap(), Some(42));
/// # });
/// ```
pub struct ValueIndex<T> {
    /// The underlying raw store.
    store: Arc<dyn Store>,
    _values: PhantomData<fn() -> T>,
}

impl<T> ValueIndex<T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    /// Create a value index over the given store.
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            _values: PhantomData,
        }
    }

    /// Return a reference to the underlying store.
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    fn encode(key: &str, value: &T) -> Result<Vec<u8>, StorageError> {
        serde_json::to_vec(value).map_err(|err| {
            StorageError::Serialization(format!(
                "failed to serialize value for key '{key}': {err}"
            ))
        })
    }

    fn decode(key: &str, bytes: &[u8]) -> Result<T, StorageError> {
        serde_json::from_slice(bytes).map_err(|err| {
            StorageError::Serialization(format!(
                "failed to deserialize value for key '{key}': {err}"
            ))
        })
    }

    /// Returns the value for the given key, or `None` if none is stored.
    pub async fn value(&self, key: &str) -> Result<Option<T>, StorageError> {
        match self.store.get(key.as_bytes()).await? {
            Some(bytes) => Ok(Some(Self::decode(key, &bytes)?)),
            None => Ok(None),
        }
    }

    /// Retrieves the values of the given keys, with `None` for every key
    /// not in the index.
    pub async fn values(&self, keys: &[&str]) -> Result<Vec<Option<T>>, StorageError> {
        let raw_keys: Vec<Vec<u8>> = keys.iter().map(|key| key.as_bytes().to_vec()).collect();
        let raw_values = self.store.multi_get(&raw_keys).await?;

        let mut result = Vec::with_capacity(keys.len());
        for (key, raw) in keys.iter().zip(raw_values) {
            result.push(match raw {
                Some(bytes) => Some(Self::decode(key, &bytes)?),
                None => None,
            });
        }
        Ok(result)
    }

    /// Sets the value for the given key.
    pub async fn set_value(&self, key: &str, value: &T) -> Result<(), StorageError> {
        self.store.put(key.as_bytes(), &Self::encode(key, value)?).await
    }

    /// Batch operation for setting multiple values at once.
    pub async fn set_values(&self, entries: &[(&str, T)]) -> Result<(), StorageError> {
        let mut raw = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            raw.push((key.as_bytes().to_vec(), Self::encode(key, value)?));
        }
        self.store.batch_put(&raw).await
    }

    /// Removes the value of the given key.
    pub async fn remove_value(&self, key: &str) -> Result<(), StorageError> {
        self.store.remove(key.as_bytes()).await
    }

    /// Batch operation for removing multiple values at once.
    pub async fn remove_values(&self, keys: &[&str]) -> Result<(), StorageError> {
        let raw_keys: Vec<Vec<u8>> = keys.iter().map(|key| key.as_bytes().to_vec()).collect();
        self.store.batch_remove(&raw_keys).await
    }

    /// Retrieves the names of all keys in the index. This can be slow for
    /// indexes holding a large amount of data.
    pub async fn all_keys(&self) -> Result<Vec<String>, StorageError> {
        let mut keys = Vec::new();
        self.store
            .scan_keys_prefix(b"", &mut |raw| {
                keys.push(String::from_utf8_lossy(raw).into_owned());
                Ok(())
            })
            .await?;
        Ok(keys)
    }

    /// Retrieves all entries whose keys start with the given prefix, in
    /// key order.
    pub async fn entries_with_prefix(&self, prefix: &str) -> Result<Vec<(String, T)>, StorageError> {
        let mut entries = Vec::new();
        self.store
            .scan_prefix(prefix.as_bytes(), &mut |raw_key, raw_value| {
                let key = String::from_utf8_lossy(raw_key).into_owned();
                let value = Self::decode(&key, raw_value)?;
                entries.push((key, value));
                Ok(())
            })
            .await?;
        Ok(entries)
    }

    /// Retrieves all entries in the index, in key order.
    pub async fn all_entries(&self) -> Result<Vec<(String, T)>, StorageError> {
        self.entries_with_prefix("").await
    }
}

impl<T> StoreIndex for ValueIndex<T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    fn type_tag() -> &'static str {
        "value-index"
    }

    fn open(store: Arc<dyn Store>) -> Self {
        Self::new(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStore;
    use serde::Deserialize;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Finding {
        rule: String,
        severity: u32,
    }

    fn index<T: Serialize + DeserializeOwned + Send + Sync>() -> (ValueIndex<T>, InMemoryStore) {
        let store = InMemoryStore::new();
        (ValueIndex::new(Arc::new(store.clone())), store)
    }

    #[tokio::test]
    async fn test_value_round_trip() {
        let (index, _) = index::<Finding>();
        let finding = Finding {
            rule: "unused-import".to_string(),
            severity: 2,
        };

        index.set_value("f1", &finding).await.unwrap();
        assert_eq!(index.value("f1").await.unwrap(), Some(finding));

        assert_eq!(index.value("missing").await.unwrap(), None);

        index.remove_value("f1").await.unwrap();
        assert_eq!(index.value("f1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_batch_values() {
        let (index, _) = index::<u32>();
        index
            .set_values(&[("a", 1), ("b", 2), ("c", 3)])
            .await
            .unwrap();

        let values = index.values(&["a", "missing", "c"]).await.unwrap();
        assert_eq!(values, vec![Some(1), None, Some(3)]);

        index.remove_values(&["a", "c"]).await.unwrap();
        assert_eq!(index.all_keys().await.unwrap(), vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn test_entries_with_prefix() {
        let (index, _) = index::<u32>();
        index.set_value("fruit:apple", &10).await.unwrap();
        index.set_value("fruit:banana", &20).await.unwrap();
        index.set_value("vegetable:carrot", &30).await.unwrap();

        let fruits = index.entries_with_prefix("fruit:").await.unwrap();
        assert_eq!(
            fruits,
            vec![
                ("fruit:apple".to_string(), 10),
                ("fruit:banana".to_string(), 20)
            ]
        );

        assert_eq!(index.all_entries().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_deserialization_error() {
        let (index, store) = index::<Finding>();

        // Write raw invalid JSON bytes directly past the index.
        store.put(b"broken", b"not-valid-json!!!").await.unwrap();

        match index.value("broken").await {
            Err(StorageError::Serialization(msg)) => {
                assert!(msg.contains("failed to deserialize"));
            }
            other => panic!("expected Serialization error, got: {other:?}"),
        }
    }
}
