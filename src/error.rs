// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>
//
// Storage error types for the Quarry persistence core.
//
// Provides a unified error enum covering all failure modes the storage
// layers may encounter: I/O errors, backend faults, data corruption,
// misuse of read-only views, and rollback configuration errors.

use thiserror::Error;

/// Errors that can occur when interacting with the storage layers.
///
/// Batch operations are all-or-nothing: on error, no partial success is
/// signalled. The core never retries internally; callers decide retry
/// policy.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred in the underlying storage layer.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The storage backend failed or is not available (e.g. handle lost,
    /// transaction failure). Carries a description of the wrapped cause.
    #[error("backend error: {0}")]
    Backend(String),

    /// The stored data is corrupted or in an unexpected format.
    #[error("corrupted data: {0}")]
    CorruptedData(String),

    /// A write operation was attempted on a read-only store view.
    #[error("store is read-only: {0}")]
    ReadOnly(String),

    /// The storage system was closed and can no longer serve requests.
    #[error("storage system is closed")]
    SystemClosed,

    /// Failed to serialize or deserialize a typed index value.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// No schema entry exists for the named store.
    #[error("no schema entry for store '{0}'")]
    MissingSchemaEntry(String),

    /// No schema has been saved to the storage system.
    #[error("schema is missing from the storage system")]
    SchemaMissing,

    /// A history access mode was supplied for a non-historized store, or
    /// omitted for a historized one.
    #[error("history access mismatch for store '{0}'")]
    HistoryAccessMismatch(String),

    /// The index type requested by the caller does not match the schema.
    #[error("index type mismatch for store '{store}': schema declares '{declared}', caller requested '{requested}'")]
    IndexTypeMismatch {
        /// The store whose schema entry was consulted.
        store: String,
        /// The index type tag declared in the schema.
        declared: String,
        /// The index type tag the caller asked for.
        requested: String,
    },

    /// Rollback was requested for a store that declares neither rollback
    /// option and whose index type has no registered rollback support.
    /// This is fatal for the rollback run, not retried.
    #[error("store '{0}' supports no rollback strategy")]
    RollbackUnsupported(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_display() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file gone");
        let err = StorageError::Io(io_err);
        assert!(err.to_string().contains("I/O error"));
    }

    #[test]
    fn test_backend_display() {
        let err = StorageError::Backend("connection refused".to_string());
        assert_eq!(err.to_string(), "backend error: connection refused");
    }

    #[test]
    fn test_corrupted_data_display() {
        let err = StorageError::CorruptedData("checksum mismatch".to_string());
        assert!(err.to_string().contains("corrupted data"));
    }

    #[test]
    fn test_read_only_display() {
        let err = StorageError::ReadOnly("head reader".to_string());
        assert!(err.to_string().contains("read-only"));
    }

    #[test]
    fn test_missing_schema_entry_display() {
        let err = StorageError::MissingSchemaEntry("findings".to_string());
        assert_eq!(err.to_string(), "no schema entry for store 'findings'");
    }

    #[test]
    fn test_index_type_mismatch_display() {
        let err = StorageError::IndexTypeMismatch {
            store: "metrics".to_string(),
            declared: "value-index".to_string(),
            requested: "other-index".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("metrics"));
        assert!(msg.contains("value-index"));
        assert!(msg.contains("other-index"));
    }

    #[test]
    fn test_rollback_unsupported_display() {
        let err = StorageError::RollbackUnsupported("cache".to_string());
        assert!(err.to_string().contains("no rollback strategy"));
    }
}
