// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>
//
// Historizing store family for the Quarry persistence core.
//
// Four cooperating views over one physical store retain the full change
// history of every logical key:
//
// - [`writer::RevisionWriterStore`] records writes against a caller-supplied
//   revision number,
// - [`head::HeadReaderStore`] reads only the most recent state (fast path),
// - [`revision::RevisionReaderStore`] reconstructs the state as of a fixed
//   revision,
// - [`eraser::HistoryEraserStore`] rolls the store back by erasing history
//   after a revision.
//
// # Physical encoding
//
// Each logical key owns two physical keyspaces in the shared store:
//
// ```text
// head slot:       "#_HEAD_#" ++ key                       -> latest value
// versioned slot:  key ++ [0xFE] ++ revision (8 bytes BE)  -> value at revision
// ```
//
// A deletion is recorded as the single-zero-byte tombstone value. The
// separator 0xFE is unlikely in textual keys without being one of the
// border values (0x00, 0xFF). Logical keys starting with the head marker
// bytes are reserved by this encoding.
//
// The encoding is shared by all four views and must stay stable within one
// deployment.

pub mod eraser;
pub mod head;
pub mod revision;
pub mod writer;

use std::sync::Arc;

use crate::store::Store;

/// A caller-assigned, monotonically non-decreasing point in logical time.
pub type Revision = u64;

/// Marker prefixed to a logical key to form its head slot.
pub(crate) const HEAD_MARKER: &[u8] = b"#_HEAD_#";

/// Single zero byte marking deleted entries in versioned slots.
pub(crate) const TOMBSTONE: &[u8] = &[0];

/// Byte separating a logical key from its revision suffix.
pub(crate) const REVISION_SEPARATOR: u8 = 0xfe;

/// Length of the separator plus the big-endian revision.
pub(crate) const REVISION_SUFFIX_LEN: usize = 1 + 8;

/// Builds the head slot key for a logical key.
pub(crate) fn head_key(key: &[u8]) -> Vec<u8> {
    [HEAD_MARKER, key].concat()
}

/// Strips the head marker from a head slot key.
pub(crate) fn strip_head_marker(raw: &[u8]) -> &[u8] {
    &raw[HEAD_MARKER.len()..]
}

/// Builds the versioned slot key for a logical key at a revision.
pub(crate) fn revision_key(key: &[u8], revision: Revision) -> Vec<u8> {
    let mut raw = Vec::with_capacity(key.len() + REVISION_SUFFIX_LEN);
    raw.extend_from_slice(key);
    raw.push(REVISION_SEPARATOR);
    raw.extend_from_slice(&revision.to_be_bytes());
    raw
}

/// Splits a versioned slot key into its logical key and revision.
///
/// Returns `None` for keys that do not carry a revision suffix.
pub(crate) fn split_revision_key(raw: &[u8]) -> Option<(&[u8], Revision)> {
    if raw.len() < REVISION_SUFFIX_LEN {
        return None;
    }
    let split = raw.len() - REVISION_SUFFIX_LEN;
    if raw[split] != REVISION_SEPARATOR {
        return None;
    }
    let revision = u64::from_be_bytes(raw[split + 1..].try_into().ok()?);
    Some((&raw[..split], revision))
}

/// Returns whether the value is the deletion tombstone.
pub(crate) fn is_tombstone(value: &[u8]) -> bool {
    value == TOMBSTONE
}

/// Selects the view through which a historized store is accessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryAccess {
    /// Read the most recent state only.
    ReadHead,
    /// Read the state as of the given revision.
    ReadRevision(Revision),
    /// Record all writes against the given revision.
    InsertAt(Revision),
}

impl HistoryAccess {
    /// Wraps the physical store in the view this mode selects.
    pub fn create_store(&self, store: Arc<dyn Store>) -> Arc<dyn Store> {
        match self {
            HistoryAccess::ReadHead => Arc::new(head::HeadReaderStore::new(store)),
            HistoryAccess::ReadRevision(revision) => {
                Arc::new(revision::RevisionReaderStore::new(store, *revision))
            }
            HistoryAccess::InsertAt(revision) => {
                Arc::new(writer::RevisionWriterStore::new(store, *revision))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_head_key_round_trip() {
        let raw = head_key(b"key1");
        assert_eq!(raw, b"#_HEAD_#key1".to_vec());
        assert!(raw.starts_with(HEAD_MARKER));
        assert_eq!(strip_head_marker(&raw), b"key1");
    }

    #[test]
    fn test_revision_key_round_trip() {
        let raw = revision_key(b"key1", 42);
        let (key, revision) = split_revision_key(&raw).unwrap();
        assert_eq!(key, b"key1");
        assert_eq!(revision, 42);
    }

    #[test]
    fn test_revision_keys_sort_by_revision() {
        let early = revision_key(b"key1", 12);
        let late = revision_key(b"key1", 27);
        assert!(early < late);
        // All versioned slots of a key sort before those of the next key.
        assert!(revision_key(b"key1", u64::MAX) < revision_key(b"key2", 0));
    }

    #[test]
    fn test_split_rejects_foreign_keys() {
        assert!(split_revision_key(b"short").is_none());
        // Right length but wrong separator byte.
        let mut raw = revision_key(b"key1", 42);
        let separator_at = raw.len() - REVISION_SUFFIX_LEN;
        raw[separator_at] = 0x00;
        assert!(split_revision_key(&raw).is_none());
    }

    #[test]
    fn test_tombstone_detection() {
        assert!(is_tombstone(&[0]));
        assert!(!is_tombstone(&[1]));
        assert!(!is_tombstone(&[]));
        assert!(!is_tombstone(&[0, 0]));
    }
}
