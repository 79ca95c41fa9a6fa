// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>
//
// Utility operations over stores: key listing, bulk clearing, range
// deletion, and a streamed export/import format for moving store contents
// between storage systems.

use std::io::{Read, Write};

use crate::error::StorageError;
use crate::store::Store;

/// Marks the end of the entries in an exported store stream.
const RECORD_TERMINATOR: i32 = -1;

/// Minimal number of bytes to accumulate during import before a batch put
/// is performed.
const MIN_READ_BYTES: usize = 1024 * 1024;

/// Returns the list of all keys of the given store, in ascending order.
pub async fn list_keys<S: Store + ?Sized>(store: &S) -> Result<Vec<Vec<u8>>, StorageError> {
    let mut keys = Vec::new();
    store
        .scan_keys_prefix(b"", &mut |key| {
            keys.push(key.to_vec());
            Ok(())
        })
        .await?;
    Ok(keys)
}

/// Returns the number of keys of the given store.
pub async fn key_count<S: Store + ?Sized>(store: &S) -> Result<usize, StorageError> {
    let mut count = 0usize;
    store
        .scan_keys_prefix(b"", &mut |_| {
            count += 1;
            Ok(())
        })
        .await?;
    Ok(count)
}

/// Completely erases the contents of the given store.
pub async fn clear_store<S: Store + ?Sized>(store: &S) -> Result<(), StorageError> {
    let keys = list_keys(store).await?;
    store.batch_remove(&keys).await
}

/// Deletes all entries between `begin` (inclusive) and `end` (exclusive).
pub async fn delete_range<S: Store + ?Sized>(
    store: &S,
    begin: &[u8],
    end: &[u8],
) -> Result<(), StorageError> {
    let mut keys = Vec::new();
    store
        .scan_keys(begin, end, &mut |key| {
            if key != end {
                keys.push(key.to_vec());
            }
            Ok(())
        })
        .await?;
    store.batch_remove(&keys).await
}

fn write_i32<W: Write>(out: &mut W, value: i32) -> Result<(), StorageError> {
    out.write_all(&value.to_be_bytes())?;
    Ok(())
}

fn read_i32<R: Read>(input: &mut R) -> Result<i32, StorageError> {
    let mut buf = [0u8; 4];
    input.read_exact(&mut buf)?;
    Ok(i32::from_be_bytes(buf))
}

/// Exports the entire contents of a store into an output stream.
///
/// The format consists, for each entry, of the key length (4 bytes, big
/// endian), the key bytes, the value length and the value bytes. After the
/// last entry a `-1` length marks the end of the stream.
///
/// Returns the number of records written.
pub async fn export_store<S, W>(store: &S, out: &mut W) -> Result<usize, StorageError>
where
    S: Store + ?Sized,
    W: Write + Send,
{
    let mut records = 0usize;
    store
        .scan_prefix(b"", &mut |key, value| {
            write_i32(out, key.len() as i32)?;
            out.write_all(key)?;
            write_i32(out, value.len() as i32)?;
            out.write_all(value)?;
            records += 1;
            Ok(())
        })
        .await?;
    write_i32(out, RECORD_TERMINATOR)?;
    Ok(records)
}

/// Imports the data of a stream written by [`export_store`] into a store.
///
/// The store is not cleared first; colliding entries are silently
/// overwritten. Entries are applied in batches of at least one megabyte to
/// bound memory usage.
///
/// Returns the number of records read.
pub async fn import_store<S, R>(store: &S, input: &mut R) -> Result<usize, StorageError>
where
    S: Store + ?Sized,
    R: Read + Send,
{
    let mut records = 0usize;
    let mut batch_bytes = 0usize;
    let mut batch: Vec<(Vec<u8>, Vec<u8>)> = Vec::new();

    loop {
        let key_len = read_i32(input)?;
        if key_len == RECORD_TERMINATOR {
            store.batch_put(&batch).await?;
            return Ok(records);
        }
        if key_len < 0 {
            return Err(StorageError::CorruptedData(format!(
                "invalid key length {key_len} in store stream"
            )));
        }
        let mut key = vec![0u8; key_len as usize];
        input.read_exact(&mut key)?;

        let value_len = read_i32(input)?;
        if value_len < 0 {
            return Err(StorageError::CorruptedData(format!(
                "invalid value length {value_len} in store stream"
            )));
        }
        let mut value = vec![0u8; value_len as usize];
        input.read_exact(&mut value)?;

        batch_bytes += key.len() + value.len();
        batch.push((key, value));
        records += 1;

        if batch_bytes >= MIN_READ_BYTES {
            store.batch_put(&batch).await?;
            batch.clear();
            batch_bytes = 0;
        }
    }
}
