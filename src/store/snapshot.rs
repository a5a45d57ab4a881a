//! Snapshot persistence for `MemoryStore`
//!
//! A snapshot is one JSON document:
//!
//! ```text
//! {"format": 1, "checksum": <crc32 of collections bytes>, "collections": {...}}
//! ```
//!
//! The checksum covers the compact serialization of `collections`.
//! Every load validates it; a mismatch aborts the load.
//! Writes go to a temporary sibling and are renamed into place.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crc32fast::Hasher;
use serde::{Deserialize, Serialize};

use super::errors::{StoreError, StoreResult};
use super::memory::{MemoryStore, Rows};

/// Current snapshot format version
pub const SNAPSHOT_FORMAT: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotFile {
    format: u32,
    checksum: u32,
    collections: BTreeMap<String, Rows>,
}

/// Computes a CRC32 checksum over the provided data.
pub fn compute_checksum(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Write the store's collections to `path`
pub fn save_snapshot(store: &MemoryStore, path: &Path) -> StoreResult<()> {
    let collections = store.export()?;
    let body = serde_json::to_vec(&collections)?;
    let file = SnapshotFile {
        format: SNAPSHOT_FORMAT,
        checksum: compute_checksum(&body),
        collections,
    };

    let tmp = path.with_extension("tmp");
    fs::write(&tmp, serde_json::to_vec_pretty(&file)?)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Load a store from `path`; a missing file yields an empty store
pub fn load_snapshot(path: &Path) -> StoreResult<MemoryStore> {
    if !path.exists() {
        return Ok(MemoryStore::new());
    }

    let bytes = fs::read(path)?;
    let file: SnapshotFile = serde_json::from_slice(&bytes)
        .map_err(|e| StoreError::CorruptSnapshot(format!("unreadable snapshot: {}", e)))?;

    if file.format != SNAPSHOT_FORMAT {
        return Err(StoreError::CorruptSnapshot(format!(
            "unsupported format {}",
            file.format
        )));
    }

    let body = serde_json::to_vec(&file.collections)?;
    let actual = compute_checksum(&body);
    if actual != file.checksum {
        return Err(StoreError::CorruptSnapshot(format!(
            "checksum mismatch: expected {:08x}, got {:08x}",
            file.checksum, actual
        )));
    }

    Ok(MemoryStore::from_collections(file.collections))
}
