//! Per-object metadata sidecars.
//!
//! Sidecars are written with the same temp-then-rename discipline as object
//! bodies. The temp lives in the bucket's scratch directory so a
//! half-written sidecar can never sit next to a committed object; rename
//! across directories is fine because both live on the same filesystem.

use super::traits::StorageError;
use crate::types::{ObjectMetadata, DEFAULT_CONTENT_TYPE};
use chrono::{DateTime, Utc};
use md5::{Digest, Md5};
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use tempfile::NamedTempFile;
use tokio::fs;
use tracing::debug;

/// Read a sidecar. Absent or unreadable sidecars yield `None`; the caller
/// falls back to stat-derived metadata.
pub async fn read(path: &Path) -> Option<ObjectMetadata> {
    let data = fs::read(path).await.ok()?;
    match serde_json::from_slice(&data) {
        Ok(meta) => Some(meta),
        Err(err) => {
            debug!("Ignoring unparseable sidecar {:?}: {}", path, err);
            None
        }
    }
}

/// Atomically write a sidecar: temp file in `scratch_dir`, fsynced, then
/// renamed over `path`.
pub async fn write_atomic(
    scratch_dir: &Path,
    path: &Path,
    metadata: &ObjectMetadata,
) -> Result<(), StorageError> {
    let data = serde_json::to_vec_pretty(metadata)?;
    let scratch_dir = scratch_dir.to_path_buf();
    let path = path.to_path_buf();

    tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
        std::fs::create_dir_all(&scratch_dir)?;
        let mut tmp = NamedTempFile::new_in(&scratch_dir)?;
        tmp.write_all(&data)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| StorageError::Io(e.error))?;
        Ok(())
    })
    .await
    .map_err(|e| StorageError::Other(format!("spawn_blocking join failed: {e}")))?
}

/// Reconstruct object metadata from filesystem stat when no sidecar is
/// available. The pseudo-ETag is a function of size and mtime, so it is
/// stable until the file changes.
pub fn synthesize(size: u64, modified: SystemTime) -> ObjectMetadata {
    ObjectMetadata {
        size,
        last_modified: DateTime::<Utc>::from(modified),
        etag: pseudo_etag(size, modified),
        content_type: DEFAULT_CONTENT_TYPE.to_string(),
        content_encoding: None,
        content_disposition: None,
        cache_control: None,
        custom_metadata: HashMap::new(),
    }
}

/// `"md5(<size>-<mtime_ns>)"`, quoted hex.
pub fn pseudo_etag(size: u64, modified: SystemTime) -> String {
    let mtime_ns = modified
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let digest = Md5::digest(format!("{size}-{mtime_ns}").as_bytes());
    format!("\"{}\"", hex::encode(digest))
}
