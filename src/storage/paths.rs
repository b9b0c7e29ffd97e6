//! Bucket/key to filesystem path resolution.
//!
//! Every path handed to the rest of the engine comes out of `PathResolver`,
//! which guarantees the result is a strict descendant of the data dir (for
//! buckets) or of the bucket dir (for objects). Keys use `/` on the wire
//! and are translated to host separators segment by segment, so a key can
//! never smuggle in an absolute path or a `..` hop.

use super::traits::StorageError;
use std::path::{Path, PathBuf};

/// Hidden per-bucket staging directory for in-progress multipart uploads.
pub const MULTIPART_DIR: &str = ".geckos3-multipart";

/// Hidden per-bucket scratch directory for PUT/Complete temp files.
pub const SCRATCH_DIR: &str = ".geckos3-tmp";

/// Suffix of per-object metadata sidecar files.
pub const SIDECAR_SUFFIX: &str = ".metadata.json";

/// Directory entries tolerated by DeleteBucket besides real objects.
pub const HIDDEN_ALLOWLIST: &[&str] = &[MULTIPART_DIR, SCRATCH_DIR, ".DS_Store", "Thumbs.db"];

/// Resolves wire-form bucket names and keys to absolute on-disk paths.
#[derive(Debug, Clone)]
pub struct PathResolver {
    root: PathBuf,
}

impl PathResolver {
    /// `root` must already be absolute (the engine canonicalizes the data
    /// dir once at startup).
    pub fn new(root: PathBuf) -> Self {
        debug_assert!(root.is_absolute());
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of a bucket directory.
    pub fn bucket_path(&self, bucket: &str) -> Result<PathBuf, StorageError> {
        validate_segment(bucket)
            .map_err(|reason| StorageError::InvalidBucketName(format!("{bucket:?}: {reason}")))?;
        let path = self.root.join(bucket);
        if !path.starts_with(&self.root) || path == self.root {
            return Err(StorageError::InvalidBucketName(format!(
                "{bucket:?}: resolves outside the data directory"
            )));
        }
        Ok(path)
    }

    /// Absolute path of an object file within its bucket.
    pub fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, StorageError> {
        let bucket_dir = self.bucket_path(bucket)?;
        if key.is_empty() {
            return Err(StorageError::InvalidKey("key must not be empty".into()));
        }
        if key.contains('\0') {
            return Err(StorageError::InvalidKey(
                "key must not contain NUL bytes".into(),
            ));
        }
        let mut path = bucket_dir.clone();
        for segment in key.split('/') {
            validate_segment(segment)
                .map_err(|reason| StorageError::InvalidKey(format!("{key:?}: {reason}")))?;
            path.push(segment);
        }
        if !path.starts_with(&bucket_dir) || path == bucket_dir {
            return Err(StorageError::InvalidKey(format!(
                "{key:?}: resolves outside its bucket"
            )));
        }
        Ok(path)
    }

    /// Absolute path of the metadata sidecar for an object.
    pub fn metadata_path(&self, bucket: &str, key: &str) -> Result<PathBuf, StorageError> {
        let path = self.object_path(bucket, key)?;
        let mut name = path
            .file_name()
            .ok_or_else(|| StorageError::InvalidKey(format!("{key:?}: no file name")))?
            .to_os_string();
        name.push(SIDECAR_SUFFIX);
        Ok(path.with_file_name(name))
    }

    /// The bucket's scratch directory for in-flight temp files.
    pub fn scratch_dir(&self, bucket: &str) -> Result<PathBuf, StorageError> {
        Ok(self.bucket_path(bucket)?.join(SCRATCH_DIR))
    }

    /// The bucket's multipart staging root.
    pub fn multipart_dir(&self, bucket: &str) -> Result<PathBuf, StorageError> {
        Ok(self.bucket_path(bucket)?.join(MULTIPART_DIR))
    }

    /// The staging directory of one multipart upload. Upload IDs are
    /// 32 lowercase hex chars; anything else cannot name a real upload
    /// and is rejected before touching the filesystem.
    pub fn upload_dir(&self, bucket: &str, upload_id: &str) -> Result<PathBuf, StorageError> {
        if upload_id.len() != 32
            || !upload_id
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        {
            return Err(StorageError::UploadNotFound(upload_id.to_string()));
        }
        Ok(self.multipart_dir(bucket)?.join(upload_id))
    }
}

/// One path segment: non-empty, no NUL, no separators, no dot-hops.
fn validate_segment(segment: &str) -> Result<(), &'static str> {
    if segment.is_empty() {
        return Err("empty path segment");
    }
    if segment.contains('\0') {
        return Err("NUL byte in path segment");
    }
    if segment.contains('/') || segment.contains('\\') {
        return Err("separator in path segment");
    }
    if segment == "." || segment == ".." {
        return Err("dot segment");
    }
    Ok(())
}
