//! Filesystem storage engine.
//!
//! All object commits follow the same discipline: stream into a temp file
//! under the bucket's scratch directory (body I/O outside any lock), then
//! take the target path's stripe and mkdir+rename into place. Readers
//! therefore only ever observe whole objects.

use super::paths::{PathResolver, HIDDEN_ALLOWLIST, MULTIPART_DIR, SCRATCH_DIR, SIDECAR_SUFFIX};
use super::sidecar;
use super::stripes::PathLocks;
use super::traits::{BodyStream, ByteRange, ObjectStore, StorageError};
use crate::types::{BucketEntry, ObjectInfo, ObjectMetadata, PutObjectInput, DEFAULT_CONTENT_TYPE};
use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use md5::{Digest, Md5};
use rand::RngCore;
use sha2::Sha256;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, SeekFrom};
use tokio_util::io::ReaderStream;
use tracing::{debug, instrument, warn};

/// Hard cap on entries visited by a single bucket walk. Listings past this
/// fail rather than silently truncating.
pub(super) const LIST_SCAN_CAP: usize = 100_000;

/// Async-safe directory check
pub(super) async fn is_dir(path: &Path) -> bool {
    fs::metadata(path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
}

/// Filesystem storage engine
///
/// Storage layout:
/// ```text
/// {data_dir}/{bucket}/
///   {key}                     # object content (keys with '/' nest dirs)
///   {key}.metadata.json       # sidecar (when enabled)
///   .geckos3-tmp/             # scratch for in-flight temp files
///   .geckos3-multipart/{id}/  # multipart staging
/// ```
pub struct FsStore {
    pub(super) paths: PathResolver,
    pub(super) locks: PathLocks,
    pub(super) sidecars: bool,
    pub(super) fsync: bool,
}

/// Result of streaming a body into a temp file.
pub(super) struct Spooled {
    pub size: u64,
    pub md5_hex: String,
}

impl FsStore {
    /// Create the engine, creating and canonicalizing the data dir.
    pub async fn new(data_dir: PathBuf, sidecars: bool, fsync: bool) -> Result<Self, StorageError> {
        fs::create_dir_all(&data_dir).await?;
        let root = fs::canonicalize(&data_dir).await?;
        Ok(Self {
            paths: PathResolver::new(root),
            locks: PathLocks::new(),
            sidecars,
            fsync,
        })
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.paths
    }

    /// Resolve a bucket that must already exist.
    pub(super) async fn require_bucket(&self, bucket: &str) -> Result<PathBuf, StorageError> {
        let dir = self.paths.bucket_path(bucket)?;
        if !is_dir(&dir).await {
            return Err(StorageError::BucketNotFound(bucket.to_string()));
        }
        Ok(dir)
    }

    /// Stream `body` into `tmp`, hashing as it goes. The temp file is
    /// removed on any failure, including digest mismatch; the caller's
    /// target path is never touched here.
    pub(super) async fn spool(
        &self,
        tmp: &Path,
        body: BodyStream,
        expected_sha256: Option<&str>,
        expected_md5: Option<&str>,
    ) -> Result<Spooled, StorageError> {
        match self
            .spool_inner(tmp, body, expected_sha256, expected_md5)
            .await
        {
            Ok(spooled) => Ok(spooled),
            Err(err) => {
                let _ = fs::remove_file(tmp).await;
                Err(err)
            }
        }
    }

    async fn spool_inner(
        &self,
        tmp: &Path,
        mut body: BodyStream,
        expected_sha256: Option<&str>,
        expected_md5: Option<&str>,
    ) -> Result<Spooled, StorageError> {
        let mut file = fs::File::create(tmp).await?;
        let mut md5 = Md5::new();
        let mut sha256 = expected_sha256.map(|_| Sha256::new());
        let mut size: u64 = 0;

        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            md5.update(&chunk);
            if let Some(hasher) = sha256.as_mut() {
                hasher.update(&chunk);
            }
            file.write_all(&chunk).await?;
            size += chunk.len() as u64;
        }
        file.flush().await?;
        if self.fsync {
            file.sync_all().await?;
        }
        drop(file);

        if let (Some(hasher), Some(expected)) = (sha256, expected_sha256) {
            let computed = hex::encode(hasher.finalize());
            if !computed.eq_ignore_ascii_case(expected) {
                debug!("SHA-256 mismatch: expected {}, got {}", expected, computed);
                return Err(StorageError::BadDigest);
            }
        }

        let md5_hex = hex::encode(md5.finalize());
        if let Some(expected) = expected_md5 {
            if !md5_hex.eq_ignore_ascii_case(expected) {
                debug!("MD5 mismatch: expected {}, got {}", expected, md5_hex);
                return Err(StorageError::BadDigest);
            }
        }

        Ok(Spooled { size, md5_hex })
    }

    /// Publish a spooled temp file at `target`: stripe lock, create parent
    /// directories, rename, optionally fsync the parent. The critical
    /// section is local disk work only.
    pub(super) async fn commit(&self, tmp: &Path, target: &Path) -> Result<(), StorageError> {
        let locks = self.locks.clone();
        let fsync = self.fsync;
        let tmp_path = tmp.to_path_buf();
        let target_path = target.to_path_buf();

        let result = tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
            let _stripe = locks.lock(&target_path);
            if let Some(parent) = target_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::rename(&tmp_path, &target_path)?;
            if fsync {
                if let Some(parent) = target_path.parent() {
                    if let Ok(dir) = std::fs::File::open(parent) {
                        let _ = dir.sync_all();
                    }
                }
            }
            Ok(())
        })
        .await
        .map_err(|e| StorageError::Other(format!("spawn_blocking join failed: {e}")))?;

        if result.is_err() {
            let _ = fs::remove_file(tmp).await;
        }
        result
    }

    /// Best-effort sidecar write. The object is already committed; a
    /// sidecar failure only downgrades read-back metadata to stat-derived.
    pub(super) async fn store_sidecar(&self, bucket: &str, key: &str, metadata: &ObjectMetadata) {
        if !self.sidecars {
            return;
        }
        let (Ok(sidecar_path), Ok(scratch)) = (
            self.paths.metadata_path(bucket, key),
            self.paths.scratch_dir(bucket),
        ) else {
            return;
        };
        if let Err(err) = sidecar::write_atomic(&scratch, &sidecar_path, metadata).await {
            warn!("Failed to write sidecar for {}/{}: {}", bucket, key, err);
        }
    }

    /// Metadata for an existing object: sidecar when enabled and in step
    /// with the data file, stat-derived otherwise.
    pub(super) async fn load_metadata(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<ObjectMetadata, StorageError> {
        let path = self.paths.object_path(bucket, key)?;
        let stat = match fs::metadata(&path).await {
            Ok(stat) => stat,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::KeyNotFound(key.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        if !stat.is_file() {
            return Err(StorageError::KeyNotFound(key.to_string()));
        }

        if self.sidecars {
            let sidecar_path = self.paths.metadata_path(bucket, key)?;
            if let Some(meta) = sidecar::read(&sidecar_path).await {
                // A sidecar lagging a concurrent overwrite describes the
                // old body; fall back to stat-derived metadata then.
                if meta.size == stat.len() {
                    return Ok(meta);
                }
            }
        }

        let modified = stat.modified().unwrap_or(UNIX_EPOCH);
        Ok(sidecar::synthesize(stat.len(), modified))
    }

    pub(super) fn build_metadata(size: u64, etag: String, input: &PutObjectInput) -> ObjectMetadata {
        ObjectMetadata {
            size,
            last_modified: Utc::now(),
            etag,
            content_type: input
                .content_type
                .clone()
                .filter(|ct| !ct.is_empty())
                .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
            content_encoding: input.content_encoding.clone(),
            content_disposition: input.content_disposition.clone(),
            cache_control: input.cache_control.clone(),
            custom_metadata: input.custom_metadata.clone(),
        }
    }
}

/// A fresh scratch file name, unique enough for a single directory.
pub(super) fn scratch_file_name() -> String {
    let mut raw = [0u8; 8];
    rand::rngs::OsRng.fill_bytes(&mut raw);
    format!(".put-{}.tmp", hex::encode(raw))
}

/// Remove now-empty parent directories of `path`, walking upward and
/// stopping at (never removing) `stop`. Best effort: the first non-empty
/// or already-gone directory ends the walk.
pub(super) fn prune_empty_parents(path: &Path, stop: &Path) {
    let mut dir = path.parent();
    while let Some(candidate) = dir {
        if candidate == stop {
            break;
        }
        if std::fs::remove_dir(candidate).is_err() {
            break;
        }
        dir = candidate.parent();
    }
}

/// Walk a bucket directory collecting wire-form keys under `prefix`,
/// sorted lexicographically. Hidden staging directories are not descended
/// into and sidecars are skipped. Visiting more than `LIST_SCAN_CAP` file
/// entries aborts the walk.
fn walk_bucket(bucket_dir: &Path, prefix: &str) -> Result<Vec<String>, StorageError> {
    let mut keys = Vec::new();
    let mut scanned: usize = 0;
    let mut stack = vec![bucket_dir.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            // Raced with a delete; the subtree is simply gone.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let entry = entry?;
            let file_type = entry.file_type()?;
            let name = entry.file_name();
            let name = name.to_string_lossy();

            if file_type.is_dir() {
                if name == MULTIPART_DIR || name == SCRATCH_DIR {
                    continue;
                }
                stack.push(entry.path());
            } else if file_type.is_file() {
                if name.ends_with(SIDECAR_SUFFIX) {
                    continue;
                }
                scanned += 1;
                if scanned > LIST_SCAN_CAP {
                    return Err(StorageError::TooManyObjects);
                }
                let rel = entry
                    .path()
                    .strip_prefix(bucket_dir)
                    .map_err(|e| StorageError::Other(e.to_string()))?
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/");
                if rel.starts_with(prefix) {
                    keys.push(rel);
                }
            }
        }
    }

    keys.sort();
    Ok(keys)
}

#[async_trait]
impl ObjectStore for FsStore {
    // === Bucket operations ===

    #[instrument(skip(self))]
    async fn bucket_exists(&self, bucket: &str) -> Result<bool, StorageError> {
        Ok(is_dir(&self.paths.bucket_path(bucket)?).await)
    }

    #[instrument(skip(self))]
    async fn create_bucket(&self, bucket: &str) -> Result<(), StorageError> {
        let dir = self.paths.bucket_path(bucket)?;
        fs::create_dir_all(&dir).await?;
        debug!("Created bucket directory: {:?}", dir);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_bucket(&self, bucket: &str) -> Result<(), StorageError> {
        let dir = self.require_bucket(bucket).await?;
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !HIDDEN_ALLOWLIST.contains(&name.as_ref()) {
                return Err(StorageError::BucketNotEmpty(bucket.to_string()));
            }
        }
        fs::remove_dir_all(&dir).await?;
        debug!("Deleted bucket directory: {:?}", dir);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_buckets(&self) -> Result<Vec<BucketEntry>, StorageError> {
        let mut buckets = Vec::new();
        let mut entries = fs::read_dir(self.paths.root()).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            // Stray directories that could not have been created through
            // the API are not buckets.
            if crate::types::validate_bucket_name(&name).is_err() {
                continue;
            }
            let modified = entry.metadata().await?.modified().unwrap_or(UNIX_EPOCH);
            buckets.push(BucketEntry {
                name,
                created: modified.into(),
            });
        }
        buckets.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(buckets)
    }

    // === Object operations ===

    #[instrument(skip(self, body, input))]
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: BodyStream,
        input: PutObjectInput,
    ) -> Result<ObjectMetadata, StorageError> {
        let bucket_dir = self.require_bucket(bucket).await?;
        let target = self.paths.object_path(bucket, key)?;

        let scratch = bucket_dir.join(SCRATCH_DIR);
        fs::create_dir_all(&scratch).await?;
        let tmp = scratch.join(scratch_file_name());

        let spooled = self
            .spool(
                &tmp,
                body,
                input.expected_sha256.as_deref(),
                input.expected_md5.as_deref(),
            )
            .await?;
        self.commit(&tmp, &target).await?;

        let metadata =
            Self::build_metadata(spooled.size, format!("\"{}\"", spooled.md5_hex), &input);
        self.store_sidecar(bucket, key, &metadata).await;

        debug!("Stored {}/{} ({} bytes)", bucket, key, spooled.size);
        Ok(metadata)
    }

    #[instrument(skip(self))]
    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        range: Option<ByteRange>,
    ) -> Result<(BodyStream, ObjectMetadata), StorageError> {
        self.require_bucket(bucket).await?;
        let metadata = self.load_metadata(bucket, key).await?;
        let path = self.paths.object_path(bucket, key)?;

        let mut file = match fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::KeyNotFound(key.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        let stream: BodyStream = match range {
            Some(range) => {
                file.seek(SeekFrom::Start(range.offset)).await?;
                Box::pin(ReaderStream::new(file.take(range.length)))
            }
            None => Box::pin(ReaderStream::new(file)),
        };
        Ok((stream, metadata))
    }

    #[instrument(skip(self))]
    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectMetadata, StorageError> {
        self.require_bucket(bucket).await?;
        self.load_metadata(bucket, key).await
    }

    #[instrument(skip(self))]
    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        let bucket_dir = self.require_bucket(bucket).await?;
        let target = self.paths.object_path(bucket, key)?;
        let sidecar_path = self.paths.metadata_path(bucket, key)?;
        let locks = self.locks.clone();

        tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
            let _stripe = locks.lock(&target);
            match std::fs::remove_file(&target) {
                Ok(()) => {}
                // Deleting a missing key is not an error.
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            let _ = std::fs::remove_file(&sidecar_path);
            prune_empty_parents(&target, &bucket_dir);
            Ok(())
        })
        .await
        .map_err(|e| StorageError::Other(format!("spawn_blocking join failed: {e}")))?
    }

    #[instrument(skip(self, replace))]
    async fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
        replace: Option<PutObjectInput>,
    ) -> Result<ObjectMetadata, StorageError> {
        self.require_bucket(dst_bucket).await?;
        let src_meta = self.head_object(src_bucket, src_key).await?;
        let (body, _) = self.get_object(src_bucket, src_key, None).await?;

        let input = match replace {
            Some(input) => input,
            None => PutObjectInput {
                content_type: Some(src_meta.content_type),
                content_encoding: src_meta.content_encoding,
                content_disposition: src_meta.content_disposition,
                cache_control: src_meta.cache_control,
                custom_metadata: src_meta.custom_metadata,
                expected_sha256: None,
                expected_md5: None,
            },
        };
        self.put_object(dst_bucket, dst_key, body, input).await
    }

    #[instrument(skip(self))]
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        max_keys: usize,
    ) -> Result<Vec<ObjectInfo>, StorageError> {
        let bucket_dir = self.require_bucket(bucket).await?;
        let prefix = prefix.to_string();
        let walk_dir = bucket_dir.clone();

        let mut keys = tokio::task::spawn_blocking(move || walk_bucket(&walk_dir, &prefix))
            .await
            .map_err(|e| StorageError::Other(format!("spawn_blocking join failed: {e}")))??;
        if max_keys > 0 {
            keys.truncate(max_keys);
        }

        let mut objects = Vec::with_capacity(keys.len());
        for key in keys {
            match self.load_metadata(bucket, &key).await {
                Ok(metadata) => objects.push(ObjectInfo { key, metadata }),
                // Deleted between walk and stat; skip silently.
                Err(StorageError::KeyNotFound(_)) => {}
                Err(err) => return Err(err),
            }
        }
        debug!("Listed {} objects in {}", objects.len(), bucket);
        Ok(objects)
    }

    // === Multipart operations (implementations in multipart.rs) ===

    async fn create_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        content_type: Option<String>,
    ) -> Result<String, StorageError> {
        self.mp_create(bucket, key, content_type).await
    }

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        body: BodyStream,
        expected_sha256: Option<String>,
    ) -> Result<String, StorageError> {
        self.mp_upload_part(bucket, key, upload_id, part_number, body, expected_sha256)
            .await
    }

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_numbers: &[u32],
    ) -> Result<ObjectMetadata, StorageError> {
        self.mp_complete(bucket, key, upload_id, part_numbers).await
    }

    async fn abort_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<(), StorageError> {
        self.mp_abort(bucket, key, upload_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures::stream;

    fn body_of(data: &[u8]) -> BodyStream {
        let owned = Bytes::copy_from_slice(data);
        Box::pin(stream::once(async move { Ok(owned) }))
    }

    async fn collect(mut stream: BodyStream) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(chunk) = stream.next().await {
            out.extend_from_slice(&chunk.unwrap());
        }
        out
    }

    async fn store() -> (tempfile::TempDir, FsStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path().to_path_buf(), true, false)
            .await
            .unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_bucket_lifecycle() {
        let (_dir, store) = store().await;
        assert!(!store.bucket_exists("pics").await.unwrap());
        store.create_bucket("pics").await.unwrap();
        assert!(store.bucket_exists("pics").await.unwrap());
        // Idempotent
        store.create_bucket("pics").await.unwrap();

        let buckets = store.list_buckets().await.unwrap();
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].name, "pics");

        store.delete_bucket("pics").await.unwrap();
        assert!(!store.bucket_exists("pics").await.unwrap());
    }

    #[tokio::test]
    async fn test_put_get_head_roundtrip() {
        let (_dir, store) = store().await;
        store.create_bucket("b").await.unwrap();

        let meta = store
            .put_object(
                "b",
                "f.txt",
                body_of(b"Hello"),
                PutObjectInput {
                    content_type: Some("text/plain".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(meta.size, 5);
        assert_eq!(meta.etag, "\"8b1a9953c4611296a827abf8c47804d7\"");
        assert_eq!(meta.content_type, "text/plain");

        let head = store.head_object("b", "f.txt").await.unwrap();
        assert_eq!(head.etag, meta.etag);
        assert_eq!(head.size, 5);

        let (stream, get_meta) = store.get_object("b", "f.txt", None).await.unwrap();
        assert_eq!(get_meta.etag, meta.etag);
        assert_eq!(collect(stream).await, b"Hello");
    }

    #[tokio::test]
    async fn test_get_object_range() {
        let (_dir, store) = store().await;
        store.create_bucket("b").await.unwrap();
        store
            .put_object("b", "r.txt", body_of(b"0123456789"), Default::default())
            .await
            .unwrap();

        let (stream, _) = store
            .get_object(
                "b",
                "r.txt",
                Some(ByteRange {
                    offset: 2,
                    length: 5,
                }),
            )
            .await
            .unwrap();
        assert_eq!(collect(stream).await, b"23456");
    }

    #[tokio::test]
    async fn test_bad_digest_preserves_existing() {
        let (_dir, store) = store().await;
        store.create_bucket("b").await.unwrap();
        store
            .put_object("b", "keep.txt", body_of(b"original"), Default::default())
            .await
            .unwrap();

        let err = store
            .put_object(
                "b",
                "keep.txt",
                body_of(b"bad payload"),
                PutObjectInput {
                    // sha256 of the empty string, so it cannot match
                    expected_sha256: Some(
                        "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
                            .to_string(),
                    ),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::BadDigest));

        let (stream, _) = store.get_object("b", "keep.txt", None).await.unwrap();
        assert_eq!(collect(stream).await, b"original");

        // The failed write left no scratch debris behind the object path.
        let (stream, _) = store.get_object("b", "keep.txt", None).await.unwrap();
        assert_eq!(collect(stream).await.len(), 8);
    }

    #[tokio::test]
    async fn test_matching_digest_accepted() {
        let (_dir, store) = store().await;
        store.create_bucket("b").await.unwrap();
        // sha256("Hello")
        let sha = "185f8db32271fe25f561a6fc938b2e264306ec304eda518007d1764826381969";
        let meta = store
            .put_object(
                "b",
                "f.txt",
                body_of(b"Hello"),
                PutObjectInput {
                    expected_sha256: Some(sha.to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(meta.size, 5);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent_and_prunes_dirs() {
        let (dir, store) = store().await;
        store.create_bucket("b").await.unwrap();
        store
            .put_object("b", "a/b/c/deep.txt", body_of(b"x"), Default::default())
            .await
            .unwrap();
        assert!(dir.path().join("b/a/b/c/deep.txt").exists());

        store.delete_object("b", "a/b/c/deep.txt").await.unwrap();
        assert!(!dir.path().join("b/a").exists(), "empty parents pruned");
        assert!(dir.path().join("b").exists(), "bucket dir kept");

        // Deleting again is a no-op.
        store.delete_object("b", "a/b/c/deep.txt").await.unwrap();
    }

    #[tokio::test]
    async fn test_list_skips_hidden_and_sidecars() {
        let (dir, store) = store().await;
        store.create_bucket("b").await.unwrap();
        for key in ["beta.txt", "alpha.txt", "nested/gamma.txt"] {
            store
                .put_object("b", key, body_of(b"x"), Default::default())
                .await
                .unwrap();
        }
        // Plant staging dirs that must never surface in listings.
        std::fs::create_dir_all(dir.path().join("b/.geckos3-multipart/u1")).unwrap();
        std::fs::write(
            dir.path().join("b/.geckos3-multipart/u1/part-00001.tmp"),
            b"p",
        )
        .unwrap();
        std::fs::create_dir_all(dir.path().join("b/.geckos3-tmp")).unwrap();
        std::fs::write(dir.path().join("b/.geckos3-tmp/leftover"), b"t").unwrap();

        let objects = store.list_objects("b", "", 0).await.unwrap();
        let keys: Vec<&str> = objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, ["alpha.txt", "beta.txt", "nested/gamma.txt"]);
    }

    #[tokio::test]
    async fn test_list_prefix_and_max_keys() {
        let (_dir, store) = store().await;
        store.create_bucket("b").await.unwrap();
        for key in ["docs/a.md", "docs/b.md", "pics/c.jpg"] {
            store
                .put_object("b", key, body_of(b"x"), Default::default())
                .await
                .unwrap();
        }

        let docs = store.list_objects("b", "docs/", 0).await.unwrap();
        assert_eq!(docs.len(), 2);

        let capped = store.list_objects("b", "", 2).await.unwrap();
        assert_eq!(capped.len(), 2);
        assert_eq!(capped[0].key, "docs/a.md");
    }

    #[tokio::test]
    async fn test_delete_bucket_not_empty() {
        let (dir, store) = store().await;
        store.create_bucket("b").await.unwrap();
        store
            .put_object("b", "f", body_of(b"x"), Default::default())
            .await
            .unwrap();

        let err = store.delete_bucket("b").await.unwrap_err();
        assert!(matches!(err, StorageError::BucketNotEmpty(_)));

        store.delete_object("b", "f").await.unwrap();
        // Hidden staging dirs and OS artifacts do not block deletion.
        std::fs::create_dir_all(dir.path().join("b/.geckos3-tmp")).unwrap();
        std::fs::write(dir.path().join("b/.DS_Store"), b"junk").unwrap();
        store.delete_bucket("b").await.unwrap();
    }

    #[tokio::test]
    async fn test_copy_preserves_and_replaces_metadata() {
        let (_dir, store) = store().await;
        store.create_bucket("b").await.unwrap();
        store
            .put_object(
                "b",
                "src.txt",
                body_of(b"payload"),
                PutObjectInput {
                    content_type: Some("text/plain".to_string()),
                    custom_metadata: [("origin".to_string(), "unit".to_string())].into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let copied = store
            .copy_object("b", "src.txt", "b", "dst.txt", None)
            .await
            .unwrap();
        assert_eq!(copied.content_type, "text/plain");
        assert_eq!(copied.custom_metadata["origin"], "unit");

        let replaced = store
            .copy_object(
                "b",
                "src.txt",
                "b",
                "dst2.txt",
                Some(PutObjectInput::default()),
            )
            .await
            .unwrap();
        assert_eq!(replaced.content_type, DEFAULT_CONTENT_TYPE);
        assert!(replaced.custom_metadata.is_empty());
    }

    #[tokio::test]
    async fn test_missing_bucket_and_key_errors() {
        let (_dir, store) = store().await;
        assert!(matches!(
            store.head_object("nope", "k").await.unwrap_err(),
            StorageError::BucketNotFound(_)
        ));

        store.create_bucket("b").await.unwrap();
        assert!(matches!(
            store.head_object("b", "k").await.unwrap_err(),
            StorageError::KeyNotFound(_)
        ));
        match store.get_object("b", "k", None).await {
            Err(StorageError::KeyNotFound(_)) => {}
            Err(_) => panic!("expected KeyNotFound, got a different error"),
            Ok(_) => panic!("expected KeyNotFound, got Ok"),
        }
    }

    #[tokio::test]
    async fn test_pseudo_etag_when_sidecars_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path().to_path_buf(), false, false)
            .await
            .unwrap();
        store.create_bucket("b").await.unwrap();
        store
            .put_object("b", "f", body_of(b"abc"), Default::default())
            .await
            .unwrap();

        assert!(!dir.path().join("b/f.metadata.json").exists());

        let first = store.head_object("b", "f").await.unwrap();
        let second = store.head_object("b", "f").await.unwrap();
        assert_eq!(first.etag, second.etag, "pseudo-ETag is stable");
        assert_eq!(first.size, 3);
    }

    #[tokio::test]
    async fn test_traversal_rejected_without_filesystem_effect() {
        let (dir, store) = store().await;
        store.create_bucket("b").await.unwrap();
        let err = store
            .put_object("b", "../escape", body_of(b"x"), Default::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidKey(_)));
        assert!(!dir.path().join("escape").exists());
    }
}
