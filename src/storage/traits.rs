//! Storage engine trait and error definitions

use crate::types::{BucketEntry, ObjectInfo, ObjectMetadata, PutObjectInput};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use thiserror::Error;

/// Streaming object body. Produced by the HTTP layer for writes and by the
/// engine for reads; always raw payload bytes (chunked framing is stripped
/// before the engine sees the stream).
pub type BodyStream = BoxStream<'static, std::io::Result<Bytes>>;

/// A resolved byte range for a partial read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub offset: u64,
    pub length: u64,
}

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("bucket not found: {0}")]
    BucketNotFound(String),

    #[error("key not found: {0}")]
    KeyNotFound(String),

    #[error("multipart upload not found: {0}")]
    UploadNotFound(String),

    #[error("part {0} has not been uploaded")]
    PartNotFound(u32),

    #[error("invalid bucket name: {0}")]
    InvalidBucketName(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("bucket not empty: {0}")]
    BucketNotEmpty(String),

    #[error("request body does not match the provided SHA-256 digest")]
    BadDigest,

    #[error("bucket listing exceeds the scan cap")]
    TooManyObjects,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("metadata serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("storage error: {0}")]
    Other(String),
}

/// Abstract storage engine for S3-like object storage.
///
/// This trait is object-safe and can be used with `Arc<dyn ObjectStore>`.
/// Bucket and key arguments are wire-form (keys use forward slashes);
/// every implementation must reject names that resolve outside its root.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    // === Bucket operations ===

    /// True iff the bucket exists as a directory under the data dir.
    async fn bucket_exists(&self, bucket: &str) -> Result<bool, StorageError>;

    /// Create a bucket. Idempotent: creating an existing bucket succeeds.
    async fn create_bucket(&self, bucket: &str) -> Result<(), StorageError>;

    /// Delete a bucket. Fails with `BucketNotEmpty` unless the bucket holds
    /// nothing but hidden staging directories and well-known OS artifacts.
    async fn delete_bucket(&self, bucket: &str) -> Result<(), StorageError>;

    /// All buckets, sorted by name.
    async fn list_buckets(&self) -> Result<Vec<BucketEntry>, StorageError>;

    // === Object operations ===

    /// Stream `body` into the object at `bucket`/`key`. The write is
    /// atomic: a temp file is renamed into place, so concurrent readers
    /// observe either the previous object or the new one, never a mixture.
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: BodyStream,
        input: PutObjectInput,
    ) -> Result<ObjectMetadata, StorageError>;

    /// Open the object for streaming read, optionally restricted to a
    /// byte range resolved by the caller.
    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        range: Option<ByteRange>,
    ) -> Result<(BodyStream, ObjectMetadata), StorageError>;

    /// Object metadata without opening the body.
    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectMetadata, StorageError>;

    /// Remove the object and its sidecar. Deleting a missing key succeeds.
    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StorageError>;

    /// Server-side copy. With `replace` set the provided input fully
    /// determines destination metadata; otherwise source metadata is
    /// propagated unchanged.
    async fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
        replace: Option<PutObjectInput>,
    ) -> Result<ObjectMetadata, StorageError>;

    /// Keys under `prefix`, sorted lexicographically. `max_keys == 0`
    /// means unlimited. Hidden staging directories and metadata sidecars
    /// never appear.
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        max_keys: usize,
    ) -> Result<Vec<ObjectInfo>, StorageError>;

    // === Multipart operations ===

    /// Start a multipart upload; returns the upload ID.
    async fn create_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        content_type: Option<String>,
    ) -> Result<String, StorageError>;

    /// Stage one part. Parts may arrive in any order and may be
    /// re-uploaded; the last write for a part number wins. Returns the
    /// part's quoted MD5 ETag.
    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        body: BodyStream,
        expected_sha256: Option<String>,
    ) -> Result<String, StorageError>;

    /// Assemble the named parts, in the order given, into the target
    /// object. Atomic: either the full object appears or nothing changes.
    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_numbers: &[u32],
    ) -> Result<ObjectMetadata, StorageError>;

    /// Drop the staging directory for an upload.
    async fn abort_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<(), StorageError>;
}
