//! Core types: object metadata (the sidecar schema) and wire-level
//! bucket/key validation shared by the HTTP layer and the storage engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Content type applied whenever a request does not carry one.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Per-object metadata, persisted as a JSON sidecar next to the object file.
///
/// Field names are the sidecar's on-disk schema; do not rename without a
/// migration story for existing data directories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMetadata {
    /// Object size in bytes
    pub size: u64,
    /// Commit time, UTC
    pub last_modified: DateTime<Utc>,
    /// Quoted ETag: `"<md5-hex>"` for single PUT, `"<md5-hex>-<N>"` for multipart
    pub etag: String,
    pub content_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_encoding: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_disposition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_control: Option<String>,
    /// Lowercased `x-amz-meta-*` suffix -> value
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub custom_metadata: HashMap<String, String>,
}

/// Caller-supplied attributes for PutObject and UploadPart.
#[derive(Debug, Clone, Default)]
pub struct PutObjectInput {
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    pub content_disposition: Option<String>,
    pub cache_control: Option<String>,
    pub custom_metadata: HashMap<String, String>,
    /// 64-hex SHA-256 the body must hash to; mismatch fails the write
    /// without touching the target path.
    pub expected_sha256: Option<String>,
    /// Hex MD5 from a Content-MD5 header; same mismatch semantics.
    pub expected_md5: Option<String>,
}

/// One entry in a ListObjects result.
#[derive(Debug, Clone)]
pub struct ObjectInfo {
    /// Bucket-relative key in wire form (forward slashes)
    pub key: String,
    pub metadata: ObjectMetadata,
}

/// One entry in a ListBuckets result.
#[derive(Debug, Clone)]
pub struct BucketEntry {
    pub name: String,
    /// Directory mtime stands in for the creation date.
    pub created: DateTime<Utc>,
}

/// Errors from validating user-provided bucket names and object keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameValidationError(String);

impl NameValidationError {
    fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

impl fmt::Display for NameValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for NameValidationError {}

/// S3 bucket naming rules, enforced at the HTTP layer on CreateBucket:
/// 3-63 chars, lowercase alphanumeric plus `-` and `.`, no leading or
/// trailing `-`/`.`, no `..`.
pub fn validate_bucket_name(name: &str) -> Result<(), NameValidationError> {
    if name.len() < 3 || name.len() > 63 {
        return Err(NameValidationError::new(
            "bucket name must be between 3 and 63 characters",
        ));
    }
    if !name
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'.')
    {
        return Err(NameValidationError::new(
            "bucket name may contain only lowercase letters, digits, '-' and '.'",
        ));
    }
    let first = name.as_bytes()[0];
    let last = name.as_bytes()[name.len() - 1];
    if first == b'-' || first == b'.' || last == b'-' || last == b'.' {
        return Err(NameValidationError::new(
            "bucket name must not start or end with '-' or '.'",
        ));
    }
    if name.contains("..") {
        return Err(NameValidationError::new(
            "bucket name must not contain '..'",
        ));
    }
    Ok(())
}

/// Wire-level key validation applied before any filesystem resolution:
/// keys are non-empty and contain no NUL byte. Traversal safety is
/// enforced separately when the key is resolved to a path.
pub fn validate_key(key: &str) -> Result<(), NameValidationError> {
    if key.is_empty() {
        return Err(NameValidationError::new("object key must not be empty"));
    }
    if key.contains('\0') {
        return Err(NameValidationError::new(
            "object key must not contain NUL bytes",
        ));
    }
    Ok(())
}
