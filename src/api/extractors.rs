//! Custom Axum extractors for S3 API validation
//!
//! These extractors pull the bucket (and key) out of the matched path and
//! apply the wire-level checks every handler needs, so handlers only ever
//! see plausible names. Filesystem-level traversal safety is enforced
//! again when the engine resolves names to paths.

use super::errors::S3Error;
use axum::{
    async_trait,
    extract::{FromRequestParts, Path},
    http::request::Parts,
};

/// Bucket name from a `/:bucket` route, checked for wire plausibility.
#[derive(Debug, Clone)]
pub struct ValidatedBucket(pub String);

impl std::ops::Deref for ValidatedBucket {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for ValidatedBucket
where
    S: Send + Sync,
{
    type Rejection = S3Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(bucket): Path<String> = Path::from_request_parts(parts, state)
            .await
            .map_err(|_| S3Error::InvalidArgument("Invalid bucket path".to_string()))?;

        if bucket.is_empty() || bucket.contains('\0') {
            return Err(S3Error::InvalidBucketName(bucket));
        }

        Ok(ValidatedBucket(bucket))
    }
}

/// Bucket and key from a `/:bucket/*key` route. The key is normalized to
/// wire form (no leading slashes) and checked for emptiness and NUL bytes.
#[derive(Debug, Clone)]
pub struct ValidatedPath {
    pub bucket: String,
    pub key: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for ValidatedPath
where
    S: Send + Sync,
{
    type Rejection = S3Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path((bucket, key)): Path<(String, String)> = Path::from_request_parts(parts, state)
            .await
            .map_err(|_| S3Error::InvalidArgument("Invalid bucket/key path".to_string()))?;

        if bucket.is_empty() || bucket.contains('\0') {
            return Err(S3Error::InvalidBucketName(bucket));
        }

        let key = key.trim_start_matches('/').to_string();
        crate::types::validate_key(&key)
            .map_err(|err| S3Error::InvalidArgument(err.to_string()))?;

        Ok(ValidatedPath { bucket, key })
    }
}
