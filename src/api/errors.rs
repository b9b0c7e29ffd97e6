//! S3 error types and XML responses

use crate::storage::StorageError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// S3 API errors
#[derive(Debug, Clone, Error)]
pub enum S3Error {
    #[error("Access Denied")]
    AccessDenied,

    #[error("The specified key does not exist.")]
    NoSuchKey(String),

    #[error("The specified bucket does not exist.")]
    NoSuchBucket(String),

    #[error("The specified multipart upload does not exist.")]
    NoSuchUpload(String),

    #[error("The specified bucket is not valid.")]
    InvalidBucketName(String),

    #[error("{0}")]
    InvalidArgument(String),

    #[error("The Content-SHA256 you specified did not match what we received.")]
    BadDigest,

    #[error("The XML you provided was not well-formed or did not validate against our published schema.")]
    MalformedXML,

    #[error("The bucket you tried to delete is not empty.")]
    BucketNotEmpty(String),

    #[error("The specified method is not allowed against this resource.")]
    MethodNotAllowed,

    #[error("A header or query you provided implies functionality that is not implemented.")]
    NotImplemented,

    #[error("We encountered an internal error. Please try again.")]
    InternalError(String),
}

impl S3Error {
    /// Get the S3 error code
    pub fn code(&self) -> &'static str {
        match self {
            S3Error::AccessDenied => "AccessDenied",
            S3Error::NoSuchKey(_) => "NoSuchKey",
            S3Error::NoSuchBucket(_) => "NoSuchBucket",
            S3Error::NoSuchUpload(_) => "NoSuchUpload",
            S3Error::InvalidBucketName(_) => "InvalidBucketName",
            S3Error::InvalidArgument(_) => "InvalidArgument",
            S3Error::BadDigest => "BadDigest",
            S3Error::MalformedXML => "MalformedXML",
            S3Error::BucketNotEmpty(_) => "BucketNotEmpty",
            S3Error::MethodNotAllowed => "MethodNotAllowed",
            S3Error::NotImplemented => "NotImplemented",
            S3Error::InternalError(_) => "InternalError",
        }
    }

    /// Get the HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            S3Error::AccessDenied => StatusCode::FORBIDDEN,
            S3Error::NoSuchKey(_) => StatusCode::NOT_FOUND,
            S3Error::NoSuchBucket(_) => StatusCode::NOT_FOUND,
            S3Error::NoSuchUpload(_) => StatusCode::NOT_FOUND,
            S3Error::InvalidBucketName(_) => StatusCode::BAD_REQUEST,
            S3Error::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            S3Error::BadDigest => StatusCode::BAD_REQUEST,
            S3Error::MalformedXML => StatusCode::BAD_REQUEST,
            S3Error::BucketNotEmpty(_) => StatusCode::CONFLICT,
            S3Error::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            S3Error::NotImplemented => StatusCode::NOT_IMPLEMENTED,
            S3Error::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Generate XML error response
    pub fn to_xml(&self) -> String {
        let resource = match self {
            S3Error::NoSuchKey(key) => key.as_str(),
            S3Error::NoSuchBucket(bucket) => bucket.as_str(),
            S3Error::NoSuchUpload(upload_id) => upload_id.as_str(),
            S3Error::BucketNotEmpty(bucket) => bucket.as_str(),
            S3Error::InvalidBucketName(bucket) => bucket.as_str(),
            _ => "",
        };

        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<Error>
    <Code>{}</Code>
    <Message>{}</Message>
    <Resource>{}</Resource>
</Error>"#,
            self.code(),
            super::xml::escape_xml(&self.to_string()),
            super::xml::escape_xml(resource),
        )
    }
}

impl IntoResponse for S3Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if matches!(self, S3Error::InternalError(_)) {
            tracing::error!("{}: {:?}", self.code(), self);
        } else {
            tracing::debug!("{}: {}", self.code(), self);
        }
        let body = self.to_xml();

        (status, [("Content-Type", "application/xml")], body).into_response()
    }
}

impl From<StorageError> for S3Error {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::BucketNotFound(bucket) => S3Error::NoSuchBucket(bucket),
            StorageError::KeyNotFound(key) => S3Error::NoSuchKey(key),
            StorageError::UploadNotFound(upload_id) => S3Error::NoSuchUpload(upload_id),
            StorageError::PartNotFound(n) => {
                S3Error::InvalidArgument(format!("part {n} has not been uploaded"))
            }
            StorageError::InvalidBucketName(msg) => S3Error::InvalidBucketName(msg),
            StorageError::InvalidKey(msg) => S3Error::InvalidArgument(msg),
            StorageError::InvalidArgument(msg) => S3Error::InvalidArgument(msg),
            StorageError::BucketNotEmpty(bucket) => S3Error::BucketNotEmpty(bucket),
            StorageError::BadDigest => S3Error::BadDigest,
            other => S3Error::InternalError(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(S3Error::AccessDenied.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            S3Error::NoSuchKey("k".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(S3Error::BadDigest.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            S3Error::BucketNotEmpty("b".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            S3Error::NotImplemented.status_code(),
            StatusCode::NOT_IMPLEMENTED
        );
    }

    #[test]
    fn test_storage_error_mapping_preserves_typed_errors() {
        assert!(matches!(
            S3Error::from(StorageError::BadDigest),
            S3Error::BadDigest
        ));
        assert!(matches!(
            S3Error::from(StorageError::PartNotFound(3)),
            S3Error::InvalidArgument(_)
        ));
        assert!(matches!(
            S3Error::from(StorageError::TooManyObjects),
            S3Error::InternalError(_)
        ));
    }

    #[test]
    fn test_error_xml_shape() {
        let xml = S3Error::NoSuchKey("a/b.txt".into()).to_xml();
        assert!(xml.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
        assert!(xml.contains("<Code>NoSuchKey</Code>"));
        assert!(xml.contains("<Resource>a/b.txt</Resource>"));
    }
}
