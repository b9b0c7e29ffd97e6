//! S3 API request handlers
//!
//! Split into submodules by domain:
//! - `object`: GET, HEAD, PUT, DELETE for individual objects, batch delete
//! - `bucket`: Bucket CRUD and listing (pagination, delimiter grouping)
//! - `multipart`: Multipart upload lifecycle
//! - `status`: Health check and root probe

mod bucket;
mod multipart;
mod object;
mod status;

use super::errors::S3Error;
use crate::storage::ObjectStore;
use crate::types::{ObjectMetadata, PutObjectInput};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use std::sync::Arc;

// Re-export all public handlers so the router wiring stays in one place.
pub use bucket::{
    bucket_get_handler, create_bucket, delete_bucket, head_bucket, list_buckets, BucketGetQuery,
};
pub use multipart::post_object;
pub use object::{delete_object, delete_objects, get_object, head_object, put_object_or_copy};
pub use status::{head_root, health_check, method_not_allowed, service_not_implemented};

/// Application state shared across handlers
pub struct AppState {
    pub store: Arc<dyn ObjectStore>,
}

/// Query parameters for object-level operations (multipart upload)
#[derive(Debug, serde::Deserialize, Default)]
pub struct ObjectQuery {
    /// CreateMultipartUpload (POST with ?uploads)
    pub uploads: Option<String>,
    /// UploadPart / CompleteMultipartUpload / Abort (with ?uploadId)
    #[serde(rename = "uploadId")]
    pub upload_id: Option<String>,
    /// UploadPart (PUT with ?partNumber)
    #[serde(rename = "partNumber")]
    pub part_number: Option<u32>,
}

// ---------------------------------------------------------------------------
// Shared utility functions used across handler submodules
// ---------------------------------------------------------------------------

/// Build response headers echoing an object's stored attributes.
fn build_object_headers(metadata: &ObjectMetadata) -> HeaderMap {
    // itoa formats integers to a stack buffer; this runs on every object
    // response.
    let mut itoa_buf = itoa::Buffer::new();

    let mut headers = HeaderMap::new();
    headers.insert("ETag", hval(&metadata.etag));
    headers.insert("Content-Length", hval(itoa_buf.format(metadata.size)));
    headers.insert("Content-Type", hval(&metadata.content_type));
    headers.insert(
        "Last-Modified",
        hval(
            &metadata
                .last_modified
                .format("%a, %d %b %Y %H:%M:%S GMT")
                .to_string(),
        ),
    );
    headers.insert("Accept-Ranges", HeaderValue::from_static("bytes"));

    if let Some(encoding) = &metadata.content_encoding {
        headers.insert("Content-Encoding", hval(encoding));
    }
    if let Some(disposition) = &metadata.content_disposition {
        headers.insert("Content-Disposition", hval(disposition));
    }
    if let Some(cache_control) = &metadata.cache_control {
        headers.insert("Cache-Control", hval(cache_control));
    }

    // User-provided custom metadata (x-amz-meta-*)
    for (key, value) in &metadata.custom_metadata {
        let header_name = format!("x-amz-meta-{}", key);
        if let Ok(name) = axum::http::header::HeaderName::from_bytes(header_name.as_bytes()) {
            headers.insert(name, hval(value));
        }
    }

    headers
}

fn hval(s: &str) -> HeaderValue {
    HeaderValue::from_bytes(s.as_bytes()).unwrap_or_else(|_| HeaderValue::from_static(""))
}

/// Build an XML response with correct Content-Type header.
fn xml_response(xml: impl Into<String>) -> Response {
    (
        StatusCode::OK,
        [("Content-Type", "application/xml")],
        xml.into(),
    )
        .into_response()
}

/// Parse request body as UTF-8, mapping errors to MalformedXML.
/// Borrows into the existing `Bytes` buffer; zero-copy.
fn body_to_utf8(body: &axum::body::Bytes) -> Result<&str, S3Error> {
    std::str::from_utf8(body).map_err(|_| S3Error::MalformedXML)
}

/// Decode base64 string to bytes (for Content-MD5 validation)
fn base64_decode(input: &str) -> Option<Vec<u8>> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD
        .decode(input.trim())
        .ok()
}

/// True for a 64-char hex string, the only `x-amz-content-sha256` form
/// that names an actual digest (as opposed to UNSIGNED-PAYLOAD or the
/// STREAMING-* sentinels).
fn is_hex_sha256(value: &str) -> bool {
    value.len() == 64 && value.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Collect everything PutObject-shaped from request headers: standard
/// content headers, `x-amz-meta-*` pairs, and the body digests to verify.
fn extract_put_input(headers: &HeaderMap) -> PutObjectInput {
    let header_str =
        |name: &str| -> Option<String> { headers.get(name)?.to_str().ok().map(str::to_string) };

    let custom_metadata = headers
        .iter()
        .filter_map(|(name, value)| {
            let suffix = name.as_str().strip_prefix("x-amz-meta-")?;
            let value = value.to_str().ok()?;
            Some((suffix.to_string(), value.to_string()))
        })
        .collect();

    let expected_sha256 = header_str("x-amz-content-sha256").filter(|v| is_hex_sha256(v));
    let expected_md5 = headers
        .get("content-md5")
        .and_then(|v| v.to_str().ok())
        .and_then(base64_decode)
        .filter(|raw| raw.len() == 16)
        .map(hex::encode);

    PutObjectInput {
        content_type: header_str("content-type"),
        content_encoding: header_str("content-encoding"),
        content_disposition: header_str("content-disposition"),
        cache_control: header_str("cache-control"),
        custom_metadata,
        expected_sha256,
        expected_md5,
    }
}
