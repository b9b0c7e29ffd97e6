//! Object-level S3 handlers: GET (with Range), HEAD, PUT (with copy and
//! part-upload detection), DELETE, and batch delete.

use super::{
    body_to_utf8, build_object_headers, extract_put_input, xml_response, AppState, ObjectQuery,
    S3Error,
};
use crate::api::aws_chunked;
use crate::api::extractors::{ValidatedBucket, ValidatedPath};
use crate::api::xml::{CopyObjectResult, DeleteError, DeleteRequest, DeleteResult};
use crate::storage::{BodyStream, ByteRange};
use axum::body::{Body, Bytes};
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::TryStreamExt;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Batch delete request bodies above this size are rejected outright.
const MAX_DELETE_BODY: usize = 1024 * 1024;

/// Query parameters for bucket-level POST operations
#[derive(Debug, serde::Deserialize, Default)]
pub struct BucketPostQuery {
    pub delete: Option<String>,
}

/// Convert the raw HTTP body into the engine's byte stream, stripping AWS
/// chunked framing when the request announces it. Only decoded payload
/// bytes ever reach the engine.
fn request_body_stream(headers: &HeaderMap, body: Body) -> BodyStream {
    let raw: BodyStream = Box::pin(
        body.into_data_stream()
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err)),
    );
    if aws_chunked::is_aws_chunked(headers) {
        debug!(
            "Decoding AWS chunked payload (decoded length hint: {:?})",
            aws_chunked::decoded_content_length(headers)
        );
        aws_chunked::decode_stream(raw)
    } else {
        raw
    }
}

/// What a Range header resolves to against a known object size.
#[derive(Debug, PartialEq, Eq)]
enum RangeOutcome {
    Full,
    Partial(ByteRange),
    Unsatisfiable,
}

/// Resolve a single `bytes=` range. Multi-range and syntactically foreign
/// headers fall back to serving the whole object, matching the lenient
/// reading RFC 7233 permits; a parseable range outside the object is 416.
fn resolve_range(header: Option<&str>, size: u64) -> RangeOutcome {
    let Some(spec) = header else {
        return RangeOutcome::Full;
    };
    let Some(spec) = spec.strip_prefix("bytes=") else {
        return RangeOutcome::Full;
    };
    if spec.contains(',') {
        return RangeOutcome::Full;
    }
    let Some((start_str, end_str)) = spec.split_once('-') else {
        return RangeOutcome::Full;
    };

    if start_str.is_empty() {
        // Suffix form: last N bytes.
        let Ok(suffix_len) = end_str.parse::<u64>() else {
            return RangeOutcome::Full;
        };
        if suffix_len == 0 || size == 0 {
            return RangeOutcome::Unsatisfiable;
        }
        let length = suffix_len.min(size);
        return RangeOutcome::Partial(ByteRange {
            offset: size - length,
            length,
        });
    }

    let Ok(start) = start_str.parse::<u64>() else {
        return RangeOutcome::Full;
    };
    if start >= size {
        return RangeOutcome::Unsatisfiable;
    }
    let end = if end_str.is_empty() {
        size - 1
    } else {
        match end_str.parse::<u64>() {
            Ok(end) => end.min(size - 1),
            Err(_) => return RangeOutcome::Full,
        }
    };
    if end < start {
        return RangeOutcome::Unsatisfiable;
    }
    RangeOutcome::Partial(ByteRange {
        offset: start,
        length: end - start + 1,
    })
}

/// PUT object handler (internal), called after validation and body setup.
async fn put_object_inner(
    state: &Arc<AppState>,
    bucket: &str,
    key: &str,
    headers: &HeaderMap,
    body: BodyStream,
) -> Result<Response, S3Error> {
    info!("PUT {}/{}", bucket, key);

    let input = extract_put_input(headers);
    let metadata = state.store.put_object(bucket, key, body, input).await?;

    Ok((StatusCode::OK, [("ETag", metadata.etag)], "").into_response())
}

/// COPY object handler (internal), dispatched on `x-amz-copy-source`.
async fn copy_object_inner(
    state: &Arc<AppState>,
    bucket: &str,
    key: &str,
    headers: &HeaderMap,
) -> Result<Response, S3Error> {
    let copy_source = headers
        .get("x-amz-copy-source")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| S3Error::InvalidArgument("Missing x-amz-copy-source header".to_string()))?;

    // Source arrives URL-encoded as [/]bucket/key
    let copy_source = urlencoding::decode(copy_source)
        .map_err(|_| S3Error::InvalidArgument("Invalid copy source encoding".to_string()))?;
    let copy_source = copy_source.trim_start_matches('/');

    let (source_bucket, source_key) = copy_source
        .split_once('/')
        .filter(|(b, k)| !b.is_empty() && !k.is_empty())
        .ok_or_else(|| S3Error::InvalidArgument("Copy source must be bucket/key".to_string()))?;

    info!("COPY {}/{} -> {}/{}", source_bucket, source_key, bucket, key);

    // REPLACE directive: request headers fully determine destination
    // metadata. Default (COPY): source metadata is carried over.
    let directive = headers
        .get("x-amz-metadata-directive")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("COPY");
    let replace = if directive.eq_ignore_ascii_case("REPLACE") {
        Some(extract_put_input(headers))
    } else {
        None
    };

    let metadata = state
        .store
        .copy_object(source_bucket, source_key, bucket, key, replace)
        .await?;

    let xml = CopyObjectResult {
        etag: metadata.etag,
        last_modified: metadata.last_modified,
    }
    .to_xml();

    Ok(xml_response(xml))
}

/// PUT object handler with copy detection and multipart upload support
/// PUT /{bucket}/{key}
/// Detects x-amz-copy-source header to dispatch to copy operation
/// Detects ?partNumber&uploadId for multipart upload part
#[instrument(skip(state, headers, body))]
pub async fn put_object_or_copy(
    State(state): State<Arc<AppState>>,
    ValidatedPath { bucket, key }: ValidatedPath,
    Query(query): Query<ObjectQuery>,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, S3Error> {
    // UploadPart
    if let (Some(part_number), Some(upload_id)) = (query.part_number, &query.upload_id) {
        info!(
            "UploadPart {}/{} part={} uploadId={}",
            bucket, key, part_number, upload_id
        );
        let input = extract_put_input(&headers);
        let body = request_body_stream(&headers, body);
        let etag = state
            .store
            .upload_part(
                &bucket,
                &key,
                upload_id,
                part_number,
                body,
                input.expected_sha256,
            )
            .await?;
        return Ok((StatusCode::OK, [("ETag", etag)], "").into_response());
    }

    if headers.contains_key("x-amz-copy-source") {
        copy_object_inner(&state, &bucket, &key, &headers).await
    } else {
        let body = request_body_stream(&headers, body);
        put_object_inner(&state, &bucket, &key, &headers, body).await
    }
}

/// GET object handler
/// GET /{bucket}/{key} - honors HTTP Range
#[instrument(skip(state, headers))]
pub async fn get_object(
    State(state): State<Arc<AppState>>,
    ValidatedPath { bucket, key }: ValidatedPath,
    Query(query): Query<ObjectQuery>,
    headers: HeaderMap,
) -> Result<Response, S3Error> {
    if query.upload_id.is_some() {
        // ListParts is not supported.
        return Err(S3Error::NotImplemented);
    }

    info!("GET {}/{}", bucket, key);

    let metadata = state.store.head_object(&bucket, &key).await?;
    let range_header = headers.get("range").and_then(|v| v.to_str().ok());

    match resolve_range(range_header, metadata.size) {
        RangeOutcome::Full => {
            let (stream, metadata) = state.store.get_object(&bucket, &key, None).await?;
            let response_headers = build_object_headers(&metadata);
            Ok((StatusCode::OK, response_headers, Body::from_stream(stream)).into_response())
        }
        RangeOutcome::Partial(range) => {
            let (stream, metadata) = state.store.get_object(&bucket, &key, Some(range)).await?;
            let mut response_headers = build_object_headers(&metadata);
            let mut itoa_buf = itoa::Buffer::new();
            response_headers.insert(
                "Content-Length",
                super::hval(itoa_buf.format(range.length)),
            );
            response_headers.insert(
                "Content-Range",
                super::hval(&format!(
                    "bytes {}-{}/{}",
                    range.offset,
                    range.offset + range.length - 1,
                    metadata.size
                )),
            );
            Ok((
                StatusCode::PARTIAL_CONTENT,
                response_headers,
                Body::from_stream(stream),
            )
                .into_response())
        }
        RangeOutcome::Unsatisfiable => {
            let mut response_headers = HeaderMap::new();
            response_headers.insert(
                "Content-Range",
                super::hval(&format!("bytes */{}", metadata.size)),
            );
            Ok((StatusCode::RANGE_NOT_SATISFIABLE, response_headers).into_response())
        }
    }
}

/// HEAD object handler
/// HEAD /{bucket}/{key}
#[instrument(skip(state))]
pub async fn head_object(
    State(state): State<Arc<AppState>>,
    ValidatedPath { bucket, key }: ValidatedPath,
) -> Result<Response, S3Error> {
    let metadata = state.store.head_object(&bucket, &key).await?;
    let headers = build_object_headers(&metadata);
    Ok((StatusCode::OK, headers).into_response())
}

/// DELETE object handler
/// DELETE /{bucket}/{key}
/// DELETE /{bucket}/{key}?uploadId=X - AbortMultipartUpload
#[instrument(skip(state))]
pub async fn delete_object(
    State(state): State<Arc<AppState>>,
    ValidatedPath { bucket, key }: ValidatedPath,
    Query(query): Query<ObjectQuery>,
) -> Result<Response, S3Error> {
    if let Some(upload_id) = &query.upload_id {
        info!(
            "AbortMultipartUpload {}/{} uploadId={}",
            bucket, key, upload_id
        );
        state
            .store
            .abort_multipart_upload(&bucket, &key, upload_id)
            .await?;
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    info!("DELETE {}/{}", bucket, key);
    state.store.delete_object(&bucket, &key).await?;

    // S3 returns 204 No Content on successful delete
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// DELETE multiple objects handler
/// POST /{bucket}?delete
#[instrument(skip(state, body))]
pub async fn delete_objects(
    State(state): State<Arc<AppState>>,
    ValidatedBucket(bucket): ValidatedBucket,
    Query(query): Query<BucketPostQuery>,
    body: Bytes,
) -> Result<Response, S3Error> {
    if query.delete.is_none() {
        return Err(S3Error::NotImplemented);
    }
    if body.len() > MAX_DELETE_BODY {
        return Err(S3Error::MalformedXML);
    }

    let body_str = body_to_utf8(&body)?;
    let delete_req = DeleteRequest::from_xml(body_str).map_err(|err| {
        warn!("Failed to parse DeleteObjects XML: {}", err);
        S3Error::MalformedXML
    })?;

    info!(
        "DELETE multiple objects in {} ({} objects)",
        bucket,
        delete_req.objects.len()
    );

    let quiet = delete_req.quiet.unwrap_or(false);
    let mut result = DeleteResult::default();

    for object in delete_req.objects {
        let key = object.key.trim_start_matches('/');
        match state.store.delete_object(&bucket, key).await {
            // Missing keys count as deleted (S3 convention); the engine
            // already treats them as a successful no-op.
            Ok(()) => result.deleted.push(object.key.clone()),
            Err(err) => {
                let s3_err = S3Error::from(err);
                result.errors.push(DeleteError {
                    key: object.key.clone(),
                    code: s3_err.code().to_string(),
                    message: s3_err.to_string(),
                });
            }
        }
    }

    Ok(xml_response(result.to_xml(quiet)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_range_forms() {
        assert_eq!(resolve_range(None, 10), RangeOutcome::Full);
        assert_eq!(
            resolve_range(Some("bytes=2-6"), 10),
            RangeOutcome::Partial(ByteRange {
                offset: 2,
                length: 5
            })
        );
        assert_eq!(
            resolve_range(Some("bytes=2-"), 10),
            RangeOutcome::Partial(ByteRange {
                offset: 2,
                length: 8
            })
        );
        assert_eq!(
            resolve_range(Some("bytes=-3"), 10),
            RangeOutcome::Partial(ByteRange {
                offset: 7,
                length: 3
            })
        );
        // End clamped to the object size.
        assert_eq!(
            resolve_range(Some("bytes=8-99"), 10),
            RangeOutcome::Partial(ByteRange {
                offset: 8,
                length: 2
            })
        );
    }

    #[test]
    fn test_resolve_range_unsatisfiable() {
        assert_eq!(
            resolve_range(Some("bytes=10-12"), 10),
            RangeOutcome::Unsatisfiable
        );
        assert_eq!(
            resolve_range(Some("bytes=0-"), 0),
            RangeOutcome::Unsatisfiable
        );
        assert_eq!(
            resolve_range(Some("bytes=-0"), 10),
            RangeOutcome::Unsatisfiable
        );
        assert_eq!(
            resolve_range(Some("bytes=5-2"), 10),
            RangeOutcome::Unsatisfiable
        );
    }

    #[test]
    fn test_resolve_range_lenient_fallbacks() {
        assert_eq!(resolve_range(Some("items=1-2"), 10), RangeOutcome::Full);
        assert_eq!(
            resolve_range(Some("bytes=1-2,4-5"), 10),
            RangeOutcome::Full
        );
        assert_eq!(resolve_range(Some("bytes=abc-def"), 10), RangeOutcome::Full);
    }
}
