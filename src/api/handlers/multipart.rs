//! Multipart upload S3 handlers: CreateMultipartUpload, CompleteMultipartUpload.

use super::{body_to_utf8, xml_response, AppState, ObjectQuery, S3Error};
use crate::api::extractors::ValidatedPath;
use crate::api::xml::{
    CompleteMultipartUploadRequest, CompleteMultipartUploadResult, InitiateMultipartUploadResult,
};
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// POST object handler; dispatches multipart upload operations by query param.
#[instrument(skip(state, headers, body))]
pub async fn post_object(
    State(state): State<Arc<AppState>>,
    ValidatedPath { bucket, key }: ValidatedPath,
    Query(query): Query<ObjectQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, S3Error> {
    if query.uploads.is_some() {
        initiate_multipart_upload(&state, &bucket, &key, &headers).await
    } else if let Some(upload_id) = &query.upload_id {
        complete_multipart_upload(&state, &bucket, &key, upload_id, body).await
    } else {
        Err(S3Error::NotImplemented)
    }
}

/// POST /{bucket}/{key}?uploads - CreateMultipartUpload
async fn initiate_multipart_upload(
    state: &AppState,
    bucket: &str,
    key: &str,
    headers: &HeaderMap,
) -> Result<Response, S3Error> {
    info!("CreateMultipartUpload {}/{}", bucket, key);

    let content_type = headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let upload_id = state
        .store
        .create_multipart_upload(bucket, key, content_type)
        .await?;

    let xml = InitiateMultipartUploadResult {
        bucket: bucket.to_string(),
        key: key.to_string(),
        upload_id,
    }
    .to_xml();
    Ok(xml_response(xml))
}

/// POST /{bucket}/{key}?uploadId=X - CompleteMultipartUpload
async fn complete_multipart_upload(
    state: &AppState,
    bucket: &str,
    key: &str,
    upload_id: &str,
    body: Bytes,
) -> Result<Response, S3Error> {
    info!(
        "CompleteMultipartUpload {}/{} uploadId={}",
        bucket, key, upload_id
    );

    let body_str = body_to_utf8(&body)?;
    let complete_req = CompleteMultipartUploadRequest::from_xml(body_str).map_err(|err| {
        warn!("Failed to parse CompleteMultipartUpload XML: {}", err);
        S3Error::MalformedXML
    })?;
    if complete_req.parts.is_empty() {
        return Err(S3Error::MalformedXML);
    }

    // The request's part order is the assembly order.
    let part_numbers: Vec<u32> = complete_req.parts.iter().map(|p| p.part_number).collect();

    let metadata = state
        .store
        .complete_multipart_upload(bucket, key, upload_id, &part_numbers)
        .await?;

    let xml = CompleteMultipartUploadResult {
        location: format!("/{}/{}", bucket, key),
        bucket: bucket.to_string(),
        key: key.to_string(),
        etag: metadata.etag,
    }
    .to_xml();
    Ok(xml_response(xml))
}
