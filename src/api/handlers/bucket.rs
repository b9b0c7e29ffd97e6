//! Bucket-level S3 handlers: CREATE, DELETE, HEAD, LIST, and the listing
//! sub-operations (GetBucketLocation, GetBucketVersioning).
//!
//! Listing pagination and delimiter grouping live here: the engine hands
//! back a sorted, prefix-filtered key set and this module walks it once,
//! spending a shared max-keys budget on Contents and CommonPrefixes alike.

use super::{xml_response, AppState, S3Error};
use crate::api::extractors::ValidatedBucket;
use crate::api::xml::{BucketInfo, ListBucketResult, ListBucketsResult, S3Object};
use crate::types::ObjectInfo;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use base64::Engine;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, instrument};

/// Hard ceiling for `max-keys`, matching S3.
const MAX_KEYS_CAP: u32 = 1000;

/// Query parameters for bucket-level GET operations
#[derive(Debug, serde::Deserialize, Default)]
pub struct BucketGetQuery {
    pub prefix: Option<String>,
    pub delimiter: Option<String>,
    #[serde(rename = "list-type")]
    pub list_type: Option<u8>,
    #[serde(rename = "max-keys")]
    pub max_keys: Option<u32>,
    /// v2 pagination
    #[serde(rename = "continuation-token")]
    pub continuation_token: Option<String>,
    #[serde(rename = "start-after")]
    pub start_after: Option<String>,
    /// v1 pagination
    pub marker: Option<String>,
    /// Encoding type for keys/prefixes in the response (e.g. "url")
    #[serde(rename = "encoding-type")]
    pub encoding_type: Option<String>,
    /// GetBucketLocation query parameter
    pub location: Option<String>,
    /// GetBucketVersioning query parameter
    pub versioning: Option<String>,
    /// ListMultipartUploads query parameter (not supported)
    pub uploads: Option<String>,
}

/// One page of a delimiter-grouped, paginated listing.
struct ListPage {
    contents: Vec<ObjectInfo>,
    common_prefixes: Vec<String>,
    is_truncated: bool,
    /// The key the truncation token is minted from.
    last_processed_key: Option<String>,
}

/// Walk the sorted key set once, skipping keys at or before `start_after`,
/// collapsing keys that share a post-prefix delimiter into deduplicated
/// common prefixes, and spending one shared counter toward `max_keys` for
/// each emitted content or newly-seen prefix. Keys that fold into an
/// already-emitted prefix are consumed for free but still advance the
/// truncation marker.
fn select_page(
    objects: Vec<ObjectInfo>,
    prefix: &str,
    delimiter: Option<&str>,
    start_after: Option<&str>,
    max_keys: usize,
) -> ListPage {
    let mut contents = Vec::new();
    let mut common_prefixes: Vec<String> = Vec::new();
    let mut seen_prefixes: HashSet<String> = HashSet::new();
    let mut count = 0usize;
    let mut is_truncated = false;
    let mut last_processed_key: Option<String> = None;

    if max_keys == 0 {
        return ListPage {
            contents,
            common_prefixes,
            is_truncated: false,
            last_processed_key: None,
        };
    }

    for object in objects {
        if let Some(after) = start_after {
            if object.key.as_str() <= after {
                continue;
            }
        }

        if let Some(delim) = delimiter {
            let suffix = &object.key[prefix.len()..];
            if let Some(idx) = suffix.find(delim) {
                let common = format!("{}{}", prefix, &suffix[..idx + delim.len()]);
                if seen_prefixes.contains(&common) {
                    last_processed_key = Some(object.key);
                    continue;
                }
                if count == max_keys {
                    is_truncated = true;
                    break;
                }
                seen_prefixes.insert(common.clone());
                common_prefixes.push(common);
                count += 1;
                last_processed_key = Some(object.key);
                continue;
            }
        }

        if count == max_keys {
            is_truncated = true;
            break;
        }
        last_processed_key = Some(object.key.clone());
        contents.push(object);
        count += 1;
    }

    ListPage {
        contents,
        common_prefixes,
        is_truncated,
        last_processed_key,
    }
}

fn encode_token(key: &str) -> String {
    base64::engine::general_purpose::STANDARD.encode(key)
}

fn decode_token(token: &str) -> Result<String, S3Error> {
    let invalid = || S3Error::InvalidArgument("invalid continuation token".to_string());
    let raw = base64::engine::general_purpose::STANDARD
        .decode(token)
        .map_err(|_| invalid())?;
    String::from_utf8(raw).map_err(|_| invalid())
}

/// Bucket-level GET handler - dispatches to appropriate operation based on query params
/// GET /{bucket}?list-type=2&prefix=  -> ListObjectsV2
/// GET /{bucket}                      -> ListObjectsV1
/// GET /{bucket}?location             -> GetBucketLocation
/// GET /{bucket}?versioning           -> GetBucketVersioning
#[instrument(skip(state))]
pub async fn bucket_get_handler(
    State(state): State<Arc<AppState>>,
    ValidatedBucket(bucket): ValidatedBucket,
    Query(query): Query<BucketGetQuery>,
) -> Result<Response, S3Error> {
    if query.location.is_some() || query.versioning.is_some() {
        if !state.store.bucket_exists(&bucket).await? {
            return Err(S3Error::NoSuchBucket(bucket));
        }
        let xml = if query.location.is_some() {
            r#"<?xml version="1.0" encoding="UTF-8"?>
<LocationConstraint xmlns="http://s3.amazonaws.com/doc/2006-03-01/">us-east-1</LocationConstraint>"#
        } else {
            r#"<?xml version="1.0" encoding="UTF-8"?>
<VersioningConfiguration xmlns="http://s3.amazonaws.com/doc/2006-03-01/"/>"#
        };
        return Ok(xml_response(xml));
    }

    if query.uploads.is_some() {
        return Err(S3Error::NotImplemented);
    }

    let is_v2 = query.list_type == Some(2);
    let prefix = query.prefix.clone().unwrap_or_default();
    let delimiter = query.delimiter.clone().filter(|d| !d.is_empty());
    let max_keys = query.max_keys.unwrap_or(MAX_KEYS_CAP).min(MAX_KEYS_CAP) as usize;

    // v2 resumes from the continuation token (start-after only applies to
    // the first page); v1 resumes from `marker`.
    let start_after = if is_v2 {
        match &query.continuation_token {
            Some(token) => Some(decode_token(token)?),
            None => query.start_after.clone(),
        }
    } else {
        query.marker.clone()
    };

    info!(
        "LIST {}/{}* (v{})",
        bucket,
        prefix,
        if is_v2 { "2" } else { "1" }
    );

    let objects = state.store.list_objects(&bucket, &prefix, 0).await?;
    let page = select_page(
        objects,
        &prefix,
        delimiter.as_deref(),
        start_after.as_deref(),
        max_keys,
    );

    let s3_objects: Vec<S3Object> = page
        .contents
        .into_iter()
        .map(|obj| {
            S3Object::new(
                obj.key,
                obj.metadata.size,
                obj.metadata.last_modified,
                obj.metadata.etag,
            )
        })
        .collect();
    let key_count = (s3_objects.len() + page.common_prefixes.len()) as u32;
    let next_key = if page.is_truncated {
        page.last_processed_key
    } else {
        None
    };

    let result = ListBucketResult {
        name: bucket,
        prefix,
        delimiter,
        max_keys: max_keys as u32,
        key_count,
        is_truncated: page.is_truncated,
        contents: s3_objects,
        common_prefixes: page.common_prefixes,
        continuation_token: if is_v2 {
            query.continuation_token.clone()
        } else {
            None
        },
        next_continuation_token: if is_v2 {
            next_key.as_deref().map(encode_token)
        } else {
            None
        },
        start_after: if is_v2 { query.start_after.clone() } else { None },
        marker: if is_v2 { None } else { query.marker.clone() },
        next_marker: if is_v2 { None } else { next_key },
        encoding_type: query.encoding_type.clone(),
        is_v1: !is_v2,
    };

    Ok(xml_response(result.to_xml()))
}

/// CREATE bucket handler
/// PUT /{bucket}
#[instrument(skip(state))]
pub async fn create_bucket(
    State(state): State<Arc<AppState>>,
    Path(bucket): Path<String>,
) -> Result<Response, S3Error> {
    info!("CREATE bucket {}", bucket);

    // S3 naming rules are an HTTP-layer concern; the engine only enforces
    // traversal safety.
    crate::types::validate_bucket_name(&bucket)
        .map_err(|_| S3Error::InvalidBucketName(bucket.clone()))?;

    state.store.create_bucket(&bucket).await?;

    Ok((StatusCode::OK, [("Location", format!("/{}", bucket))], "").into_response())
}

/// DELETE bucket handler
/// DELETE /{bucket}
#[instrument(skip(state))]
pub async fn delete_bucket(
    State(state): State<Arc<AppState>>,
    ValidatedBucket(bucket): ValidatedBucket,
) -> Result<Response, S3Error> {
    info!("DELETE bucket {}", bucket);

    state.store.delete_bucket(&bucket).await?;

    Ok(StatusCode::NO_CONTENT.into_response())
}

/// HEAD bucket handler
/// HEAD /{bucket}
#[instrument(skip(state))]
pub async fn head_bucket(
    State(state): State<Arc<AppState>>,
    ValidatedBucket(bucket): ValidatedBucket,
) -> Result<Response, S3Error> {
    if !state.store.bucket_exists(&bucket).await? {
        return Err(S3Error::NoSuchBucket(bucket));
    }

    Ok((StatusCode::OK, [("x-amz-bucket-region", "us-east-1")]).into_response())
}

/// LIST buckets handler
/// GET /
#[instrument(skip(state))]
pub async fn list_buckets(State(state): State<Arc<AppState>>) -> Result<Response, S3Error> {
    info!("LIST buckets");

    let buckets = state.store.list_buckets().await?;

    let result = ListBucketsResult {
        owner_id: "geckos3".to_string(),
        owner_display_name: "geckos3".to_string(),
        buckets: buckets
            .into_iter()
            .map(|entry| BucketInfo {
                name: entry.name,
                creation_date: entry.created,
            })
            .collect(),
    };

    Ok(xml_response(result.to_xml()))
}
