//! S3 API implementation

pub mod auth;
mod aws_chunked;
mod errors;
mod extractors;
pub mod handlers;
mod xml;

pub use errors::S3Error;
pub use extractors::{ValidatedBucket, ValidatedPath};

use axum::body::Body;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;
use std::sync::atomic::{AtomicU64, Ordering};

static REQUEST_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Stamp every response with `x-amz-request-id: geckos3-<n>`, a
/// process-local monotonic counter. The same id appears in request logs,
/// which is what clients quote when reporting problems.
pub async fn request_id_middleware(request: Request<Body>, next: Next) -> Response {
    let n = REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut response = next.run(request).await;
    if let Ok(value) = format!("geckos3-{n}").parse() {
        response.headers_mut().insert("x-amz-request-id", value);
    }
    response
}
