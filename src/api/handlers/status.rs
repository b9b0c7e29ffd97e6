//! Health-check and probe handlers.

use super::S3Error;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// GET /health - liveness probe, bypasses auth.
pub async fn health_check() -> Response {
    (StatusCode::OK, "OK").into_response()
}

/// HEAD / - connection probe used by S3 clients before real requests.
pub async fn head_root() -> Response {
    StatusCode::OK.into_response()
}

/// Service-level requests other than GET/HEAD have no S3 meaning here.
pub async fn service_not_implemented() -> Response {
    S3Error::NotImplemented.into_response()
}

/// Method fallback for bucket/object routes, so unsupported verbs render
/// the S3 error body instead of a bare 405.
pub async fn method_not_allowed() -> Response {
    S3Error::MethodNotAllowed.into_response()
}
