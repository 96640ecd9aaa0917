//! HTTP error responses for the ogproxy server.
//!
//! Every error renders as `{"error": ..., "message": ...}` with
//! `Cache-Control: no-store`. Details of internal failures are logged and
//! never echoed to the caller.

use axum::Json;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde_json::json;

use ogproxy_client::UrlError;
use ogproxy_core::Error;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The target URL was missing or malformed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// The origin could not be fetched or answered with an error status.
    #[error("Failed to fetch URL: {0}")]
    Upstream(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<UrlError> for ApiError {
    fn from(err: UrlError) -> Self {
        ApiError::InvalidUrl(err.to_string())
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::InvalidUrl(msg) => ApiError::InvalidUrl(msg),
            e if e.is_upstream() => ApiError::Upstream(e.to_string()),
            e => ApiError::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, message) = match self {
            ApiError::InvalidUrl(msg) => (StatusCode::BAD_REQUEST, "Invalid URL", msg),
            ApiError::Upstream(detail) => {
                tracing::error!("origin fetch failed: {}", detail);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error", "Failed to fetch URL".to_string())
            }
            ApiError::Internal(detail) => {
                tracing::error!("request failed: {}", detail);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error", "An unknown error occurred".to_string())
            }
        };

        (status, [(header::CACHE_CONTROL, "no-store")], Json(json!({ "error": error, "message": message })))
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http_body_util::BodyExt;

    async fn body_json(body: Body) -> serde_json::Value {
        let bytes = body.collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn invalid_url_returns_400() {
        let response = ApiError::from(UrlError::Empty).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.headers().get(header::CACHE_CONTROL).unwrap(), "no-store");
        let json = body_json(response.into_body()).await;
        assert_eq!(json, json!({ "error": "Invalid URL", "message": "No URL provided" }));
    }

    #[tokio::test]
    async fn core_validation_error_returns_400() {
        let response = ApiError::from(Error::InvalidUrl("Invalid URL format".into())).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response.into_body()).await;
        assert_eq!(json["message"], "Invalid URL format");
    }

    #[tokio::test]
    async fn upstream_status_hides_details() {
        let response = ApiError::from(Error::HttpStatus(503)).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(response.into_body()).await;
        assert_eq!(json, json!({ "error": "Internal Server Error", "message": "Failed to fetch URL" }));
    }

    #[tokio::test]
    async fn network_error_is_upstream() {
        let err = ApiError::from(Error::HttpError("network error: refused".into()));
        assert!(matches!(err, ApiError::Upstream(_)));
    }

    #[tokio::test]
    async fn other_errors_are_unknown() {
        let response = ApiError::from(Error::ExtractFailed("worker panicked".into())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers().get(header::CACHE_CONTROL).unwrap(), "no-store");
        let json = body_json(response.into_body()).await;
        assert_eq!(json["message"], "An unknown error occurred");
    }
}
