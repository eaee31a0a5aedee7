//! Error types for the HTTP front-end: [`ServerError`] for the binary's own
//! startup/config path, [`ApiError`] for request handlers (implements
//! `IntoResponse` so handler signatures can just `?` their way out).

// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

// Layer 3: Internal module imports
use pool_core::PoolError;

/// Errors from configuration loading and server bootstrap.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, Serialize)]
struct ApiErrorBody {
    error: String,
}

/// Wraps a [`PoolError`] so request handlers can use `?` and still produce
/// a well-formed JSON error response.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct ApiError(#[from] pub PoolError);

impl IntoResponse for ApiError {
    /// §6/§7: `NoHealthyWorker` is a 503 (the pool is temporarily unable to
    /// serve), `UpstreamTimeout`/`UpstreamTransport`/`UpstreamError` are
    /// 502s (the upstream child misbehaved), `InvalidAudioPayload` is a 400
    /// (the caller's fault), `ConfigMissing` is a 500 (it should never
    /// reach a request handler at all).
    fn into_response(self) -> Response {
        let status = match &self.0 {
            PoolError::NoHealthyWorker => StatusCode::SERVICE_UNAVAILABLE,
            PoolError::UpstreamError { .. }
            | PoolError::UpstreamTimeout { .. }
            | PoolError::UpstreamTransport { .. } => StatusCode::BAD_GATEWAY,
            PoolError::InvalidAudioPayload { .. } => StatusCode::BAD_REQUEST,
            PoolError::ConfigMissing => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = ApiErrorBody {
            error: self.0.to_string(),
        };

        (status, axum::Json(body)).into_response()
    }
}
