//! The outer HTTP surface (§6): thin handlers that validate the request,
//! delegate to [`PoolManager`], and translate the result to JSON.

// Layer 1: Standard library imports
use std::collections::HashMap;

// Layer 2: Third-party crate imports
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine;
use tower_http::trace::TraceLayer;
use tracing::warn;

// Layer 3: Internal module imports
use pool_core::{PoolManager, PoolStatus, ProviderInfo, TranscriptionResult, PROVIDER_NAME};

use crate::error::ApiError;

/// Build the full router, with `manager` as shared application state.
/// `PoolManager` is already a cheap `Arc`-backed clone, so it's used
/// directly as axum state rather than wrapped in an extra `Arc`.
pub fn router(manager: PoolManager) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/providers", get(providers))
        .route("/api/v1/transcriptions", post(transcribe))
        .route("/api/v1/status", get(status))
        .layer(TraceLayer::new_for_http())
        .with_state(manager)
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn providers(State(manager): State<PoolManager>) -> Json<Vec<ProviderInfo>> {
    let config = manager.config();
    Json(vec![ProviderInfo {
        name: PROVIDER_NAME.to_string(),
        pool_size: config.pool_size,
        starting_port: config.starting_port,
    }])
}

async fn status(State(manager): State<PoolManager>) -> Json<PoolStatus> {
    Json(manager.get_pool_status().await)
}

/// Accepts `multipart/form-data` with a binary `file` part plus optional
/// `language`, `timestamps`, and arbitrary string metadata fields; base64
/// re-encodes the file so it can be handed to `PoolManager::transcribe`'s
/// spec-shaped contract, and forwards everything else as caller metadata.
async fn transcribe(
    State(manager): State<PoolManager>,
    mut multipart: Multipart,
) -> Result<Json<TranscriptionResult>, ApiError> {
    let mut audio_base64 = None;
    let mut language = None;
    let mut timestamps = false;
    let mut metadata = HashMap::new();

    while let Ok(Some(field)) = multipart.next_field().await {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        match name.as_str() {
            "file" => match field.bytes().await {
                Ok(bytes) => {
                    audio_base64 = Some(base64::engine::general_purpose::STANDARD.encode(bytes));
                }
                Err(e) => warn!(error = %e, "failed to read multipart file part"),
            },
            "language" => {
                if let Ok(text) = field.text().await {
                    language = Some(text);
                }
            }
            "timestamps" => {
                if let Ok(text) = field.text().await {
                    timestamps = text.eq_ignore_ascii_case("true") || text == "1";
                }
            }
            _ => {
                if let Ok(text) = field.text().await {
                    metadata.insert(name, text);
                }
            }
        }
    }

    let audio_base64 = audio_base64.unwrap_or_default();
    let result = manager
        .transcribe(&audio_base64, language.as_deref(), timestamps, metadata)
        .await?;
    Ok(Json(result))
}
