//! The request-proxy path: normalize the caller's base64 audio, select a
//! worker, forward the decoded bytes, translate the child's response into
//! the canonical shape, and roll the dice on rotation (§4.4).

// Layer 1: Standard library imports
use std::collections::HashMap;

// Layer 2: Third-party crate imports
use base64::Engine;
use reqwest::multipart::{Form, Part};
use tracing::{debug, warn};

// Layer 3: Internal module imports
use crate::error::PoolError;
use crate::manager::{PoolManager, PROXY_TIMEOUT};
use crate::types::{Segment, TranscriptionResult, PROVIDER_NAME};

/// Raw upstream response shape from `whisper-server`'s `/inference`
/// endpoint, decoded defensively (§4.4 step 6): every field is optional on
/// the wire and missing ones fall back per spec.
#[derive(Debug, Clone, Default, serde::Deserialize)]
struct UpstreamResponse {
    text: Option<String>,
    transcript: Option<String>,
    #[serde(default)]
    segments: Vec<UpstreamSegment>,
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct UpstreamSegment {
    text: Option<String>,
    start: Option<f64>,
    end: Option<f64>,
    confidence: Option<f64>,
    speaker: Option<String>,
}

impl PoolManager {
    /// §4.4: the full request-proxy path.
    ///
    /// `audio_base64` may carry surrounding whitespace and an optional
    /// `data:<mime>;base64,` prefix; both are stripped before decoding.
    /// `timestamps` is accepted for the outer HTTP contract's sake but, per
    /// the upstream call's fixed field list, is not itself forwarded to the
    /// child or reflected in the result. On any upstream failure the
    /// serving worker's failure counter is bumped (step 8); the Health
    /// Sweep, not this path, decides whether that crosses the replacement
    /// threshold.
    pub async fn transcribe(
        &self,
        audio_base64: &str,
        language: Option<&str>,
        _timestamps: bool,
        metadata: HashMap<String, String>,
    ) -> Result<TranscriptionResult, PoolError> {
        let audio_bytes = decode_audio(audio_base64)?;
        let selected = self.select_worker().await?;
        let language = language.unwrap_or("en").to_string();

        let part = Part::bytes(audio_bytes)
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .unwrap_or_else(|_| Part::bytes(Vec::new()));
        let form = Form::new()
            .part("file", part)
            .text("response_format", "json")
            .text("temperature", "0.0")
            .text("language", language.clone());

        let url = format!("{}/inference", selected.base_url);
        let result = self
            .inner
            .proxy_client
            .post(&url)
            .timeout(PROXY_TIMEOUT)
            .multipart(form)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                match serde_json::from_str::<UpstreamResponse>(&body) {
                    Ok(parsed) => {
                        self.record_dispatch_outcome(selected.id, true).await;
                        self.maybe_rotate(selected.id).await;
                        Ok(translate(parsed, language, metadata, &selected))
                    }
                    Err(e) => {
                        warn!(url, error = %e, "upstream response failed to parse");
                        self.record_dispatch_outcome(selected.id, false).await;
                        Err(PoolError::UpstreamError {
                            status: status.as_u16(),
                            body,
                        })
                    }
                }
            }
            Ok(response) => {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                debug!(url, status, "upstream returned non-2xx");
                self.record_dispatch_outcome(selected.id, false).await;
                Err(PoolError::UpstreamError { status, body })
            }
            Err(e) if e.is_timeout() => {
                self.record_dispatch_outcome(selected.id, false).await;
                Err(PoolError::UpstreamTimeout {
                    timeout_ms: PROXY_TIMEOUT.as_millis() as u64,
                })
            }
            Err(e) => {
                self.record_dispatch_outcome(selected.id, false).await;
                Err(PoolError::UpstreamTransport {
                    source: Box::new(e),
                })
            }
        }
    }

    /// §4.3.6/§4.4 step 9: after a successful dispatch, rotate the worker
    /// out once it has crossed `rotate_threshold` served requests.
    /// `accepting_requests` flips to `false` synchronously, within this same
    /// dispatch, so the worker drops out of the next `select_worker` call
    /// immediately; the actual `replace_worker` is deferred
    /// `ROTATION_DELAY` to let any other in-flight requests against it
    /// finish first.
    async fn maybe_rotate(&self, id: crate::util::WorkerId) {
        let should_rotate = {
            let mut state = self.inner.state.lock().await;
            let Some(worker) = state.workers.iter_mut().find(|w| w.id == id) else {
                return;
            };

            let crossed = worker.request_count >= self.inner.config.rotate_threshold
                && worker.accepting_requests;
            if crossed {
                worker.accepting_requests = false;
            }
            crossed
        };

        if should_rotate {
            debug!(%id, "worker reached request threshold, scheduling rotation");
            let manager = self.clone();
            tokio::spawn(async move {
                tokio::time::sleep(crate::manager::ROTATION_DELAY).await;
                manager.replace_worker(id).await;
            });
        }
    }
}

/// §4.4 step 3: strip whitespace and an optional `data:<mime>;base64,`
/// prefix, then base64-decode.
fn decode_audio(input: &str) -> Result<Vec<u8>, PoolError> {
    let stripped: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    let payload = match stripped.split_once(";base64,") {
        Some((_, data)) => data,
        None => stripped.as_str(),
    };

    base64::engine::general_purpose::STANDARD
        .decode(payload)
        .map_err(|e| PoolError::InvalidAudioPayload {
            reason: e.to_string(),
        })
}

/// §4.4 steps 6-7: defensive decode plus every derived field.
fn translate(
    upstream: UpstreamResponse,
    language: String,
    caller_metadata: HashMap<String, String>,
    selected: &crate::manager::SelectedWorker,
) -> TranscriptionResult {
    let text = upstream
        .text
        .or(upstream.transcript)
        .unwrap_or_default();

    let segments: Vec<Segment> = upstream
        .segments
        .into_iter()
        .map(|s| {
            let text = s.text.unwrap_or_default().trim().to_string();
            let start = s.start.unwrap_or(0.0);
            let end = s.end.unwrap_or(start);
            Segment {
                text,
                start,
                end,
                confidence: s.confidence,
                speaker: s.speaker,
            }
        })
        .collect();

    let duration = segments.last().map_or(0.0, |s| s.end);
    let confidence = if segments.is_empty() { 0.0 } else { 1.0 };

    let mut metadata = caller_metadata;
    metadata.insert("worker_id".to_string(), selected.id.to_string());
    metadata.insert("worker_url".to_string(), selected.base_url.clone());

    TranscriptionResult {
        text,
        language,
        duration,
        segments,
        confidence,
        provider: PROVIDER_NAME.to_string(),
        metadata,
    }
}
