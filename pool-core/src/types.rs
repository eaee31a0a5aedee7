//! Wire shapes exchanged with the outer HTTP surface (§6).

// Layer 1: Standard library imports
use std::collections::HashMap;

// Layer 2: Third-party crate imports
use serde::{Deserialize, Serialize};

// Layer 3: Internal module imports
use crate::worker::WorkerState;

/// One transcribed segment, defensively decoded from the child's response
/// (§4.4 step 6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub text: String,
    pub start: f64,
    pub end: f64,
    pub confidence: Option<f64>,
    pub speaker: Option<String>,
}

/// The canonical transcription result returned by `transcribe()` (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionResult {
    pub text: String,
    pub language: String,
    pub duration: f64,
    pub segments: Vec<Segment>,
    pub confidence: f64,
    pub provider: String,
    pub metadata: HashMap<String, String>,
}

/// `provider = "whisper-server"` for every result (§4.4 step 7).
pub const PROVIDER_NAME: &str = "whisper-server";

/// One worker's entry in `GET /api/v1/status`'s `workers[]` array (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerStatus {
    pub id: String,
    pub port: u16,
    pub state: WorkerState,
    pub request_count: u64,
    pub consecutive_failures: u32,
    pub accepting_requests: bool,
    pub uptime_ms: i64,
}

/// `GET /api/v1/status`'s top-level shape (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolStatus {
    pub total_workers: usize,
    pub healthy_workers: usize,
    pub workers: Vec<WorkerStatus>,
}

/// `GET /api/v1/providers`'s static descriptor (§6). Not a pool-core-internal
/// type, but shared here so `pool-server` doesn't need to redeclare
/// worker/pool vocabulary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub name: String,
    pub pool_size: usize,
    pub starting_port: u16,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[allow(clippy::expect_used)]
    fn segment_serializes_optional_fields_as_null() {
        let segment = Segment {
            text: "hello".into(),
            start: 0.0,
            end: 1.2,
            confidence: None,
            speaker: None,
        };
        let json = serde_json::to_string(&segment).expect("serialization should succeed");
        assert!(json.contains("\"confidence\":null"));
        assert!(json.contains("\"speaker\":null"));
    }
}
