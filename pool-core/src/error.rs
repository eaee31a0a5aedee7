//! Error types for the worker pool manager.
//!
//! Two error enums model the two propagation paths described by the
//! design: [`PoolError`] surfaces to a caller of [`crate::manager::PoolManager`]'s
//! public operations, while [`SpawnError`] is internal bookkeeping absorbed
//! by the spawn-with-backoff path and reflected only in logs and counters
//! (it is never returned to a user request).

// Layer 1: Standard library imports
use std::error::Error;

// Layer 2: Third-party crate imports
use thiserror::Error;

// Layer 3: Internal module imports
// (none)

/// Errors surfaced to a caller of the pool's public API.
#[derive(Debug, Error)]
pub enum PoolError {
    /// `init()` was called with an empty child command.
    #[error("child command must not be empty")]
    ConfigMissing,

    /// No worker was selectable at dispatch time.
    #[error("No healthy workers available")]
    NoHealthyWorker,

    /// The caller's audio payload was not valid base64 once whitespace and
    /// a `data:<mime>;base64,` prefix (if any) were stripped.
    #[error("invalid base64 audio payload: {reason}")]
    InvalidAudioPayload { reason: String },

    /// The upstream child returned a non-2xx response to `/inference`.
    #[error("upstream error: HTTP {status}: {body}")]
    UpstreamError { status: u16, body: String },

    /// The upstream child did not respond within the proxy timeout.
    #[error("upstream request timed out after {timeout_ms}ms")]
    UpstreamTimeout { timeout_ms: u64 },

    /// The upstream child's response could not be reached at all (connection
    /// refused, DNS failure, etc., anything short of a timeout).
    #[error("upstream transport error: {source}")]
    UpstreamTransport {
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
}

impl PoolError {
    /// Returns `true` if this error penalizes the serving worker's
    /// `consecutive_failures` counter per §4.4 step 8.
    pub fn penalizes_worker(&self) -> bool {
        matches!(
            self,
            PoolError::UpstreamError { .. }
                | PoolError::UpstreamTimeout { .. }
                | PoolError::UpstreamTransport { .. }
        )
    }
}

/// Internal errors from the spawn-with-backoff path (§4.3.2).
///
/// Never surfaced directly to a user request: a failed spawn manifests only
/// as the continued absence of a healthy worker for that port.
#[derive(Debug, Error)]
pub enum SpawnError {
    /// The OS refused to fork/exec the child command.
    #[error("failed to spawn child on port {port}: {source}")]
    ProcessSpawnFailed {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// The child never answered a healthy `/health` probe within the
    /// startup deadline.
    #[error("child on port {port} did not become healthy within {timeout_ms}ms")]
    StartupTimeout { port: u16, timeout_ms: u64 },

    /// The spawn attempt was suppressed by the per-port backoff gate.
    #[error("spawn on port {port} suppressed by backoff ({remaining_ms}ms remaining)")]
    BackoffActive { port: u16, remaining_ms: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_errors_penalize_worker() {
        assert!(PoolError::UpstreamTimeout { timeout_ms: 120_000 }.penalizes_worker());
        assert!(PoolError::UpstreamError {
            status: 500,
            body: "boom".into()
        }
        .penalizes_worker());
    }

    #[test]
    fn no_healthy_worker_does_not_penalize() {
        assert!(!PoolError::NoHealthyWorker.penalizes_worker());
        assert!(!PoolError::ConfigMissing.penalizes_worker());
        assert!(!PoolError::InvalidAudioPayload {
            reason: "bad padding".into()
        }
        .penalizes_worker());
    }

    #[test]
    fn display_messages_are_informative() {
        let err = PoolError::UpstreamError {
            status: 500,
            body: "internal error".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("500"));
        assert!(msg.contains("internal error"));
    }
}
