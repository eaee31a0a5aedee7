//! The Health Prober, a single stateless liveness check (§4.2).

// Layer 1: Standard library imports
use std::time::Duration;

// Layer 2: Third-party crate imports
use tracing::{debug, trace};

// Layer 3: Internal module imports
// (none)

/// Per-probe abort timeout (§4.3 constants).
pub const HEALTH_TIMEOUT: Duration = Duration::from_millis(2000);

/// Issues `GET <base_url>/health` with a hard timeout and reports whether
/// the worker answered with a 2xx status.
///
/// Stateless: a `HealthProber` mutates nothing and can be shared freely
/// across concurrent probes.
#[derive(Debug, Clone)]
pub struct HealthProber {
    client: reqwest::Client,
}

impl HealthProber {
    /// Build a prober with the fixed `HEALTH_TIMEOUT` baked into the
    /// underlying HTTP client.
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(HEALTH_TIMEOUT)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }

    /// Probe `<base_url>/health`. Returns `true` iff the response status is
    /// 2xx; any network error, timeout, or non-2xx status returns `false`.
    ///
    /// `during_startup` only affects log verbosity; it never changes the
    /// return value (§4.2).
    pub async fn probe(&self, base_url: &str, during_startup: bool) -> bool {
        let url = format!("{base_url}/health");
        match self.client.get(&url).send().await {
            Ok(response) if response.status().is_success() => {
                trace!(url, "health probe succeeded");
                true
            }
            Ok(response) => {
                if during_startup {
                    trace!(url, status = %response.status(), "startup health probe not yet ok");
                } else {
                    debug!(url, status = %response.status(), "health probe returned non-2xx");
                }
                false
            }
            Err(e) => {
                if during_startup {
                    trace!(url, error = %e, "startup health probe failed");
                } else {
                    debug!(url, error = %e, "health probe failed");
                }
                false
            }
        }
    }
}

impl Default for HealthProber {
    fn default() -> Self {
        Self::new()
    }
}
