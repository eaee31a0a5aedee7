//! The Pool Manager, the heart of the system (§4.3).
//!
//! Owns the worker registry, the round-robin cursor, the per-port backoff
//! table, and the two periodic sweeps. [`PoolManager`] is a cheap,
//! `Clone`-able handle (an `Arc` around its shared state) so sweep tasks
//! and the proxy path can each hold their own copy without borrowing
//! tricks; the pattern mirrors how `reqwest::Client` or this workspace's
//! `BackendPool`-style state holders are shared across tasks.

mod dispatch;
mod sweep;

// Layer 1: Standard library imports
use std::sync::Arc;
use std::time::Duration;

// Layer 2: Third-party crate imports
use chrono::Utc;
use tokio::sync::{oneshot, Mutex};
use tracing::info;

// Layer 3: Internal module imports
use crate::backoff::BackoffTable;
use crate::config::PoolConfig;
use crate::driver::WorkerDriver;
use crate::error::PoolError;
use crate::prober::HealthProber;
use crate::types::{PoolStatus, WorkerStatus};
use crate::util::WorkerId;
use crate::worker::{WorkerHandle, WorkerState};

/// Period of the Health Sweep.
pub const HEALTH_INTERVAL: Duration = Duration::from_millis(5000);

/// Consecutive failed probes before a worker is replaced.
pub const HEALTH_MAX_FAILURES: u32 = 3;

/// Period of the Audit Sweep.
pub const AUDIT_INTERVAL: Duration = Duration::from_millis(30_000);

/// Deadline for a freshly spawned worker to reach `Healthy`.
pub const STARTUP_TIMEOUT: Duration = Duration::from_millis(30_000);

/// Poll interval used while waiting for a worker to become healthy.
pub const STARTUP_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Per-request proxy timeout.
pub const PROXY_TIMEOUT: Duration = Duration::from_millis(120_000);

/// Drain window between a worker closing its `accepting_requests` gate for
/// rotation and the replacement actually being spawned (§4.3.6).
pub const ROTATION_DELAY: Duration = Duration::from_millis(5000);

/// A worker selected for dispatch: just enough to issue the upstream call
/// without holding the registry lock across it (§5).
#[derive(Debug, Clone)]
pub(crate) struct SelectedWorker {
    pub(crate) id: WorkerId,
    pub(crate) base_url: String,
}

/// Registry + cursor + backoff table: the state a single mutex guards
/// per the concurrency model (§5).
pub(crate) struct PoolState {
    pub(crate) workers: Vec<WorkerHandle>,
    pub(crate) cursor: usize,
    pub(crate) backoff: BackoffTable,
}

struct SweepHandles {
    health_handle: tokio::task::JoinHandle<()>,
    health_shutdown: oneshot::Sender<()>,
    audit_handle: tokio::task::JoinHandle<()>,
    audit_shutdown: oneshot::Sender<()>,
}

pub(crate) struct Inner {
    pub(crate) config: PoolConfig,
    pub(crate) driver: WorkerDriver,
    pub(crate) prober: HealthProber,
    pub(crate) proxy_client: reqwest::Client,
    pub(crate) state: Mutex<PoolState>,
    sweeps: Mutex<Option<SweepHandles>>,
}

/// Owns process lifecycle, health state machine, backoff respawn, the
/// periodic sweeps, round-robin dispatch, and the request-proxy path.
///
/// Process-wide in deployment but not a singleton in code: tests can
/// construct as many independent managers as they like (§9's "namespace
/// pattern" redesign flag).
#[derive(Clone)]
pub struct PoolManager {
    pub(crate) inner: Arc<Inner>,
}

impl PoolManager {
    /// Construct a manager. Does not spawn anything; call `init()` next.
    pub fn new(config: PoolConfig) -> Self {
        let driver = WorkerDriver::new(config.whisper_server.clone());
        let proxy_client = reqwest::Client::builder()
            .timeout(PROXY_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            inner: Arc::new(Inner {
                config,
                driver,
                prober: HealthProber::new(),
                proxy_client,
                state: Mutex::new(PoolState {
                    workers: Vec::new(),
                    cursor: 0,
                    backoff: BackoffTable::new(),
                }),
                sweeps: Mutex::new(None),
            }),
        }
    }

    /// §4.3.1: fails fatally if the child command is empty. Spawns workers
    /// for `[starting_port, starting_port + pool_size)` sequentially; each
    /// awaits its own startup-health outcome before the next is launched;
    /// then arms the Health and Audit sweeps as independent periodic
    /// timers.
    pub async fn init(&self) -> Result<(), PoolError> {
        if self.inner.config.whisper_server.cmd.trim().is_empty() {
            return Err(PoolError::ConfigMissing);
        }

        for port in self.inner.config.port_range() {
            self.spawn_worker(port).await;
        }

        self.arm_sweeps().await;
        Ok(())
    }

    /// §4.3.8: cancel both sweeps, gracefully terminate every registered
    /// worker, clear the registry. A second call is a no-op.
    pub async fn dispose(&self) {
        let sweeps = {
            let mut guard = self.inner.sweeps.lock().await;
            guard.take()
        };

        if let Some(sweeps) = sweeps {
            let _ = sweeps.health_shutdown.send(());
            let _ = sweeps.audit_shutdown.send(());
            let _ = sweeps.health_handle.await;
            let _ = sweeps.audit_handle.await;
        }

        let workers = {
            let mut state = self.inner.state.lock().await;
            std::mem::take(&mut state.workers)
        };

        for mut worker in workers {
            self.inner.driver.terminate(&mut worker, true).await;
        }

        info!("pool manager disposed");
    }

    /// `GET /api/v1/status`'s payload (§6).
    pub async fn get_pool_status(&self) -> PoolStatus {
        let state = self.inner.state.lock().await;
        let now = Utc::now();

        let workers: Vec<WorkerStatus> = state
            .workers
            .iter()
            .map(|w| WorkerStatus {
                id: w.id.to_string(),
                port: w.port,
                state: w.state,
                request_count: w.request_count,
                consecutive_failures: w.consecutive_failures,
                accepting_requests: w.accepting_requests,
                uptime_ms: w.uptime_ms(now),
            })
            .collect();

        let healthy_workers = workers
            .iter()
            .filter(|w| w.state == WorkerState::Healthy)
            .count();

        PoolStatus {
            total_workers: workers.len(),
            healthy_workers,
            workers,
        }
    }

    /// Configuration this manager was constructed with (read-only access
    /// for `pool-server`'s `/api/v1/providers` descriptor).
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    async fn arm_sweeps(&self) {
        let (health_shutdown, health_shutdown_rx) = oneshot::channel();
        let health_handle = sweep::spawn_health_sweep(self.clone(), health_shutdown_rx);

        let (audit_shutdown, audit_shutdown_rx) = oneshot::channel();
        let audit_handle = sweep::spawn_audit_sweep(self.clone(), audit_shutdown_rx);

        let mut guard = self.inner.sweeps.lock().await;
        *guard = Some(SweepHandles {
            health_handle,
            health_shutdown,
            audit_handle,
            audit_shutdown,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChildCommandConfig;

    fn config_with_cmd(cmd: &str) -> PoolConfig {
        PoolConfig {
            pool_size: 2,
            rotate_threshold: 100,
            starting_port: 19000,
            whisper_server: ChildCommandConfig {
                cmd: cmd.to_string(),
                ..Default::default()
            },
        }
    }

    #[tokio::test]
    async fn init_fails_fatally_on_empty_command() {
        let manager = PoolManager::new(config_with_cmd(""));
        let result = manager.init().await;
        assert!(matches!(result, Err(PoolError::ConfigMissing)));
    }

    #[tokio::test]
    async fn empty_pool_status_before_init() {
        let manager = PoolManager::new(config_with_cmd("whisper-server"));
        let status = manager.get_pool_status().await;
        assert_eq!(status.total_workers, 0);
        assert_eq!(status.healthy_workers, 0);
    }

    #[tokio::test]
    async fn dispose_without_init_is_a_harmless_noop() {
        let manager = PoolManager::new(config_with_cmd("whisper-server"));
        manager.dispose().await;
        manager.dispose().await;
    }
}
