//! The Health and Audit sweeps, independent periodic timers armed by
//! [`super::PoolManager::init`] (§4.3.3, §4.3.4).

// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use chrono::Utc;
use tokio::sync::oneshot;
use tracing::{info, warn};

// Layer 3: Internal module imports
use super::{PoolManager, HEALTH_INTERVAL, HEALTH_MAX_FAILURES, AUDIT_INTERVAL};
use crate::util::WorkerId;
use crate::worker::WorkerState;

/// Spawn the Health Sweep: every `HEALTH_INTERVAL`, probe every worker and
/// react to state transitions. Detached, cancelled only by sending on
/// `shutdown_rx`'s paired sender (owned by the manager's `Inner`).
pub(super) fn spawn_health_sweep(
    manager: PoolManager,
    mut shutdown_rx: oneshot::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(HEALTH_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    manager.health_sweep_once().await;
                }
                _ = &mut shutdown_rx => {
                    info!("health sweep shutting down");
                    break;
                }
            }
        }
    })
}

/// Spawn the Audit Sweep: every `AUDIT_INTERVAL`, reap dead processes and
/// top the pool back up to `pool_size`.
pub(super) fn spawn_audit_sweep(
    manager: PoolManager,
    mut shutdown_rx: oneshot::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(AUDIT_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    manager.audit_sweep_once().await;
                }
                _ = &mut shutdown_rx => {
                    info!("audit sweep shutting down");
                    break;
                }
            }
        }
    })
}

impl PoolManager {
    /// §4.3.3: probe every registered worker. Per-worker probes run as
    /// detached fire-and-forget tasks; this method does not await them
    /// collectively, so one slow or hung worker never delays the next tick
    /// or another worker's probe.
    pub(crate) async fn health_sweep_once(&self) {
        let ids: Vec<WorkerId> = {
            let state = self.inner.state.lock().await;
            state.workers.iter().map(|w| w.id).collect()
        };

        for id in ids {
            let manager = self.clone();
            tokio::spawn(async move {
                manager.probe_worker_once(id).await;
            });
        }
    }

    /// One worker's health probe cycle: probe, record the outcome, and
    /// replace the worker if it has just crossed `HEALTH_MAX_FAILURES`
    /// consecutive failures.
    async fn probe_worker_once(&self, id: WorkerId) {
        let base_url = {
            let state = self.inner.state.lock().await;
            state.workers.iter().find(|w| w.id == id).map(|w| w.base_url.clone())
        };

        let Some(base_url) = base_url else {
            return;
        };

        let healthy = self.inner.prober.probe(&base_url, false).await;
        let now = Utc::now();

        let failures_crossed_threshold = {
            let mut state = self.inner.state.lock().await;
            let Some(worker) = state.workers.iter_mut().find(|w| w.id == id) else {
                return;
            };

            if healthy {
                worker.record_probe_success(now);
                None
            } else {
                worker.record_probe_failure();
                if worker.consecutive_failures >= HEALTH_MAX_FAILURES {
                    worker.state = WorkerState::Unhealthy;
                    Some(worker.consecutive_failures)
                } else {
                    None
                }
            }
        };

        if let Some(failures) = failures_crossed_threshold {
            warn!(
                base_url, failures, "worker crossed failure threshold, replacing"
            );
            self.replace_worker(id).await;
        }
    }

    /// §4.3.4: reap any worker whose OS process has already exited, then
    /// top the registry back up to `pool_size` for any port left without a
    /// live entry, then warn if the pool is below half its configured
    /// strength.
    pub(crate) async fn audit_sweep_once(&self) {
        let dead_ids: Vec<WorkerId> = {
            let mut state = self.inner.state.lock().await;
            state
                .workers
                .iter_mut()
                .filter(|w| !w.is_alive())
                .map(|w| w.id)
                .collect()
        };

        for id in dead_ids {
            let removed = {
                let mut state = self.inner.state.lock().await;
                let idx = state.workers.iter().position(|w| w.id == id);
                idx.map(|i| state.workers.remove(i))
            };

            if let Some(mut worker) = removed {
                warn!(port = worker.port, "reaping dead worker process");
                worker.state = WorkerState::Stopped;
            }
        }

        self.recover_pool().await;
        self.warn_if_below_low_watermark().await;
    }

    /// §4.3.4 step 3: log-only warning, no action taken. A separate Health
    /// Sweep or the next Audit Sweep's recovery pass is what actually
    /// brings the pool back up.
    async fn warn_if_below_low_watermark(&self) {
        let state = self.inner.state.lock().await;
        let healthy = state
            .workers
            .iter()
            .filter(|w| w.state == WorkerState::Healthy)
            .count();
        let watermark = self.inner.config.pool_size / 2;

        if healthy < watermark {
            warn!(
                healthy,
                pool_size = self.inner.config.pool_size,
                "healthy worker count below low watermark"
            );
        }
    }
}
