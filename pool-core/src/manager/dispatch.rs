//! Spawn-with-backoff, startup confirmation, replacement, and round-robin
//! selection: §4.3.1, §4.3.2, §4.3.6, §4.3.7.

// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use chrono::Utc;
use tracing::{info, warn};

// Layer 3: Internal module imports
use super::{PoolManager, SelectedWorker, STARTUP_POLL_INTERVAL, STARTUP_TIMEOUT};
use crate::error::{PoolError, SpawnError};

impl PoolManager {
    /// §4.3.2: spawn a worker on `port`, gated by the per-port backoff
    /// table. A backoff-suppressed or OS-level spawn failure is recorded
    /// and absorbed; `init()` and the Audit Sweep call this in a loop and
    /// neither aborts on a single port's failure.
    pub(crate) async fn spawn_worker(&self, port: u16) {
        let now = Utc::now();

        let remaining_ms = {
            let state = self.inner.state.lock().await;
            if state.backoff.should_attempt(port, now) {
                None
            } else {
                Some(state.backoff.remaining_ms(port, now))
            }
        };

        if let Some(remaining_ms) = remaining_ms {
            let err = SpawnError::BackoffActive { port, remaining_ms };
            warn!(%err, "spawn suppressed by backoff");
            return;
        }

        {
            let mut state = self.inner.state.lock().await;
            state.backoff.record_attempt(port, now);
        }

        let worker = match self.inner.driver.spawn(port).await {
            Ok(worker) => worker,
            Err(e) => {
                warn!(port, error = %e, "failed to spawn worker");
                let mut state = self.inner.state.lock().await;
                state.backoff.record_failure(port, Utc::now());
                return;
            }
        };

        let id = worker.id;
        {
            let mut state = self.inner.state.lock().await;
            state.workers.push(worker);
        }

        if self.wait_for_healthy(id).await {
            info!(port, "worker became healthy");
            let mut state = self.inner.state.lock().await;
            state.backoff.record_success(port);
        } else {
            let err = SpawnError::StartupTimeout {
                port,
                timeout_ms: STARTUP_TIMEOUT.as_millis() as u64,
            };
            warn!(%err, "retiring worker that never became healthy");
            self.retire_unhealthy_startup(id, port).await;
        }
    }

    /// §4.3.1/§4.3.2: poll `/health` every `STARTUP_POLL_INTERVAL` until the
    /// worker answers healthy or `STARTUP_TIMEOUT` elapses.
    async fn wait_for_healthy(&self, id: crate::util::WorkerId) -> bool {
        let deadline = tokio::time::Instant::now() + STARTUP_TIMEOUT;

        loop {
            let base_url = {
                let state = self.inner.state.lock().await;
                state.workers.iter().find(|w| w.id == id).map(|w| w.base_url.clone())
            };

            let Some(base_url) = base_url else {
                return false;
            };

            if self.inner.prober.probe(&base_url, true).await {
                let mut state = self.inner.state.lock().await;
                if let Some(w) = state.workers.iter_mut().find(|w| w.id == id) {
                    w.record_probe_success(Utc::now());
                }
                return true;
            }

            if tokio::time::Instant::now() >= deadline {
                return false;
            }

            tokio::time::sleep(STARTUP_POLL_INTERVAL).await;
        }
    }

    /// A worker never passed its startup deadline: terminate it, record the
    /// backoff failure, and drop it from the registry (§4.3.2 step 7).
    async fn retire_unhealthy_startup(&self, id: crate::util::WorkerId, port: u16) {
        let worker = {
            let mut state = self.inner.state.lock().await;
            let idx = state.workers.iter().position(|w| w.id == id);
            idx.map(|i| state.workers.remove(i))
        };

        if let Some(mut worker) = worker {
            self.inner.driver.terminate(&mut worker, false).await;
        }

        let mut state = self.inner.state.lock().await;
        state.backoff.record_failure(port, Utc::now());
    }

    /// §4.3.6: replace a worker in place. Spawns the replacement on the same
    /// port *before* tearing down the old process, so a port can transiently
    /// run two processes; this keeps the pool from ever dipping below its
    /// configured strength while the outgoing process is still shutting down.
    pub(crate) async fn replace_worker(&self, id: crate::util::WorkerId) {
        let port = {
            let state = self.inner.state.lock().await;
            state.workers.iter().find(|w| w.id == id).map(|w| w.port)
        };

        let Some(port) = port else {
            return;
        };

        let old_worker = {
            let mut state = self.inner.state.lock().await;
            let idx = state.workers.iter().position(|w| w.id == id);
            idx.map(|i| state.workers.remove(i))
        };

        self.spawn_worker(port).await;

        if let Some(mut old_worker) = old_worker {
            self.inner.driver.terminate(&mut old_worker, true).await;
        }
    }

    /// §4.3.7: round-robin selection over the selectable subset (workers
    /// with `state == Healthy && accepting_requests`), advancing the cursor
    /// exactly once per call regardless of outcome. The cursor is taken
    /// modulo the selectable set's length, not the full registry's, so a
    /// gated-out worker (rotating, unhealthy) never skews the rotation
    /// toward its neighbors. Returns a self-contained snapshot so the
    /// caller can issue the upstream request after the lock is released.
    pub(crate) async fn select_worker(&self) -> Result<SelectedWorker, PoolError> {
        let mut state = self.inner.state.lock().await;

        let selectable: Vec<usize> = state
            .workers
            .iter()
            .enumerate()
            .filter(|(_, w)| w.is_selectable())
            .map(|(i, _)| i)
            .collect();

        if selectable.is_empty() {
            return Err(PoolError::NoHealthyWorker);
        }

        let slot = state.cursor % selectable.len();
        state.cursor = slot + 1;

        let idx = selectable[slot];
        let worker = &mut state.workers[idx];
        worker.request_count += 1;

        Ok(SelectedWorker {
            id: worker.id,
            base_url: worker.base_url.clone(),
        })
    }

    /// §4.3.4: maintain `pool_size` workers. Spawns a replacement for every
    /// port in the configured range that currently has no live registry
    /// entry. Called by the Audit Sweep and available to callers that want
    /// an eager top-up after bulk removals.
    pub(crate) async fn recover_pool(&self) {
        let missing_ports: Vec<u16> = {
            let state = self.inner.state.lock().await;
            self.inner
                .config
                .port_range()
                .filter(|port| !state.workers.iter().any(|w| w.port == *port))
                .collect()
        };

        for port in missing_ports {
            self.spawn_worker(port).await;
        }
    }

    /// §4.4 step 8: penalize the serving worker's failure counter after an
    /// upstream error, without itself deciding whether to replace it; that
    /// judgment is the Health Sweep's alone.
    pub(crate) async fn record_dispatch_outcome(&self, id: crate::util::WorkerId, success: bool) {
        let mut state = self.inner.state.lock().await;
        if let Some(worker) = state.workers.iter_mut().find(|w| w.id == id) {
            if success {
                worker.consecutive_failures = 0;
            } else {
                worker.consecutive_failures += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChildCommandConfig, PoolConfig};

    fn config() -> PoolConfig {
        PoolConfig {
            pool_size: 1,
            rotate_threshold: 100,
            starting_port: 19100,
            whisper_server: ChildCommandConfig {
                cmd: "whisper-server".into(),
                ..Default::default()
            },
        }
    }

    #[tokio::test]
    async fn select_worker_fails_with_empty_registry() {
        let manager = PoolManager::new(config());
        let result = manager.select_worker().await;
        assert!(matches!(result, Err(PoolError::NoHealthyWorker)));
    }

    #[tokio::test]
    async fn recover_pool_is_a_noop_when_all_ports_occupied_by_nothing_to_spawn() {
        // With an empty command the driver would fail to spawn; this only
        // exercises that recover_pool() doesn't panic scanning an empty
        // registry against a non-empty port range.
        let mut cfg = config();
        cfg.whisper_server.cmd = "/nonexistent/does-not-exist".into();
        let manager = PoolManager::new(cfg);
        manager.recover_pool().await;
        let status = manager.get_pool_status().await;
        assert_eq!(status.total_workers, 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    #[allow(clippy::expect_used)]
    async fn select_worker_skips_a_gated_worker_without_skewing_rotation() {
        use crate::worker::WorkerHandle;
        use tokio::process::Command;

        let manager = PoolManager::new(config());

        let mut ids = Vec::new();
        {
            let mut state = manager.inner.state.lock().await;
            for port in [19300u16, 19301, 19302] {
                let mut cmd = Command::new("sleep");
                cmd.arg("30");
                let child = cmd.spawn().expect("failed to spawn sleep");

                let mut worker = WorkerHandle::new(port, child);
                worker.record_probe_success(Utc::now());
                ids.push(worker.id);
                state.workers.push(worker);
            }
            // Gate the middle worker (B) out of selection.
            state.workers[1].accepting_requests = false;
        }

        let a = ids[0];
        let c = ids[2];

        let mut sequence = Vec::new();
        for _ in 0..4 {
            let selected = manager.select_worker().await.expect("a healthy worker is selectable");
            sequence.push(selected.id);
        }

        assert_eq!(sequence, vec![a, c, a, c]);

        let mut state = manager.inner.state.lock().await;
        for mut worker in state.workers.drain(..) {
            if let Some(mut child) = worker.take_process() {
                let _ = child.start_kill();
                let _ = child.wait().await;
            }
        }
    }
}
