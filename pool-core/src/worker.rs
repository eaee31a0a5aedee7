//! The Worker Handle, a value object representing one supervised child (§3, §4.1).

// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::process::Child;

// Layer 3: Internal module imports
use crate::util::WorkerId;

/// Health state machine for a worker (§3 Lifecycles).
///
/// ```text
/// Starting --(first healthy probe)--> Healthy --(HEALTH_MAX_FAILURES failures)--> Unhealthy
///    |                                                                                |
///    +--(startup deadline elapses, terminated+removed)                  (replaced, then) v
///                                                                                    Stopped
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerState {
    /// Spawned, not yet confirmed healthy.
    Starting,
    /// Passed a health probe and is eligible for dispatch.
    Healthy,
    /// Failed `HEALTH_MAX_FAILURES` consecutive probes; pending replacement.
    Unhealthy,
    /// Terminated by `terminate()`. Terminal.
    Stopped,
}

/// One supervised child process plus its management state (§3).
pub struct WorkerHandle {
    /// Opaque unique ID, stable for the worker's entire life.
    pub id: WorkerId,

    /// TCP port the child listens on; the key for backoff accounting.
    pub port: u16,

    /// `http://127.0.0.1:<port>`.
    pub base_url: String,

    /// OS child process handle. `None` once `terminate()` has taken it to
    /// run the (possibly delayed) kill in a detached task.
    process: Option<Child>,

    /// Current health state.
    pub state: WorkerState,

    /// Monotonic count of requests dispatched to this worker.
    pub request_count: u64,

    /// Count of consecutive failing health probes; reset on any success.
    pub consecutive_failures: u32,

    /// Gate checked by the dispatcher in addition to `state == Healthy`.
    pub accepting_requests: bool,

    /// Wall-clock time of spawn.
    pub started_at: DateTime<Utc>,

    /// Wall-clock time of the most recent successful probe. `None` until
    /// the first one (spec's "0 until first").
    pub last_healthy_at: Option<DateTime<Utc>>,
}

impl WorkerHandle {
    /// Construct a freshly-spawned handle in `Starting` state.
    pub fn new(port: u16, process: Child) -> Self {
        Self {
            id: WorkerId::new(),
            port,
            base_url: format!("http://127.0.0.1:{port}"),
            process: Some(process),
            state: WorkerState::Starting,
            request_count: 0,
            consecutive_failures: 0,
            accepting_requests: true,
            started_at: Utc::now(),
            last_healthy_at: None,
        }
    }

    /// `true` iff this worker is selectable by the round-robin dispatcher.
    pub fn is_selectable(&self) -> bool {
        self.state == WorkerState::Healthy && self.accepting_requests
    }

    /// Liveness probe (§4.1): `true` iff the OS process has not yet
    /// reported an exit code. Used only by the Audit Sweep's dead-process
    /// pass, never by the Health Sweep.
    pub fn is_alive(&mut self) -> bool {
        match self.process.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// OS process ID, if the process is still tracked.
    pub fn pid(&self) -> Option<u32> {
        self.process.as_ref().and_then(Child::id)
    }

    /// Milliseconds since spawn, for `GET /api/v1/status`'s `uptime_ms`.
    pub fn uptime_ms(&self, now: DateTime<Utc>) -> i64 {
        (now - self.started_at).num_milliseconds().max(0)
    }

    /// Record a successful health probe: reset failures, mark healthy.
    pub fn record_probe_success(&mut self, now: DateTime<Utc>) {
        self.consecutive_failures = 0;
        self.last_healthy_at = Some(now);
        if self.state != WorkerState::Healthy {
            self.state = WorkerState::Healthy;
        }
    }

    /// Record a failed health probe: bump the consecutive-failure counter.
    pub fn record_probe_failure(&mut self) {
        self.consecutive_failures += 1;
    }

    /// Take ownership of the underlying OS process handle so the caller can
    /// schedule (possibly delayed) termination in a detached task. Leaves
    /// `self.process` empty; subsequent `is_alive()` calls report `false`.
    pub(crate) fn take_process(&mut self) -> Option<Child> {
        self.process.take()
    }
}

impl Drop for WorkerHandle {
    /// Safety net for an ungraceful manager crash: if `terminate()` never
    /// ran, best-effort kill the child so it doesn't outlive the handle as
    /// a zombie. Not a substitute for `dispose()`; it can't await the
    /// reap, so it only starts the kill.
    fn drop(&mut self) {
        if let Some(mut child) = self.process.take() {
            let _ = child.start_kill();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::process::Command;

    fn sleepy_child() -> Child {
        #[cfg(unix)]
        let mut cmd = Command::new("sleep");
        #[cfg(unix)]
        cmd.arg("30");
        #[cfg(not(unix))]
        let mut cmd = Command::new("cmd");
        #[cfg(not(unix))]
        cmd.args(["/C", "timeout", "30"]);
        #[allow(clippy::expect_used)]
        cmd.spawn().expect("failed to spawn test child")
    }

    #[tokio::test]
    async fn new_worker_starts_in_starting_state() {
        let handle = WorkerHandle::new(9000, sleepy_child());
        assert_eq!(handle.state, WorkerState::Starting);
        assert!(handle.accepting_requests);
        assert_eq!(handle.base_url, "http://127.0.0.1:9000");
        assert!(handle.last_healthy_at.is_none());
    }

    #[tokio::test]
    async fn not_selectable_until_healthy() {
        let mut handle = WorkerHandle::new(9001, sleepy_child());
        assert!(!handle.is_selectable());
        handle.record_probe_success(Utc::now());
        assert!(handle.is_selectable());
        handle.accepting_requests = false;
        assert!(!handle.is_selectable());
    }

    #[tokio::test]
    async fn probe_success_resets_failure_counter() {
        let mut handle = WorkerHandle::new(9002, sleepy_child());
        handle.record_probe_failure();
        handle.record_probe_failure();
        assert_eq!(handle.consecutive_failures, 2);
        handle.record_probe_success(Utc::now());
        assert_eq!(handle.consecutive_failures, 0);
        assert!(handle.last_healthy_at.is_some());
    }

    #[tokio::test]
    async fn is_alive_true_for_running_process() {
        let mut handle = WorkerHandle::new(9003, sleepy_child());
        assert!(handle.is_alive());
    }

    #[tokio::test]
    async fn is_alive_false_after_take_process() {
        let mut handle = WorkerHandle::new(9004, sleepy_child());
        if let Some(mut child) = handle.take_process() {
            let _ = child.start_kill();
            let _ = child.wait().await;
        }
        assert!(!handle.is_alive());
    }
}
