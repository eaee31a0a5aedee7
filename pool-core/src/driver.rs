//! The Worker Driver, spawns and terminates child inference processes (§4.1).

// Layer 1: Standard library imports
use std::time::Duration;

// Layer 2: Third-party crate imports
use tokio::process::Command;
use tracing::warn;

// Layer 3: Internal module imports
use crate::config::ChildCommandConfig;
use crate::error::SpawnError;
use crate::worker::{WorkerHandle, WorkerState};

/// Drain window between marking a worker non-accepting and killing it
/// during a graceful termination (§4.1, §5).
pub const GRACEFUL_DRAIN: Duration = Duration::from_secs(2);

/// Spawns and terminates child inference processes, and builds the
/// deterministic argument vector described in §4.1.
///
/// Stateless beyond its configuration: the driver never registers or
/// tracks workers itself, that is the Pool Manager's job (§4.3).
#[derive(Debug, Clone)]
pub struct WorkerDriver {
    config: ChildCommandConfig,
}

impl WorkerDriver {
    pub fn new(config: ChildCommandConfig) -> Self {
        Self { config }
    }

    /// Deterministic argv construction (§4.1):
    /// `[--port <p>]` always, `[--model <m>]` if non-empty, `[--threads <t>]`
    /// if `t > 0`, then whitespace-split `extra_args` tokens with empty
    /// tokens discarded.
    pub fn build_args(&self, port: u16) -> Vec<String> {
        let mut args = vec!["--port".to_string(), port.to_string()];

        if !self.config.model.is_empty() {
            args.push("--model".to_string());
            args.push(self.config.model.clone());
        }

        if self.config.threads > 0 {
            args.push("--threads".to_string());
            args.push(self.config.threads.to_string());
        }

        args.extend(
            self.config
                .extra_args
                .split_whitespace()
                .map(str::to_string),
        );

        args
    }

    /// Fork the child on `port`, returning a handle in `Starting` state.
    /// stdio is inherited by default; out-of-band log capture to files is
    /// an external collaborator's concern (§1), not this driver's.
    pub async fn spawn(&self, port: u16) -> Result<WorkerHandle, SpawnError> {
        let args = self.build_args(port);
        let mut command = Command::new(&self.config.cmd);
        command.args(&args);
        if self.config.cwd.as_os_str().len() > 0 {
            command.current_dir(&self.config.cwd);
        }

        let child = command
            .spawn()
            .map_err(|source| SpawnError::ProcessSpawnFailed { port, source })?;

        Ok(WorkerHandle::new(port, child))
    }

    /// Terminate a worker (§4.1). When `graceful`, a `SIGTERM` is sent
    /// immediately and the process is given `GRACEFUL_DRAIN` to exit on its
    /// own before being force-killed on a detached task; otherwise it is
    /// force-killed right away. `accepting_requests` clears and `state`
    /// moves to `Stopped` synchronously either way. Failures to signal or
    /// kill are logged, never propagated.
    pub async fn terminate(&self, worker: &mut WorkerHandle, graceful: bool) {
        worker.accepting_requests = false;
        worker.state = WorkerState::Stopped;

        let pid = worker.pid();
        let Some(mut child) = worker.take_process() else {
            return;
        };

        if graceful {
            if let Some(pid) = pid {
                send_sigterm(pid);
            }
            tokio::spawn(async move {
                tokio::time::sleep(GRACEFUL_DRAIN).await;
                if let Err(e) = child.start_kill() {
                    warn!(error = %e, "failed to force-kill worker after graceful drain");
                }
                let _ = child.wait().await;
            });
        } else {
            if let Err(e) = child.start_kill() {
                warn!(error = %e, "failed to kill worker immediately");
            }
            tokio::spawn(async move {
                let _ = child.wait().await;
            });
        }
    }
}

/// Best-effort `SIGTERM` so a graceful termination gives the child a chance
/// to exit cleanly before `GRACEFUL_DRAIN` elapses and it is force-killed.
#[cfg(unix)]
fn send_sigterm(pid: u32) {
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;

    if let Err(e) = signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        warn!(pid, error = %e, "failed to send SIGTERM");
    }
}

#[cfg(not(unix))]
fn send_sigterm(_pid: u32) {}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(cmd: &str) -> ChildCommandConfig {
        ChildCommandConfig {
            cmd: cmd.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn build_args_always_includes_port() {
        let driver = WorkerDriver::new(cfg("whisper-server"));
        assert_eq!(driver.build_args(9000), vec!["--port", "9000"]);
    }

    #[test]
    fn build_args_includes_model_when_non_empty() {
        let driver = WorkerDriver::new(ChildCommandConfig {
            model: "ggml-base.bin".into(),
            ..cfg("whisper-server")
        });
        assert_eq!(
            driver.build_args(9000),
            vec!["--port", "9000", "--model", "ggml-base.bin"]
        );
    }

    #[test]
    fn build_args_omits_threads_when_zero() {
        let driver = WorkerDriver::new(ChildCommandConfig {
            threads: 0,
            ..cfg("whisper-server")
        });
        assert_eq!(driver.build_args(9000), vec!["--port", "9000"]);
    }

    #[test]
    fn build_args_includes_threads_when_positive() {
        let driver = WorkerDriver::new(ChildCommandConfig {
            threads: 4,
            ..cfg("whisper-server")
        });
        assert_eq!(
            driver.build_args(9000),
            vec!["--port", "9000", "--threads", "4"]
        );
    }

    #[test]
    fn build_args_splits_extra_args_and_drops_empty_tokens() {
        let driver = WorkerDriver::new(ChildCommandConfig {
            extra_args: "  --flag-a   --flag-b val  ".into(),
            ..cfg("whisper-server")
        });
        assert_eq!(
            driver.build_args(9000),
            vec!["--port", "9000", "--flag-a", "--flag-b", "val"]
        );
    }

    #[test]
    fn build_args_orders_model_threads_then_extra() {
        let driver = WorkerDriver::new(ChildCommandConfig {
            cmd: "whisper-server".into(),
            model: "m.bin".into(),
            threads: 2,
            extra_args: "--verbose".into(),
            ..Default::default()
        });
        assert_eq!(
            driver.build_args(9100),
            vec![
                "--port", "9100", "--model", "m.bin", "--threads", "2", "--verbose"
            ]
        );
    }

    #[tokio::test]
    async fn spawn_failure_is_reported_as_spawn_error() {
        let driver = WorkerDriver::new(cfg("/nonexistent/binary/does-not-exist"));
        let result = driver.spawn(9200).await;
        assert!(matches!(
            result,
            Err(SpawnError::ProcessSpawnFailed { port: 9200, .. })
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    #[allow(clippy::expect_used)]
    async fn spawn_and_immediate_terminate_stops_the_worker() {
        let driver = WorkerDriver::new(ChildCommandConfig {
            extra_args: "30".into(),
            ..cfg("sleep")
        });
        let mut worker = driver.spawn(9300).await.expect("spawn should succeed");
        driver.terminate(&mut worker, false).await;
        assert_eq!(worker.state, WorkerState::Stopped);
        assert!(!worker.accepting_requests);
    }
}
