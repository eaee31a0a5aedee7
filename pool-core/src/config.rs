//! Configuration the pool manager reads at `init()` time (§6).

// Layer 1: Standard library imports
use std::path::PathBuf;

// Layer 2: Third-party crate imports
use serde::{Deserialize, Serialize};

// Layer 3: Internal module imports
// (none)

/// Child command configuration: how `whisper-server` (or any compatible
/// inference binary) is launched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChildCommandConfig {
    /// Executable (or path to it). Must be non-empty at `init()`.
    pub cmd: String,

    /// Working directory for the child process. Defaults to the manager
    /// process's own working directory when empty.
    #[serde(default)]
    pub cwd: PathBuf,

    /// Model path/name passed as `--model <m>` when non-empty.
    #[serde(default)]
    pub model: String,

    /// Thread count passed as `--threads <t>` when greater than zero.
    #[serde(default)]
    pub threads: u32,

    /// Free-form extra arguments, whitespace-split, empty tokens discarded.
    #[serde(default)]
    pub extra_args: String,
}

impl Default for ChildCommandConfig {
    fn default() -> Self {
        Self {
            cmd: String::new(),
            cwd: PathBuf::new(),
            model: String::new(),
            threads: 0,
            extra_args: String::new(),
        }
    }
}

/// Pool-wide configuration (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Number of workers the pool tends toward.
    pub pool_size: usize,

    /// Requests a worker serves before it is voluntarily rotated out.
    pub rotate_threshold: u64,

    /// First port in the contiguous range `[starting_port, starting_port + pool_size)`.
    pub starting_port: u16,

    /// Child process launch configuration.
    pub whisper_server: ChildCommandConfig,
}

impl PoolConfig {
    /// The port range workers are spawned across, per §4.3.1/§4.3.4.
    pub fn port_range(&self) -> std::ops::Range<u16> {
        self.starting_port..self.starting_port.saturating_add(self.pool_size as u16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PoolConfig {
        PoolConfig {
            pool_size: 3,
            rotate_threshold: 100,
            starting_port: 9000,
            whisper_server: ChildCommandConfig {
                cmd: "whisper-server".into(),
                ..Default::default()
            },
        }
    }

    #[test]
    fn port_range_covers_configured_ports() {
        let cfg = sample();
        let ports: Vec<u16> = cfg.port_range().collect();
        assert_eq!(ports, vec![9000, 9001, 9002]);
    }

    #[test]
    fn default_child_command_is_empty() {
        let cfg = ChildCommandConfig::default();
        assert!(cfg.cmd.is_empty());
        assert_eq!(cfg.threads, 0);
    }
}
