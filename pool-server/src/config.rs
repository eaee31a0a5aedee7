//! Layered configuration: defaults, then an optional TOML file, then
//! environment variables prefixed `POOL_SERVER_`, the same precedence
//! order the `config` crate's builder applies everywhere it's used in this
//! workspace.

// Layer 1: Standard library imports
use std::path::PathBuf;

// Layer 2: Third-party crate imports
use serde::{Deserialize, Serialize};

// Layer 3: Internal module imports
use pool_core::{ChildCommandConfig, PoolConfig};

use crate::error::ServerError;

/// Top-level configuration for the `pool-server` binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address (`host:port`) the outer HTTP listener binds to. An ambient
    /// necessity for the server; the pool itself has no notion of this.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Worker pool configuration, passed straight through to
    /// `pool_core::PoolManager::new`.
    pub pool: PoolConfig,
}

fn default_bind_addr() -> String {
    "127.0.0.1:8090".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            pool: PoolConfig {
                pool_size: 2,
                rotate_threshold: 1000,
                starting_port: 9000,
                whisper_server: ChildCommandConfig::default(),
            },
        }
    }
}

impl ServerConfig {
    /// Load configuration from `path` (if it exists) layered over
    /// defaults, then over `POOL_SERVER_*` environment variables. `bind`
    /// overrides `bind_addr` last of all, if given (the CLI's `--bind`).
    pub fn load(path: Option<&PathBuf>, bind: Option<&str>) -> Result<Self, ServerError> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&Self::default())?);

        if let Some(path) = path {
            if path.exists() {
                builder = builder.add_source(config::File::from(path.as_path()));
            }
        }

        builder = builder.add_source(
            config::Environment::with_prefix("POOL_SERVER")
                .separator("__")
                .try_parsing(true),
        );

        if let Some(bind) = bind {
            builder = builder.set_override("bind_addr", bind)?;
        }

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }

    /// Default config file location: `~/.pool-server/config.toml`.
    pub fn default_path() -> PathBuf {
        let home_dir = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        home_dir.join(".pool-server").join("config.toml")
    }
}
