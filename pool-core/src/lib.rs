//! # pool-core - Worker Pool Manager for external speech-to-text inference
//!
//! Supervises a fixed-size pool of `whisper-server`-compatible child
//! processes: spawning them, confirming startup health, probing liveness on
//! a schedule, replacing workers that fail health checks or exit
//! unexpectedly, and dispatching inference requests across the pool with
//! round-robin rotation.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use pool_core::{ChildCommandConfig, PoolConfig, PoolManager};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PoolConfig {
//!         pool_size: 2,
//!         rotate_threshold: 1000,
//!         starting_port: 9000,
//!         whisper_server: ChildCommandConfig {
//!             cmd: "whisper-server".into(),
//!             model: "ggml-base.en.bin".into(),
//!             ..Default::default()
//!         },
//!     };
//!
//!     let manager = PoolManager::new(config);
//!     manager.init().await?;
//!
//!     let result = manager
//!         .transcribe("<base64 audio>", Some("en"), true, Default::default())
//!         .await?;
//!     println!("{}", result.text);
//!
//!     manager.dispose().await;
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! ## Core Components
//! - [`driver`] - Spawns and terminates child inference processes
//! - [`prober`] - Stateless `/health` liveness checks
//! - [`manager`] - The Pool Manager: registry, sweeps, dispatch
//! - [`proxy`] (re-exported onto [`manager::PoolManager`]) - The
//!   request-proxy path
//!
//! ## Supporting Types
//! - [`worker`] - `WorkerHandle` and its health state machine
//! - [`backoff`] - Per-port exponential backoff bookkeeping
//! - [`config`] - Pool and child-process configuration
//! - [`error`] - `PoolError` (public) and `SpawnError` (internal)
//! - [`types`] - Wire shapes shared with the outer HTTP surface
//! - [`util`] - `WorkerId` and small serde helpers
//!
//! # Standards
//!
//! - 3-layer import organization (std -> third-party -> internal) in every
//!   module.
//! - `chrono::DateTime<Utc>` for every timestamp.
//! - A single `tokio::sync::Mutex` guards the registry, cursor, and backoff
//!   table together; HTTP calls are always issued after the guard drops.

pub mod backoff;
pub mod config;
pub mod driver;
pub mod error;
pub mod manager;
pub mod prober;
mod proxy;
pub mod types;
pub mod util;
pub mod worker;

pub use backoff::{BackoffRecord, BackoffTable};
pub use config::{ChildCommandConfig, PoolConfig};
pub use driver::WorkerDriver;
pub use error::{PoolError, SpawnError};
pub use manager::PoolManager;
pub use prober::HealthProber;
pub use types::{PoolStatus, ProviderInfo, Segment, TranscriptionResult, WorkerStatus, PROVIDER_NAME};
pub use util::WorkerId;
pub use worker::{WorkerHandle, WorkerState};
