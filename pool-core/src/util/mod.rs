//! Utility types and helpers shared across the pool manager.

pub mod ids;
pub mod serde_helpers;

pub use ids::WorkerId;
pub use serde_helpers::duration_millis_serde;
