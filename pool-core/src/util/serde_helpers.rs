//! Serialization helpers for common types.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Serde module for `Duration` as whole milliseconds.
///
/// Every timing constant in this crate (health interval, startup timeout,
/// base backoff, ...) is specified in milliseconds, so config and status
/// payloads round-trip through the same unit rather than seconds.
pub mod duration_millis_serde {
    use super::*;

    /// Serializes a `Duration` as milliseconds (u64).
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    /// Deserializes a `Duration` from milliseconds (u64).
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
