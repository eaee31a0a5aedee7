// Layer 1: Standard library imports
use std::fmt::{self, Display};

// Layer 2: Third-party crate imports
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Layer 3: Internal module imports
// (none)

/// Opaque identifier for a supervised worker.
///
/// Stable for the worker's entire life; generated once at spawn time
/// (`spawn_worker`) and never reused, even across replacement of the
/// same port.
///
/// # Example
///
/// ```rust
/// use pool_core::util::WorkerId;
///
/// let id1 = WorkerId::new();
/// let id2 = WorkerId::new();
/// assert_ne!(id1, id2); // Globally unique
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkerId(Uuid);

impl WorkerId {
    /// Generate a new random worker ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `WorkerId` from an existing UUID (used in tests/fixtures).
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for WorkerId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_ids_are_unique() {
        let a = WorkerId::new();
        let b = WorkerId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn worker_id_from_uuid_roundtrips() {
        let uuid = Uuid::new_v4();
        let id = WorkerId::from_uuid(uuid);
        assert_eq!(id.as_uuid(), &uuid);
    }

    #[test]
    fn worker_id_display_is_not_empty() {
        let id = WorkerId::new();
        let display = format!("{id}");
        assert!(!display.is_empty());
        assert!(display.contains('-'));
    }

    #[test]
    fn worker_id_default_is_random() {
        let a = WorkerId::default();
        let b = WorkerId::default();
        assert_ne!(a, b);
    }
}
