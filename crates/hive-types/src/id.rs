//! Identifier types for HIVE.
//!
//! All identifiers are UUID-backed so they stay unique across the whole
//! session regardless of which runtime task minted them.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::{uuid, Uuid};

/// HIVE namespace UUID for deterministic UUID v5 generation.
///
/// Used as the namespace when deriving worker ids from in-game names,
/// so the same character always maps to the same [`WorkerId`].
const HIVE_NAMESPACE: Uuid = uuid!("6f1f6f62-7f1e-4c13-9b47-5a2d86a3c1e4");

/// Identifier for a worker runtime.
///
/// A worker drives exactly one game client; everything the worker emits
/// (action requests, pipe traffic, store attributes) is tagged with its
/// `WorkerId`.
///
/// # UUID Strategy
///
/// - **Named workers**: UUID v5, deterministic from the in-game name
/// - **Anonymous workers** (tests, scratch runtimes): UUID v4, random
///
/// Deterministic ids keep log lines and scheduler snapshots correlatable
/// across restarts of the same character roster.
///
/// # Example
///
/// ```
/// use hive_types::WorkerId;
///
/// let a1 = WorkerId::named("Aria");
/// let a2 = WorkerId::named("Aria");
/// assert_eq!(a1, a2);            // Same name, same id
///
/// let t1 = WorkerId::new();
/// let t2 = WorkerId::new();
/// assert_ne!(t1, t2);            // Anonymous ids are unique
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkerId {
    /// Globally unique identifier.
    pub uuid: Uuid,
    /// Human-readable label (in-game name, or "worker" for anonymous).
    pub name: String,
}

impl WorkerId {
    /// Creates an anonymous worker id with a random UUID v4.
    #[must_use]
    pub fn new() -> Self {
        Self {
            uuid: Uuid::new_v4(),
            name: "worker".to_string(),
        }
    }

    /// Creates a worker id deterministically derived from an in-game name.
    ///
    /// # Example
    ///
    /// ```
    /// use hive_types::WorkerId;
    ///
    /// let a = WorkerId::named("Aria");
    /// let b = WorkerId::named("Brynn");
    /// assert_ne!(a.uuid, b.uuid);
    /// assert_eq!(a.name, "Aria");
    /// ```
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            uuid: Uuid::new_v5(&HIVE_NAMESPACE, name.as_bytes()),
            name,
        }
    }

    /// Returns `true` if this id was derived from the given name.
    #[must_use]
    pub fn is_named(&self, name: &str) -> bool {
        self.name == name
    }
}

impl Default for WorkerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Identity of one pushed priority-floor barrier.
///
/// A scheduler request with `block_lower_priority` pushes a floor entry
/// tagged with a fresh `BarrierId`; the done-callback of that task pops
/// exactly that entry. Removal is by identity, never by priority value,
/// so two barriers at the same priority cannot alias.
///
/// # Example
///
/// ```
/// use hive_types::BarrierId;
///
/// let a = BarrierId::new();
/// let b = BarrierId::new();
/// assert_ne!(a, b);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BarrierId(Uuid);

impl BarrierId {
    /// Mints a fresh barrier identity.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BarrierId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BarrierId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_worker_is_deterministic() {
        let a = WorkerId::named("Aria");
        let b = WorkerId::named("Aria");
        assert_eq!(a, b);
        assert_eq!(a.uuid, b.uuid);
    }

    #[test]
    fn different_names_differ() {
        let a = WorkerId::named("Aria");
        let b = WorkerId::named("Brynn");
        assert_ne!(a.uuid, b.uuid);
    }

    #[test]
    fn anonymous_workers_are_unique() {
        assert_ne!(WorkerId::new(), WorkerId::new());
    }

    #[test]
    fn display_uses_name() {
        let id = WorkerId::named("Aria");
        assert_eq!(id.to_string(), "Aria");
        assert!(id.is_named("Aria"));
        assert!(!id.is_named("Brynn"));
    }

    #[test]
    fn barrier_ids_are_unique() {
        assert_ne!(BarrierId::new(), BarrierId::new());
    }

    #[test]
    fn worker_id_serde_round_trip() {
        let id = WorkerId::named("Aria");
        let json = serde_json::to_string(&id).unwrap();
        let back: WorkerId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}
