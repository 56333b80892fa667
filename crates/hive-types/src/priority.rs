//! Scheduling priority scale.
//!
//! Priorities are plain integers with the scheduler's convention baked
//! into the type: **a numerically lower value is more urgent**. The
//! background floor ([`Priority::BACKGROUND`]) is the least urgent value
//! representable and is where idle maintenance work lives.
//!
//! # Semantics
//!
//! | Question | Method | Rule |
//! |----------|--------|------|
//! | May A cancel running B? | [`preempts`](Priority::preempts) | `A < B` strictly |
//! | Is R admitted under floor F? | [`admitted_under`](Priority::admitted_under) | `R <= F` |
//!
//! Preemption is strict (equal priorities coexist); admission under a
//! barrier is inclusive (work at exactly the floor still enters).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Scheduling priority. Lower value = more urgent.
///
/// # Example
///
/// ```
/// use hive_types::Priority;
///
/// let rescue = Priority::new(1);
/// let rotation = Priority::new(50);
///
/// assert!(rescue.preempts(rotation));
/// assert!(!rotation.preempts(rescue));
/// assert!(!rescue.preempts(rescue));        // strict
/// assert!(rotation.admitted_under(rotation)); // inclusive
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Priority(pub i32);

impl Priority {
    /// The least urgent priority; where idle/background work runs.
    pub const BACKGROUND: Priority = Priority(i32::MAX);

    /// Creates a priority from a raw level.
    #[must_use]
    pub const fn new(level: i32) -> Self {
        Self(level)
    }

    /// Returns the raw level.
    #[must_use]
    pub const fn level(self) -> i32 {
        self.0
    }

    /// Returns `true` if a task at `self` may cancel a running task at
    /// `other`. Strict: equal priorities never preempt each other.
    #[must_use]
    pub const fn preempts(self, other: Priority) -> bool {
        self.0 < other.0
    }

    /// Returns `true` if a request at `self` is admitted under the
    /// priority floor `floor`. Inclusive: work at exactly the floor
    /// still enters; only numerically greater (less urgent) work is
    /// blocked.
    #[must_use]
    pub const fn admitted_under(self, floor: Priority) -> bool {
        self.0 <= floor.0
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::BACKGROUND
    }
}

impl From<i32> for Priority {
    fn from(level: i32) -> Self {
        Self(level)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::BACKGROUND {
            f.write_str("background")
        } else {
            write!(f, "{}", self.0)
        }
    }
}
