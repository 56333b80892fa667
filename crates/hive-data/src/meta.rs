//! Per-attribute metadata.
//!
//! Every set — including one that stores an unchanged value — appends
//! to the rolling history and bumps the update timestamps. Validity
//! and change timestamps move independently: an update that produced
//! an empty value advances `last_update` but not `last_valid_update`;
//! an update that reproduced the previous value advances neither
//! `last_change` nor validity unless the value is itself valid.

use serde_json::Value;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Rolling history depth per attribute.
pub const HISTORY_CAPACITY: usize = 10;

/// Returns whether a stored value counts as a usable observation.
///
/// Invalid values: null, empty string, empty array or object, and
/// numeric arrays whose every element is zero (a blank detection
/// frame). Scalar zero and `false` are valid — only the collection
/// forms encode "nothing seen".
///
/// # Example
///
/// ```
/// use hive_data::is_valid;
/// use serde_json::json;
///
/// assert!(is_valid(&json!(0)));
/// assert!(is_valid(&json!(false)));
/// assert!(is_valid(&json!([3, 0])));
///
/// assert!(!is_valid(&json!(null)));
/// assert!(!is_valid(&json!("")));
/// assert!(!is_valid(&json!([])));
/// assert!(!is_valid(&json!([0, 0, 0])));
/// ```
#[must_use]
pub fn is_valid(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::Array(items) => {
            if items.is_empty() {
                return false;
            }
            let all_zero_numbers = items.iter().all(|item| {
                item.as_f64().map(|n| n == 0.0).unwrap_or(false)
            });
            !all_zero_numbers
        }
        Value::Bool(_) | Value::Number(_) => true,
    }
}

/// Book-keeping attached to one attribute.
#[derive(Debug)]
pub struct AttributeMeta {
    /// Number of reads served.
    pub access_count: u64,
    /// Number of sets (updates and write-backs).
    pub update_count: u64,
    /// When the value was last set.
    pub last_update: Option<Instant>,
    /// When a valid value was last set.
    pub last_valid_update: Option<Instant>,
    /// When the stored value last differed from its predecessor.
    pub last_change: Option<Instant>,
    /// Rolling history of the last [`HISTORY_CAPACITY`] values.
    pub history: VecDeque<Value>,
    /// Cumulative time spent inside the update function.
    pub total_update_time: Duration,
}

impl AttributeMeta {
    /// Creates empty metadata for a freshly registered attribute.
    #[must_use]
    pub fn new() -> Self {
        Self {
            access_count: 0,
            update_count: 0,
            last_update: None,
            last_valid_update: None,
            last_change: None,
            history: VecDeque::with_capacity(HISTORY_CAPACITY),
            total_update_time: Duration::ZERO,
        }
    }

    /// Records one set of the attribute.
    ///
    /// `previous` is the value being replaced (`None` on the first
    /// set); `elapsed` is the time the producing update spent, zero
    /// for direct write-backs.
    pub fn record_set(&mut self, previous: Option<&Value>, new: &Value, elapsed: Duration) {
        let now = Instant::now();

        self.update_count += 1;
        self.last_update = Some(now);
        self.total_update_time += elapsed;

        if is_valid(new) {
            self.last_valid_update = Some(now);
        }

        let changed = match previous {
            Some(prev) => prev != new,
            None => true,
        };
        if changed {
            self.last_change = Some(now);
        }

        if self.history.len() == HISTORY_CAPACITY {
            self.history.pop_front();
        }
        self.history.push_back(new.clone());
    }

    /// Records one read.
    pub fn record_access(&mut self) {
        self.access_count += 1;
    }

    /// Age of the stored value, `None` before the first set.
    #[must_use]
    pub fn age(&self) -> Option<Duration> {
        self.last_update.map(|t| t.elapsed())
    }

    /// Most recent history entry satisfying the validity predicate.
    #[must_use]
    pub fn last_known_valid(&self) -> Option<&Value> {
        self.history.iter().rev().find(|v| is_valid(v))
    }
}

impl Default for AttributeMeta {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only diagnostic view of one attribute's metadata.
#[derive(Debug, Clone)]
pub struct AttributeSnapshot {
    /// Attribute name.
    pub name: String,
    /// Number of reads served.
    pub access_count: u64,
    /// Number of sets.
    pub update_count: u64,
    /// Age of the stored value.
    pub age: Option<Duration>,
    /// Entries currently in the rolling history.
    pub history_len: usize,
    /// Cumulative update-function time.
    pub total_update_time: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn validity_predicate() {
        assert!(is_valid(&json!(1)));
        assert!(is_valid(&json!(0)));
        assert!(is_valid(&json!(true)));
        assert!(is_valid(&json!(false)));
        assert!(is_valid(&json!("x")));
        assert!(is_valid(&json!([0, 1])));
        assert!(is_valid(&json!([0.5])));
        assert!(is_valid(&json!({"k": 1})));
        assert!(is_valid(&json!(["a", "b"])));

        assert!(!is_valid(&json!(null)));
        assert!(!is_valid(&json!("")));
        assert!(!is_valid(&json!([])));
        assert!(!is_valid(&json!({})));
        assert!(!is_valid(&json!([0, 0])));
        assert!(!is_valid(&json!([0.0, 0.0, 0.0])));
    }

    #[test]
    fn history_is_bounded() {
        let mut meta = AttributeMeta::new();
        let mut prev: Option<Value> = None;
        for i in 0..25 {
            let v = json!(i);
            meta.record_set(prev.as_ref(), &v, Duration::ZERO);
            prev = Some(v);
        }
        assert_eq!(meta.history.len(), HISTORY_CAPACITY);
        assert_eq!(meta.history.front(), Some(&json!(15)));
        assert_eq!(meta.history.back(), Some(&json!(24)));
        assert_eq!(meta.update_count, 25);
    }

    #[test]
    fn unchanged_value_still_appends() {
        let mut meta = AttributeMeta::new();
        let v = json!("same");
        meta.record_set(None, &v, Duration::ZERO);
        let first_change = meta.last_change;
        meta.record_set(Some(&v), &v, Duration::ZERO);

        assert_eq!(meta.history.len(), 2);
        assert_eq!(meta.update_count, 2);
        assert_eq!(meta.last_change, first_change);
    }

    #[test]
    fn invalid_value_does_not_advance_validity() {
        let mut meta = AttributeMeta::new();
        meta.record_set(None, &json!("seen"), Duration::ZERO);
        let valid_at = meta.last_valid_update;
        assert!(valid_at.is_some());

        meta.record_set(Some(&json!("seen")), &json!(""), Duration::ZERO);
        assert_eq!(meta.last_valid_update, valid_at);
        assert!(meta.last_update > valid_at);
    }

    #[test]
    fn last_known_valid_walks_back() {
        let mut meta = AttributeMeta::new();
        meta.record_set(None, &json!([1, 2]), Duration::ZERO);
        meta.record_set(Some(&json!([1, 2])), &json!([]), Duration::ZERO);
        meta.record_set(Some(&json!([])), &json!([0, 0]), Duration::ZERO);

        assert_eq!(meta.last_known_valid(), Some(&json!([1, 2])));
    }

    #[test]
    fn last_known_valid_none_when_all_invalid() {
        let mut meta = AttributeMeta::new();
        meta.record_set(None, &json!(null), Duration::ZERO);
        meta.record_set(Some(&json!(null)), &json!(""), Duration::ZERO);
        assert!(meta.last_known_valid().is_none());
    }

    #[test]
    fn update_time_accumulates() {
        let mut meta = AttributeMeta::new();
        meta.record_set(None, &json!(1), Duration::from_millis(5));
        meta.record_set(Some(&json!(1)), &json!(2), Duration::from_millis(7));
        assert_eq!(meta.total_update_time, Duration::from_millis(12));
    }
}
