//! The reactive store.
//!
//! [`BotData`] is an explicit mapping from attribute name to
//! `(value, metadata, update_fn, threshold, error_handler)`. Reads go
//! through [`BotData::read`], which performs the staleness check and
//! refreshes before returning — the reactive behavior is an explicit
//! operation, not attribute-access magic.

use crate::error::DataError;
use crate::meta::{AttributeMeta, AttributeSnapshot};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Result of one update-function invocation.
pub type UpdateResult = Result<Value, String>;

/// Future returned by an update function.
type UpdateFuture = Pin<Box<dyn Future<Output = UpdateResult> + Send>>;

/// A registered producer for one attribute's value.
///
/// Update functions are nullary; whatever context they need (capture
/// handles, detection parameters) is captured at registration time.
pub type UpdateFn = Box<dyn FnMut() -> UpdateFuture + Send>;

/// A registered recovery routine, run once before the single retry
/// when an update function fails.
pub type RecoveryFn = Box<dyn FnMut() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send>;

/// Wraps an async closure into an [`UpdateFn`].
///
/// # Example
///
/// ```
/// use hive_data::update_fn;
/// use serde_json::json;
///
/// let producer = update_fn(|| async { Ok(json!(42)) });
/// ```
pub fn update_fn<F, Fut>(mut f: F) -> UpdateFn
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = UpdateResult> + Send + 'static,
{
    Box::new(move || Box::pin(f()))
}

/// Wraps an async closure into a [`RecoveryFn`].
pub fn recovery_fn<F, Fut>(mut f: F) -> RecoveryFn
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Box::new(move || Box::pin(f()))
}

/// Attribute names that accept direct external writes.
///
/// Everything else flows in through update functions or kernel
/// write-backs; these identity-style attributes are set once by the
/// session bring-up.
const SYSTEM_WRITABLE: &[&str] = &["ign", "channel"];

/// One attribute's full record.
struct AttributeEntry {
    value: Value,
    update: Option<UpdateFn>,
    threshold: Option<Duration>,
    recovery: Option<RecoveryFn>,
    meta: AttributeMeta,
}

impl AttributeEntry {
    fn set(&mut self, new: Value, elapsed: Duration) {
        let previous = if self.meta.update_count == 0 {
            None
        } else {
            Some(&self.value)
        };
        self.meta.record_set(previous, &new, elapsed);
        self.value = new;
    }
}

/// Per-worker reactive key/value store.
///
/// # Example
///
/// ```
/// use hive_data::{update_fn, BotData};
/// use serde_json::json;
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let mut data = BotData::new();
/// data.register(
///     "hp",
///     update_fn(|| async { Ok(json!(1250)) }),
///     Some(Duration::from_millis(100)),
///     None,
///     None,
/// )
/// .await
/// .unwrap();
///
/// assert_eq!(data.read("hp").await.unwrap(), json!(1250));
/// # }
/// ```
pub struct BotData {
    attributes: HashMap<String, AttributeEntry>,
}

impl BotData {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            attributes: HashMap::new(),
        }
    }

    /// Registers an attribute.
    ///
    /// Idempotent: re-registering an existing name overwrites the
    /// update function, threshold, and error handler but preserves the
    /// stored value, history, and counters. For a new name with no
    /// `initial`, a first update runs eagerly so the first read never
    /// observes a hole.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::UpdateFailed`] if the eager first update
    /// (and its recovery retry, when registered) fails.
    pub async fn register(
        &mut self,
        name: impl Into<String>,
        update: UpdateFn,
        threshold: Option<Duration>,
        initial: Option<Value>,
        recovery: Option<RecoveryFn>,
    ) -> Result<(), DataError> {
        let name = name.into();

        if let Some(entry) = self.attributes.get_mut(&name) {
            debug!(attribute = %name, "re-registering attribute, history preserved");
            entry.update = Some(update);
            entry.threshold = threshold;
            entry.recovery = recovery;
            return Ok(());
        }

        let needs_first_update = initial.is_none();
        let mut entry = AttributeEntry {
            value: Value::Null,
            update: Some(update),
            threshold,
            recovery,
            meta: AttributeMeta::new(),
        };
        if let Some(value) = initial {
            entry.set(value, Duration::ZERO);
        }
        self.attributes.insert(name.clone(), entry);

        if needs_first_update {
            self.refresh(&name).await?;
        }
        Ok(())
    }

    /// Reads an attribute, refreshing first when its age exceeds the
    /// registered threshold.
    ///
    /// Unknown names with the `has_` prefix return `false`: the
    /// capability-probe convention, so cross-cutting consumers can ask
    /// "does this bot track X" without registration order mattering.
    ///
    /// # Errors
    ///
    /// [`DataError::UnknownAttribute`] for other unknown names;
    /// [`DataError::UpdateFailed`] when a required refresh fails.
    pub async fn read(&mut self, name: &str) -> Result<Value, DataError> {
        let needs_refresh = match self.attributes.get(name) {
            None => {
                if name.starts_with("has_") {
                    return Ok(Value::Bool(false));
                }
                return Err(DataError::UnknownAttribute(name.to_string()));
            }
            Some(entry) => match entry.threshold {
                Some(threshold) => entry.meta.age().map_or(true, |age| age > threshold),
                None => false,
            },
        };

        if needs_refresh {
            self.refresh(name).await?;
        }

        let entry = self
            .attributes
            .get_mut(name)
            .ok_or_else(|| DataError::UnknownAttribute(name.to_string()))?;
        entry.meta.record_access();
        Ok(entry.value.clone())
    }

    /// Forces an update of one attribute.
    ///
    /// On failure the registered recovery routine (if any) runs once,
    /// followed by a single retry of the update. A second failure, or
    /// a failure with no recovery registered, propagates.
    ///
    /// # Errors
    ///
    /// [`DataError::UnknownAttribute`] if the name was never
    /// registered; [`DataError::UpdateFailed`] as described above.
    pub async fn refresh(&mut self, name: &str) -> Result<(), DataError> {
        let entry = self
            .attributes
            .get_mut(name)
            .ok_or_else(|| DataError::UnknownAttribute(name.to_string()))?;

        let started = Instant::now();
        let first = match entry.update.as_mut() {
            Some(update) => update().await,
            None => {
                return Err(DataError::UpdateFailed {
                    attribute: name.to_string(),
                    reason: "no update function registered".to_string(),
                })
            }
        };

        let outcome = match first {
            Ok(value) => Ok(value),
            Err(first_reason) => match entry.recovery.as_mut() {
                Some(recover) => {
                    warn!(
                        attribute = %name,
                        reason = %first_reason,
                        "update failed, running recovery and retrying once"
                    );
                    recover().await;
                    match entry.update.as_mut() {
                        Some(update) => update().await,
                        None => Err(first_reason),
                    }
                }
                None => Err(first_reason),
            },
        };

        match outcome {
            Ok(value) => {
                entry.set(value, started.elapsed());
                Ok(())
            }
            Err(reason) => Err(DataError::UpdateFailed {
                attribute: name.to_string(),
                reason,
            }),
        }
    }

    /// Direct external write.
    ///
    /// # Errors
    ///
    /// [`DataError::WriteForbidden`] unless the name is in the system
    /// allowlist. Everything else flows in through update functions or
    /// [`apply_update`](Self::apply_update).
    pub fn write(&mut self, name: &str, value: Value) -> Result<(), DataError> {
        if !SYSTEM_WRITABLE.contains(&name) {
            return Err(DataError::WriteForbidden(name.to_string()));
        }
        self.apply_update(name, value);
        Ok(())
    }

    /// Kernel write-back path.
    ///
    /// Used by the worker runtime to apply `Update` pipe messages
    /// (scheduled-task results routed via `update_attribute`) and by
    /// session bring-up for identity attributes. Creates a passive
    /// attribute (no update function, no threshold) when the name is
    /// new; metadata and history are maintained either way.
    pub fn apply_update(&mut self, name: &str, value: Value) {
        match self.attributes.get_mut(name) {
            Some(entry) => entry.set(value, Duration::ZERO),
            None => {
                let mut entry = AttributeEntry {
                    value: Value::Null,
                    update: None,
                    threshold: None,
                    recovery: None,
                    meta: AttributeMeta::new(),
                };
                entry.set(value, Duration::ZERO);
                self.attributes.insert(name.to_string(), entry);
            }
        }
    }

    /// Most recent history entry satisfying the validity predicate.
    ///
    /// # Errors
    ///
    /// [`DataError::UnknownAttribute`] for unregistered names.
    pub fn last_known_valid(&self, name: &str) -> Result<Option<Value>, DataError> {
        self.entry(name)
            .map(|entry| entry.meta.last_known_valid().cloned())
    }

    /// Time since a valid value was last stored; `None` if never.
    ///
    /// # Errors
    ///
    /// [`DataError::UnknownAttribute`] for unregistered names.
    pub fn time_since_last_valid(&self, name: &str) -> Result<Option<Duration>, DataError> {
        self.entry(name)
            .map(|entry| entry.meta.last_valid_update.map(|t| t.elapsed()))
    }

    /// Time since the stored value last changed; `None` if never set.
    ///
    /// # Errors
    ///
    /// [`DataError::UnknownAttribute`] for unregistered names.
    pub fn time_since_last_change(&self, name: &str) -> Result<Option<Duration>, DataError> {
        self.entry(name)
            .map(|entry| entry.meta.last_change.map(|t| t.elapsed()))
    }

    /// Diagnostic snapshot of one attribute.
    ///
    /// # Errors
    ///
    /// [`DataError::UnknownAttribute`] for unregistered names.
    pub fn snapshot(&self, name: &str) -> Result<AttributeSnapshot, DataError> {
        self.entry(name).map(|entry| AttributeSnapshot {
            name: name.to_string(),
            access_count: entry.meta.access_count,
            update_count: entry.meta.update_count,
            age: entry.meta.age(),
            history_len: entry.meta.history.len(),
            total_update_time: entry.meta.total_update_time,
        })
    }

    /// Diagnostic snapshots of every attribute, unordered.
    #[must_use]
    pub fn snapshots(&self) -> Vec<AttributeSnapshot> {
        self.attributes
            .keys()
            .filter_map(|name| self.snapshot(name).ok())
            .collect()
    }

    /// Returns `true` if the attribute is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    /// Number of registered attributes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Returns `true` when no attribute is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// History of one attribute, oldest first.
    ///
    /// # Errors
    ///
    /// [`DataError::UnknownAttribute`] for unregistered names.
    pub fn history(&self, name: &str) -> Result<Vec<Value>, DataError> {
        self.entry(name)
            .map(|entry| entry.meta.history.iter().cloned().collect())
    }

    fn entry(&self, name: &str) -> Result<&AttributeEntry, DataError> {
        self.attributes
            .get(name)
            .ok_or_else(|| DataError::UnknownAttribute(name.to_string()))
    }
}

impl Default for BotData {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    fn counter_fn(counter: Arc<AtomicU64>) -> UpdateFn {
        update_fn(move || {
            let counter = Arc::clone(&counter);
            async move { Ok(json!(counter.fetch_add(1, Ordering::SeqCst) + 1)) }
        })
    }

    #[tokio::test]
    async fn register_with_initial_skips_eager_update() {
        let counter = Arc::new(AtomicU64::new(0));
        let mut data = BotData::new();
        data.register("x", counter_fn(Arc::clone(&counter)), None, Some(json!(7)), None)
            .await
            .unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(data.read("x").await.unwrap(), json!(7));
    }

    #[tokio::test]
    async fn threshold_triggers_refresh_on_read() {
        let counter = Arc::new(AtomicU64::new(0));
        let mut data = BotData::new();
        data.register(
            "x",
            counter_fn(Arc::clone(&counter)),
            Some(Duration::from_millis(100)),
            None,
            None,
        )
        .await
        .unwrap();

        // Eager first update produced 1; both reads are inside the window.
        assert_eq!(data.read("x").await.unwrap(), json!(1));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(data.read("x").await.unwrap(), json!(1));

        tokio::time::sleep(Duration::from_millis(110)).await;
        assert_eq!(data.read("x").await.unwrap(), json!(2));

        assert_eq!(data.history("x").unwrap(), vec![json!(1), json!(2)]);

        // Both stored values are non-empty, so validity tracked update.
        let snapshot = data.snapshot("x").unwrap();
        assert_eq!(snapshot.update_count, 2);
        assert_eq!(
            data.time_since_last_valid("x").unwrap().is_some(),
            data.time_since_last_change("x").unwrap().is_some(),
        );
    }

    #[tokio::test]
    async fn no_threshold_means_no_auto_refresh() {
        let counter = Arc::new(AtomicU64::new(0));
        let mut data = BotData::new();
        data.register("x", counter_fn(Arc::clone(&counter)), None, None, None)
            .await
            .unwrap();

        for _ in 0..5 {
            assert_eq!(data.read("x").await.unwrap(), json!(1));
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_read_fails_except_capability_probes() {
        let mut data = BotData::new();
        assert_eq!(
            data.read("hp").await,
            Err(DataError::UnknownAttribute("hp".into()))
        );
        assert_eq!(data.read("has_pet").await.unwrap(), json!(false));
    }

    #[tokio::test]
    async fn reregister_preserves_history() {
        let mut data = BotData::new();
        data.register("x", update_fn(|| async { Ok(json!(1)) }), None, None, None)
            .await
            .unwrap();
        data.refresh("x").await.unwrap();

        data.register("x", update_fn(|| async { Ok(json!(99)) }), None, None, None)
            .await
            .unwrap();

        // History from before re-registration survives; the new
        // update function takes over on the next refresh.
        assert_eq!(data.history("x").unwrap(), vec![json!(1), json!(1)]);
        data.refresh("x").await.unwrap();
        assert_eq!(data.read("x").await.unwrap(), json!(99));
    }

    #[tokio::test]
    async fn recovery_runs_once_then_retry() {
        let attempts = Arc::new(AtomicU64::new(0));
        let recovered = Arc::new(AtomicU64::new(0));

        let a = Arc::clone(&attempts);
        let update = update_fn(move || {
            let a = Arc::clone(&a);
            async move {
                if a.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err("client window lost".to_string())
                } else {
                    Ok(json!("found"))
                }
            }
        });

        let r = Arc::clone(&recovered);
        let recovery = recovery_fn(move || {
            let r = Arc::clone(&r);
            async move {
                r.fetch_add(1, Ordering::SeqCst);
            }
        });

        let mut data = BotData::new();
        data.register("target", update, None, None, Some(recovery))
            .await
            .unwrap();

        assert_eq!(data.read("target").await.unwrap(), json!("found"));
        assert_eq!(recovered.load(Ordering::SeqCst), 1);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn update_failure_without_recovery_propagates() {
        let mut data = BotData::new();
        let result = data
            .register(
                "x",
                update_fn(|| async { Err("no capture".to_string()) }),
                None,
                None,
                None,
            )
            .await;

        assert_eq!(
            result,
            Err(DataError::UpdateFailed {
                attribute: "x".into(),
                reason: "no capture".into(),
            })
        );
    }

    #[tokio::test]
    async fn external_writes_restricted_to_allowlist() {
        let mut data = BotData::new();
        assert!(data.write("ign", json!("Aria")).is_ok());
        assert_eq!(data.read("ign").await.unwrap(), json!("Aria"));

        assert_eq!(
            data.write("hp", json!(100)),
            Err(DataError::WriteForbidden("hp".into()))
        );
    }

    #[tokio::test]
    async fn apply_update_creates_passive_attribute() {
        let mut data = BotData::new();
        data.apply_update("rune_solved", json!(true));
        assert_eq!(data.read("rune_solved").await.unwrap(), json!(true));

        // Passive attributes never auto-refresh.
        data.apply_update("rune_solved", json!(false));
        assert_eq!(data.read("rune_solved").await.unwrap(), json!(false));
        assert_eq!(data.history("rune_solved").unwrap().len(), 2);
    }

    #[tokio::test]
    async fn last_known_valid_skips_blank_frames() {
        let mut data = BotData::new();
        data.register("mobs", update_fn(|| async { Ok(json!([4, 7])) }), None, None, None)
            .await
            .unwrap();
        data.apply_update("mobs", json!([]));
        data.apply_update("mobs", json!([0, 0]));

        assert_eq!(data.last_known_valid("mobs").unwrap(), Some(json!([4, 7])));
        assert_eq!(data.read("mobs").await.unwrap(), json!([0, 0]));
    }

    #[tokio::test]
    async fn snapshots_cover_all_attributes() {
        let mut data = BotData::new();
        data.apply_update("a", json!(1));
        data.apply_update("b", json!(2));
        let mut names: Vec<String> = data.snapshots().into_iter().map(|s| s.name).collect();
        names.sort();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
    }
}
