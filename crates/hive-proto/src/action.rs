//! Action envelopes.
//!
//! An [`ActionRequest`] is the immutable unit of work a decision maker
//! sends up its pipe. The main-loop scheduler turns it into a named,
//! prioritized task; the envelope itself carries everything the
//! scheduler needs to admit, dedup, preempt, and report back.

use hive_types::{Priority, WorkerId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

/// Future produced by one invocation of an action procedure.
pub type BoxedActionFuture = Pin<Box<dyn Future<Output = Result<Value, ActionFailure>> + Send>>;

/// A resumable action procedure.
///
/// The procedure is a factory, not a future: validation retries invoke
/// it again for each submission. Arguments are captured by the closure.
pub type ActionFn = Arc<dyn Fn() -> BoxedActionFuture + Send + Sync>;

/// A result observer attached to a scheduled task.
///
/// Callbacks run in the task's done path, in the order they were
/// attached, after the exception policy and the `update_attribute`
/// write-back have been applied.
pub type CallbackFn = Arc<dyn Fn(&ActionOutcome) + Send + Sync>;

/// Wraps an async closure into an [`ActionFn`].
///
/// # Example
///
/// ```
/// use hive_proto::action_fn;
/// use serde_json::json;
///
/// let procedure = action_fn(|| async { Ok(json!("done")) });
/// ```
pub fn action_fn<F, Fut>(f: F) -> ActionFn
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ActionFailure>> + Send + 'static,
{
    Arc::new(move || Box::pin(f()))
}

/// Why an action did not complete with a value.
///
/// # Variants
///
/// | Variant | Benign | Fatal | Typical source |
/// |---------|--------|-------|----------------|
/// | `Timeout` | yes | no | configured action deadline elapsed |
/// | `ValidationTimeout` | no | no | act-and-confirm retries exhausted |
/// | `Duplicate` | no | no | name collision with dedup opted out |
/// | `Failed` | no | yes | any other uncaught procedure error |
///
/// Benign failures are logged and dropped; non-fatal failures surface
/// to the submitter; fatal failures raise an aux alert and broadcast
/// shutdown (the kernel prefers consistent shutdown to silent
/// misbehavior while it holds the host's input system).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum ActionFailure {
    /// The configured deadline for the action elapsed.
    #[error("action timed out after {elapsed_ms} ms")]
    Timeout {
        /// Time spent before the deadline fired.
        elapsed_ms: u64,
    },

    /// An act-and-confirm exchange exhausted its trials.
    #[error("validation did not confirm '{identifier}' within {trials} trials")]
    ValidationTimeout {
        /// Identifier of the validated action.
        identifier: String,
        /// Number of submissions attempted.
        trials: u32,
    },

    /// A live task with the same name already exists and the request
    /// opted out of cancel-and-replace.
    #[error("duplicate task name '{identifier}'")]
    Duplicate {
        /// The colliding identifier.
        identifier: String,
    },

    /// Any other error raised by the procedure.
    #[error("action failed: {0}")]
    Failed(String),
}

impl ActionFailure {
    /// Returns `true` for failures the exception policy ignores.
    #[must_use]
    pub fn is_benign(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns `true` for failures that must alert and shut the
    /// session down.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Final state of a scheduled action, reported on the worker pipe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionOutcome {
    /// The procedure returned a value.
    Completed(Value),
    /// The procedure returned an error.
    Failed(ActionFailure),
    /// The task was canceled (preemption, dedup, or shutdown).
    Canceled,
}

impl ActionOutcome {
    /// Returns the completed value, if any.
    #[must_use]
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Completed(v) => Some(v),
            _ => None,
        }
    }

    /// Returns `true` if the action completed with a value.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

/// Out-of-band relay payload for the peripherals runner.
///
/// Forwarded unchanged to the external chat bridge: a text alert, an
/// image capture, or both. At least one side is expected to be set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayRequest {
    /// Text to relay.
    pub message: Option<String>,
    /// Encoded image blob to relay.
    pub image: Option<Vec<u8>>,
}

impl RelayRequest {
    /// Creates a text-only relay payload.
    #[must_use]
    pub fn text(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            image: None,
        }
    }

    /// Creates an image-only relay payload.
    #[must_use]
    pub fn image(image: Vec<u8>) -> Self {
        Self {
            message: None,
            image: Some(image),
        }
    }

    /// Attaches an image (builder-style).
    #[must_use]
    pub fn with_image(mut self, image: Vec<u8>) -> Self {
        self.image = Some(image);
        self
    }

    /// Returns `true` when neither text nor image is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.message.is_none() && self.image.is_none()
    }
}

/// Immutable envelope describing one unit of work for the main loop.
///
/// Constructed by a decision maker, sent over the worker pipe,
/// materialized as a named task by the scheduler, discarded after
/// completion.
///
/// # Identity
///
/// `identifier` is a human-readable name, typically
/// `"<component> - <sub-action>"`. Uniqueness is enforced per
/// `(worker, identifier)` unless `cancels_across_workers` opts into
/// global identity.
///
/// # Example
///
/// ```
/// use hive_proto::{action_fn, ActionRequest};
/// use hive_types::{Priority, WorkerId};
/// use serde_json::json;
///
/// let request = ActionRequest::new(
///     "rotation - cast buff",
///     WorkerId::named("Aria"),
///     Priority::new(50),
///     action_fn(|| async { Ok(json!(true)) }),
/// )
/// .with_update_attribute("buff_active")
/// .blocking_lower_priority();
///
/// assert!(request.cancels_same_name);
/// assert!(request.block_lower_priority);
/// ```
#[derive(Clone)]
pub struct ActionRequest {
    /// Task name, unique within the originating worker by default.
    pub identifier: String,
    /// The resumable procedure to run in the main loop.
    pub procedure: ActionFn,
    /// Scheduling priority; lower value = more urgent.
    pub priority: Priority,
    /// Originating worker.
    pub worker: WorkerId,
    /// Cancel a live task with the same `(worker, identifier)` instead
    /// of rejecting this request. Defaults to `true`.
    pub cancels_same_name: bool,
    /// Cancel every live task with the same identifier regardless of
    /// worker. Defaults to `false`.
    pub cancels_across_workers: bool,
    /// Whether a more urgent request may cancel this task once it is
    /// running. Defaults to `true`.
    pub cancellable: bool,
    /// Push a priority floor for the lifetime of this task, blocking
    /// admission of less urgent work. Defaults to `false`.
    pub block_lower_priority: bool,
    /// Task names to cancel immediately on admission.
    pub cancel_task_names: Vec<String>,
    /// Result observers, run in order in the done path.
    pub callbacks: Vec<CallbackFn>,
    /// On completion, write the task's value into the originating
    /// worker's store under this attribute name.
    pub update_attribute: Option<String>,
    /// Out-of-band relay payload, forwarded to peripherals on admission.
    pub aux: Option<RelayRequest>,
}

impl ActionRequest {
    /// Creates a request with the default policy: dedup by
    /// cancel-and-replace within the worker, cancellable, no barrier.
    #[must_use]
    pub fn new(
        identifier: impl Into<String>,
        worker: WorkerId,
        priority: Priority,
        procedure: ActionFn,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            procedure,
            priority,
            worker,
            cancels_same_name: true,
            cancels_across_workers: false,
            cancellable: true,
            block_lower_priority: false,
            cancel_task_names: Vec::new(),
            callbacks: Vec::new(),
            update_attribute: None,
            aux: None,
        }
    }

    /// Opts out of same-name cancel-and-replace: a collision is
    /// rejected back to the submitter instead.
    #[must_use]
    pub fn rejecting_duplicates(mut self) -> Self {
        self.cancels_same_name = false;
        self
    }

    /// Extends identity across workers: admission cancels every live
    /// task with this identifier, whichever worker owns it.
    #[must_use]
    pub fn cancelling_across_workers(mut self) -> Self {
        self.cancels_across_workers = true;
        self
    }

    /// Marks the task as not preemptible by more urgent work.
    #[must_use]
    pub fn not_cancellable(mut self) -> Self {
        self.cancellable = false;
        self
    }

    /// Pushes a priority floor for the lifetime of the task.
    #[must_use]
    pub fn blocking_lower_priority(mut self) -> Self {
        self.block_lower_priority = true;
        self
    }

    /// Adds task names to cancel immediately on admission.
    #[must_use]
    pub fn with_cancel_task_names(mut self, names: Vec<String>) -> Self {
        self.cancel_task_names = names;
        self
    }

    /// Appends a result observer to the done chain.
    #[must_use]
    pub fn with_callback(mut self, callback: CallbackFn) -> Self {
        self.callbacks.push(callback);
        self
    }

    /// Writes the task's value back into the originating worker's
    /// store under `attribute` on completion.
    #[must_use]
    pub fn with_update_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.update_attribute = Some(attribute.into());
        self
    }

    /// Attaches an out-of-band relay payload.
    #[must_use]
    pub fn with_aux(mut self, aux: RelayRequest) -> Self {
        self.aux = Some(aux);
        self
    }
}

impl fmt::Debug for ActionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionRequest")
            .field("identifier", &self.identifier)
            .field("priority", &self.priority)
            .field("worker", &self.worker)
            .field("cancels_same_name", &self.cancels_same_name)
            .field("cancels_across_workers", &self.cancels_across_workers)
            .field("cancellable", &self.cancellable)
            .field("block_lower_priority", &self.block_lower_priority)
            .field("cancel_task_names", &self.cancel_task_names)
            .field("callbacks", &self.callbacks.len())
            .field("update_attribute", &self.update_attribute)
            .field("aux", &self.aux.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn noop() -> ActionFn {
        action_fn(|| async { Ok(Value::Null) })
    }

    #[test]
    fn defaults_match_policy() {
        let req = ActionRequest::new("test - act", WorkerId::new(), Priority::new(10), noop());
        assert!(req.cancels_same_name);
        assert!(!req.cancels_across_workers);
        assert!(req.cancellable);
        assert!(!req.block_lower_priority);
        assert!(req.cancel_task_names.is_empty());
        assert!(req.callbacks.is_empty());
        assert!(req.update_attribute.is_none());
        assert!(req.aux.is_none());
    }

    #[test]
    fn builders_compose() {
        let req = ActionRequest::new("test - act", WorkerId::new(), Priority::new(10), noop())
            .rejecting_duplicates()
            .cancelling_across_workers()
            .not_cancellable()
            .blocking_lower_priority()
            .with_cancel_task_names(vec!["other - act".into()])
            .with_update_attribute("hp")
            .with_aux(RelayRequest::text("hello"));

        assert!(!req.cancels_same_name);
        assert!(req.cancels_across_workers);
        assert!(!req.cancellable);
        assert!(req.block_lower_priority);
        assert_eq!(req.cancel_task_names, vec!["other - act".to_string()]);
        assert_eq!(req.update_attribute.as_deref(), Some("hp"));
        assert_eq!(req.aux.unwrap().message.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn procedure_is_reinvocable() {
        let procedure = action_fn(|| async { Ok(json!(1)) });
        let first = (procedure)().await.unwrap();
        let second = (procedure)().await.unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn failure_classes() {
        assert!(ActionFailure::Timeout { elapsed_ms: 5 }.is_benign());
        assert!(!ActionFailure::Timeout { elapsed_ms: 5 }.is_fatal());

        let validation = ActionFailure::ValidationTimeout {
            identifier: "x".into(),
            trials: 3,
        };
        assert!(!validation.is_benign());
        assert!(!validation.is_fatal());

        let failed = ActionFailure::Failed("boom".into());
        assert!(!failed.is_benign());
        assert!(failed.is_fatal());
    }

    #[test]
    fn outcome_value_accessor() {
        let done = ActionOutcome::Completed(json!(42));
        assert!(done.is_completed());
        assert_eq!(done.value(), Some(&json!(42)));

        assert!(ActionOutcome::Canceled.value().is_none());
        assert!(!ActionOutcome::Canceled.is_completed());
    }

    #[test]
    fn relay_request_shapes() {
        let text = RelayRequest::text("alert");
        assert!(!text.is_empty());
        assert!(text.image.is_none());

        let both = RelayRequest::text("alert").with_image(vec![1, 2, 3]);
        assert_eq!(both.image.as_deref(), Some(&[1u8, 2, 3][..]));

        assert!(RelayRequest::default().is_empty());
    }

    #[test]
    fn outcome_serde_round_trip() {
        let outcome = ActionOutcome::Failed(ActionFailure::Duplicate {
            identifier: "rotation - attack".into(),
        });
        let json = serde_json::to_string(&outcome).unwrap();
        let back: ActionOutcome = serde_json::from_str(&json).unwrap();
        assert_eq!(outcome, back);
    }
}
