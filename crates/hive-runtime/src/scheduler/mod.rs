//! Action scheduler.
//!
//! Converts [`ActionRequest`]s into named, prioritized tokio tasks.
//! Admission is atomic per request and applies, in order: aux
//! forwarding, the priority-floor gate, name-collision policy,
//! explicit cancels, preemption of less urgent cancellable work, task
//! spawn, optional floor push, and the done chain.
//!
//! # Admission
//!
//! ```text
//! submit(request)
//!   │ 1. aux payload → peripherals pipe (non-blocking)
//!   │ 2. priority > effective floor? → drop, log
//!   │ 3. name collision → cancel predecessor(s) or reject duplicate
//!   │ 4. cancel_task_names → abort matching tasks
//!   │ 5. preempt: cancel less urgent cancellable live tasks
//!   │ 6. spawn task, record {identifier, priority, worker,
//!   │    cancellable, created_at}
//!   │ 7. block_lower_priority → push floor entry (popped by identity
//!   │    in this task's done path)
//!   └ 8. done chain: exception policy → update_attribute write-back
//!        → user callbacks → result report on the worker pipe
//! ```
//!
//! # Preemption
//!
//! Cancellation is task abort: in-flight awaits unwind at the next
//! suspension point and RAII guards (input sessions) run their
//! guaranteed-release cleanup. The scheduler never waits for a
//! canceled task — its monitor reaps it and reports `Canceled`.
//!
//! # Ordering
//!
//! Within one worker, requests are admitted in pipe arrival order.
//! Across workers there is no admission order; priority governs
//! preemption only.

mod floor;

pub use floor::FloorStack;

use crate::control::SessionControl;
use hive_proto::{
    ActionFailure, ActionOutcome, ActionRequest, PipeMessage, PipeSender, RelayRequest,
};
use hive_types::{BarrierId, ErrorCode, Priority, WorkerId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, warn};

/// Live-task count above which the scheduler logs an overload
/// warning. Collisions cancel-and-replace, so overload shows up as
/// churn rather than growth; the warning is the early signal.
pub const DEFAULT_WARN_THRESHOLD: usize = 30;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TaskKey {
    worker: WorkerId,
    identifier: String,
}

struct LiveTask {
    instance: u64,
    priority: Priority,
    cancellable: bool,
    created_at: Instant,
    abort: AbortHandle,
}

struct Registry {
    live: HashMap<TaskKey, LiveTask>,
    workers: HashMap<WorkerId, PipeSender>,
    floor: FloorStack,
}

struct Inner {
    registry: Mutex<Registry>,
    aux_tx: PipeSender,
    control: SessionControl,
    warn_threshold: usize,
    next_instance: AtomicU64,
}

/// Everything the monitor needs after the task is spawned.
struct DoneContext {
    key: TaskKey,
    instance: u64,
    barrier: Option<BarrierId>,
    update_attribute: Option<String>,
    callbacks: Vec<hive_proto::CallbackFn>,
}

/// The main-loop scheduler. Cloneable; every clone shares one
/// registry.
#[derive(Clone)]
pub struct ActionScheduler {
    inner: Arc<Inner>,
}

impl ActionScheduler {
    /// Creates a scheduler.
    ///
    /// `aux_tx` is the main→peripherals pipe sender used for aux
    /// payload forwarding and fatal alerts; `control` is where the
    /// exception policy latches shutdown.
    #[must_use]
    pub fn new(aux_tx: PipeSender, control: SessionControl) -> Self {
        Self::with_warn_threshold(aux_tx, control, DEFAULT_WARN_THRESHOLD)
    }

    /// Creates a scheduler with a custom overload warning threshold.
    #[must_use]
    pub fn with_warn_threshold(
        aux_tx: PipeSender,
        control: SessionControl,
        warn_threshold: usize,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry: Mutex::new(Registry {
                    live: HashMap::new(),
                    workers: HashMap::new(),
                    floor: FloorStack::new(),
                }),
                aux_tx,
                control,
                warn_threshold,
                next_instance: AtomicU64::new(1),
            }),
        }
    }

    /// Registers the main→worker pipe sender for result and
    /// write-back traffic.
    pub fn register_worker(&self, worker: WorkerId, sender: PipeSender) {
        self.inner.registry.lock().workers.insert(worker, sender);
    }

    /// Removes a worker's pipe sender.
    pub fn unregister_worker(&self, worker: &WorkerId) {
        self.inner.registry.lock().workers.remove(worker);
    }

    /// Admits a request.
    ///
    /// Returns `Ok(true)` when a task was spawned and `Ok(false)` when
    /// the request was dropped by the priority floor.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::Duplicate`] when a live task with the same
    /// name exists and the request opted out of cancel-and-replace;
    /// the rejection is also surfaced as a `Result` message on the
    /// originating worker's pipe.
    pub async fn submit(&self, request: ActionRequest) -> Result<bool, SchedulerError> {
        // Aux payloads ride along regardless of admission outcome.
        if let Some(aux) = &request.aux {
            if self
                .inner
                .aux_tx
                .try_send(PipeMessage::Aux(aux.clone()))
                .is_err()
            {
                warn!(identifier = %request.identifier, "aux pipe unavailable, payload dropped");
            }
        }

        let key = TaskKey {
            worker: request.worker.clone(),
            identifier: request.identifier.clone(),
        };

        enum Admission {
            Dropped,
            Duplicate(Option<PipeSender>),
            Spawned {
                context: DoneContext,
                join: JoinHandle<Result<serde_json::Value, ActionFailure>>,
                live_count: usize,
            },
        }

        let admission = {
            let mut registry = self.inner.registry.lock();

            let floor = registry.floor.effective();
            if !request.priority.admitted_under(floor) {
                debug!(
                    identifier = %request.identifier,
                    priority = %request.priority,
                    %floor,
                    "request blocked by priority levels"
                );
                Admission::Dropped
            } else if !request.cancels_same_name
                && !request.cancels_across_workers
                && registry.live.contains_key(&key)
            {
                Admission::Duplicate(registry.workers.get(&key.worker).cloned())
            } else {
                // Name collision policy: cancel the predecessor(s).
                if request.cancels_across_workers {
                    for (existing, task) in &registry.live {
                        if existing.identifier == key.identifier {
                            debug!(identifier = %key.identifier, worker = %existing.worker,
                                "cancelling same-named task across workers");
                            task.abort.abort();
                        }
                    }
                } else if request.cancels_same_name {
                    if let Some(task) = registry.live.get(&key) {
                        debug!(identifier = %key.identifier, "cancelling predecessor with same name");
                        task.abort.abort();
                    }
                }

                // Explicit cancels by task name, any worker.
                for name in &request.cancel_task_names {
                    for (existing, task) in &registry.live {
                        if &existing.identifier == name {
                            debug!(cancelled = %name, by = %key.identifier, "explicit cancel");
                            task.abort.abort();
                        }
                    }
                }

                // Preempt less urgent cancellable work.
                for (existing, task) in &registry.live {
                    if request.priority.preempts(task.priority) && task.cancellable {
                        debug!(
                            preempted = %existing.identifier,
                            by = %key.identifier,
                            "priority preemption"
                        );
                        task.abort.abort();
                    }
                }

                let future = (request.procedure)();
                let join = tokio::spawn(future);
                let instance = self.inner.next_instance.fetch_add(1, Ordering::Relaxed);

                registry.live.insert(
                    key.clone(),
                    LiveTask {
                        instance,
                        priority: request.priority,
                        cancellable: request.cancellable,
                        created_at: Instant::now(),
                        abort: join.abort_handle(),
                    },
                );

                let barrier = request
                    .block_lower_priority
                    .then(|| registry.floor.push(request.priority));

                Admission::Spawned {
                    context: DoneContext {
                        key: key.clone(),
                        instance,
                        barrier,
                        update_attribute: request.update_attribute.clone(),
                        callbacks: request.callbacks.clone(),
                    },
                    join,
                    live_count: registry.live.len(),
                }
            }
        };

        match admission {
            Admission::Dropped => Ok(false),
            Admission::Duplicate(sender) => self.reject_duplicate(key, sender).await,
            Admission::Spawned {
                context,
                join,
                live_count,
            } => {
                if live_count > self.inner.warn_threshold {
                    warn!(
                        live = live_count,
                        threshold = self.inner.warn_threshold,
                        "live task count above warning threshold"
                    );
                }
                let inner = Arc::clone(&self.inner);
                tokio::spawn(Self::watch(inner, context, join));
                Ok(true)
            }
        }
    }

    async fn reject_duplicate(
        &self,
        key: TaskKey,
        sender: Option<PipeSender>,
    ) -> Result<bool, SchedulerError> {
        let failure = ActionFailure::Duplicate {
            identifier: key.identifier.clone(),
        };
        if let Some(sender) = sender {
            let _ = sender
                .send(PipeMessage::Result {
                    identifier: key.identifier.clone(),
                    outcome: ActionOutcome::Failed(failure),
                })
                .await;
        }
        Err(SchedulerError::Duplicate {
            worker: key.worker,
            identifier: key.identifier,
        })
    }

    /// Reaps one task: bookkeeping, then the done chain.
    async fn watch(
        inner: Arc<Inner>,
        context: DoneContext,
        join: JoinHandle<Result<serde_json::Value, ActionFailure>>,
    ) {
        let outcome = match join.await {
            Ok(Ok(value)) => ActionOutcome::Completed(value),
            Ok(Err(failure)) => ActionOutcome::Failed(failure),
            Err(join_error) if join_error.is_cancelled() => ActionOutcome::Canceled,
            Err(join_error) => {
                ActionOutcome::Failed(ActionFailure::Failed(format!("task panicked: {join_error}")))
            }
        };

        let worker_sender = {
            let mut registry = inner.registry.lock();

            // Remove only our own entry; cancel-and-replace may have
            // put a successor under the same key already.
            if registry
                .live
                .get(&context.key)
                .is_some_and(|task| task.instance == context.instance)
            {
                registry.live.remove(&context.key);
            }

            if let Some(barrier) = context.barrier {
                registry.floor.pop(barrier);
            }

            registry.workers.get(&context.key.worker).cloned()
        };

        // (a) Exception policy.
        if let ActionOutcome::Failed(failure) = &outcome {
            if failure.is_fatal() {
                let alert = RelayRequest::text(format!(
                    "[{}] task '{}' failed: {}",
                    context.key.worker, context.key.identifier, failure
                ));
                let _ = inner.aux_tx.send(PipeMessage::Aux(alert)).await;
                inner.control.request_shutdown(format!(
                    "task '{}' on worker '{}' failed",
                    context.key.identifier, context.key.worker
                ));
            } else if failure.is_benign() {
                debug!(identifier = %context.key.identifier, %failure, "benign task failure");
            } else {
                warn!(identifier = %context.key.identifier, %failure, "task failure");
            }
        }

        // (b) Attribute write-back.
        if let (Some(attribute), ActionOutcome::Completed(value)) =
            (&context.update_attribute, &outcome)
        {
            if let Some(sender) = &worker_sender {
                let _ = sender
                    .send(PipeMessage::Update {
                        attribute: attribute.clone(),
                        value: value.clone(),
                    })
                    .await;
            }
        }

        // (c) User callbacks, in attachment order.
        for callback in &context.callbacks {
            callback(&outcome);
        }

        // (d) Result report to the originating worker.
        if let Some(sender) = &worker_sender {
            let _ = sender
                .send(PipeMessage::Result {
                    identifier: context.key.identifier.clone(),
                    outcome,
                })
                .await;
        }
    }

    /// Number of live tasks.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.inner.registry.lock().live.len()
    }

    /// Current effective priority floor.
    #[must_use]
    pub fn effective_floor(&self) -> Priority {
        self.inner.registry.lock().floor.effective()
    }

    /// Diagnostic snapshot of the live task set.
    #[must_use]
    pub fn snapshot(&self) -> SchedulerSnapshot {
        let registry = self.inner.registry.lock();
        let mut tasks: Vec<TaskSnapshot> = registry
            .live
            .iter()
            .map(|(key, task)| TaskSnapshot {
                identifier: key.identifier.clone(),
                worker: key.worker.clone(),
                priority: task.priority,
                cancellable: task.cancellable,
                age: task.created_at.elapsed(),
            })
            .collect();
        tasks.sort_by_key(|t| t.priority);
        SchedulerSnapshot {
            tasks,
            floor: registry.floor.effective(),
            barriers: registry.floor.len(),
        }
    }
}

/// One live task, as seen from outside.
#[derive(Debug, Clone)]
pub struct TaskSnapshot {
    /// Task name.
    pub identifier: String,
    /// Owning worker.
    pub worker: WorkerId,
    /// Admission priority.
    pub priority: Priority,
    /// Whether preemption may cancel it.
    pub cancellable: bool,
    /// Time since admission.
    pub age: Duration,
}

/// Point-in-time view of the scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerSnapshot {
    /// Live tasks, most urgent first.
    pub tasks: Vec<TaskSnapshot>,
    /// Effective priority floor.
    pub floor: Priority,
    /// Number of active floor entries.
    pub barriers: usize,
}

/// Scheduler errors.
///
/// | Error | Code | Recoverable |
/// |-------|------|-------------|
/// | [`Duplicate`](SchedulerError::Duplicate) | `SCHED_DUPLICATE_TASK` | Yes |
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    /// A live task already holds this name and the request declined
    /// cancel-and-replace. Retrying after the predecessor finishes
    /// may succeed.
    #[error("duplicate task '{identifier}' for worker '{worker}'")]
    Duplicate {
        /// Submitting worker.
        worker: WorkerId,
        /// Colliding task name.
        identifier: String,
    },
}

impl ErrorCode for SchedulerError {
    fn code(&self) -> &'static str {
        match self {
            Self::Duplicate { .. } => "SCHED_DUPLICATE_TASK",
        }
    }

    fn is_recoverable(&self) -> bool {
        true
    }
}
