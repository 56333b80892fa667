//! Shared synchronization primitives.
//!
//! The [`SyncBroker`] is the one place where cross-worker
//! synchronization primitives are created. Any task holding a
//! [`SyncBrokerHandle`] can request a primitive by tag; requests for
//! the same tag resolve to the same primitive, which is how two
//! workers end up waiting on one condition.
//!
//! # Protocol
//!
//! ```text
//! requester                        SyncBroker task
//!     │  MintRequest{tag, kind}        │
//!     ├───────── mpsc ────────────────►│ get-or-create by tag
//!     │                                │
//!     │◄──────── oneshot ──────────────┤ PrimitiveHandle (clone)
//! ```
//!
//! The broker applies requests sequentially, so concurrent mints of
//! the same tag cannot race into two primitives. If the broker task is
//! not running, a mint blocks until it is — startup callers wrap
//! [`SyncBrokerHandle::mint_timeout`] around the first request.

use hive_types::ErrorCode;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch, Barrier, Mutex, Notify, OwnedMutexGuard};
use tracing::{debug, info};

/// Command queue depth for mint requests.
const BROKER_QUEUE_SIZE: usize = 32;

/// Which primitive a mint request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveKind {
    /// Mutual exclusion.
    Lock,
    /// Condition: lock + notify-all wakeups.
    Condition,
    /// Manual-reset event flag.
    Event,
    /// Rendezvous for a fixed party count.
    Barrier {
        /// Number of tasks that must arrive before any proceeds.
        parties: usize,
    },
}

impl PrimitiveKind {
    fn tag_kind(&self) -> &'static str {
        match self {
            Self::Lock => "lock",
            Self::Condition => "condition",
            Self::Event => "event",
            Self::Barrier { .. } => "barrier",
        }
    }
}

/// A minted primitive, cloneable across tasks and workers.
#[derive(Debug, Clone)]
pub enum PrimitiveHandle {
    /// See [`PrimitiveKind::Lock`].
    Lock(SharedLock),
    /// See [`PrimitiveKind::Condition`].
    Condition(SharedCondition),
    /// See [`PrimitiveKind::Event`].
    Event(SharedEvent),
    /// See [`PrimitiveKind::Barrier`].
    Barrier(SharedBarrier),
}

impl PrimitiveHandle {
    /// Extracts the lock, if this handle is one.
    #[must_use]
    pub fn as_lock(&self) -> Option<SharedLock> {
        match self {
            Self::Lock(lock) => Some(lock.clone()),
            _ => None,
        }
    }

    /// Extracts the condition, if this handle is one.
    #[must_use]
    pub fn as_condition(&self) -> Option<SharedCondition> {
        match self {
            Self::Condition(cond) => Some(cond.clone()),
            _ => None,
        }
    }

    /// Extracts the event, if this handle is one.
    #[must_use]
    pub fn as_event(&self) -> Option<SharedEvent> {
        match self {
            Self::Event(event) => Some(event.clone()),
            _ => None,
        }
    }

    /// Extracts the barrier, if this handle is one.
    #[must_use]
    pub fn as_barrier(&self) -> Option<SharedBarrier> {
        match self {
            Self::Barrier(barrier) => Some(barrier.clone()),
            _ => None,
        }
    }

    fn kind_matches(&self, kind: PrimitiveKind) -> bool {
        matches!(
            (self, kind),
            (Self::Lock(_), PrimitiveKind::Lock)
                | (Self::Condition(_), PrimitiveKind::Condition)
                | (Self::Event(_), PrimitiveKind::Event)
                | (Self::Barrier(_), PrimitiveKind::Barrier { .. })
        )
    }
}

/// Cross-task mutual exclusion.
#[derive(Debug, Clone)]
pub struct SharedLock {
    inner: Arc<Mutex<()>>,
}

impl SharedLock {
    fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(())),
        }
    }

    /// Acquires the lock; the guard releases on drop from any task.
    pub async fn acquire(&self) -> OwnedMutexGuard<()> {
        Arc::clone(&self.inner).lock_owned().await
    }

    /// Attempts to acquire without waiting.
    #[must_use]
    pub fn try_acquire(&self) -> Option<OwnedMutexGuard<()>> {
        Arc::clone(&self.inner).try_lock_owned().ok()
    }
}

/// Condition variable: a lock plus notify-all wakeups.
///
/// The wakeup registration happens before the guard is released, so a
/// `notify_all` between release and sleep cannot be missed.
///
/// # Example
///
/// ```
/// use hive_runtime::SharedCondition;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let cond = SharedCondition::new();
/// let waiter = cond.clone();
///
/// let task = tokio::spawn(async move {
///     let guard = waiter.acquire().await;
///     let _guard = waiter.wait(guard).await;
/// });
///
/// tokio::task::yield_now().await;
/// cond.notify_all();
/// task.await.unwrap();
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct SharedCondition {
    lock: Arc<Mutex<()>>,
    notify: Arc<Notify>,
}

impl SharedCondition {
    /// Creates a standalone condition (tests, single-worker setups).
    /// Shared conditions normally come from the broker.
    #[must_use]
    pub fn new() -> Self {
        Self {
            lock: Arc::new(Mutex::new(())),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Acquires the condition's lock.
    pub async fn acquire(&self) -> OwnedMutexGuard<()> {
        Arc::clone(&self.lock).lock_owned().await
    }

    /// Releases the guard, sleeps until the next `notify_all`, then
    /// re-acquires.
    pub async fn wait(&self, guard: OwnedMutexGuard<()>) -> OwnedMutexGuard<()> {
        let notified = self.notify.notified();
        drop(guard);
        notified.await;
        self.acquire().await
    }

    /// Like [`wait`](Self::wait) with a deadline. The boolean is
    /// `true` when the wait timed out rather than being notified.
    pub async fn wait_timeout(
        &self,
        guard: OwnedMutexGuard<()>,
        timeout: Duration,
    ) -> (OwnedMutexGuard<()>, bool) {
        let notified = self.notify.notified();
        drop(guard);
        let timed_out = tokio::time::timeout(timeout, notified).await.is_err();
        (self.acquire().await, timed_out)
    }

    /// Wakes every task currently waiting. Callable from sync code
    /// (done callbacks).
    pub fn notify_all(&self) {
        self.notify.notify_waiters();
    }
}

impl Default for SharedCondition {
    fn default() -> Self {
        Self::new()
    }
}

/// Manual-reset event flag.
#[derive(Debug, Clone)]
pub struct SharedEvent {
    tx: Arc<watch::Sender<bool>>,
}

impl SharedEvent {
    fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Sets the flag, waking current and future waiters.
    pub fn set(&self) {
        self.tx.send_replace(true);
    }

    /// Clears the flag.
    pub fn clear(&self) {
        self.tx.send_replace(false);
    }

    /// Returns the current flag state.
    #[must_use]
    pub fn is_set(&self) -> bool {
        *self.tx.borrow()
    }

    /// Waits until the flag is set (returns immediately if it already
    /// is).
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // wait_for only fails when the sender is dropped; we hold it.
        let _ = rx.wait_for(|set| *set).await;
    }
}

/// Rendezvous for a fixed number of parties.
#[derive(Debug, Clone)]
pub struct SharedBarrier {
    inner: Arc<Barrier>,
}

impl SharedBarrier {
    fn new(parties: usize) -> Self {
        Self {
            inner: Arc::new(Barrier::new(parties.max(1))),
        }
    }

    /// Arrives at the barrier and waits for the remaining parties.
    /// Returns `true` on exactly one of the released tasks.
    pub async fn arrive(&self) -> bool {
        self.inner.wait().await.is_leader()
    }
}

struct MintRequest {
    tag: String,
    kind: PrimitiveKind,
    reply: oneshot::Sender<Result<PrimitiveHandle, SyncError>>,
}

/// The broker task: owns the tag registry, applies mints sequentially.
pub struct SyncBroker {
    rx: mpsc::Receiver<MintRequest>,
    registry: HashMap<String, PrimitiveHandle>,
}

impl SyncBroker {
    /// Creates the broker and its first handle.
    #[must_use]
    pub fn channel() -> (Self, SyncBrokerHandle) {
        let (tx, rx) = mpsc::channel(BROKER_QUEUE_SIZE);
        (
            Self {
                rx,
                registry: HashMap::new(),
            },
            SyncBrokerHandle { tx },
        )
    }

    /// Serves mint requests until every handle is dropped.
    pub async fn run(mut self) {
        info!("sync broker started");
        while let Some(request) = self.rx.recv().await {
            let result = self.resolve(&request.tag, request.kind);
            let _ = request.reply.send(result);
        }
        info!("sync broker stopped");
    }

    fn resolve(&mut self, tag: &str, kind: PrimitiveKind) -> Result<PrimitiveHandle, SyncError> {
        if let Some(existing) = self.registry.get(tag) {
            if !existing.kind_matches(kind) {
                return Err(SyncError::KindMismatch {
                    tag: tag.to_string(),
                });
            }
            debug!(tag, "reusing primitive");
            return Ok(existing.clone());
        }

        let handle = match kind {
            PrimitiveKind::Lock => PrimitiveHandle::Lock(SharedLock::new()),
            PrimitiveKind::Condition => PrimitiveHandle::Condition(SharedCondition::new()),
            PrimitiveKind::Event => PrimitiveHandle::Event(SharedEvent::new()),
            PrimitiveKind::Barrier { parties } => {
                PrimitiveHandle::Barrier(SharedBarrier::new(parties))
            }
        };
        debug!(tag, kind = kind.tag_kind(), "minted primitive");
        self.registry.insert(tag.to_string(), handle.clone());
        Ok(handle)
    }
}

/// Cloneable requester handle to the [`SyncBroker`].
#[derive(Debug, Clone)]
pub struct SyncBrokerHandle {
    tx: mpsc::Sender<MintRequest>,
}

impl SyncBrokerHandle {
    /// Requests the primitive registered under `tag`, creating it on
    /// first use.
    ///
    /// # Errors
    ///
    /// [`SyncError::Closed`] when the broker task is gone;
    /// [`SyncError::KindMismatch`] when `tag` already names a
    /// different primitive kind.
    pub async fn mint(
        &self,
        tag: impl Into<String>,
        kind: PrimitiveKind,
    ) -> Result<PrimitiveHandle, SyncError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(MintRequest {
                tag: tag.into(),
                kind,
                reply,
            })
            .await
            .map_err(|_| SyncError::Closed)?;
        rx.await.map_err(|_| SyncError::Closed)?
    }

    /// [`mint`](Self::mint) with a deadline, for bring-up paths where
    /// a missing broker must not block forever.
    ///
    /// # Errors
    ///
    /// [`SyncError::Timeout`] when the deadline elapses, otherwise as
    /// [`mint`](Self::mint).
    pub async fn mint_timeout(
        &self,
        tag: impl Into<String>,
        kind: PrimitiveKind,
        timeout: Duration,
    ) -> Result<PrimitiveHandle, SyncError> {
        tokio::time::timeout(timeout, self.mint(tag, kind))
            .await
            .map_err(|_| SyncError::Timeout)?
    }
}

/// Sync layer errors.
///
/// | Error | Code | Recoverable |
/// |-------|------|-------------|
/// | [`Closed`](SyncError::Closed) | `SYNC_CLOSED` | No |
/// | [`Timeout`](SyncError::Timeout) | `SYNC_TIMEOUT` | Yes |
/// | [`KindMismatch`](SyncError::KindMismatch) | `SYNC_KIND_MISMATCH` | No |
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// The broker task has stopped.
    #[error("sync broker is not running")]
    Closed,

    /// A mint deadline elapsed before the broker answered.
    #[error("sync broker request timed out")]
    Timeout,

    /// The tag already names a primitive of a different kind.
    #[error("primitive tag '{tag}' exists with a different kind")]
    KindMismatch {
        /// The colliding tag.
        tag: String,
    },
}

impl ErrorCode for SyncError {
    fn code(&self) -> &'static str {
        match self {
            Self::Closed => "SYNC_CLOSED",
            Self::Timeout => "SYNC_TIMEOUT",
            Self::KindMismatch { .. } => "SYNC_KIND_MISMATCH",
        }
    }

    fn is_recoverable(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}
