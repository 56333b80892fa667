//! Decision-maker runtime.
//!
//! A [`DecisionMaker`] is a cooperative unit inside a worker: it reads
//! the data store, decides, and emits action requests. Each maker
//! declares a [`DecisionKind`] for bulk enable/disable, a throttle
//! (minimum time between iterations), and the data attributes it
//! requires — the worker registers the union at startup and refuses to
//! run with holes in it.
//!
//! # Loop Contract
//!
//! ```text
//! loop:
//!   if disabled: sleep until enabled (and the worker is not paused)
//!   decide()
//!     cancellation  → unwinds with the task
//!     other error   → logged, re-raised (fatal to the worker)
//!   sleep(throttle) if throttle > 0
//! ```
//!
//! A decision maker must not hold the loop for the duration of an
//! action: it emits a request and returns, or awaits the condition its
//! validation uses, so sibling makers interleave.

mod validate;

pub use validate::{predicate_fn, ActionWithValidation, ValidationPredicate};

use crate::sync::SyncBrokerHandle;
use crate::worker::ActionEmitter;
use hive_data::{BotData, DataError};
use hive_proto::{ActionOutcome, PipeError};
use hive_types::{ErrorCode, WorkerId};
use async_trait::async_trait;
use parking_lot::Mutex as SyncMutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tracing::{error, info};

/// Logical family of a decision maker, for bulk enable/disable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecisionKind {
    /// Farming / combat rotation.
    Rotation,
    /// Humanization and watchdog behaviors.
    AntiDetection,
    /// Upkeep: buffs, potions, inventory.
    Maintenance,
}

/// A cooperative decision unit.
#[async_trait]
pub trait DecisionMaker: Send + Sync {
    /// Human-readable name, used in task identifiers and logs.
    fn name(&self) -> &str;

    /// Family for bulk enable/disable.
    fn kind(&self) -> DecisionKind;

    /// Minimum time between iterations. Zero means back-to-back.
    fn throttle(&self) -> Duration {
        Duration::ZERO
    }

    /// Data attributes this maker reads. The worker verifies the
    /// union is registered before anything runs.
    fn required_attributes(&self) -> Vec<String> {
        Vec::new()
    }

    /// One evaluation: read state, maybe emit requests.
    ///
    /// # Errors
    ///
    /// Any error is fatal to the worker; recover internally (retry at
    /// the next tick) for conditions worth surviving.
    async fn decide(&mut self, ctx: &mut DecisionContext) -> Result<(), DecisionError>;
}

/// Everything a decision maker sees.
pub struct DecisionContext {
    worker: WorkerId,
    data: Arc<Mutex<BotData>>,
    emitter: ActionEmitter,
    broker: SyncBrokerHandle,
    outcomes: Arc<SyncMutex<HashMap<String, ActionOutcome>>>,
}

impl DecisionContext {
    /// Assembles a context; called by the worker runtime per maker.
    #[must_use]
    pub fn new(
        worker: WorkerId,
        data: Arc<Mutex<BotData>>,
        emitter: ActionEmitter,
        broker: SyncBrokerHandle,
        outcomes: Arc<SyncMutex<HashMap<String, ActionOutcome>>>,
    ) -> Self {
        Self {
            worker,
            data,
            emitter,
            broker,
            outcomes,
        }
    }

    /// The owning worker.
    #[must_use]
    pub fn worker(&self) -> &WorkerId {
        &self.worker
    }

    /// The worker's data store.
    #[must_use]
    pub fn data(&self) -> &Arc<Mutex<BotData>> {
        &self.data
    }

    /// Reads one attribute (threshold-refreshing).
    ///
    /// # Errors
    ///
    /// Propagates [`DataError`] from the store.
    pub async fn read(&self, name: &str) -> Result<Value, DecisionError> {
        self.data
            .lock()
            .await
            .read(name)
            .await
            .map_err(DecisionError::Data)
    }

    /// The request emitter for this worker.
    #[must_use]
    pub fn emitter(&self) -> &ActionEmitter {
        &self.emitter
    }

    /// The shared-primitives broker.
    #[must_use]
    pub fn broker(&self) -> &SyncBrokerHandle {
        &self.broker
    }

    /// Takes the most recent outcome reported for a task name, if
    /// one has arrived on the pipe.
    #[must_use]
    pub fn take_outcome(&self, identifier: &str) -> Option<ActionOutcome> {
        self.outcomes.lock().remove(identifier)
    }
}

/// Per-maker control handle held by the worker runtime.
#[derive(Debug)]
pub struct DecisionHandle {
    /// Maker name.
    pub name: String,
    /// Maker family.
    pub kind: DecisionKind,
    enabled: watch::Sender<bool>,
}

impl DecisionHandle {
    pub(crate) fn new(name: String, kind: DecisionKind) -> (Self, watch::Receiver<bool>) {
        let (enabled, rx) = watch::channel(true);
        (
            Self {
                name,
                kind,
                enabled,
            },
            rx,
        )
    }

    /// Enables or disables the maker's loop.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.send_replace(enabled);
    }

    /// Current enablement.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        *self.enabled.borrow()
    }
}

/// Drives one decision maker until shutdown (task abort) or a fatal
/// error.
pub(crate) async fn run_loop(
    mut maker: Box<dyn DecisionMaker>,
    mut ctx: DecisionContext,
    mut enabled_rx: watch::Receiver<bool>,
    mut run_rx: watch::Receiver<bool>,
) -> Result<(), DecisionError> {
    let name = maker.name().to_string();
    info!(maker = %name, worker = %ctx.worker, "decision maker started");

    loop {
        // Disabled or paused: sleep until both gates are open. A
        // closed channel means the worker is tearing down.
        if enabled_rx.wait_for(|enabled| *enabled).await.is_err() {
            return Ok(());
        }
        if run_rx.wait_for(|running| *running).await.is_err() {
            return Ok(());
        }

        if let Err(err) = maker.decide(&mut ctx).await {
            error!(maker = %name, worker = %ctx.worker, %err, "decision maker failed");
            return Err(err);
        }

        let throttle = maker.throttle();
        if throttle > Duration::ZERO {
            tokio::time::sleep(throttle).await;
        } else {
            // Stay cooperative even with no throttle.
            tokio::task::yield_now().await;
        }
    }
}

/// Decision layer errors.
///
/// | Error | Code | Recoverable |
/// |-------|------|-------------|
/// | [`Emit`](DecisionError::Emit) | `DECIDE_EMIT_FAILED` | No |
/// | [`Data`](DecisionError::Data) | `DECIDE_DATA_FAILED` | Yes |
/// | [`ValidationTimeout`](DecisionError::ValidationTimeout) | `DECIDE_VALIDATION_TIMEOUT` | Yes |
/// | [`Fatal`](DecisionError::Fatal) | `DECIDE_FATAL` | No |
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecisionError {
    /// The worker pipe is gone; requests cannot reach the scheduler.
    #[error("request emit failed: {0}")]
    Emit(#[from] PipeError),

    /// A store read or refresh failed beyond its recovery path.
    #[error("data access failed: {0}")]
    Data(#[from] DataError),

    /// An act-and-confirm exchange exhausted its trials. The maker
    /// may retry at its next tick or escalate.
    #[error("validation of '{identifier}' timed out after {trials} trials")]
    ValidationTimeout {
        /// The validated task name.
        identifier: String,
        /// Trials attempted.
        trials: u32,
    },

    /// Anything the maker itself considers unrecoverable.
    #[error("{0}")]
    Fatal(String),
}

impl ErrorCode for DecisionError {
    fn code(&self) -> &'static str {
        match self {
            Self::Emit(_) => "DECIDE_EMIT_FAILED",
            Self::Data(_) => "DECIDE_DATA_FAILED",
            Self::ValidationTimeout { .. } => "DECIDE_VALIDATION_TIMEOUT",
            Self::Fatal(_) => "DECIDE_FATAL",
        }
    }

    fn is_recoverable(&self) -> bool {
        matches!(self, Self::Data(_) | Self::ValidationTimeout { .. })
    }
}
