//! HIVE runtime - the orchestration kernel proper.
//!
//! This crate hosts everything that runs: the session engine, the
//! priority-preemptive action scheduler, per-worker listeners and
//! runtimes, the decision-maker loop, validated actions, scoped input
//! sessions, the shared-primitives broker, and the peripherals runner.
//!
//! # Crate Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Kernel SDK Layer                         │
//! │  hive-types / hive-proto / hive-data                        │
//! └─────────────────────────────────────────────────────────────┘
//!                               ↓
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Runtime Layer (THIS CRATE)                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  engine     : SessionEngine lifecycle, SessionControl       │
//! │  scheduler  : ActionScheduler, priority floor stack         │
//! │  listener   : per-worker pipe drain into the scheduler      │
//! │  worker     : WorkerRuntime, ActionEmitter                  │
//! │  decision   : DecisionMaker trait, loop, validated actions  │
//! │  input      : focus lock, input sessions, forced releases   │
//! │  sync       : SyncBroker minting shared primitives          │
//! │  peripherals: chat bridge relay + periodic recorder         │
//! │  commands   : external command parsing                      │
//! │  config     : session + per-character configuration         │
//! └─────────────────────────────────────────────────────────────┘
//!                               ↓
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Frontend Layer                          │
//! │  hive-cli                                                    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Control Flow
//!
//! A decision maker reads its worker's data store, decides to act, and
//! emits an [`ActionRequest`](hive_proto::ActionRequest) up the pipe.
//! The worker's listener hands it to the [`scheduler`], which admits it
//! as a named prioritized task subject to preemption, dedup, and
//! priority-floor rules. The task's done chain applies the exception
//! policy, writes the result back into the originating store, and runs
//! user callbacks — including the `notify_all` that wakes a validated
//! action waiting on a shared condition.
//!
//! # Concurrency Model
//!
//! Single-threaded cooperative scheduling within each task; true
//! parallelism across the multi-thread runtime. All timing is
//! monotonic. The host's keyboard/mouse focus is a single async lock;
//! canceled actions release held keys before the lock is returned.

pub mod commands;
pub mod config;
pub mod decision;
pub mod engine;
pub mod input;
pub mod listener;
pub mod peripherals;
pub mod scheduler;
pub mod sync;
pub mod worker;

mod control;
mod error;

pub use commands::{parse_command, CommandError, SessionCommand};
pub use config::{CharacterProfile, ConfigError, ConfigLoader, SessionConfig};
pub use control::SessionControl;
pub use decision::{
    predicate_fn, ActionWithValidation, DecisionContext, DecisionError, DecisionHandle,
    DecisionKind, DecisionMaker, ValidationPredicate,
};
pub use engine::{ChatComposer, SessionEngine, WorkerBlueprint};
pub use error::EngineError;
pub use input::{
    InputBackend, InputBroker, InputError, InputEvent, InputSequence, InputSession, Key,
};
pub use listener::WorkerListener;
pub use peripherals::{CaptureSource, ChannelBridge, ChatBridge, PeripheralsRunner};
pub use scheduler::{ActionScheduler, SchedulerError, SchedulerSnapshot, TaskSnapshot};
pub use sync::{
    PrimitiveHandle, PrimitiveKind, SharedBarrier, SharedCondition, SharedEvent, SharedLock,
    SyncBroker, SyncBrokerHandle, SyncError,
};
pub use worker::{ActionEmitter, WorkerControls, WorkerRuntime};
