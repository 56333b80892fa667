//! Core types for the HIVE orchestration kernel.
//!
//! This crate is the leaf of the workspace: identifier types, the
//! scheduling [`Priority`] scale, and the [`ErrorCode`] taxonomy shared
//! by every layer above it.
//!
//! # Crate Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Kernel SDK Layer                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  hive-types : WorkerId, BarrierId, Priority, ErrorCode ◄────│── HERE
//! │  hive-proto : ActionRequest, PipeMessage, Pipe              │
//! │  hive-data  : BotData store, MinimapGrid                    │
//! └─────────────────────────────────────────────────────────────┘
//!                               ↓
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Runtime Layer                           │
//! │  hive-runtime : SyncBroker, ActionScheduler, WorkerListener,│
//! │                 WorkerRuntime, SessionEngine, Peripherals   │
//! └─────────────────────────────────────────────────────────────┘
//!                               ↓
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Frontend Layer                          │
//! │  hive-cli : binary entry point                              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Identifier Strategy
//!
//! Workers are identified by [`WorkerId`]; a worker driving a named game
//! client gets a deterministic id ([`WorkerId::named`]) so that logs and
//! pipe traffic stay correlatable across restarts. Priority barriers get
//! a fresh random [`BarrierId`] per push so that removal is by identity,
//! never by value.
//!
//! # Usage
//!
//! ```
//! use hive_types::{Priority, WorkerId};
//!
//! let worker = WorkerId::named("Aria");
//! let urgent = Priority::new(5);
//! let idle = Priority::BACKGROUND;
//!
//! assert!(urgent.preempts(idle));
//! assert_eq!(worker.to_string(), "Aria");
//! ```

mod error;
mod id;
mod priority;

pub use error::{assert_error_code, assert_error_codes, ErrorCode};
pub use id::{BarrierId, WorkerId};
pub use priority::Priority;
