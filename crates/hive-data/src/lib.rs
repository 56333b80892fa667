//! Reactive bot data for HIVE workers.
//!
//! Each worker owns one [`BotData`] store: a registry of named
//! attributes whose values are produced by registered update functions.
//! Reads are self-refreshing — an attribute older than its staleness
//! threshold is updated before the value is returned — so decision
//! makers always consume a coherent, bounded-age view of game state.
//!
//! # Ownership Model
//!
//! The store lives inside one worker task group; every decision maker
//! of that worker runs on the same cooperative loop. Reads and writes
//! are therefore race-free without locks. Update functions are async so
//! long observation work (screen capture) can be offloaded rather than
//! stalling the loop.
//!
//! # Attribute Lifecycle
//!
//! ```text
//! register(name, update_fn, threshold)
//!        │  (eager first update unless an initial value is given)
//!        ▼
//! read(name) ──age > threshold──► refresh(name) ──► update_fn()
//!        │                             │ on error: error_handler + one retry
//!        ▼                             ▼
//!   current value            metadata: history (≤ 10), counts,
//!                            update / validity / change timestamps
//! ```
//!
//! # Validity
//!
//! A value is **valid** iff it is not one of: null, empty string,
//! empty collection, all-zero numeric array. [`BotData::last_known_valid`]
//! walks the rolling history for the most recent valid entry — the
//! standard trick for riding out flaky observations.
//!
//! This crate also carries the [`MinimapGrid`] consumed by decision
//! makers: a directed graph of typed connections on an integer grid.
//! Pathfinding itself is not the kernel's business.

mod error;
mod grid;
mod meta;
mod store;

pub use error::DataError;
pub use grid::{Connection, ConnectionKind, GridPoint, MinimapGrid, MinimapNode};
pub use meta::{is_valid, AttributeMeta, AttributeSnapshot, HISTORY_CAPACITY};
pub use store::{update_fn, recovery_fn, BotData, RecoveryFn, UpdateFn, UpdateResult};
