//! Pipe protocol and action envelopes for HIVE.
//!
//! Workers talk to the main loop — and the main loop talks to the
//! peripherals runner — through typed, framed, FIFO pipes. This crate
//! owns the message vocabulary and the pipe construction; it knows
//! nothing about scheduling policy.
//!
//! # Message Types
//!
//! | Message | Direction | Meaning |
//! |---------|-----------|---------|
//! | [`PipeMessage::Request`] | worker → main | schedule this [`ActionRequest`] |
//! | [`PipeMessage::Result`]  | main → worker | outcome of a scheduled action |
//! | [`PipeMessage::Update`]  | main → worker | write a value into the worker's store |
//! | [`PipeMessage::Signal`]  | both | control: shutdown / pause / resume |
//! | [`PipeMessage::Aux`]     | main → peripherals | relay payload for the chat bridge |
//! | [`PipeMessage::Fatal`]   | worker → main | uncaught worker error (fail fast) |
//! | [`PipeMessage::Eos`]     | both | end-of-stream sentinel, orderly close |
//!
//! # Flow
//!
//! ```text
//! ┌──────────────┐   Request    ┌──────────────┐    Aux     ┌─────────────┐
//! │ WorkerRuntime│ ───────────► │  SessionLoop │ ─────────► │ Peripherals │
//! │  (decision   │              │  (listener + │            │  (chat,     │
//! │   makers)    │ ◄─────────── │   scheduler) │            │   recorder) │
//! └──────────────┘ Result/Update└──────────────┘            └─────────────┘
//! ```
//!
//! # Ordering
//!
//! Each pipe direction is a single bounded queue: FIFO per direction,
//! one logical reader and one logical writer. Nothing here reorders by
//! priority — priority is the scheduler's concern, applied after a
//! request has been read off the pipe in arrival order.
//!
//! # Usage
//!
//! ```
//! use hive_proto::{ControlSignal, Pipe, PipeMessage};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let (mut main_end, mut worker_end) = Pipe::pair(16);
//!
//! main_end
//!     .send(PipeMessage::Signal(ControlSignal::Pause))
//!     .await
//!     .unwrap();
//!
//! match worker_end.recv().await {
//!     Some(PipeMessage::Signal(ControlSignal::Pause)) => {}
//!     other => panic!("unexpected: {:?}", other),
//! }
//! # }
//! ```

mod action;
mod error;
mod message;
mod pipe;

pub use action::{
    action_fn, ActionFailure, ActionFn, ActionOutcome, BoxedActionFuture, CallbackFn,
    ActionRequest, RelayRequest,
};
pub use error::PipeError;
pub use message::{ControlSignal, PipeMessage};
pub use pipe::{Pipe, PipeEnd, PipeReceiver, PipeSender, DEFAULT_PIPE_CAPACITY};

// Re-export from hive_types for convenience
pub use hive_types::{Priority, WorkerId};
