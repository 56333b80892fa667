//! Pipe message framing.
//!
//! One enum covers both pipe kinds (main ↔ worker, main ↔ peripherals).
//! The end-of-stream sentinel is a distinguished variant rather than a
//! channel close so the reader can tell an orderly shutdown apart from
//! a crashed peer.

use crate::action::{ActionOutcome, ActionRequest, RelayRequest};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Control-plane signal carried on a pipe.
///
/// Unlike data messages, signals are about the run state of the
/// receiving side as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlSignal {
    /// Begin orderly teardown.
    Shutdown,
    /// Stop draining work; keep state.
    Pause,
    /// Resume draining work.
    Resume,
}

/// One framed message on a pipe.
///
/// # Direction Conventions
///
/// | Variant | main ↔ worker | main ↔ peripherals |
/// |---------|---------------|--------------------|
/// | `Request` | worker → main | — |
/// | `Result`  | main → worker | — |
/// | `Update`  | main → worker | — |
/// | `Signal`  | both | both |
/// | `Aux`     | — | main → peripherals |
/// | `Fatal`   | worker → main | peripherals → main |
/// | `Eos`     | both | both |
#[derive(Debug, Clone)]
pub enum PipeMessage {
    /// Schedule this action in the main loop.
    Request(ActionRequest),

    /// Outcome of a previously submitted action.
    Result {
        /// Identifier of the originating request.
        identifier: String,
        /// How the task ended.
        outcome: ActionOutcome,
    },

    /// Write `value` into the receiving worker's data store.
    Update {
        /// Attribute name in the worker's store.
        attribute: String,
        /// New value.
        value: Value,
    },

    /// Control-plane signal.
    Signal(ControlSignal),

    /// Relay payload for the external chat bridge.
    Aux(RelayRequest),

    /// Uncaught error on the sending side. The listener treats this as
    /// worker-fatal: aux alert, shutdown broadcast, error return.
    Fatal(String),

    /// End-of-stream sentinel; orderly close of this direction.
    Eos,
}

impl PipeMessage {
    /// Returns `true` for the end-of-stream sentinel.
    #[must_use]
    pub fn is_eos(&self) -> bool {
        matches!(self, Self::Eos)
    }

    /// Short tag for logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Request(_) => "request",
            Self::Result { .. } => "result",
            Self::Update { .. } => "update",
            Self::Signal(_) => "signal",
            Self::Aux(_) => "aux",
            Self::Fatal(_) => "fatal",
            Self::Eos => "eos",
        }
    }
}
