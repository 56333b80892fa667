//! Pipe layer errors.
//!
//! | Error | Code | Recoverable |
//! |-------|------|-------------|
//! | [`Closed`](PipeError::Closed) | `PIPE_CLOSED` | No |
//! | [`Full`](PipeError::Full) | `PIPE_FULL` | Yes |

use hive_types::ErrorCode;
use thiserror::Error;

/// Error on a pipe operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PipeError {
    /// The peer dropped its end of the pipe.
    ///
    /// **Not recoverable** — the conversation is over; the holder
    /// should begin its own teardown.
    #[error("pipe closed by peer")]
    Closed,

    /// The bounded queue is at capacity.
    ///
    /// **Recoverable** — the async `send` path waits for space; only
    /// `try_send` surfaces this.
    #[error("pipe queue full")]
    Full,
}

impl ErrorCode for PipeError {
    fn code(&self) -> &'static str {
        match self {
            Self::Closed => "PIPE_CLOSED",
            Self::Full => "PIPE_FULL",
        }
    }

    fn is_recoverable(&self) -> bool {
        matches!(self, Self::Full)
    }
}
