//! Engine-level errors.
//!
//! | Error | Code | Recoverable |
//! |-------|------|-------------|
//! | [`WorkerFatal`](EngineError::WorkerFatal) | `ENGINE_WORKER_FATAL` | No |
//! | [`MissingCapability`](EngineError::MissingCapability) | `ENGINE_MISSING_CAPABILITY` | No |
//! | [`ShutdownTimeout`](EngineError::ShutdownTimeout) | `ENGINE_SHUTDOWN_TIMEOUT` | No |
//! | [`ChannelClosed`](EngineError::ChannelClosed) | `ENGINE_CHANNEL_CLOSED` | No |

use hive_types::{ErrorCode, WorkerId};
use thiserror::Error;

/// Fatal condition observed by the session engine or a listener.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// An uncaught error escaped a worker (decision maker or
    /// scheduled task). The session shuts down rather than continue
    /// driving inputs on stale assumptions.
    #[error("worker '{worker}' fatal: {reason}")]
    WorkerFatal {
        /// The failing worker.
        worker: WorkerId,
        /// The error text forwarded on the pipe.
        reason: String,
    },

    /// A decision maker requires a data attribute its worker never
    /// registered. Caught at bring-up, before anything runs.
    #[error("worker '{worker}' is missing required attribute '{attribute}'")]
    MissingCapability {
        /// Worker whose store is incomplete.
        worker: WorkerId,
        /// The missing attribute name.
        attribute: String,
    },

    /// A worker failed to join within the teardown grace period.
    #[error("worker '{worker}' did not stop within the grace period")]
    ShutdownTimeout {
        /// The straggler.
        worker: WorkerId,
    },

    /// An internal channel closed while the session was still
    /// running.
    #[error("internal channel closed: {0}")]
    ChannelClosed(String),
}

impl ErrorCode for EngineError {
    fn code(&self) -> &'static str {
        match self {
            Self::WorkerFatal { .. } => "ENGINE_WORKER_FATAL",
            Self::MissingCapability { .. } => "ENGINE_MISSING_CAPABILITY",
            Self::ShutdownTimeout { .. } => "ENGINE_SHUTDOWN_TIMEOUT",
            Self::ChannelClosed(_) => "ENGINE_CHANNEL_CLOSED",
        }
    }

    fn is_recoverable(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hive_types::assert_error_codes;

    #[test]
    fn all_error_codes_valid() {
        let worker = WorkerId::named("Aria");
        assert_error_codes(
            &[
                EngineError::WorkerFatal {
                    worker: worker.clone(),
                    reason: "x".into(),
                },
                EngineError::MissingCapability {
                    worker: worker.clone(),
                    attribute: "hp".into(),
                },
                EngineError::ShutdownTimeout { worker },
                EngineError::ChannelClosed("x".into()),
            ],
            "ENGINE_",
        );
    }

    #[test]
    fn engine_errors_never_recover() {
        assert!(!EngineError::ChannelClosed("x".into()).is_recoverable());
    }
}
