//! Worker listener.
//!
//! One listener task per worker drains the worker→main pipe and feeds
//! the scheduler. Control beats data: the shutdown latch is polled
//! first, and while the session is paused the pipe is not drained at
//! all — requests back up in the bounded pipe until resume.
//!
//! # Exit Conditions
//!
//! | Observation | Action |
//! |-------------|--------|
//! | `Eos` sentinel | broadcast shutdown, return `Ok` |
//! | pipe closed without `Eos` | broadcast shutdown, return `Ok` |
//! | `Fatal` from the worker | aux alert, broadcast shutdown, return `Err` |
//! | shutdown latched elsewhere | return `Ok` |

use crate::control::SessionControl;
use crate::error::EngineError;
use crate::scheduler::ActionScheduler;
use hive_proto::{PipeMessage, PipeReceiver, PipeSender, RelayRequest};
use hive_types::WorkerId;
use tracing::{debug, info, warn};

/// Main-loop drain task for one worker's pipe.
pub struct WorkerListener {
    worker: WorkerId,
    rx: PipeReceiver,
    scheduler: ActionScheduler,
    control: SessionControl,
    aux_tx: PipeSender,
}

impl WorkerListener {
    /// Creates a listener over the main-side receiver of a worker
    /// pipe.
    #[must_use]
    pub fn new(
        worker: WorkerId,
        rx: PipeReceiver,
        scheduler: ActionScheduler,
        control: SessionControl,
        aux_tx: PipeSender,
    ) -> Self {
        Self {
            worker,
            rx,
            scheduler,
            control,
            aux_tx,
        }
    }

    /// Drains the pipe until shutdown.
    ///
    /// # Errors
    ///
    /// [`EngineError::WorkerFatal`] when the worker forwarded an
    /// uncaught error; the alert and shutdown broadcast have already
    /// happened by the time this returns.
    pub async fn run(mut self) -> Result<(), EngineError> {
        info!(worker = %self.worker, "listener started");

        loop {
            tokio::select! {
                biased;

                () = self.control.shutdown_signalled() => {
                    info!(worker = %self.worker, "listener stopping on shutdown");
                    return Ok(());
                }

                // Pause gate: while the run flag is down the pipe
                // branch below is disabled, so nothing is drained.
                () = self.control.wait_running(), if !self.control.is_running() => {}

                msg = self.rx.recv(), if self.control.is_running() => match msg {
                    Some(PipeMessage::Request(request)) => {
                        debug!(worker = %self.worker, identifier = %request.identifier, "request received");
                        match self.scheduler.submit(request).await {
                            Ok(true) => {}
                            Ok(false) => {
                                debug!(worker = %self.worker, "request dropped by priority floor");
                            }
                            Err(err) => {
                                warn!(worker = %self.worker, %err, "request rejected");
                            }
                        }
                    }

                    Some(PipeMessage::Fatal(reason)) => {
                        warn!(worker = %self.worker, %reason, "worker fatal");
                        let alert = RelayRequest::text(format!(
                            "[{}] worker fatal: {}",
                            self.worker, reason
                        ));
                        let _ = self.aux_tx.send(PipeMessage::Aux(alert)).await;
                        self.control
                            .request_shutdown(format!("worker '{}' fatal", self.worker));
                        return Err(EngineError::WorkerFatal {
                            worker: self.worker,
                            reason,
                        });
                    }

                    Some(PipeMessage::Eos) => {
                        info!(worker = %self.worker, "end of stream from worker");
                        self.control
                            .request_shutdown(format!("worker '{}' closed its pipe", self.worker));
                        return Ok(());
                    }

                    Some(other) => {
                        debug!(worker = %self.worker, kind = other.kind(), "ignoring unexpected message");
                    }

                    None => {
                        warn!(worker = %self.worker, "worker pipe closed without sentinel");
                        self.control
                            .request_shutdown(format!("worker '{}' pipe lost", self.worker));
                        return Ok(());
                    }
                }
            }
        }
    }
}
