//! Peripherals runner.
//!
//! A sibling of the worker runtimes that owns out-of-band I/O: it
//! drains the aux pipe into an external chat bridge, relays inbound
//! bridge lines back up the pipe (the main loop parses them into
//! session commands), and periodically captures screen data. It
//! speaks the same pipe protocol and honors the same `Eos` discipline
//! as every worker.
//!
//! ```text
//!            Aux (alerts, chat)           outbound
//! main ────────────────────────► runner ──────────► ChatBridge
//! main ◄──────────────────────── runner ◄────────── (inbound lines)
//!            Aux (command text)
//!                                runner ──tick────► CaptureSource
//! ```
//!
//! The bridge and the capture source are seams; the kernel ships a
//! channel-backed bridge for wiring and tests, and nothing else.

use hive_proto::{ControlSignal, PipeEnd, PipeMessage, RelayRequest};
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// External chat service seam.
#[async_trait]
pub trait ChatBridge: Send {
    /// Delivers an outbound relay payload.
    ///
    /// # Errors
    ///
    /// Implementation-defined reason; logged, not fatal.
    async fn post(&mut self, relay: RelayRequest) -> Result<(), String>;

    /// Waits for the next inbound line. `None` means the bridge is
    /// closed; the runner stops polling it.
    async fn next_inbound(&mut self) -> Option<String>;
}

/// Screen capture seam for the periodic recorder.
#[async_trait]
pub trait CaptureSource: Send {
    /// Captures one frame.
    ///
    /// # Errors
    ///
    /// Implementation-defined reason; logged, not fatal.
    async fn capture(&mut self) -> Result<Vec<u8>, String>;
}

/// Channel-backed [`ChatBridge`]: outbound payloads surface on a
/// receiver, inbound lines come from a sender. The simplest real
/// wiring, and the test double.
pub struct ChannelBridge {
    outbound_tx: mpsc::UnboundedSender<RelayRequest>,
    inbound_rx: mpsc::UnboundedReceiver<String>,
}

impl ChannelBridge {
    /// Creates the bridge plus its far ends.
    #[must_use]
    pub fn channel() -> (
        Self,
        mpsc::UnboundedReceiver<RelayRequest>,
        mpsc::UnboundedSender<String>,
    ) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        (
            Self {
                outbound_tx,
                inbound_rx,
            },
            outbound_rx,
            inbound_tx,
        )
    }
}

#[async_trait]
impl ChatBridge for ChannelBridge {
    async fn post(&mut self, relay: RelayRequest) -> Result<(), String> {
        self.outbound_tx
            .send(relay)
            .map_err(|_| "outbound channel closed".to_string())
    }

    async fn next_inbound(&mut self) -> Option<String> {
        self.inbound_rx.recv().await
    }
}

/// The auxiliary runner task.
pub struct PeripheralsRunner {
    pipe: PipeEnd,
    bridge: Box<dyn ChatBridge>,
    capture: Option<Box<dyn CaptureSource>>,
    record_period: Duration,
}

impl PeripheralsRunner {
    /// Creates a runner over the peripherals side of the aux pipe.
    ///
    /// `capture` is optional; without it the recorder tick is
    /// disabled.
    #[must_use]
    pub fn new(
        pipe: PipeEnd,
        bridge: Box<dyn ChatBridge>,
        capture: Option<Box<dyn CaptureSource>>,
        record_period: Duration,
    ) -> Self {
        Self {
            pipe,
            bridge,
            capture,
            record_period,
        }
    }

    /// Runs until `Eos`/`Shutdown` arrives or the pipe is lost.
    pub async fn run(mut self) {
        info!("peripherals runner started");

        let mut recorder = tokio::time::interval(self.record_period.max(Duration::from_millis(10)));
        recorder.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick of a tokio interval fires immediately; skip
        // it so the first capture happens one period in.
        recorder.tick().await;

        let mut last_frame: Option<Vec<u8>> = None;
        let mut bridge_open = true;

        loop {
            tokio::select! {
                biased;

                msg = self.pipe.recv() => match msg {
                    Some(PipeMessage::Aux(mut relay)) => {
                        // Alerts without a capture get the freshest
                        // frame attached.
                        if relay.image.is_none() {
                            relay.image = last_frame.clone();
                        }
                        if let Err(reason) = self.bridge.post(relay).await {
                            warn!(%reason, "bridge post failed");
                        }
                    }

                    Some(PipeMessage::Signal(ControlSignal::Shutdown))
                    | Some(PipeMessage::Eos) => {
                        info!("peripherals runner stopping");
                        break;
                    }

                    Some(other) => {
                        debug!(kind = other.kind(), "ignoring unexpected message");
                    }

                    None => {
                        warn!("aux pipe lost");
                        break;
                    }
                },

                inbound = self.bridge.next_inbound(), if bridge_open => match inbound {
                    Some(line) => {
                        debug!(%line, "inbound bridge line");
                        if self
                            .pipe
                            .send(PipeMessage::Aux(RelayRequest::text(line)))
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    None => {
                        info!("bridge closed, inbound polling stopped");
                        bridge_open = false;
                    }
                },

                _ = recorder.tick(), if self.capture.is_some() => {
                    if let Some(capture) = self.capture.as_mut() {
                        match capture.capture().await {
                            Ok(frame) => {
                                debug!(bytes = frame.len(), "frame captured");
                                last_frame = Some(frame);
                            }
                            Err(reason) => warn!(%reason, "capture failed"),
                        }
                    }
                }
            }
        }

        self.pipe.close().await;
        info!("peripherals runner stopped");
    }
}
