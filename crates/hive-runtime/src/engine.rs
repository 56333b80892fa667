//! Session engine.
//!
//! [`SessionEngine`] owns the process topology: the sync broker, the
//! peripherals runner, one worker runtime + listener per configured
//! bot, and the main relay loop. Bring-up and teardown follow a fixed
//! order so a failure anywhere converges on the same clean exit.
//!
//! # Bring-up
//!
//! 1. sync broker task
//! 2. peripherals runner and its pipe
//! 3. per bot: worker runtime (pipe, store, decision makers, broker
//!    handle) and its main-loop listener
//! 4. main loop: aux relay + listeners until shutdown
//!
//! # Teardown
//!
//! `Eos` to every worker pipe → bounded-grace join of every worker →
//! `Eos` to peripherals → cancel remaining main-loop tasks → broker
//! stops when its last handle drops. The engine returns `Err` iff
//! something fatal drove the shutdown; the binary maps that to a
//! non-zero exit code.

use crate::commands::{parse_command, SessionCommand};
use crate::control::SessionControl;
use crate::decision::DecisionMaker;
use crate::error::EngineError;
use crate::listener::WorkerListener;
use crate::peripherals::{CaptureSource, ChatBridge, PeripheralsRunner};
use crate::scheduler::{ActionScheduler, DEFAULT_WARN_THRESHOLD};
use crate::sync::SyncBroker;
use crate::worker::{WorkerControls, WorkerRuntime};
use hive_data::BotData;
use hive_proto::{
    ActionFn, ActionRequest, ControlSignal, Pipe, PipeMessage, PipeSender,
    DEFAULT_PIPE_CAPACITY,
};
use hive_types::{Priority, WorkerId};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

/// Default grace period for joining workers at teardown.
const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Default period between recorder captures.
const DEFAULT_RECORD_PERIOD: Duration = Duration::from_secs(60);

/// Priority used for injected chat actions.
const CHAT_PRIORITY: Priority = Priority::new(5);

/// Priority used for safe-idle actions on `stop`.
const IDLE_PRIORITY: Priority = Priority::new(1);

/// Builds an [`ActionFn`] for a `write <channel> <text>` command.
pub type ChatComposer = Arc<dyn Fn(&str, &str) -> ActionFn + Send + Sync>;

/// Everything needed to spawn one bot.
pub struct WorkerBlueprint {
    /// Worker identity, derived from the in-game name.
    pub worker: WorkerId,
    /// Pre-registered data store.
    pub data: BotData,
    /// Decision makers; the first is the root (the `hold` command
    /// targets it).
    pub makers: Vec<Box<dyn DecisionMaker>>,
    /// Procedure submitted on the `stop` command.
    pub idle_procedure: Option<ActionFn>,
    /// Builds chat procedures for the `write` command.
    pub chat_composer: Option<ChatComposer>,
}

impl WorkerBlueprint {
    /// Creates a blueprint for a named character. The store starts
    /// with the `ign` identity attribute set.
    #[must_use]
    pub fn new(ign: impl Into<String>) -> Self {
        let ign = ign.into();
        let mut data = BotData::new();
        data.apply_update("ign", json!(ign.clone()));
        Self {
            worker: WorkerId::named(ign),
            data,
            makers: Vec::new(),
            idle_procedure: None,
            chat_composer: None,
        }
    }

    /// Replaces the data store.
    #[must_use]
    pub fn with_data(mut self, data: BotData) -> Self {
        self.data = data;
        self
    }

    /// Appends a decision maker.
    #[must_use]
    pub fn with_maker(mut self, maker: Box<dyn DecisionMaker>) -> Self {
        self.makers.push(maker);
        self
    }

    /// Sets the safe-idle procedure for the `stop` command.
    #[must_use]
    pub fn with_idle_procedure(mut self, procedure: ActionFn) -> Self {
        self.idle_procedure = Some(procedure);
        self
    }

    /// Sets the chat composer for the `write` command.
    #[must_use]
    pub fn with_chat_composer(mut self, composer: ChatComposer) -> Self {
        self.chat_composer = Some(composer);
        self
    }
}

struct WorkerEntry {
    id: WorkerId,
    sender: PipeSender,
    controls: WorkerControls,
    runtime: JoinHandle<Result<(), EngineError>>,
    idle_procedure: Option<ActionFn>,
    chat_composer: Option<ChatComposer>,
}

/// The session engine.
pub struct SessionEngine {
    blueprints: Vec<WorkerBlueprint>,
    bridge: Box<dyn ChatBridge>,
    capture: Option<Box<dyn CaptureSource>>,
    control: SessionControl,
    pipe_capacity: usize,
    shutdown_grace: Duration,
    record_period: Duration,
    warn_threshold: usize,
}

impl SessionEngine {
    /// Creates an engine with the given chat bridge.
    #[must_use]
    pub fn new(bridge: Box<dyn ChatBridge>) -> Self {
        Self {
            blueprints: Vec::new(),
            bridge,
            capture: None,
            control: SessionControl::new(),
            pipe_capacity: DEFAULT_PIPE_CAPACITY,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            record_period: DEFAULT_RECORD_PERIOD,
            warn_threshold: DEFAULT_WARN_THRESHOLD,
        }
    }

    /// Adds a bot.
    #[must_use]
    pub fn with_worker(mut self, blueprint: WorkerBlueprint) -> Self {
        self.blueprints.push(blueprint);
        self
    }

    /// Enables the periodic recorder.
    #[must_use]
    pub fn with_capture(mut self, capture: Box<dyn CaptureSource>, period: Duration) -> Self {
        self.capture = Some(capture);
        self.record_period = period;
        self
    }

    /// Overrides the teardown grace period.
    #[must_use]
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Overrides the per-direction pipe capacity.
    #[must_use]
    pub fn with_pipe_capacity(mut self, capacity: usize) -> Self {
        self.pipe_capacity = capacity;
        self
    }

    /// Overrides the scheduler's overload warning threshold.
    #[must_use]
    pub fn with_warn_threshold(mut self, threshold: usize) -> Self {
        self.warn_threshold = threshold;
        self
    }

    /// A handle on the session's run state, for frontends.
    #[must_use]
    pub fn control(&self) -> SessionControl {
        self.control.clone()
    }

    /// Runs the whole session.
    ///
    /// # Errors
    ///
    /// The first fatal condition that drove the shutdown:
    /// [`EngineError::WorkerFatal`], [`EngineError::ShutdownTimeout`],
    /// or [`EngineError::ChannelClosed`]. A clean shutdown (kill
    /// command, orderly sentinel) returns `Ok`.
    pub async fn run(mut self) -> Result<(), EngineError> {
        info!(workers = self.blueprints.len(), "session starting");

        // (1) Shared-primitives broker.
        let (broker, broker_handle) = SyncBroker::channel();
        let broker_task = tokio::spawn(broker.run());

        // (2) Peripherals runner.
        let (aux_main, aux_periph) = Pipe::pair(self.pipe_capacity);
        let (aux_tx, mut aux_rx) = aux_main.split();
        let periph_task = tokio::spawn(
            PeripheralsRunner::new(aux_periph, self.bridge, self.capture, self.record_period)
                .run(),
        );

        let scheduler = ActionScheduler::with_warn_threshold(
            aux_tx.clone(),
            self.control.clone(),
            self.warn_threshold,
        );

        // (3) Workers and their listeners.
        let mut workers = Vec::new();
        let mut listeners: JoinSet<Result<(), EngineError>> = JoinSet::new();
        for blueprint in self.blueprints.drain(..) {
            let (main_end, worker_end) = Pipe::pair(self.pipe_capacity);
            let (main_tx, main_rx) = main_end.split();
            scheduler.register_worker(blueprint.worker.clone(), main_tx.clone());

            let (runtime, controls) = WorkerRuntime::new(
                blueprint.worker.clone(),
                worker_end,
                blueprint.data,
                blueprint.makers,
                broker_handle.clone(),
            );
            let runtime_task = tokio::spawn(runtime.run());

            listeners.spawn(
                WorkerListener::new(
                    blueprint.worker.clone(),
                    main_rx,
                    scheduler.clone(),
                    self.control.clone(),
                    aux_tx.clone(),
                )
                .run(),
            );

            workers.push(WorkerEntry {
                id: blueprint.worker,
                sender: main_tx,
                controls,
                runtime: runtime_task,
                idle_procedure: blueprint.idle_procedure,
                chat_composer: blueprint.chat_composer,
            });
        }

        // (4) Main loop.
        let mut fatal: Option<EngineError> = None;
        loop {
            tokio::select! {
                biased;

                () = self.control.shutdown_signalled() => break,

                msg = aux_rx.recv() => match msg {
                    Some(PipeMessage::Aux(relay)) => {
                        if let Some(text) = relay.message {
                            match parse_command(&text) {
                                Ok(command) => {
                                    Self::apply_command(
                                        command,
                                        &self.control,
                                        &scheduler,
                                        &workers,
                                    )
                                    .await;
                                }
                                Err(err) => {
                                    debug!(line = %text, %err, "unparseable bridge line");
                                }
                            }
                        }
                    }

                    Some(PipeMessage::Fatal(reason)) => {
                        warn!(%reason, "peripherals fatal");
                        self.control.request_shutdown(format!("peripherals fatal: {reason}"));
                    }

                    Some(PipeMessage::Eos) | None => {
                        self.control.request_shutdown("peripherals pipe closed");
                    }

                    Some(other) => {
                        debug!(kind = other.kind(), "ignoring unexpected aux message");
                    }
                },

                joined = listeners.join_next(), if !listeners.is_empty() => match joined {
                    Some(Ok(Ok(()))) => {}
                    Some(Ok(Err(err))) => {
                        warn!(%err, "listener reported fatal");
                        fatal.get_or_insert(err);
                    }
                    Some(Err(join_err)) if join_err.is_cancelled() => {}
                    Some(Err(join_err)) => {
                        fatal.get_or_insert(EngineError::ChannelClosed(format!(
                            "listener panicked: {join_err}"
                        )));
                        self.control.request_shutdown("listener panicked");
                    }
                    None => {}
                },
            }

            if self.control.is_shutdown() {
                break;
            }
        }

        info!(
            reason = self.control.shutdown_reason().as_deref().unwrap_or("unknown"),
            "session tearing down"
        );

        // (5) Teardown: sentinel to every worker, bounded join.
        for worker in &workers {
            let _ = worker.sender.send(PipeMessage::Eos).await;
        }
        for worker in workers {
            match tokio::time::timeout(self.shutdown_grace, worker.runtime).await {
                Ok(Ok(Ok(()))) => debug!(worker = %worker.id, "worker joined"),
                Ok(Ok(Err(err))) => {
                    debug!(worker = %worker.id, %err, "worker joined with error");
                    fatal.get_or_insert(err);
                }
                Ok(Err(join_err)) => {
                    fatal.get_or_insert(EngineError::ChannelClosed(format!(
                        "worker task failed: {join_err}"
                    )));
                }
                Err(_) => {
                    warn!(worker = %worker.id, "worker missed the grace period");
                    fatal.get_or_insert(EngineError::ShutdownTimeout {
                        worker: worker.id.clone(),
                    });
                }
            }
        }

        // Sentinel to peripherals, then cancel stragglers.
        let _ = aux_tx.send(PipeMessage::Eos).await;
        let _ = tokio::time::timeout(self.shutdown_grace, periph_task).await;

        listeners.abort_all();
        while listeners.join_next().await.is_some() {}

        // The broker stops when the last handle drops.
        drop(scheduler);
        drop(broker_handle);
        let _ = tokio::time::timeout(self.shutdown_grace, broker_task).await;

        match fatal {
            Some(err) => {
                warn!(%err, "session ended with fatal");
                Err(err)
            }
            None => {
                info!("session ended cleanly");
                Ok(())
            }
        }
    }

    async fn apply_command(
        command: SessionCommand,
        control: &SessionControl,
        scheduler: &ActionScheduler,
        workers: &[WorkerEntry],
    ) {
        info!(?command, "applying session command");
        match command {
            SessionCommand::Kill => control.request_shutdown("kill command"),

            SessionCommand::Pause => {
                control.pause();
                for worker in workers {
                    let _ = worker
                        .sender
                        .send(PipeMessage::Signal(ControlSignal::Pause))
                        .await;
                }
            }

            SessionCommand::Resume => {
                control.resume();
                for worker in workers {
                    worker.controls.set_hold(false);
                    let _ = worker
                        .sender
                        .send(PipeMessage::Signal(ControlSignal::Resume))
                        .await;
                }
            }

            SessionCommand::Hold => {
                for worker in workers {
                    worker.controls.set_hold(true);
                }
            }

            SessionCommand::Stop => {
                for worker in workers {
                    let Some(procedure) = worker.idle_procedure.clone() else {
                        continue;
                    };
                    let request = ActionRequest::new(
                        "session - safe spot",
                        worker.id.clone(),
                        IDLE_PRIORITY,
                        procedure,
                    );
                    if let Err(err) = scheduler.submit(request).await {
                        warn!(worker = %worker.id, %err, "safe-spot submit failed");
                    }
                }
            }

            SessionCommand::Write { channel, text } => {
                // The first bot with a composer does the typing.
                let Some(worker) = workers.iter().find(|w| w.chat_composer.is_some()) else {
                    warn!("write command with no chat-capable worker");
                    return;
                };
                let Some(composer) = worker.chat_composer.as_ref() else {
                    return;
                };
                let request = ActionRequest::new(
                    "session - chat message",
                    worker.id.clone(),
                    CHAT_PRIORITY,
                    composer(&channel, &text),
                );
                if let Err(err) = scheduler.submit(request).await {
                    warn!(worker = %worker.id, %err, "chat submit failed");
                }
            }
        }
    }
}
