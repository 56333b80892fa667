//! Worker runtime.
//!
//! A [`WorkerRuntime`] is the worker side of one pipe: it owns the
//! bot's data store, supervises the bot's decision makers, and routes
//! pipe traffic — `Update` into the store, `Result` to whoever asked,
//! `Signal` into the run gates. One runtime per game client.
//!
//! ```text
//!                      ┌──────────────────────────────┐
//!                      │        WorkerRuntime         │
//! main ──Update──────► │  store.apply_update          │
//! main ──Result──────► │  outcomes[identifier]        │
//! main ──Signal/Eos──► │  pause / resume / teardown   │
//!                      │                              │
//!                      │  DecisionMaker loops ────────┼──Request──► main
//!                      └──────────────────────────────┘
//! ```

use crate::decision::{
    self, DecisionContext, DecisionError, DecisionHandle, DecisionKind, DecisionMaker,
};
use crate::error::EngineError;
use crate::sync::SyncBrokerHandle;
use hive_data::BotData;
use hive_proto::{ActionOutcome, ActionRequest, ControlSignal, PipeEnd, PipeMessage, PipeSender};
use hive_types::WorkerId;
use parking_lot::Mutex as SyncMutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Cloneable request submitter handed to decision makers.
#[derive(Debug, Clone)]
pub struct ActionEmitter {
    worker: WorkerId,
    tx: PipeSender,
}

impl ActionEmitter {
    /// Creates an emitter over a worker→main pipe sender.
    #[must_use]
    pub fn new(worker: WorkerId, tx: PipeSender) -> Self {
        Self { worker, tx }
    }

    /// The worker this emitter submits for.
    #[must_use]
    pub fn worker(&self) -> &WorkerId {
        &self.worker
    }

    /// Sends a request up the pipe.
    ///
    /// # Errors
    ///
    /// [`DecisionError::Emit`] when the pipe is gone.
    pub async fn submit(&self, request: ActionRequest) -> Result<(), DecisionError> {
        self.tx
            .send(PipeMessage::Request(request))
            .await
            .map_err(DecisionError::Emit)
    }
}

/// Control surface the engine keeps per worker.
#[derive(Debug)]
pub struct WorkerControls {
    hold: watch::Sender<bool>,
    kind_tx: mpsc::UnboundedSender<(DecisionKind, bool)>,
}

impl WorkerControls {
    /// Blocks or unblocks the root decision maker (the first one the
    /// blueprint listed).
    pub fn set_hold(&self, held: bool) {
        self.hold.send_replace(held);
    }

    /// Current hold flag.
    #[must_use]
    pub fn is_held(&self) -> bool {
        *self.hold.borrow()
    }

    /// Enables or disables every decision maker of one kind.
    pub fn set_kind_enabled(&self, kind: DecisionKind, enabled: bool) {
        let _ = self.kind_tx.send((kind, enabled));
    }
}

/// The worker-side task group for one game client.
pub struct WorkerRuntime {
    id: WorkerId,
    pipe: PipeEnd,
    data: Arc<Mutex<BotData>>,
    makers: Vec<Box<dyn DecisionMaker>>,
    broker: SyncBrokerHandle,
    hold_rx: watch::Receiver<bool>,
    kind_rx: mpsc::UnboundedReceiver<(DecisionKind, bool)>,
}

impl WorkerRuntime {
    /// Creates a runtime over the worker side of a pipe.
    ///
    /// The data store should already carry every attribute the
    /// decision makers declare; [`run`](Self::run) verifies the union
    /// before anything moves.
    #[must_use]
    pub fn new(
        id: WorkerId,
        pipe: PipeEnd,
        data: BotData,
        makers: Vec<Box<dyn DecisionMaker>>,
        broker: SyncBrokerHandle,
    ) -> (Self, WorkerControls) {
        let (hold_tx, hold_rx) = watch::channel(false);
        let (kind_tx, kind_rx) = mpsc::unbounded_channel();
        (
            Self {
                id,
                pipe,
                data: Arc::new(Mutex::new(data)),
                makers,
                broker,
                hold_rx,
                kind_rx,
            },
            WorkerControls {
                hold: hold_tx,
                kind_tx,
            },
        )
    }

    /// The worker's identity.
    #[must_use]
    pub fn id(&self) -> &WorkerId {
        &self.id
    }

    /// Runs until the main loop sends `Eos`/`Shutdown`, a decision
    /// maker fails, or the pipe is lost.
    ///
    /// # Errors
    ///
    /// [`EngineError::MissingCapability`] when a declared attribute is
    /// unregistered; [`EngineError::WorkerFatal`] when a decision
    /// maker errors out (the failure is forwarded on the pipe first).
    pub async fn run(mut self) -> Result<(), EngineError> {
        info!(worker = %self.id, makers = self.makers.len(), "worker runtime started");

        // Capability check: the union of declared attributes must be
        // registered. `has_` probes are exempt by convention.
        {
            let data = self.data.lock().await;
            for maker in &self.makers {
                for attribute in maker.required_attributes() {
                    if !attribute.starts_with("has_") && !data.contains(&attribute) {
                        let err = EngineError::MissingCapability {
                            worker: self.id.clone(),
                            attribute,
                        };
                        let _ = self.pipe.send(PipeMessage::Fatal(err.to_string())).await;
                        self.pipe.close().await;
                        return Err(err);
                    }
                }
            }
        }

        let (tx, mut rx) = self.pipe.split();
        let outcomes: Arc<SyncMutex<HashMap<String, ActionOutcome>>> =
            Arc::new(SyncMutex::new(HashMap::new()));
        let (run_tx, run_rx) = watch::channel(true);

        let mut handles = Vec::new();
        let mut loops: JoinSet<Result<(), DecisionError>> = JoinSet::new();
        for maker in self.makers.drain(..) {
            let (handle, enabled_rx) = DecisionHandle::new(maker.name().to_string(), maker.kind());
            let ctx = DecisionContext::new(
                self.id.clone(),
                Arc::clone(&self.data),
                ActionEmitter::new(self.id.clone(), tx.clone()),
                self.broker.clone(),
                Arc::clone(&outcomes),
            );
            loops.spawn(decision::run_loop(maker, ctx, enabled_rx, run_rx.clone()));
            handles.push(handle);
        }

        let mut hold_rx = self.hold_rx.clone();
        let exit = loop {
            tokio::select! {
                biased;

                msg = rx.recv() => match msg {
                    Some(PipeMessage::Update { attribute, value }) => {
                        debug!(worker = %self.id, %attribute, "write-back applied");
                        self.data.lock().await.apply_update(&attribute, value);
                    }

                    Some(PipeMessage::Result { identifier, outcome }) => {
                        if let ActionOutcome::Failed(failure) = &outcome {
                            warn!(worker = %self.id, %identifier, %failure, "task failed");
                        }
                        outcomes.lock().insert(identifier, outcome);
                    }

                    Some(PipeMessage::Signal(ControlSignal::Pause)) => {
                        info!(worker = %self.id, "decision loops paused");
                        run_tx.send_replace(false);
                    }

                    Some(PipeMessage::Signal(ControlSignal::Resume)) => {
                        info!(worker = %self.id, "decision loops resumed");
                        run_tx.send_replace(true);
                    }

                    Some(PipeMessage::Signal(ControlSignal::Shutdown))
                    | Some(PipeMessage::Eos) => {
                        info!(worker = %self.id, "worker runtime stopping");
                        break Ok(());
                    }

                    Some(other) => {
                        debug!(worker = %self.id, kind = other.kind(), "ignoring unexpected message");
                    }

                    None => {
                        warn!(worker = %self.id, "main pipe lost");
                        break Ok(());
                    }
                },

                changed = hold_rx.changed() => {
                    if changed.is_ok() {
                        let held = *hold_rx.borrow();
                        if let Some(root) = handles.first() {
                            info!(worker = %self.id, maker = %root.name, held, "root hold flag");
                            root.set_enabled(!held);
                        }
                    }
                }

                cmd = self.kind_rx.recv() => {
                    if let Some((kind, enabled)) = cmd {
                        info!(worker = %self.id, ?kind, enabled, "bulk toggle");
                        for handle in handles.iter().filter(|h| h.kind == kind) {
                            handle.set_enabled(enabled);
                        }
                    }
                }

                joined = loops.join_next(), if !loops.is_empty() => match joined {
                    Some(Ok(Ok(()))) => {}

                    Some(Ok(Err(err))) => {
                        let _ = tx.send(PipeMessage::Fatal(err.to_string())).await;
                        break Err(EngineError::WorkerFatal {
                            worker: self.id.clone(),
                            reason: err.to_string(),
                        });
                    }

                    Some(Err(join_err)) if join_err.is_cancelled() => {}

                    Some(Err(join_err)) => {
                        let reason = format!("decision maker panicked: {join_err}");
                        let _ = tx.send(PipeMessage::Fatal(reason.clone())).await;
                        break Err(EngineError::WorkerFatal {
                            worker: self.id.clone(),
                            reason,
                        });
                    }

                    None => {}
                },
            }
        };

        loops.abort_all();
        while loops.join_next().await.is_some() {}
        tx.close().await;
        info!(worker = %self.id, "worker runtime stopped");
        exit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::DecisionKind;
    use crate::sync::SyncBroker;
    use async_trait::async_trait;
    use hive_data::update_fn;
    use hive_proto::{action_fn, Pipe};
    use hive_types::Priority;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct TickMaker {
        emitted: Arc<AtomicU32>,
    }

    #[async_trait]
    impl DecisionMaker for TickMaker {
        fn name(&self) -> &str {
            "rotation"
        }

        fn kind(&self) -> DecisionKind {
            DecisionKind::Rotation
        }

        fn throttle(&self) -> Duration {
            Duration::from_millis(10)
        }

        fn required_attributes(&self) -> Vec<String> {
            vec!["hp".into()]
        }

        async fn decide(&mut self, ctx: &mut DecisionContext) -> Result<(), DecisionError> {
            let _hp = ctx.read("hp").await?;
            let n = self.emitted.fetch_add(1, Ordering::SeqCst);
            let request = ActionRequest::new(
                format!("rotation - tick {n}"),
                ctx.worker().clone(),
                Priority::new(50),
                action_fn(|| async { Ok(json!(true)) }),
            );
            ctx.emitter().submit(request).await
        }
    }

    struct FailingMaker;

    #[async_trait]
    impl DecisionMaker for FailingMaker {
        fn name(&self) -> &str {
            "doomed"
        }

        fn kind(&self) -> DecisionKind {
            DecisionKind::Maintenance
        }

        async fn decide(&mut self, _ctx: &mut DecisionContext) -> Result<(), DecisionError> {
            Err(DecisionError::Fatal("observation pipeline gone".into()))
        }
    }

    async fn store_with_hp() -> BotData {
        let mut data = BotData::new();
        data.register("hp", update_fn(|| async { Ok(json!(1000)) }), None, None, None)
            .await
            .unwrap();
        data
    }

    fn broker() -> SyncBrokerHandle {
        let (broker, handle) = SyncBroker::channel();
        tokio::spawn(broker.run());
        handle
    }

    #[tokio::test]
    async fn decision_makers_emit_requests_up_the_pipe() {
        let worker = WorkerId::named("Aria");
        let (mut main_end, worker_end) = Pipe::pair(32);
        let emitted = Arc::new(AtomicU32::new(0));

        let (runtime, _controls) = WorkerRuntime::new(
            worker.clone(),
            worker_end,
            store_with_hp().await,
            vec![Box::new(TickMaker {
                emitted: Arc::clone(&emitted),
            })],
            broker(),
        );
        let task = tokio::spawn(runtime.run());

        let msg = tokio::time::timeout(Duration::from_secs(1), main_end.recv())
            .await
            .unwrap()
            .unwrap();
        match msg {
            PipeMessage::Request(request) => {
                assert!(request.identifier.starts_with("rotation - tick"));
                assert_eq!(request.worker, worker);
            }
            other => panic!("expected request, got {:?}", other),
        }

        main_end.send(PipeMessage::Eos).await.unwrap();
        let result = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn update_message_lands_in_store() {
        let worker = WorkerId::named("Aria");
        let (main_end, worker_end) = Pipe::pair(32);

        let data = store_with_hp().await;
        let (runtime, _controls) =
            WorkerRuntime::new(worker, worker_end, data, Vec::new(), broker());
        let shared = Arc::clone(&runtime.data);
        let task = tokio::spawn(runtime.run());

        main_end
            .send(PipeMessage::Update {
                attribute: "rune_solved".into(),
                value: json!(true),
            })
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(
            shared.lock().await.read("rune_solved").await.unwrap(),
            json!(true)
        );

        main_end.send(PipeMessage::Eos).await.unwrap();
        let _ = tokio::time::timeout(Duration::from_secs(1), task).await;
    }

    #[tokio::test]
    async fn missing_capability_is_fatal_before_start() {
        let worker = WorkerId::named("Aria");
        let (mut main_end, worker_end) = Pipe::pair(32);

        // Store without "hp".
        let (runtime, _controls) = WorkerRuntime::new(
            worker.clone(),
            worker_end,
            BotData::new(),
            vec![Box::new(TickMaker {
                emitted: Arc::new(AtomicU32::new(0)),
            })],
            broker(),
        );
        let task = tokio::spawn(runtime.run());

        let msg = tokio::time::timeout(Duration::from_secs(1), main_end.recv())
            .await
            .unwrap()
            .unwrap();
        match msg {
            PipeMessage::Fatal(reason) => assert!(reason.contains("hp")),
            other => panic!("expected fatal, got {:?}", other),
        }

        let result = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(
            result,
            Err(EngineError::MissingCapability { .. })
        ));
    }

    #[tokio::test]
    async fn failing_decision_maker_forwards_fatal() {
        let worker = WorkerId::named("Aria");
        let (mut main_end, worker_end) = Pipe::pair(32);

        let (runtime, _controls) = WorkerRuntime::new(
            worker,
            worker_end,
            BotData::new(),
            vec![Box::new(FailingMaker)],
            broker(),
        );
        let task = tokio::spawn(runtime.run());

        let msg = tokio::time::timeout(Duration::from_secs(1), main_end.recv())
            .await
            .unwrap()
            .unwrap();
        match msg {
            PipeMessage::Fatal(reason) => {
                assert!(reason.contains("observation pipeline gone"));
            }
            other => panic!("expected fatal, got {:?}", other),
        }

        let result = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(EngineError::WorkerFatal { .. })));
    }

    #[tokio::test]
    async fn pause_signal_gates_decision_loops() {
        let worker = WorkerId::named("Aria");
        let (mut main_end, worker_end) = Pipe::pair(64);
        let emitted = Arc::new(AtomicU32::new(0));

        let (runtime, _controls) = WorkerRuntime::new(
            worker,
            worker_end,
            store_with_hp().await,
            vec![Box::new(TickMaker {
                emitted: Arc::clone(&emitted),
            })],
            broker(),
        );
        let task = tokio::spawn(runtime.run());

        tokio::time::sleep(Duration::from_millis(50)).await;
        main_end
            .send(PipeMessage::Signal(ControlSignal::Pause))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let at_pause = emitted.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;
        // Paused loops emit at most one more request (the iteration in
        // flight when the signal landed).
        assert!(emitted.load(Ordering::SeqCst) <= at_pause + 1);

        main_end.send(PipeMessage::Eos).await.unwrap();
        let _ = tokio::time::timeout(Duration::from_secs(1), task).await;
    }

    #[tokio::test]
    async fn kind_toggle_gates_matching_makers() {
        let worker = WorkerId::named("Aria");
        let (mut main_end, worker_end) = Pipe::pair(64);
        let emitted = Arc::new(AtomicU32::new(0));

        let (runtime, controls) = WorkerRuntime::new(
            worker,
            worker_end,
            store_with_hp().await,
            vec![Box::new(TickMaker {
                emitted: Arc::clone(&emitted),
            })],
            broker(),
        );
        let task = tokio::spawn(runtime.run());

        tokio::time::sleep(Duration::from_millis(50)).await;
        controls.set_kind_enabled(DecisionKind::Rotation, false);
        tokio::time::sleep(Duration::from_millis(50)).await;

        let at_disable = emitted.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(emitted.load(Ordering::SeqCst) <= at_disable + 1);

        // Re-enabling the kind lets the loop tick again.
        controls.set_kind_enabled(DecisionKind::Rotation, true);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(emitted.load(Ordering::SeqCst) > at_disable);

        main_end.send(PipeMessage::Eos).await.unwrap();
        let _ = tokio::time::timeout(Duration::from_secs(1), task).await;
    }

    #[tokio::test]
    async fn hold_disables_root_maker() {
        let worker = WorkerId::named("Aria");
        let (mut main_end, worker_end) = Pipe::pair(64);
        let emitted = Arc::new(AtomicU32::new(0));

        let (runtime, controls) = WorkerRuntime::new(
            worker,
            worker_end,
            store_with_hp().await,
            vec![Box::new(TickMaker {
                emitted: Arc::clone(&emitted),
            })],
            broker(),
        );
        let task = tokio::spawn(runtime.run());

        tokio::time::sleep(Duration::from_millis(50)).await;
        controls.set_hold(true);
        assert!(controls.is_held());
        tokio::time::sleep(Duration::from_millis(50)).await;

        let at_hold = emitted.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(emitted.load(Ordering::SeqCst) <= at_hold + 1);

        main_end.send(PipeMessage::Eos).await.unwrap();
        let _ = tokio::time::timeout(Duration::from_secs(1), task).await;
    }
}
