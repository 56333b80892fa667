//! Shared fixtures for the end-to-end tests.
#![allow(dead_code)]

use async_trait::async_trait;
use hive_proto::{action_fn, ActionRequest, Priority};
use hive_runtime::{DecisionContext, DecisionError, DecisionKind, DecisionMaker};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Records every event the kernel emits through it.
pub struct RecordingBackend {
    log: Mutex<Vec<hive_runtime::InputEvent>>,
    emit_delay: Duration,
}

impl RecordingBackend {
    pub fn new(emit_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            log: Mutex::new(Vec::new()),
            emit_delay,
        })
    }

    pub fn events(&self) -> Vec<hive_runtime::InputEvent> {
        self.log.lock().clone()
    }
}

#[async_trait]
impl hive_runtime::InputBackend for RecordingBackend {
    async fn emit(&self, event: &hive_runtime::InputEvent) -> Result<(), String> {
        if self.emit_delay > Duration::ZERO {
            tokio::time::sleep(self.emit_delay).await;
        }
        self.log.lock().push(event.clone());
        Ok(())
    }
}

/// Emits one counted no-op request per tick after an initial delay.
pub struct ProbeMaker {
    pub label: &'static str,
    pub priority: Priority,
    pub initial_delay: Duration,
    pub throttle: Duration,
    pub runs: Arc<AtomicU32>,
    pub started: bool,
}

impl ProbeMaker {
    pub fn new(label: &'static str, priority: Priority) -> (Self, Arc<AtomicU32>) {
        let runs = Arc::new(AtomicU32::new(0));
        (
            Self {
                label,
                priority,
                initial_delay: Duration::ZERO,
                throttle: Duration::from_millis(50),
                runs: Arc::clone(&runs),
                started: false,
            },
            runs,
        )
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }
}

#[async_trait]
impl DecisionMaker for ProbeMaker {
    fn name(&self) -> &str {
        self.label
    }

    fn kind(&self) -> DecisionKind {
        DecisionKind::Rotation
    }

    fn throttle(&self) -> Duration {
        self.throttle
    }

    async fn decide(&mut self, ctx: &mut DecisionContext) -> Result<(), DecisionError> {
        if !self.started {
            self.started = true;
            tokio::time::sleep(self.initial_delay).await;
        }
        let runs = Arc::clone(&self.runs);
        let request = ActionRequest::new(
            format!("{} - probe", self.label),
            ctx.worker().clone(),
            self.priority,
            action_fn(move || {
                let runs = Arc::clone(&runs);
                async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                    Ok(json!(true))
                }
            }),
        );
        ctx.emitter().submit(request).await
    }
}

/// Fails its decision loop after a fixed number of ticks.
pub struct CrashAfterMaker {
    pub after: u32,
    ticks: u32,
}

impl CrashAfterMaker {
    pub fn new(after: u32) -> Self {
        Self { after, ticks: 0 }
    }
}

#[async_trait]
impl DecisionMaker for CrashAfterMaker {
    fn name(&self) -> &str {
        "crash probe"
    }

    fn kind(&self) -> DecisionKind {
        DecisionKind::Maintenance
    }

    fn throttle(&self) -> Duration {
        Duration::from_millis(10)
    }

    async fn decide(&mut self, _ctx: &mut DecisionContext) -> Result<(), DecisionError> {
        self.ticks += 1;
        if self.ticks > self.after {
            Err(DecisionError::Fatal("minimap capture lost".into()))
        } else {
            Ok(())
        }
    }
}
