//! Cross-worker condition wake: a validated action on one worker is
//! woken by the done callback of another worker's task, through a
//! condition both minted from the shared-primitives broker by tag.

mod common;

use hive_proto::{action_fn, ActionRequest, Priority};
use hive_runtime::{
    predicate_fn, ActionWithValidation, ChannelBridge, DecisionContext, DecisionError,
    DecisionKind, DecisionMaker, PrimitiveKind, SessionEngine, WorkerBlueprint,
};
use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

const CONDITION_TAG: &str = "condition:rune";

/// Waits, via a validated action, for the rune flag another worker
/// sets.
struct RuneWaiter {
    rune_solved: Arc<AtomicBool>,
    confirmations: Arc<AtomicU32>,
    done: bool,
}

#[async_trait]
impl DecisionMaker for RuneWaiter {
    fn name(&self) -> &str {
        "rune waiter"
    }

    fn kind(&self) -> DecisionKind {
        DecisionKind::Rotation
    }

    fn throttle(&self) -> Duration {
        Duration::from_millis(50)
    }

    async fn decide(&mut self, ctx: &mut DecisionContext) -> Result<(), DecisionError> {
        if self.done {
            return Ok(());
        }
        self.done = true;

        let condition = ctx
            .broker()
            .mint_timeout(CONDITION_TAG, PrimitiveKind::Condition, Duration::from_secs(1))
            .await
            .map_err(|e| DecisionError::Fatal(e.to_string()))?
            .as_condition()
            .ok_or_else(|| DecisionError::Fatal("wrong primitive kind".into()))?;

        // The waiter's own request does nothing; only the sibling
        // worker's done callback can make the predicate pass.
        let flag = Arc::clone(&self.rune_solved);
        let mut validated = ActionWithValidation::new(
            ActionRequest::new(
                "rune waiter - watch",
                ctx.worker().clone(),
                Priority::new(20),
                action_fn(|| async { Ok(json!("watching")) }),
            ),
            predicate_fn(move || {
                let flag = Arc::clone(&flag);
                async move { flag.load(Ordering::SeqCst) }
            }),
            condition,
            Duration::from_secs(5),
            1,
        );

        validated.execute(ctx.emitter()).await?;
        self.confirmations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Solves the rune after a delay; its task's done callback notifies
/// the shared condition.
struct RuneSolver {
    rune_solved: Arc<AtomicBool>,
    submitted: bool,
}

#[async_trait]
impl DecisionMaker for RuneSolver {
    fn name(&self) -> &str {
        "rune solver"
    }

    fn kind(&self) -> DecisionKind {
        DecisionKind::Maintenance
    }

    fn throttle(&self) -> Duration {
        Duration::from_millis(50)
    }

    async fn decide(&mut self, ctx: &mut DecisionContext) -> Result<(), DecisionError> {
        if self.submitted {
            return Ok(());
        }
        self.submitted = true;

        let condition = ctx
            .broker()
            .mint_timeout(CONDITION_TAG, PrimitiveKind::Condition, Duration::from_secs(1))
            .await
            .map_err(|e| DecisionError::Fatal(e.to_string()))?
            .as_condition()
            .ok_or_else(|| DecisionError::Fatal("wrong primitive kind".into()))?;

        // Give the waiter time to park on the condition first.
        tokio::time::sleep(Duration::from_millis(200)).await;

        let flag = Arc::clone(&self.rune_solved);
        let request = ActionRequest::new(
            "rune solver - solve",
            ctx.worker().clone(),
            Priority::new(10),
            action_fn(move || {
                let flag = Arc::clone(&flag);
                async move {
                    flag.store(true, Ordering::SeqCst);
                    Ok(json!("solved"))
                }
            }),
        )
        .with_callback(Arc::new(move |_| condition.notify_all()));

        ctx.emitter().submit(request).await
    }
}

#[tokio::test]
async fn done_callback_on_one_worker_wakes_validator_on_another() {
    let (bridge, _outbound, inbound_tx) = ChannelBridge::channel();

    let rune_solved = Arc::new(AtomicBool::new(false));
    let confirmations = Arc::new(AtomicU32::new(0));

    let engine = SessionEngine::new(Box::new(bridge))
        .with_worker(WorkerBlueprint::new("Aria").with_maker(Box::new(RuneWaiter {
            rune_solved: Arc::clone(&rune_solved),
            confirmations: Arc::clone(&confirmations),
            done: false,
        })))
        .with_worker(WorkerBlueprint::new("Brynn").with_maker(Box::new(RuneSolver {
            rune_solved: Arc::clone(&rune_solved),
            submitted: false,
        })))
        .with_shutdown_grace(Duration::from_secs(2));
    let session = tokio::spawn(engine.run());

    // The validator confirms well inside its 5 s trial window because
    // the solver's done callback notifies the shared condition.
    let deadline = std::time::Instant::now() + Duration::from_secs(3);
    while confirmations.load(Ordering::SeqCst) == 0 && std::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    assert_eq!(confirmations.load(Ordering::SeqCst), 1, "validator never woke");
    assert!(rune_solved.load(Ordering::SeqCst));

    inbound_tx.send("kill".to_string()).unwrap();
    let result = tokio::time::timeout(Duration::from_secs(5), session)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_ok());
}
