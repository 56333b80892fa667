//! Validated actions.
//!
//! An [`ActionWithValidation`] is the act-and-confirm loop: submit a
//! request, wait on a shared condition for a predicate to become true,
//! re-submit up to `max_trials`, fail with a validation timeout
//! otherwise. The wake path is the scheduler's done chain — every
//! submission carries a callback that calls `notify_all` on the
//! condition, so the waiter re-checks its predicate exactly when the
//! main loop finished (or canceled) the action.
//!
//! # Execution Modes
//!
//! - [`execute`](ActionWithValidation::execute) — the condition's lock
//!   is released between waits, so sibling validators on the same
//!   condition interleave.
//! - [`execute_holding`](ActionWithValidation::execute_holding) — the
//!   lock is held across the whole exchange, serializing validators
//!   that share the condition.

use super::DecisionError;
use crate::sync::SharedCondition;
use crate::worker::ActionEmitter;
use hive_proto::ActionRequest;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::OwnedMutexGuard;
use tracing::debug;

/// Async success predicate, re-evaluated after every wakeup.
pub type ValidationPredicate =
    Box<dyn FnMut() -> Pin<Box<dyn Future<Output = bool> + Send>> + Send>;

/// Wraps an async closure into a [`ValidationPredicate`].
///
/// # Example
///
/// ```
/// use hive_runtime::decision::predicate_fn;
///
/// let mut hits = 0;
/// let _predicate = predicate_fn(move || {
///     hits += 1;
///     let confirmed = hits > 2;
///     async move { confirmed }
/// });
/// ```
pub fn predicate_fn<F, Fut>(mut f: F) -> ValidationPredicate
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = bool> + Send + 'static,
{
    Box::new(move || Box::pin(f()))
}

/// One act-and-confirm exchange.
pub struct ActionWithValidation {
    request: ActionRequest,
    predicate: ValidationPredicate,
    condition: SharedCondition,
    timeout: Duration,
    max_trials: u32,
}

impl ActionWithValidation {
    /// Composes a validated action.
    ///
    /// `timeout` bounds each trial; the exchange as a whole takes at
    /// most `timeout × max_trials` plus scheduling latency.
    #[must_use]
    pub fn new(
        request: ActionRequest,
        predicate: ValidationPredicate,
        condition: SharedCondition,
        timeout: Duration,
        max_trials: u32,
    ) -> Self {
        Self {
            request,
            predicate,
            condition,
            timeout,
            max_trials: max_trials.max(1),
        }
    }

    /// Runs the exchange, releasing the condition between waits.
    ///
    /// Returns the number of trials used on success.
    ///
    /// # Errors
    ///
    /// [`DecisionError::ValidationTimeout`] when every trial elapsed
    /// without the predicate confirming;
    /// [`DecisionError::Emit`] when the worker pipe is gone.
    pub async fn execute(&mut self, emitter: &ActionEmitter) -> Result<u32, DecisionError> {
        self.run(emitter, false).await
    }

    /// Runs the exchange while holding the condition's lock
    /// throughout, serializing other validators on the same
    /// condition.
    ///
    /// # Errors
    ///
    /// As for [`execute`](Self::execute).
    pub async fn execute_holding(&mut self, emitter: &ActionEmitter) -> Result<u32, DecisionError> {
        self.run(emitter, true).await
    }

    async fn run(&mut self, emitter: &ActionEmitter, hold: bool) -> Result<u32, DecisionError> {
        let mut held: Option<OwnedMutexGuard<()>> = None;

        for trial in 1..=self.max_trials {
            let mut guard = match held.take() {
                Some(guard) => guard,
                None => self.condition.acquire().await,
            };

            let wake = self.condition.clone();
            let request = self
                .request
                .clone()
                .with_callback(Arc::new(move |_| wake.notify_all()));
            emitter.submit(request).await?;
            debug!(
                identifier = %self.request.identifier,
                trial,
                max = self.max_trials,
                "validated action submitted"
            );

            let deadline = Instant::now() + self.timeout;
            loop {
                if (self.predicate)().await {
                    return Ok(trial);
                }
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                let (reacquired, timed_out) =
                    self.condition.wait_timeout(guard, deadline - now).await;
                guard = reacquired;
                if timed_out {
                    break;
                }
            }

            // A notification that landed between predicate checks is
            // indistinguishable from a timeout; look once more before
            // burning the trial.
            if (self.predicate)().await {
                return Ok(trial);
            }

            // Trial exhausted; no re-submission happens past this
            // point for the final trial.
            if hold {
                held = Some(guard);
            }
        }

        Err(DecisionError::ValidationTimeout {
            identifier: self.request.identifier.clone(),
            trials: self.max_trials,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::SessionControl;
    use crate::scheduler::ActionScheduler;
    use hive_proto::{action_fn, Pipe, PipeMessage};
    use hive_types::{Priority, WorkerId};
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Wires a real scheduler + listener-less loop: requests emitted
    /// by the validator are pumped straight into the scheduler.
    struct Rig {
        emitter: ActionEmitter,
        _pump: tokio::task::JoinHandle<()>,
        _drain: tokio::task::JoinHandle<()>,
    }

    fn rig(worker: &WorkerId) -> Rig {
        let (aux_main, aux_periph) = Pipe::pair(16);
        let control = SessionControl::new();
        let scheduler = ActionScheduler::new(aux_main.sender(), control);
        let (_aux_tx, mut aux_rx) = aux_periph.split();
        tokio::spawn(async move { while aux_rx.recv().await.is_some() {} });

        let (main_end, worker_end) = Pipe::pair(16);
        scheduler.register_worker(worker.clone(), main_end.sender());

        let (_main_tx, mut main_rx) = main_end.split();
        let (worker_tx, mut worker_rx) = worker_end.split();

        // Pump: worker → scheduler (stands in for the listener).
        let pump_scheduler = scheduler.clone();
        let pump = tokio::spawn(async move {
            while let Some(msg) = main_rx.recv().await {
                if let PipeMessage::Request(request) = msg {
                    let _ = pump_scheduler.submit(request).await;
                }
            }
        });
        // Drain main → worker results.
        let drain = tokio::spawn(async move { while worker_rx.recv().await.is_some() {} });

        Rig {
            emitter: ActionEmitter::new(worker.clone(), worker_tx),
            _pump: pump,
            _drain: drain,
        }
    }

    fn counting_request(worker: &WorkerId, counter: Arc<AtomicU32>) -> ActionRequest {
        ActionRequest::new(
            "rotation - hit rune",
            worker.clone(),
            Priority::new(10),
            action_fn(move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(json!(true))
                }
            }),
        )
    }

    #[tokio::test]
    async fn succeeds_once_predicate_confirms() {
        let worker = WorkerId::named("Aria");
        let rig = rig(&worker);

        let submissions = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&submissions);

        // Confirms only after the second submission has run.
        let predicate = predicate_fn(move || {
            let seen = Arc::clone(&seen);
            async move { seen.load(Ordering::SeqCst) >= 2 }
        });

        let mut validated = ActionWithValidation::new(
            counting_request(&worker, Arc::clone(&submissions)),
            predicate,
            SharedCondition::new(),
            Duration::from_millis(100),
            3,
        );

        let trials = validated.execute(&rig.emitter).await.unwrap();
        assert_eq!(trials, 2);
        assert_eq!(submissions.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn single_trial_raises_validation_timeout() {
        let worker = WorkerId::named("Aria");
        let rig = rig(&worker);

        let submissions = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&submissions);
        let predicate = predicate_fn(move || {
            let seen = Arc::clone(&seen);
            async move { seen.load(Ordering::SeqCst) >= 2 }
        });

        let mut validated = ActionWithValidation::new(
            counting_request(&worker, Arc::clone(&submissions)),
            predicate,
            SharedCondition::new(),
            Duration::from_millis(50),
            1,
        );

        let err = validated.execute(&rig.emitter).await.unwrap_err();
        assert_eq!(
            err,
            DecisionError::ValidationTimeout {
                identifier: "rotation - hit rune".into(),
                trials: 1,
            }
        );
        // The timeout stops re-submission.
        assert_eq!(submissions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn done_callback_wakes_waiter_promptly() {
        let worker = WorkerId::named("Aria");
        let rig = rig(&worker);

        let submissions = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&submissions);
        let predicate = predicate_fn(move || {
            let seen = Arc::clone(&seen);
            async move { seen.load(Ordering::SeqCst) >= 1 }
        });

        let mut validated = ActionWithValidation::new(
            counting_request(&worker, Arc::clone(&submissions)),
            predicate,
            SharedCondition::new(),
            // Long per-trial timeout: only the notify path can make
            // this finish fast.
            Duration::from_secs(5),
            1,
        );

        let started = Instant::now();
        let trials = validated.execute(&rig.emitter).await.unwrap();
        assert_eq!(trials, 1);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn holding_mode_serializes_same_condition() {
        let worker = WorkerId::named("Aria");
        let rig = rig(&worker);
        let condition = SharedCondition::new();

        // A bystander holds the condition; the holding validator must
        // wait for it before submitting.
        let guard = condition.acquire().await;

        let submissions = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&submissions);
        let predicate = predicate_fn(move || {
            let seen = Arc::clone(&seen);
            async move { seen.load(Ordering::SeqCst) >= 1 }
        });

        let mut validated = ActionWithValidation::new(
            counting_request(&worker, Arc::clone(&submissions)),
            predicate,
            condition.clone(),
            Duration::from_millis(200),
            1,
        );

        let emitter = rig.emitter.clone();
        let task = tokio::spawn(async move { validated.execute_holding(&emitter).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(submissions.load(Ordering::SeqCst), 0);

        drop(guard);
        let result = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }
}
