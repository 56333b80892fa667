//! Scoped input sessions.
//!
//! The host's keyboard/mouse focus is one shared resource. Every
//! action that drives inputs goes through an [`InputSession`]: a
//! scoped acquisition of the global focus lock that plays events in
//! order with randomized short delays, tracks which keys it holds
//! down, and — on every exit path including task abort — emits key-up
//! for its `forced_releases` **before** the focus lock is released.
//!
//! ```text
//! broker.session(forced).await     acquire focus lock
//!     session.play(&events)        ordered, humanized cadence
//!     │
//!     ├─ normal end / finish()     held ∩ forced released, lock freed
//!     └─ task abort → Drop         cleanup job: {key-ups, lock guard}
//!                                  drained by the cleanup task; the
//!                                  guard drops only after the key-ups
//! ```
//!
//! The backend is a seam: the kernel only knows
//! [`InputBackend::emit`]. Concrete injectors live outside.

use hive_types::ErrorCode;
use async_trait::async_trait;
use parking_lot::Mutex as SyncMutex;
use rand::Rng;
use std::collections::HashSet;
use std::fmt;
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

/// Default humanized delay between events, in milliseconds.
const DEFAULT_DELAY_MS: RangeInclusive<u64> = 8..=35;

/// A key name as the backend understands it ("alt", "left", "z", …).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Key(pub String);

impl Key {
    /// Creates a key.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// One input event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    /// Press and hold.
    KeyDown(Key),
    /// Release.
    KeyUp(Key),
    /// Move the pointer to screen coordinates.
    MouseMove {
        /// Horizontal position.
        x: i32,
        /// Vertical position.
        y: i32,
    },
    /// Click at the current pointer position.
    Click,
}

/// An ordered batch of events plus the keys to force-release if the
/// playing task is canceled mid-sequence.
#[derive(Debug, Clone, Default)]
pub struct InputSequence {
    /// Events, played in order.
    pub events: Vec<InputEvent>,
    /// Keys to release on cancellation.
    pub forced_releases: Vec<Key>,
}

impl InputSequence {
    /// Creates an empty sequence.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a key-down and registers the key for forced release.
    #[must_use]
    pub fn hold(mut self, key: impl Into<Key>) -> Self {
        let key = key.into();
        self.events.push(InputEvent::KeyDown(key.clone()));
        if !self.forced_releases.contains(&key) {
            self.forced_releases.push(key);
        }
        self
    }

    /// Appends a key-up.
    #[must_use]
    pub fn release(mut self, key: impl Into<Key>) -> Self {
        self.events.push(InputEvent::KeyUp(key.into()));
        self
    }

    /// Appends a down/up pair.
    #[must_use]
    pub fn tap(self, key: impl Into<Key>) -> Self {
        let key = key.into();
        self.hold(key.clone()).release(key)
    }

    /// Appends a pointer move.
    #[must_use]
    pub fn mouse_move(mut self, x: i32, y: i32) -> Self {
        self.events.push(InputEvent::MouseMove { x, y });
        self
    }

    /// Appends a click.
    #[must_use]
    pub fn click(mut self) -> Self {
        self.events.push(InputEvent::Click);
        self
    }
}

/// The injection seam. Implementations translate events into real OS
/// input; the kernel ships none.
#[async_trait]
pub trait InputBackend: Send + Sync {
    /// Emits one event.
    ///
    /// # Errors
    ///
    /// Implementation-defined; surfaced as
    /// [`InputError::Backend`].
    async fn emit(&self, event: &InputEvent) -> Result<(), String>;
}

/// Key-ups plus the focus guard they must precede.
struct CleanupJob {
    events: Vec<InputEvent>,
    guard: OwnedMutexGuard<()>,
}

/// Per-process input state: the focus lock, the monotone sent-keys
/// set, and the cleanup drain.
#[derive(Clone)]
pub struct InputBroker {
    backend: Arc<dyn InputBackend>,
    focus: Arc<Mutex<()>>,
    sent_keys: Arc<SyncMutex<HashSet<Key>>>,
    cleanup_tx: mpsc::UnboundedSender<CleanupJob>,
    delay_ms: RangeInclusive<u64>,
}

impl InputBroker {
    /// Creates the broker and spawns its cleanup drain task.
    #[must_use]
    pub fn new(backend: Arc<dyn InputBackend>) -> Self {
        Self::with_delay_range(backend, DEFAULT_DELAY_MS)
    }

    /// Creates a broker with a custom inter-event delay range.
    #[must_use]
    pub fn with_delay_range(
        backend: Arc<dyn InputBackend>,
        delay_ms: RangeInclusive<u64>,
    ) -> Self {
        let (cleanup_tx, mut cleanup_rx) = mpsc::unbounded_channel::<CleanupJob>();

        let drain_backend = Arc::clone(&backend);
        tokio::spawn(async move {
            while let Some(job) = cleanup_rx.recv().await {
                for event in &job.events {
                    if let Err(reason) = drain_backend.emit(event).await {
                        warn!(%reason, "cleanup emit failed");
                    }
                }
                // The focus lock releases only now, after the key-ups.
                drop(job.guard);
            }
        });

        Self {
            backend,
            focus: Arc::new(Mutex::new(())),
            sent_keys: Arc::new(SyncMutex::new(HashSet::new())),
            cleanup_tx,
            delay_ms,
        }
    }

    /// Acquires the focus lock and opens a session.
    pub async fn session(&self, forced_releases: Vec<Key>) -> InputSession {
        let guard = Arc::clone(&self.focus).lock_owned().await;
        InputSession {
            broker: self.clone(),
            guard: Some(guard),
            held: HashSet::new(),
            forced_releases,
        }
    }

    /// Plays a whole sequence under one session.
    ///
    /// # Errors
    ///
    /// [`InputError::Backend`] on the first failing emit; held keys in
    /// `forced_releases` are still released.
    pub async fn run(&self, sequence: &InputSequence) -> Result<(), InputError> {
        let mut session = self.session(sequence.forced_releases.clone()).await;
        session.play(&sequence.events).await?;
        session.finish().await;
        Ok(())
    }

    /// Keys this process has ever sent. Monotone within the process
    /// lifetime.
    #[must_use]
    pub fn keys_sent(&self) -> Vec<Key> {
        self.sent_keys.lock().iter().cloned().collect()
    }

    /// Emits key-up for every key ever sent. Teardown hygiene.
    pub async fn release_all(&self) {
        let keys = self.keys_sent();
        for key in keys {
            let event = InputEvent::KeyUp(key);
            if let Err(reason) = self.backend.emit(&event).await {
                warn!(%reason, "release_all emit failed");
            }
        }
    }

    fn random_delay(&self) -> Duration {
        let ms = rand::thread_rng().gen_range(self.delay_ms.clone());
        Duration::from_millis(ms)
    }
}

/// A scoped hold on the host's input focus.
///
/// Dropping the session — normally, or because the owning task was
/// aborted — emits key-up for every held key listed in
/// `forced_releases`, then releases the focus lock.
pub struct InputSession {
    broker: InputBroker,
    guard: Option<OwnedMutexGuard<()>>,
    held: HashSet<Key>,
    forced_releases: Vec<Key>,
}

impl InputSession {
    /// Plays events in order with humanized delays.
    ///
    /// # Errors
    ///
    /// [`InputError::Backend`] on the first failing emit.
    pub async fn play(&mut self, events: &[InputEvent]) -> Result<(), InputError> {
        for event in events {
            self.broker
                .backend
                .emit(event)
                .await
                .map_err(InputError::Backend)?;

            match event {
                InputEvent::KeyDown(key) => {
                    self.held.insert(key.clone());
                    self.broker.sent_keys.lock().insert(key.clone());
                }
                InputEvent::KeyUp(key) => {
                    self.held.remove(key);
                    self.broker.sent_keys.lock().insert(key.clone());
                }
                InputEvent::MouseMove { .. } | InputEvent::Click => {}
            }

            tokio::time::sleep(self.broker.random_delay()).await;
        }
        Ok(())
    }

    /// Keys currently held by this session.
    #[must_use]
    pub fn held(&self) -> Vec<Key> {
        self.held.iter().cloned().collect()
    }

    /// Completes the session cleanly: releases still-held forced keys
    /// inline, then frees the focus lock.
    pub async fn finish(mut self) {
        let pending = self.pending_releases();
        for event in &pending {
            if let Err(reason) = self.broker.backend.emit(event).await {
                warn!(%reason, "finish emit failed");
            }
        }
        self.held.clear();
        // Drop impl sees no pending work and releases the lock
        // directly.
        drop(self.guard.take());
    }

    fn pending_releases(&self) -> Vec<InputEvent> {
        self.forced_releases
            .iter()
            .filter(|key| self.held.contains(*key))
            .map(|key| InputEvent::KeyUp(key.clone()))
            .collect()
    }
}

impl Drop for InputSession {
    fn drop(&mut self) {
        let Some(guard) = self.guard.take() else {
            return;
        };
        let pending = self.pending_releases();
        if pending.is_empty() {
            return; // Guard drops here; nothing was held.
        }
        debug!(count = pending.len(), "forced releases on session drop");
        // Hand the guard to the cleanup task so the focus lock frees
        // only after the key-ups reach the backend.
        let _ = self.broker.cleanup_tx.send(CleanupJob {
            events: pending,
            guard,
        });
    }
}

/// Input layer errors.
///
/// | Error | Code | Recoverable |
/// |-------|------|-------------|
/// | [`Backend`](InputError::Backend) | `INPUT_BACKEND_FAILED` | Yes |
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    /// The backend rejected an event.
    #[error("input backend failed: {0}")]
    Backend(String),
}

impl ErrorCode for InputError {
    fn code(&self) -> &'static str {
        match self {
            Self::Backend(_) => "INPUT_BACKEND_FAILED",
        }
    }

    fn is_recoverable(&self) -> bool {
        true
    }
}
