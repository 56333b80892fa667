//! Session-wide run state.
//!
//! One [`SessionControl`] is shared by the engine, every listener, and
//! the scheduler's done chain. It carries two watch channels: the run
//! flag (pause/resume gating for pipe draining) and the shutdown latch
//! (set once, with a reason, by whoever fails first).

use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// Cloneable handle on the session's run state.
#[derive(Debug, Clone)]
pub struct SessionControl {
    run_tx: Arc<watch::Sender<bool>>,
    shutdown_tx: Arc<watch::Sender<Option<String>>>,
}

impl SessionControl {
    /// Creates a running, not-shut-down control.
    #[must_use]
    pub fn new() -> Self {
        let (run_tx, _) = watch::channel(true);
        let (shutdown_tx, _) = watch::channel(None);
        Self {
            run_tx: Arc::new(run_tx),
            shutdown_tx: Arc::new(shutdown_tx),
        }
    }

    /// Clears the run flag: listeners stop draining their pipes.
    pub fn pause(&self) {
        info!("session paused");
        self.run_tx.send_replace(false);
    }

    /// Sets the run flag.
    pub fn resume(&self) {
        info!("session resumed");
        self.run_tx.send_replace(true);
    }

    /// Current run flag.
    #[must_use]
    pub fn is_running(&self) -> bool {
        *self.run_tx.borrow()
    }

    /// Waits until the run flag is set. Returns immediately when
    /// already running. Shutdown also releases the wait so paused
    /// listeners can exit.
    pub async fn wait_running(&self) {
        let mut run_rx = self.run_tx.subscribe();
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        loop {
            if *run_rx.borrow() || shutdown_rx.borrow().is_some() {
                return;
            }
            tokio::select! {
                changed = run_rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
            }
        }
    }

    /// Latches the shutdown reason. The first caller wins; later
    /// reasons are dropped.
    pub fn request_shutdown(&self, reason: impl Into<String>) {
        let reason = reason.into();
        self.shutdown_tx.send_if_modified(|current| {
            if current.is_some() {
                false
            } else {
                info!(%reason, "shutdown requested");
                *current = Some(reason.clone());
                true
            }
        });
    }

    /// Returns `true` once shutdown has been requested.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.shutdown_tx.borrow().is_some()
    }

    /// The latched shutdown reason, if any.
    #[must_use]
    pub fn shutdown_reason(&self) -> Option<String> {
        self.shutdown_tx.borrow().clone()
    }

    /// Waits for the shutdown latch.
    pub async fn shutdown_signalled(&self) {
        let mut rx = self.shutdown_tx.subscribe();
        // wait_for fails only if the sender is dropped; we hold it.
        let _ = rx.wait_for(|reason| reason.is_some()).await;
    }
}

impl Default for SessionControl {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn starts_running_and_clean() {
        let control = SessionControl::new();
        assert!(control.is_running());
        assert!(!control.is_shutdown());
        assert!(control.shutdown_reason().is_none());
    }

    #[tokio::test]
    async fn pause_resume_toggle() {
        let control = SessionControl::new();
        control.pause();
        assert!(!control.is_running());
        control.resume();
        assert!(control.is_running());
    }

    #[tokio::test]
    async fn wait_running_blocks_while_paused() {
        let control = SessionControl::new();
        control.pause();

        let waiter = control.clone();
        let task = tokio::spawn(async move {
            waiter.wait_running().await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!task.is_finished());

        control.resume();
        tokio::time::timeout(Duration::from_millis(100), task)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn shutdown_releases_paused_waiters() {
        let control = SessionControl::new();
        control.pause();

        let waiter = control.clone();
        let task = tokio::spawn(async move {
            waiter.wait_running().await;
        });

        control.request_shutdown("test");
        tokio::time::timeout(Duration::from_millis(100), task)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn first_shutdown_reason_wins() {
        let control = SessionControl::new();
        control.request_shutdown("first");
        control.request_shutdown("second");
        assert_eq!(control.shutdown_reason().as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn shutdown_signalled_wakes() {
        let control = SessionControl::new();
        let waiter = control.clone();
        let task = tokio::spawn(async move {
            waiter.shutdown_signalled().await;
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        control.request_shutdown("done");
        tokio::time::timeout(Duration::from_millis(100), task)
            .await
            .unwrap()
            .unwrap();
    }
}
