//! Bounded duplex pipes.
//!
//! A [`Pipe`] is a pair of bounded mpsc queues, one per direction.
//! Each [`PipeEnd`] can send and receive; splitting an end separates
//! the sender half (cloneable, handed to decision makers or done
//! callbacks) from the receiver half (exactly one reader per
//! direction, owned by the listening task).

use crate::error::PipeError;
use crate::message::PipeMessage;
use tokio::sync::mpsc;

/// Default per-direction queue capacity.
///
/// 64 in-flight messages comfortably covers a worker's burst of
/// requests plus result/update backwash without unbounded growth.
pub const DEFAULT_PIPE_CAPACITY: usize = 64;

/// Constructor for duplex pipe pairs.
#[derive(Debug)]
pub struct Pipe;

impl Pipe {
    /// Creates a connected pair of pipe ends with the given
    /// per-direction capacity.
    #[must_use]
    pub fn pair(capacity: usize) -> (PipeEnd, PipeEnd) {
        let (a_tx, b_rx) = mpsc::channel(capacity);
        let (b_tx, a_rx) = mpsc::channel(capacity);

        (
            PipeEnd {
                tx: PipeSender { tx: a_tx },
                rx: PipeReceiver { rx: a_rx },
            },
            PipeEnd {
                tx: PipeSender { tx: b_tx },
                rx: PipeReceiver { rx: b_rx },
            },
        )
    }
}

/// Sending half of a pipe direction.
///
/// Cloneable: within one side, several producers (the runtime task,
/// decision makers, done callbacks) may share the write end. FIFO is
/// preserved per producer and the queue stays bounded.
#[derive(Debug, Clone)]
pub struct PipeSender {
    tx: mpsc::Sender<PipeMessage>,
}

impl PipeSender {
    /// Sends a message, waiting for queue space.
    ///
    /// # Errors
    ///
    /// Returns [`PipeError::Closed`] if the peer dropped its receiver.
    pub async fn send(&self, msg: PipeMessage) -> Result<(), PipeError> {
        self.tx.send(msg).await.map_err(|_| PipeError::Closed)
    }

    /// Sends a message without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`PipeError::Full`] when the queue is at capacity and
    /// [`PipeError::Closed`] when the peer is gone.
    pub fn try_send(&self, msg: PipeMessage) -> Result<(), PipeError> {
        self.tx.try_send(msg).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => PipeError::Full,
            mpsc::error::TrySendError::Closed(_) => PipeError::Closed,
        })
    }

    /// Sends the end-of-stream sentinel, best effort.
    ///
    /// Errors are swallowed: a peer that already hung up has already
    /// observed end-of-stream.
    pub async fn close(&self) {
        let _ = self.send(PipeMessage::Eos).await;
    }
}

/// Receiving half of a pipe direction. Exactly one per direction.
#[derive(Debug)]
pub struct PipeReceiver {
    rx: mpsc::Receiver<PipeMessage>,
}

impl PipeReceiver {
    /// Receives the next message in FIFO order.
    ///
    /// Returns `None` when every sender is gone — a crashed peer, as
    /// opposed to an orderly [`PipeMessage::Eos`].
    pub async fn recv(&mut self) -> Option<PipeMessage> {
        self.rx.recv().await
    }

    /// Receives without waiting; `None` when the queue is empty or
    /// closed.
    pub fn try_recv(&mut self) -> Option<PipeMessage> {
        self.rx.try_recv().ok()
    }
}

/// One side of a duplex pipe.
#[derive(Debug)]
pub struct PipeEnd {
    tx: PipeSender,
    rx: PipeReceiver,
}

impl PipeEnd {
    /// Sends a message to the peer.
    ///
    /// # Errors
    ///
    /// Returns [`PipeError::Closed`] if the peer dropped its end.
    pub async fn send(&self, msg: PipeMessage) -> Result<(), PipeError> {
        self.tx.send(msg).await
    }

    /// Sends without waiting; see [`PipeSender::try_send`].
    ///
    /// # Errors
    ///
    /// Returns [`PipeError::Full`] or [`PipeError::Closed`].
    pub fn try_send(&self, msg: PipeMessage) -> Result<(), PipeError> {
        self.tx.try_send(msg)
    }

    /// Receives the next message from the peer.
    pub async fn recv(&mut self) -> Option<PipeMessage> {
        self.rx.recv().await
    }

    /// Receives without waiting.
    pub fn try_recv(&mut self) -> Option<PipeMessage> {
        self.rx.try_recv()
    }

    /// Returns a clone of the sending half.
    #[must_use]
    pub fn sender(&self) -> PipeSender {
        self.tx.clone()
    }

    /// Splits this end into its sender and receiver halves.
    #[must_use]
    pub fn split(self) -> (PipeSender, PipeReceiver) {
        (self.tx, self.rx)
    }

    /// Sends the end-of-stream sentinel, best effort.
    pub async fn close(&self) {
        self.tx.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ControlSignal;

    #[tokio::test]
    async fn round_trip_both_directions() {
        let (a, mut b) = Pipe::pair(4);

        a.send(PipeMessage::Signal(ControlSignal::Pause))
            .await
            .unwrap();
        assert!(matches!(
            b.recv().await,
            Some(PipeMessage::Signal(ControlSignal::Pause))
        ));

        b.send(PipeMessage::Fatal("boom".into())).await.unwrap();
        let mut a = a;
        assert!(matches!(a.recv().await, Some(PipeMessage::Fatal(_))));
    }

    #[tokio::test]
    async fn fifo_per_direction() {
        let (a, mut b) = Pipe::pair(8);

        for signal in [
            ControlSignal::Pause,
            ControlSignal::Resume,
            ControlSignal::Shutdown,
        ] {
            a.send(PipeMessage::Signal(signal)).await.unwrap();
        }

        let mut seen = Vec::new();
        for _ in 0..3 {
            if let Some(PipeMessage::Signal(s)) = b.recv().await {
                seen.push(s);
            }
        }
        assert_eq!(
            seen,
            vec![
                ControlSignal::Pause,
                ControlSignal::Resume,
                ControlSignal::Shutdown
            ]
        );
    }

    #[tokio::test]
    async fn try_send_reports_full() {
        let (a, _b) = Pipe::pair(1);
        a.try_send(PipeMessage::Eos).unwrap();
        assert_eq!(a.try_send(PipeMessage::Eos), Err(PipeError::Full));
    }

    #[tokio::test]
    async fn send_after_peer_drop_reports_closed() {
        let (a, b) = Pipe::pair(4);
        drop(b);
        assert_eq!(
            a.send(PipeMessage::Signal(ControlSignal::Pause)).await,
            Err(PipeError::Closed)
        );
    }

    #[tokio::test]
    async fn close_delivers_eos_sentinel() {
        let (a, mut b) = Pipe::pair(4);
        a.close().await;
        assert!(matches!(b.recv().await, Some(PipeMessage::Eos)));
    }

    #[tokio::test]
    async fn split_sender_still_feeds_receiver() {
        let (a, b) = Pipe::pair(4);
        let (b_tx, _b_rx) = b.split();
        let sender = b_tx.clone();

        sender.send(PipeMessage::Eos).await.unwrap();
        let mut a = a;
        assert!(matches!(a.recv().await, Some(PipeMessage::Eos)));
    }
}
