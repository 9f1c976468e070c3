//! Single-slot push signal.
//!
//! Capacity is one and senders never block: a signal raised while another is
//! still pending is dropped, because the pending push already covers it.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Result of raising a push signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalOutcome {
    /// The slot was empty; a push is now pending.
    Queued,
    /// A push was already pending; this signal collapsed into it.
    Coalesced,
    /// The receiving handler is gone.
    Closed,
}

/// Sending half, held by the [`Connection`](crate::Connection).
#[derive(Debug)]
pub struct PushSignal {
    tx: mpsc::Sender<()>,
}

/// Receiving half, owned by the stream handler.
#[derive(Debug)]
pub struct PushReceiver {
    rx: mpsc::Receiver<()>,
}

pub fn push_signal() -> (PushSignal, PushReceiver) {
    let (tx, rx) = mpsc::channel(1);
    (PushSignal { tx }, PushReceiver { rx })
}

impl PushSignal {
    /// Non-blocking, best-effort signal.
    pub fn notify(&self) -> SignalOutcome {
        match self.tx.try_send(()) {
            Ok(()) => SignalOutcome::Queued,
            Err(TrySendError::Full(())) => SignalOutcome::Coalesced,
            Err(TrySendError::Closed(())) => SignalOutcome::Closed,
        }
    }
}

impl PushReceiver {
    /// Wait for the next pending push. Cancel-safe.
    pub async fn recv(&mut self) -> Option<()> {
        self.rx.recv().await
    }

    /// Consume a pending push without waiting. Returns whether one was pending.
    pub fn try_recv(&mut self) -> bool {
        self.rx.try_recv().is_ok()
    }
}
