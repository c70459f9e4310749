//! Handle onto the outbound queue of one relay connection.

use tokio::sync::mpsc;
use tunnel_core::OutboundEvent;

/// Sending half of a connection's ordered outbound queue.
///
/// The transport's writer task owns the receiving half and drains it in FIFO
/// order, so events pushed by one task reach the relay in the order they were
/// pushed.  Once the connection closes, every send fails and the event is
/// dropped; an emitter can never deliver to a later connection.
#[derive(Debug, Clone)]
pub struct RelayEmitter {
    tx: mpsc::Sender<OutboundEvent>,
}

impl RelayEmitter {
    pub fn new(tx: mpsc::Sender<OutboundEvent>) -> Self {
        Self { tx }
    }

    /// Creates an emitter together with the receiving half of its queue.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<OutboundEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Queues `event`, waiting for space if the queue is full.
    ///
    /// Returns `false` if the connection has closed.
    pub async fn emit(&self, event: OutboundEvent) -> bool {
        self.tx.send(event).await.is_ok()
    }

    /// Queues `event` only if there is room right now.
    ///
    /// Used for best-effort notifications, which must never wait.
    pub fn try_emit(&self, event: OutboundEvent) -> bool {
        self.tx.try_send(event).is_ok()
    }

    /// Whether the receiving half is gone.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
