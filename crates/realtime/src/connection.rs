use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;

use crate::error::DeliveryError;
use crate::protocol::OutboundEvent;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Send side of one client connection.
///
/// Writes never wait: an event either lands in the bounded outbound buffer or
/// the write fails. Closing is idempotent and observed by both the session
/// reading from the client and the writer draining the [`Outbox`].
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: u64,
    outbound: mpsc::Sender<OutboundEvent>,
    closed: CancellationToken,
}

/// Receive side of a connection's outbound buffer, drained by the socket writer.
#[derive(Debug)]
pub struct Outbox {
    id: u64,
    receiver: mpsc::Receiver<OutboundEvent>,
    closed: CancellationToken,
}

impl ConnectionHandle {
    pub fn new(buffer: usize) -> (Self, Outbox) {
        let id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
        let (outbound, receiver) = mpsc::channel(buffer.max(1));
        let closed = CancellationToken::new();

        (
            Self {
                id,
                outbound,
                closed: closed.clone(),
            },
            Outbox {
                id,
                receiver,
                closed,
            },
        )
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn try_deliver(&self, event: OutboundEvent) -> Result<(), DeliveryError> {
        if self.closed.is_cancelled() {
            return Err(DeliveryError::ConnectionClosed(self.id));
        }

        self.outbound.try_send(event).map_err(|error| match error {
            TrySendError::Full(_) => DeliveryError::BufferFull(self.id),
            TrySendError::Closed(_) => DeliveryError::ConnectionClosed(self.id),
        })
    }

    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves once the connection has been closed from any side.
    pub async fn closed(&self) {
        self.closed.cancelled().await
    }
}

impl Outbox {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next event to write. Events buffered before a close are still handed
    /// out; `None` means the connection is closed and the buffer is empty.
    pub async fn recv(&mut self) -> Option<OutboundEvent> {
        tokio::select! {
            biased;
            event = self.receiver.recv() => event,
            _ = self.closed.cancelled() => self.receiver.try_recv().ok(),
        }
    }

    /// Close from the writer side, e.g. after a socket write failed.
    pub fn close(&self) {
        self.closed.cancel();
    }
}
