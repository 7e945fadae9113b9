//! Bounded single-consumer queues between pipeline stages.
//!
//! `block` queues make producers wait for room. `drop_oldest` queues never
//! make producers wait; when full, the oldest queued item is discarded and the
//! consumer logs how many it missed.

use parley_config::{OverflowPolicy, QueueConfig};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::DeliveryError;

#[derive(Debug)]
enum Sender<T> {
    Block(mpsc::Sender<T>),
    DropOldest(broadcast::Sender<T>),
}

#[derive(Debug)]
enum Receiver<T> {
    Block(mpsc::Receiver<T>),
    DropOldest(broadcast::Receiver<T>),
}

#[derive(Debug)]
pub struct StageSender<T> {
    name: &'static str,
    inner: Sender<T>,
}

#[derive(Debug)]
pub struct StageReceiver<T> {
    name: &'static str,
    inner: Receiver<T>,
}

/// Create a queue for the named stage.
///
/// Drop-oldest queues round their capacity up to the next power of two.
pub fn stage_queue<T>(name: &'static str, config: QueueConfig) -> (StageSender<T>, StageReceiver<T>)
where
    T: Clone + Send + 'static,
{
    let capacity = config.capacity.max(1);
    match config.overflow {
        OverflowPolicy::Block => {
            let (tx, rx) = mpsc::channel(capacity);
            (
                StageSender {
                    name,
                    inner: Sender::Block(tx),
                },
                StageReceiver {
                    name,
                    inner: Receiver::Block(rx),
                },
            )
        }
        OverflowPolicy::DropOldest => {
            let (tx, rx) = broadcast::channel(capacity);
            (
                StageSender {
                    name,
                    inner: Sender::DropOldest(tx),
                },
                StageReceiver {
                    name,
                    inner: Receiver::DropOldest(rx),
                },
            )
        }
    }
}

impl<T> Clone for StageSender<T> {
    fn clone(&self) -> Self {
        let inner = match &self.inner {
            Sender::Block(tx) => Sender::Block(tx.clone()),
            Sender::DropOldest(tx) => Sender::DropOldest(tx.clone()),
        };
        Self {
            name: self.name,
            inner,
        }
    }
}

impl<T> StageSender<T> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Enqueue an item. Only `block` queues ever wait here.
    pub async fn send(&self, item: T) -> Result<(), DeliveryError> {
        match &self.inner {
            Sender::Block(tx) => tx
                .send(item)
                .await
                .map_err(|_| DeliveryError::QueueClosed(self.name)),
            Sender::DropOldest(tx) => tx
                .send(item)
                .map(|_| ())
                .map_err(|_| DeliveryError::QueueClosed(self.name)),
        }
    }
}

impl<T: Clone> StageReceiver<T> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Wait for the next item. `None` once every sender is gone and the queue is empty.
    pub async fn recv(&mut self) -> Option<T> {
        match &mut self.inner {
            Receiver::Block(rx) => rx.recv().await,
            Receiver::DropOldest(rx) => loop {
                match rx.recv().await {
                    Ok(item) => return Some(item),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(queue = self.name, skipped, "queue overflowed, dropped oldest items");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            },
        }
    }

    /// Take an item if one is queued right now.
    pub fn try_recv(&mut self) -> Option<T> {
        match &mut self.inner {
            Receiver::Block(rx) => rx.try_recv().ok(),
            Receiver::DropOldest(rx) => loop {
                match rx.try_recv() {
                    Ok(item) => return Some(item),
                    Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                        warn!(queue = self.name, skipped, "queue overflowed, dropped oldest items");
                    }
                    Err(_) => return None,
                }
            },
        }
    }

    /// Next item for a worker loop. After `shutdown` fires, items already
    /// queued are still handed out; `None` once the queue is drained.
    pub async fn next(&mut self, shutdown: &CancellationToken) -> Option<T> {
        if shutdown.is_cancelled() {
            return self.try_recv();
        }

        tokio::select! {
            biased;
            item = self.recv() => item,
            _ = shutdown.cancelled() => self.try_recv(),
        }
    }
}
