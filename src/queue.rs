//! Bounded frame queues between pipeline stages.
//!
//! A queue of capacity `C` holds at most `C` items: the producer enqueues
//! `C` items without waiting and blocks on the `C+1`-th until the consumer
//! takes one. This is the only backpressure in the pipeline; a slow peer
//! stalls the OutboundPump, which fills the queue behind it, which stalls
//! the stage feeding it.
//!
//! Every wait also races the session's shutdown signal, so no stage stays
//! parked on a queue after teardown.
//!
//! # Closing
//!
//! Dropping the [`QueueSender`] closes the queue. The consumer drains what
//! is left, then [`QueueReceiver::pop`] returns `Ok(None)`.

use tokio::sync::mpsc;

use crate::error::{FramewireError, Result};
use crate::supervisor::ShutdownSignal;

/// Default capacity of each inter-stage queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 20;

/// Create a bounded queue whose waits are interrupted by `shutdown`.
///
/// A `capacity` of zero is raised to one.
pub fn bounded_queue<T>(
    capacity: usize,
    shutdown: ShutdownSignal,
) -> (QueueSender<T>, QueueReceiver<T>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        QueueSender {
            tx,
            shutdown: shutdown.clone(),
        },
        QueueReceiver { rx, shutdown },
    )
}

/// Producer half.
#[derive(Debug)]
pub struct QueueSender<T> {
    tx: mpsc::Sender<T>,
    shutdown: ShutdownSignal,
}

impl<T> QueueSender<T> {
    /// Enqueue an item, waiting while the queue is full.
    ///
    /// # Errors
    ///
    /// - `Cancelled` if teardown started before the item was accepted
    /// - `QueueClosed` if the consumer is gone
    pub async fn push(&mut self, item: T) -> Result<()> {
        if self.shutdown.is_triggered() {
            return Err(FramewireError::Cancelled);
        }

        tokio::select! {
            biased;
            _ = self.shutdown.triggered() => Err(FramewireError::Cancelled),
            sent = self.tx.send(item) => sent.map_err(|_| FramewireError::QueueClosed),
        }
    }

    /// Items currently queued.
    #[inline]
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the next `push` would wait.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.tx.capacity() == 0
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }
}

/// Consumer half.
#[derive(Debug)]
pub struct QueueReceiver<T> {
    rx: mpsc::Receiver<T>,
    shutdown: ShutdownSignal,
}

impl<T> QueueReceiver<T> {
    /// Dequeue the oldest item, waiting while the queue is empty.
    ///
    /// Returns `Ok(None)` once the producer is gone and the queue is drained.
    ///
    /// # Errors
    ///
    /// `Cancelled` if teardown started. Items still queued are discarded.
    pub async fn pop(&mut self) -> Result<Option<T>> {
        tokio::select! {
            biased;
            _ = self.shutdown.triggered() => Err(FramewireError::Cancelled),
            item = self.rx.recv() => Ok(item),
        }
    }

    /// Items currently queued.
    #[inline]
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
