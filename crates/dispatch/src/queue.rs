//! Fixed-capacity multi-producer multi-consumer queue.
//!
//! Every hand-off in the pipeline goes through one of these. Call sites pick
//! explicitly between [`BoundedQueue::put`], which suspends until there is
//! room, and [`BoundedQueue::try_put`], which hands the item back when the
//! queue is full so the caller can log and drop it.

use async_channel::{Receiver, Sender, TryRecvError, TrySendError};
use serde::Serialize;

/// Why a [`BoundedQueue::try_put`] did not enqueue. The item is returned.
#[derive(Debug)]
pub enum TryPutError<T> {
    Full(T),
    Closed(T),
}

impl<T> TryPutError<T> {
    pub fn into_inner(self) -> T {
        match self {
            TryPutError::Full(item) | TryPutError::Closed(item) => item,
        }
    }

    pub fn is_full(&self) -> bool {
        matches!(self, TryPutError::Full(_))
    }
}

/// Returned by [`BoundedQueue::put`] when the queue was closed.
#[derive(Debug)]
pub struct Closed<T>(pub T);

/// Observed state of a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueStat {
    pub len: usize,
    pub capacity: usize,
    pub closed: bool,
}

pub struct BoundedQueue<T> {
    name: &'static str,
    tx: Sender<T>,
    rx: Receiver<T>,
}

impl<T> Clone for BoundedQueue<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            tx: self.tx.clone(),
            rx: self.rx.clone(),
        }
    }
}

impl<T> BoundedQueue<T> {
    /// Create a queue holding at most `capacity` items (at least one).
    pub fn new(name: &'static str, capacity: usize) -> Self {
        let (tx, rx) = async_channel::bounded(capacity.max(1));
        Self { name, tx, rx }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Enqueue, suspending while the queue is full.
    pub async fn put(&self, item: T) -> Result<(), Closed<T>> {
        self.tx.send(item).await.map_err(|e| Closed(e.into_inner()))
    }

    /// Enqueue without suspending.
    pub fn try_put(&self, item: T) -> Result<(), TryPutError<T>> {
        self.tx.try_send(item).map_err(|e| match e {
            TrySendError::Full(item) => TryPutError::Full(item),
            TrySendError::Closed(item) => TryPutError::Closed(item),
        })
    }

    /// Dequeue, suspending while the queue is empty.
    ///
    /// Returns `None` once the queue is closed and every buffered item has
    /// been taken.
    pub async fn take(&self) -> Option<T> {
        self.rx.recv().await.ok()
    }

    pub fn try_take(&self) -> Option<T> {
        match self.rx.try_recv() {
            Ok(item) => Some(item),
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => None,
        }
    }

    /// Close the queue for producers. Buffered items stay available to
    /// consumers. Returns `true` only for the call that actually closed it.
    pub fn close(&self) -> bool {
        self.tx.close()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.tx.capacity().unwrap_or(usize::MAX)
    }

    pub fn stat(&self) -> QueueStat {
        QueueStat {
            len: self.len(),
            capacity: self.capacity(),
            closed: self.is_closed(),
        }
    }
}
