//! Cross-thread action queue.
//!
//! Transport threads enqueue closures; the owner thread runs them in FIFO
//! order from [`ActionQueue::drain_all`]. Every consumer-visible effect of
//! the host goes through here so consumers only ever observe state changes on
//! the owner thread.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_channel::{Receiver, Sender, unbounded};

/// A deferred unit of work.
pub type Action = Box<dyn FnOnce() + Send + 'static>;

/// Cloneable enqueue handle for background threads.
#[derive(Clone)]
pub struct ActionSender {
    sender: Sender<Action>,
    closed: Arc<AtomicBool>,
}

impl ActionSender {
    /// Queue `action` for the next drain.
    ///
    /// Never blocks. Returns `false`, discarding the action, once the queue
    /// has been closed.
    pub fn enqueue(&self, action: impl FnOnce() + Send + 'static) -> bool {
        if self.closed.load(Ordering::Acquire) {
            tracing::debug!("Action queue closed; discarding action");
            return false;
        }
        self.sender.send(Box::new(action)).is_ok()
    }

    /// Whether the queue has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Unbounded multi-producer queue drained on a single owner thread.
pub struct ActionQueue {
    sender: ActionSender,
    receiver: Receiver<Action>,
}

impl Default for ActionQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionQueue {
    /// Create an open, empty queue.
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self {
            sender: ActionSender {
                sender,
                closed: Arc::new(AtomicBool::new(false)),
            },
            receiver,
        }
    }

    /// A handle that can enqueue from any thread.
    pub fn sender(&self) -> ActionSender {
        self.sender.clone()
    }

    /// Queue `action`. See [`ActionSender::enqueue`].
    pub fn enqueue(&self, action: impl FnOnce() + Send + 'static) -> bool {
        self.sender.enqueue(action)
    }

    /// Run every queued action, including ones enqueued while draining.
    ///
    /// Call from the owner thread only. Returns how many actions ran.
    pub fn drain_all(&self) -> usize {
        let mut ran = 0;
        while let Ok(action) = self.receiver.try_recv() {
            action();
            ran += 1;
        }
        ran
    }

    /// Stop accepting new actions. Already-queued ones still run on the next drain.
    pub fn close(&self) {
        self.sender.closed.store(true, Ordering::Release);
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Number of actions waiting.
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    /// Whether nothing is waiting.
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}
