//! FIFO hand-off ordering post-commit callbacks across threads
//!
//! Each successful commit enqueues its timestamp while the commit lock is
//! held, so the queue order is the publication order. Before running its
//! callbacks a thread waits until its timestamp reaches the head of the queue;
//! dropping the returned [`Turn`] dequeues it and wakes the waiters.
//!
//! Commits themselves interleave freely; only callback execution is ordered.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use tracing::trace;

/// Queue of published commits awaiting their callbacks
#[derive(Debug, Default)]
pub(crate) struct CommitOrder {
    queue: Mutex<VecDeque<u64>>,
    turn_changed: Condvar,
}

impl CommitOrder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Append a published commit
    ///
    /// Must be called in publication order.
    pub(crate) fn enqueue(&self, timestamp: u64) {
        self.queue.lock().push_back(timestamp);
    }

    /// Block until `timestamp` is at the head of the queue
    pub(crate) fn wait_turn(&self, timestamp: u64) -> Turn<'_> {
        let mut queue = self.queue.lock();
        while queue.front() != Some(&timestamp) {
            trace!(target: "entwined::commit", timestamp, "Waiting for commit turn");
            self.turn_changed.wait(&mut queue);
        }
        Turn {
            order: self,
            timestamp,
        }
    }

    /// Number of commits whose callbacks have not finished
    #[cfg(test)]
    pub(crate) fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    fn release(&self, timestamp: u64) {
        let mut queue = self.queue.lock();
        if queue.front() == Some(&timestamp) {
            queue.pop_front();
        }
        drop(queue);
        self.turn_changed.notify_all();
    }
}

/// The head position in a [`CommitOrder`], released on drop
#[must_use = "the turn is released as soon as it is dropped"]
pub(crate) struct Turn<'a> {
    order: &'a CommitOrder,
    timestamp: u64,
}

impl Drop for Turn<'_> {
    fn drop(&mut self) {
        self.order.release(self.timestamp);
    }
}
