//! TransactionalQueue: FIFO queue with head/tail conflict tracking
//!
//! The queue is logically split in two:
//! - the shared `source` list, consumed from the front through a cursor;
//!   every committed poll advances `global_poll_count`
//! - a locally appended `tail`, only visible to this transaction until commit
//!
//! ## Conflict Rules
//!
//! A queue that was peeked or polled conflicts when:
//! 1. the global head advanced concurrently (`global_poll_count` differs), or
//! 2. the transaction read past the end of its source into its own tail while
//!    the global source was replaced (someone appended concurrently).
//!
//! Offers alone never conflict. `global_poll_count` wraps and is compared by
//! equality only.

use entwined_core::{Error, Result, Transactional};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

/// Transactional FIFO queue
pub struct TransactionalQueue<E> {
    /// Committed contents, shared by all copies
    source: Arc<Vec<E>>,
    /// Number of items polled from the global queue since its creation
    global_poll_count: usize,
    /// Position of the next unread item in `source`
    cursor: usize,
    /// Locally offered items
    tail: VecDeque<E>,
    /// Items polled by this transaction
    poll_count: usize,
    /// Depth of the queue observed by this transaction
    peek_count: usize,
}

impl<E> TransactionalQueue<E>
where
    E: Clone + Send + Sync + 'static,
{
    /// Create an empty queue
    pub fn new() -> Self {
        Self::with_source(Arc::new(Vec::new()), 0)
    }

    fn with_source(source: Arc<Vec<E>>, global_poll_count: usize) -> Self {
        TransactionalQueue {
            source,
            global_poll_count,
            cursor: 0,
            tail: VecDeque::new(),
            poll_count: 0,
            peek_count: 0,
        }
    }

    /// Append an item to the tail
    pub fn offer(&mut self, item: E) {
        self.tail.push_back(item);
    }

    /// Append every item of the iterator
    pub fn offer_all<I>(&mut self, items: I)
    where
        I: IntoIterator<Item = E>,
    {
        self.tail.extend(items);
    }

    /// Look at the head without removing it
    ///
    /// An empty queue answers `None` without recording a peek, so observing
    /// "nothing there" does not conflict with later offers.
    pub fn peek(&mut self) -> Option<&E> {
        let mut depth = self.poll_count;
        let head = if self.cursor < self.source.len() {
            depth += 1;
            self.source.get(self.cursor)
        } else if !self.tail.is_empty() {
            depth += 1;
            self.tail.front()
        } else {
            None
        };
        self.peek_count = self.peek_count.max(depth);
        head
    }

    /// Remove and return the head
    pub fn poll(&mut self) -> Option<E> {
        let head = if let Some(item) = self.source.get(self.cursor) {
            self.cursor += 1;
            self.poll_count += 1;
            Some(item.clone())
        } else if let Some(item) = self.tail.pop_front() {
            self.poll_count += 1;
            Some(item)
        } else {
            None
        };
        self.peek_count = self.peek_count.max(self.poll_count);
        head
    }

    /// Head of the queue, failing when empty
    pub fn element(&mut self) -> Result<&E> {
        self.peek()
            .ok_or_else(|| Error::contract("Queue is empty"))
    }

    /// Remove the head, failing when empty
    pub fn remove_head(&mut self) -> Result<E> {
        self.poll()
            .ok_or_else(|| Error::contract("Queue is empty"))
    }

    /// Whether the queue has no items, logged like `peek`
    pub fn is_empty(&mut self) -> bool {
        self.peek().is_none()
    }

    /// Number of items, logged like `peek`
    pub fn len(&mut self) -> usize {
        if self.is_empty() {
            return 0;
        }
        (self.source.len() - self.cursor) + self.tail.len()
    }

    /// Poll every item
    pub fn clear(&mut self) {
        while self.poll().is_some() {}
    }

    /// Poll every item into `target`
    pub fn drain_to<C>(&mut self, target: &mut C)
    where
        C: Extend<E>,
    {
        while let Some(item) = self.poll() {
            target.extend(std::iter::once(item));
        }
    }

    /// Whether two queues share the same source
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.source, &b.source) && a.global_poll_count == b.global_poll_count
    }
}

impl<E> Default for TransactionalQueue<E>
where
    E: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<E> FromIterator<E> for TransactionalQueue<E>
where
    E: Clone + Send + Sync + 'static,
{
    fn from_iter<I: IntoIterator<Item = E>>(iter: I) -> Self {
        Self::with_source(Arc::new(iter.into_iter().collect()), 0)
    }
}

impl<E: fmt::Debug> fmt::Debug for TransactionalQueue<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionalQueue")
            .field("source", &self.source)
            .field("global_poll_count", &self.global_poll_count)
            .field("cursor", &self.cursor)
            .field("tail", &self.tail)
            .field("poll_count", &self.poll_count)
            .field("peek_count", &self.peek_count)
            .finish()
    }
}

impl<E> Transactional for TransactionalQueue<E>
where
    E: Clone + Send + Sync + 'static,
{
    fn clean_copy(&self) -> Self {
        Self::with_source(Arc::clone(&self.source), self.global_poll_count)
    }

    fn dirty_copy(&self) -> Self {
        TransactionalQueue {
            source: Arc::clone(&self.source),
            global_poll_count: self.global_poll_count,
            cursor: self.source.len().min(self.poll_count),
            tail: self.tail.clone(),
            poll_count: self.poll_count,
            peek_count: self.peek_count,
        }
    }

    fn update(&mut self, changes: Self, only_read_logs: bool) -> Result<()> {
        if !Arc::ptr_eq(&self.source, &changes.source) {
            return Err(Error::contract(
                "Updates are only possible for collections with the same source",
            ));
        }
        self.peek_count = self.peek_count.max(changes.peek_count);
        if !only_read_logs {
            self.cursor = changes.cursor;
            self.tail = changes.tail;
            self.poll_count = changes.poll_count;
        }
        Ok(())
    }

    fn commit(&self, global: &Self) -> Result<Self> {
        if global.peek_count != 0 || !global.tail.is_empty() {
            return Err(Error::misuse(
                "Global state queue must be committed before calling this method",
            ));
        }

        if self.peek_count == 0 && self.tail.is_empty() {
            return Ok(global.clean_copy());
        }

        if self.peek_count != 0 {
            if global.global_poll_count != self.global_poll_count {
                return Err(Error::conflict("Queue's head was updated"));
            }
            let past_source = self.peek_count > self.source.len();
            if past_source && !Arc::ptr_eq(&global.source, &self.source) {
                return Err(Error::conflict(
                    "Reading past source queue with tail concurrently updated",
                ));
            }
        }

        if self.poll_count == 0 && self.tail.is_empty() {
            return Ok(global.clean_copy());
        }

        let skip = self.poll_count.min(global.source.len());
        let items: Vec<E> = global.source[skip..]
            .iter()
            .cloned()
            .chain(self.tail.iter().cloned())
            .collect();
        Ok(Self::with_source(
            Arc::new(items),
            global.global_poll_count.wrapping_add(self.poll_count),
        ))
    }
}
