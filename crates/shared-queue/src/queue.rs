//! Blocking Queue Implementation

use crate::QueueClosed;
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use tracing::trace;

struct Inner<T> {
    items: VecDeque<T>,
    killed: bool,
}

/// Thread-safe FIFO shared between producers and one consumer.
///
/// Storage is unbounded. Bounding is the consumer's decision: under backlog it
/// calls [`SharedQueue::wait_and_pop_to_back`] to skip straight to the newest
/// item. Once [`SharedQueue::kill`] is called the queue is closed for good.
pub struct SharedQueue<T> {
    inner: Mutex<Inner<T>>,
    ready: Condvar,
}

impl<T> SharedQueue<T> {
    /// Create an empty queue
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                killed: false,
            }),
            ready: Condvar::new(),
        }
    }

    // A panicking holder never leaves the deque half-updated, so a poisoned
    // lock is still safe to use.
    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until an item is available or the queue is killed
    fn wait_for_items(&self) -> Result<MutexGuard<'_, Inner<T>>, QueueClosed> {
        let guard = self.lock();
        let guard = self
            .ready
            .wait_while(guard, |inner| !inner.killed && inner.items.is_empty())
            .unwrap_or_else(PoisonError::into_inner);
        if guard.killed {
            Err(QueueClosed)
        } else {
            Ok(guard)
        }
    }

    /// Append an item at the tail. Never blocks; dropped after kill.
    pub fn push_back(&self, item: T) {
        let mut inner = self.lock();
        if inner.killed {
            return;
        }
        inner.items.push_back(item);
        drop(inner);
        self.ready.notify_one();
    }

    /// Remove and return the oldest item, waiting if the queue is empty
    pub fn wait_and_pop_front(&self) -> Result<T, QueueClosed> {
        let mut inner = self.wait_for_items()?;
        inner.items.pop_front().ok_or(QueueClosed)
    }

    /// Discard every pending item except the newest and return it
    pub fn wait_and_pop_to_back(&self) -> Result<T, QueueClosed> {
        self.wait_and_pop_to_back_counted().map(|(item, _)| item)
    }

    /// Same as [`SharedQueue::wait_and_pop_to_back`], also reporting how
    /// many stale items were discarded.
    pub fn wait_and_pop_to_back_counted(&self) -> Result<(T, usize), QueueClosed> {
        let mut inner = self.wait_for_items()?;
        let shed = inner.items.len() - 1;
        let newest = inner.items.pop_back().ok_or(QueueClosed)?;
        inner.items.clear();
        if shed > 0 {
            trace!("Shed {} stale items", shed);
        }
        Ok((newest, shed))
    }

    /// Instantaneous number of pending items. Stale by the time it returns.
    pub fn size(&self) -> usize {
        self.lock().items.len()
    }

    /// Check if the queue is currently empty
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Close the queue and wake every waiter. Safe to call repeatedly.
    pub fn kill(&self) {
        let mut inner = self.lock();
        inner.killed = true;
        inner.items.clear();
        drop(inner);
        self.ready.notify_all();
    }

    /// Whether [`SharedQueue::kill`] has been called
    pub fn is_killed(&self) -> bool {
        self.lock().killed
    }
}

impl<T> Default for SharedQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
