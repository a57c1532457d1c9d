//! Bounded FIFO queue of filled analysis windows.
//!
//! The producer side never blocks: [`WindowQueue::try_push`] hands the window
//! back when the queue is at capacity and the caller drops it (backpressure by
//! shedding, not stalling). The consumer side suspends on a condvar in
//! [`WindowQueue::pop_wait`] until a window arrives or the queue closes, so
//! idle workers cost nothing.
//!
//! Windows enter in creation order; which worker completes which window first
//! is unspecified.

use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};

use crate::pool::Window;

struct QueueInner {
    windows: VecDeque<Window>,
    closed: bool,
}

/// Fixed-capacity window queue between the front-end and the worker pool.
pub struct WindowQueue {
    inner: Mutex<QueueInner>,
    not_empty: Condvar,
    capacity: usize,
}

impl WindowQueue {
    /// Create an open queue with space for `capacity` windows.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                windows: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            not_empty: Condvar::new(),
            capacity,
        }
    }

    /// Enqueue a window without blocking.
    ///
    /// On a full or closed queue the window comes back in `Err` so the caller
    /// keeps ownership and can resume filling it.
    pub fn try_push(&self, window: Window) -> Result<(), Window> {
        let mut inner = self.inner.lock();
        if inner.closed || inner.windows.len() == self.capacity {
            return Err(window);
        }
        window.mark_queued();
        inner.windows.push_back(window);
        drop(inner);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Dequeue the oldest window, suspending until one is available.
    ///
    /// Returns `None` once the queue is closed; windows still queued at close
    /// are intentionally left for [`Self::drain`] so workers exit promptly.
    pub fn pop_wait(&self) -> Option<Window> {
        let mut inner = self.inner.lock();
        loop {
            if inner.closed {
                return None;
            }
            if let Some(window) = inner.windows.pop_front() {
                window.mark_processing();
                return Some(window);
            }
            self.not_empty.wait(&mut inner);
        }
    }

    /// Close the queue and wake every suspended consumer.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.closed = true;
        drop(inner);
        self.not_empty.notify_all();
    }

    /// Reopen a closed queue for the next streaming session.
    pub fn reopen(&self) {
        self.inner.lock().closed = false;
    }

    /// Remove and return every queued window (shutdown path; dropping the
    /// result sends the windows back to their pool).
    pub fn drain(&self) -> Vec<Window> {
        let mut inner = self.inner.lock();
        inner.windows.drain(..).collect()
    }

    /// Current queue depth.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().windows.len()
    }

    /// Whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum queue depth.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether the queue has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }
}
