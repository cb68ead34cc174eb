//! Bounded blocking queue linking pipeline stages
//!
//! A plain FIFO behind one mutex and two condition variables. Producers block
//! while the queue is full, consumers block while it is empty, and `close`
//! releases everybody: pending items can still be drained, new ones are
//! refused.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// Upper bound for the default capacity; more slots only add memory
const MAX_DEFAULT_CAPACITY: usize = 8;

/// Default capacity: one slot per core, capped
pub fn default_capacity() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(MAX_DEFAULT_CAPACITY)
}

struct QueueState<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Thread-safe MPMC FIFO with a fixed capacity and permanent close
pub struct BoundedQueue<T> {
    state: Mutex<QueueState<T>>,
    not_full: Condvar,
    not_empty: Condvar,
    capacity: usize,
}

impl<T> BoundedQueue<T> {
    /// Create a queue holding at most `capacity` items (at least one)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
            capacity,
        }
    }

    // A panicking holder cannot leave the deque half-updated, so a poisoned
    // lock is still consistent.
    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue an item, blocking while the queue is full
    ///
    /// Returns `false` and drops the item if the queue is (or becomes) closed.
    pub fn push(&self, item: T) -> bool {
        {
            let state = self.lock();
            let mut state = self
                .not_full
                .wait_while(state, |s| !s.closed && s.items.len() >= self.capacity)
                .unwrap_or_else(PoisonError::into_inner);
            if state.closed {
                return false;
            }
            state.items.push_back(item);
        }
        self.not_empty.notify_one();
        true
    }

    /// Dequeue an item, blocking while the queue is empty
    ///
    /// Returns `None` once the queue is closed and fully drained.
    pub fn pop(&self) -> Option<T> {
        let item = {
            let state = self.lock();
            let mut state = self
                .not_empty
                .wait_while(state, |s| !s.closed && s.items.is_empty())
                .unwrap_or_else(PoisonError::into_inner);
            state.items.pop_front()?
        };
        self.not_full.notify_one();
        Some(item)
    }

    /// Refuse further pushes and wake every waiter. Idempotent.
    pub fn close(&self) {
        self.lock().closed = true;
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T> Default for BoundedQueue<T> {
    fn default() -> Self {
        Self::new(default_capacity())
    }
}
