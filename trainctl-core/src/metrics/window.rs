//! Fixed-capacity history buffer with drop-oldest eviction.

use std::collections::VecDeque;

/// Storage reserved up front; larger windows grow as values arrive.
const INITIAL_RESERVE: usize = 1024;

/// A bounded FIFO window. Pushing into a full window evicts the oldest value.
#[derive(Debug, Clone)]
pub struct BoundedWindow<T> {
    capacity: usize,
    items: VecDeque<T>,
}

impl<T> BoundedWindow<T> {
    /// Create a window holding at most `capacity` values (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            items: VecDeque::with_capacity(capacity.min(INITIAL_RESERVE)),
        }
    }

    /// Push a value, returning the evicted one if the window was full.
    pub fn push(&mut self, value: T) -> Option<T> {
        let evicted = if self.items.len() == self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(value);
        evicted
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() == self.capacity
    }

    /// Values from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}
