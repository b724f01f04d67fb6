//! Bounded ring for recent samples.
//!
//! Overflow never fails: pushing into a full ring evicts the oldest sample.

use std::collections::VecDeque;

/// Fixed-capacity FIFO that drops its oldest entry when full.
#[derive(Debug, Clone)]
pub struct BoundedRing<T> {
    buffer: VecDeque<T>,
    capacity: usize,
}

impl<T> BoundedRing<T> {
    /// Create a new ring with the specified capacity (at least 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Push a sample, returning the evicted one if the ring was full
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.buffer.len() >= self.capacity {
            self.buffer.pop_front()
        } else {
            None
        };
        self.buffer.push_back(item);
        evicted
    }

    /// Get current number of items in the ring
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the ring is empty
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Get ring capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest retained sample
    pub fn first(&self) -> Option<&T> {
        self.buffer.front()
    }

    /// Newest sample
    pub fn last(&self) -> Option<&T> {
        self.buffer.back()
    }

    /// Iterate from oldest to newest
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.buffer.iter()
    }

    /// Clear all items from the ring
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl BoundedRing<f64> {
    /// Arithmetic mean, `None` when empty
    pub fn mean(&self) -> Option<f64> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(self.buffer.iter().sum::<f64>() / self.buffer.len() as f64)
        }
    }

    /// Largest sample, `None` when empty
    pub fn max(&self) -> Option<f64> {
        self.buffer.iter().copied().reduce(f64::max)
    }
}
