//! Bounded sample ring
//!
//! Shared between a producer task and a reader through an `Arc`. When full,
//! the oldest sample is evicted.

use parking_lot::Mutex;
use std::collections::VecDeque;

/// Fixed-capacity FIFO guarded by a mutex
#[derive(Debug)]
pub struct SampleRing<T> {
    inner: Mutex<RingState<T>>,
    capacity: usize,
}

#[derive(Debug)]
struct RingState<T> {
    items: VecDeque<T>,
    dropped: u64,
}

impl<T> SampleRing<T> {
    /// Create a ring holding at most `capacity` items (minimum 1)
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(RingState {
                items: VecDeque::with_capacity(capacity.min(1024)),
                dropped: 0,
            }),
            capacity,
        }
    }

    /// Append an item, returning the evicted oldest one when full
    pub fn push(&self, item: T) -> Option<T> {
        let mut state = self.inner.lock();
        let evicted = if state.items.len() >= self.capacity {
            state.dropped += 1;
            state.items.pop_front()
        } else {
            None
        };
        state.items.push_back(item);
        evicted
    }

    /// Take every buffered item, leaving the ring empty
    pub fn drain(&self) -> Vec<T> {
        self.inner.lock().items.drain(..).collect()
    }

    /// Number of buffered items
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    /// True when nothing is buffered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().items.is_empty()
    }

    /// Maximum number of buffered items
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Items evicted because the ring was full
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.inner.lock().dropped
    }
}
