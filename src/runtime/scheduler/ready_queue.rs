//! Ready queue.
//!
//! A thread-safe unbounded FIFO of states waiting to be resumed. Producers
//! on any thread push; the owning scheduler's run loop pops.

use crate::state::StateRef;
use crossbeam_queue::SegQueue;
use core::fmt;

/// A ready queue of state objects.
#[derive(Default)]
pub struct ReadyQueue {
    inner: SegQueue<StateRef>,
}

impl ReadyQueue {
    /// Creates a new ready queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: SegQueue::new(),
        }
    }

    /// Pushes a state to the back of the queue.
    pub fn push(&self, state: StateRef) {
        self.inner.push(state);
    }

    /// Pops the state at the front of the queue.
    pub fn pop(&self) -> Option<StateRef> {
        self.inner.pop()
    }

    /// Returns the number of queued states.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns true if the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl fmt::Debug for ReadyQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadyQueue")
            .field("len", &self.inner.len())
            .finish()
    }
}
