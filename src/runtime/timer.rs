//! Timer heap for deadline management.
//!
//! Each scheduler owns a min-heap of timers and fires the expired ones at
//! the start of every batch. A timer is shared between the heap and its
//! [`TimerHandle`]; firing and stopping race on one atomic transition out of
//! the armed state, so a timer either fires or is stopped, never both.
//!
//! A timer may be bound to an owning state object. Once the owner is gone
//! the timer is stopped the next time the heap looks at it, so an abandoned
//! sleep neither fires nor keeps a run loop alive.

use core::fmt;
use parking_lot::Mutex;
use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;
use tracing::trace;

use crate::state::State;

const ARMED: u8 = 0;
const FIRED: u8 = 1;
const STOPPED: u8 = 2;

type TimerCallback = Box<dyn FnOnce() + Send>;

struct TimerShared {
    phase: AtomicU8,
    callback: Mutex<Option<TimerCallback>>,
    owner: Option<Weak<dyn State>>,
}

impl TimerShared {
    fn is_armed(&self) -> bool {
        self.phase.load(Ordering::Acquire) == ARMED
    }

    /// Armed and still wanted: stops the timer if its owner is gone.
    fn is_pending(&self) -> bool {
        if !self.is_armed() {
            return false;
        }
        match &self.owner {
            Some(owner) if owner.strong_count() == 0 => {
                if self.stop() {
                    trace!("timer stopped: owner dropped");
                }
                false
            }
            _ => true,
        }
    }

    fn transition(&self, to: u8) -> bool {
        self.phase
            .compare_exchange(ARMED, to, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn fire(&self) -> bool {
        if !self.transition(FIRED) {
            return false;
        }
        let callback = self.callback.lock().take();
        if let Some(callback) = callback {
            callback();
        }
        true
    }

    fn stop(&self) -> bool {
        if !self.transition(STOPPED) {
            return false;
        }
        let callback = self.callback.lock().take();
        drop(callback);
        true
    }
}

/// A timer entry in the heap.
struct TimerEntry {
    deadline: Instant,
    /// Insertion order; breaks deadline ties.
    generation: u64,
    shared: Arc<TimerShared>,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.generation == other.generation
    }
}

impl Eq for TimerEntry {}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // Reverse ordering for min-heap (earliest deadline first)
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.generation.cmp(&self.generation))
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

/// Handle to a scheduled timer.
///
/// An empty handle (the default, or after [`reset`](Self::reset)) refers to
/// no timer.
#[derive(Clone, Default)]
pub struct TimerHandle {
    shared: Option<Arc<TimerShared>>,
}

impl TimerHandle {
    /// Cancels the timer without firing it.
    ///
    /// Returns true if this call stopped an armed timer.
    #[allow(clippy::must_use_candidate)]
    pub fn stop(&self) -> bool {
        self.shared.as_ref().is_some_and(|s| s.stop())
    }

    /// Detaches this handle from its timer without cancelling it.
    pub fn reset(&mut self) {
        self.shared = None;
    }

    /// Returns true if the handle refers to a timer that has not fired or
    /// been stopped, and whose owner (if bound) is still alive.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.shared.as_ref().is_some_and(|s| s.is_pending())
    }

    /// Returns true if the handle refers to no timer.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shared.is_none()
    }
}

impl fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerHandle")
            .field("attached", &self.shared.is_some())
            .field("active", &self.is_active())
            .finish()
    }
}

/// A min-heap of timers ordered by deadline.
#[derive(Default)]
pub struct TimerHeap {
    heap: BinaryHeap<TimerEntry>,
    next_generation: u64,
}

impl TimerHeap {
    /// Creates a new empty timer heap.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of timers in the heap, including stopped ones not
    /// yet pruned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Returns true if the heap is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Schedules `callback` to run at `deadline`.
    pub fn insert(
        &mut self,
        deadline: Instant,
        callback: impl FnOnce() + Send + 'static,
    ) -> TimerHandle {
        self.push(deadline, None, Box::new(callback))
    }

    /// Schedules `callback` to run at `deadline` while `owner` is alive.
    pub fn insert_owned(
        &mut self,
        deadline: Instant,
        owner: Weak<dyn State>,
        callback: impl FnOnce() + Send + 'static,
    ) -> TimerHandle {
        self.push(deadline, Some(owner), Box::new(callback))
    }

    fn push(
        &mut self,
        deadline: Instant,
        owner: Option<Weak<dyn State>>,
        callback: TimerCallback,
    ) -> TimerHandle {
        let generation = self.next_generation;
        self.next_generation += 1;
        let shared = Arc::new(TimerShared {
            phase: AtomicU8::new(ARMED),
            callback: Mutex::new(Some(callback)),
            owner,
        });
        self.heap.push(TimerEntry {
            deadline,
            generation,
            shared: Arc::clone(&shared),
        });
        TimerHandle {
            shared: Some(shared),
        }
    }

    /// Returns the earliest deadline among armed timers, if any.
    pub fn peek_deadline(&mut self) -> Option<Instant> {
        self.prune();
        self.heap.peek().map(|e| e.deadline)
    }

    /// Returns true if any timer is still armed.
    ///
    /// Stopped, fired and orphaned entries are dropped from the heap.
    pub fn has_armed(&mut self) -> bool {
        self.heap.retain(|e| e.shared.is_pending());
        !self.heap.is_empty()
    }

    /// Pops all armed timers that have expired (deadline <= now).
    ///
    /// The returned timers have not fired yet; pass them to [`fire_all`]
    /// once the heap lock is released.
    pub fn pop_expired(&mut self, now: Instant) -> Vec<ExpiredTimer> {
        let mut expired = Vec::new();
        while let Some(entry) = self.heap.peek() {
            if entry.deadline > now {
                break;
            }
            if let Some(entry) = self.heap.pop() {
                if entry.shared.is_pending() {
                    expired.push(ExpiredTimer {
                        shared: entry.shared,
                    });
                }
            }
        }
        expired
    }

    /// Clears all timers without firing them.
    pub fn clear(&mut self) {
        for entry in self.heap.drain() {
            entry.shared.stop();
        }
    }

    fn prune(&mut self) {
        while self.heap.peek().is_some_and(|e| !e.shared.is_pending()) {
            self.heap.pop();
        }
    }
}

impl fmt::Debug for TimerHeap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerHeap")
            .field("len", &self.heap.len())
            .field("next_generation", &self.next_generation)
            .finish()
    }
}

/// A timer popped from the heap, ready to fire.
pub struct ExpiredTimer {
    shared: Arc<TimerShared>,
}

impl fmt::Debug for ExpiredTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpiredTimer").finish_non_exhaustive()
    }
}

/// Fires each expired timer that has not been stopped in the meantime.
///
/// Returns the number of callbacks that ran.
pub fn fire_all(expired: Vec<ExpiredTimer>) -> usize {
    let mut fired = 0;
    for timer in expired {
        if timer.shared.fire() {
            fired += 1;
        }
    }
    if fired > 0 {
        trace!(fired, "timers fired");
    }
    fired
}
