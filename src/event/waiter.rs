//! Waiter descriptors: the state objects an awaiting body parks on sources.
//!
//! Each descriptor is resolved by exactly one of three causes: a source
//! notifying it, its timer expiring, or its owner cancelling it. The causes
//! race from different threads; an atomic transition out of the armed state
//! picks the winner and every loser returns without side effects.
//!
//! | Descriptor | Armed | Terminal |
//! |------------|-------|----------|
//! | [`StateEvent`] | `phase == ARMED` | `CANCELLED`, `TIMED_OUT`, or the notifying source's id |
//! | [`StateEventAll`] | `counter > 0` | counter reaches 0 (all arrived) or -1 (cancel/timeout) |
//!
//! The winner stops (or, for a fired timer, detaches) the timer and, unless
//! it is the cancel path, hands the descriptor back to its scheduler if a
//! continuation is waiting.

use core::fmt;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicIsize, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use tracing::trace;

use super::{EventImpl, EventWaiter};
use crate::coroutine::Continuation;
use crate::runtime::scheduler::SchedulerRef;
use crate::runtime::timer::TimerHandle;
use crate::state::{State, StateCore};
use crate::types::{EventId, StateId};

const ARMED: u64 = 0;
const CANCELLED: u64 = 1;
const TIMED_OUT: u64 = 2;
const NOTIFIED_BASE: u64 = 3;

/// How a wait resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WaitOutcome {
    /// Not resolved yet.
    Pending,
    /// A single-wait was satisfied by the given source.
    Notified(EventId),
    /// Every source of a wait-all signaled.
    Completed,
    /// The timer expired first.
    TimedOut,
    /// The wait was cancelled.
    Cancelled,
}

impl WaitOutcome {
    /// Returns true if the wait resolved through signals rather than a
    /// timeout or cancellation.
    #[must_use]
    pub const fn is_signaled(self) -> bool {
        matches!(self, Self::Notified(_) | Self::Completed)
    }

    /// Returns true once the wait has resolved.
    #[must_use]
    pub const fn is_resolved(self) -> bool {
        !matches!(self, Self::Pending)
    }

    fn decode_single(phase: u64) -> Self {
        match phase {
            ARMED => Self::Pending,
            CANCELLED => Self::Cancelled,
            TIMED_OUT => Self::TimedOut,
            raw => Self::Notified(EventId::from_raw(raw - NOTIFIED_BASE)),
        }
    }
}

/// Single-wait descriptor.
///
/// Parked on one or more sources; the first source to notify it wins.
pub struct StateEvent {
    core: StateCore,
    phase: AtomicU64,
    timer: Mutex<TimerHandle>,
}

impl StateEvent {
    /// Creates an armed descriptor attached to `scheduler`.
    #[must_use]
    pub fn new(scheduler: &SchedulerRef) -> Arc<Self> {
        let state = Arc::new_cyclic(|this: &Weak<Self>| {
            let this: Weak<dyn State> = this.clone();
            Self {
                core: StateCore::new(this),
                phase: AtomicU64::new(ARMED),
                timer: Mutex::new(TimerHandle::default()),
            }
        });
        state.core.set_scheduler(scheduler);
        state
    }

    /// Installs the continuation resumed when the descriptor resolves.
    pub fn await_suspend(&self, cont: Continuation) {
        self.core.install(cont);
    }

    /// Takes the continuation back, if the scheduler has not taken it.
    pub fn take_handle(&self) -> Option<Continuation> {
        self.core.take_handle()
    }

    /// Stores the timer racing this descriptor.
    ///
    /// If the descriptor already resolved, the timer is stopped at once.
    pub fn set_timer(&self, timer: TimerHandle) {
        let mut slot = self.timer.lock();
        *slot = timer;
        if self.is_resolved() {
            slot.stop();
        }
    }

    /// Returns the current outcome.
    #[must_use]
    pub fn outcome(&self) -> WaitOutcome {
        WaitOutcome::decode_single(self.phase.load(Ordering::Acquire))
    }

    fn arbitrate(&self, to: u64) -> bool {
        let current = self.phase.load(Ordering::Acquire);
        current == ARMED
            && self
                .phase
                .compare_exchange(ARMED, to, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
    }
}

impl EventWaiter for StateEvent {
    fn on_notify(&self, source: &EventImpl) -> bool {
        if !self.arbitrate(source.id().as_u64() + NOTIFIED_BASE) {
            return false;
        }
        trace!(state_id = ?self.core.id(), event_id = ?source.id(), "wait notified");
        self.timer.lock().stop();
        self.core.requeue();
        true
    }

    fn on_cancel(&self) {
        if !self.arbitrate(CANCELLED) {
            return;
        }
        trace!(state_id = ?self.core.id(), "wait cancelled");
        self.timer.lock().stop();
        drop(self.core.take_handle());
    }

    fn on_timeout(&self) -> bool {
        if !self.arbitrate(TIMED_OUT) {
            return false;
        }
        trace!(state_id = ?self.core.id(), "wait timed out");
        self.timer.lock().reset();
        self.core.requeue();
        true
    }

    fn is_resolved(&self) -> bool {
        self.phase.load(Ordering::Acquire) != ARMED
    }
}

impl State for StateEvent {
    fn id(&self) -> StateId {
        self.core.id()
    }

    fn resume(&self) {
        self.core.resume_with(self);
    }

    fn has_handler(&self) -> bool {
        self.core.has_handler()
    }

    fn scheduler(&self) -> Option<SchedulerRef> {
        self.core.scheduler()
    }

    fn switch_scheduler_await_suspend(&self, target: &SchedulerRef) -> bool {
        self.core.migrate(self, target)
    }
}

impl fmt::Debug for StateEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateEvent")
            .field("id", &self.core.id())
            .field("outcome", &self.outcome())
            .finish()
    }
}

const RESULT_PENDING: u8 = 0;
const RESULT_ALL: u8 = 1;
const RESULT_TIMED_OUT: u8 = 2;
const RESULT_CANCELLED: u8 = 3;

/// Wait-all descriptor.
///
/// Parked on N sources with a countdown of N. The arrival that takes the
/// count from 1 to 0 resolves the wait successfully; a cancel or timeout
/// while the count is still positive resolves it as failed.
pub struct StateEventAll {
    core: StateCore,
    counter: AtomicIsize,
    result: AtomicU8,
    timer: Mutex<TimerHandle>,
}

impl StateEventAll {
    /// Creates a descriptor waiting for `count` arrivals.
    ///
    /// A count of zero is resolved successfully from the start.
    #[must_use]
    pub fn new(count: usize, scheduler: &SchedulerRef) -> Arc<Self> {
        let count = isize::try_from(count).unwrap_or(isize::MAX);
        let state = Arc::new_cyclic(|this: &Weak<Self>| {
            let this: Weak<dyn State> = this.clone();
            Self {
                core: StateCore::new(this),
                counter: AtomicIsize::new(count),
                result: AtomicU8::new(if count == 0 {
                    RESULT_ALL
                } else {
                    RESULT_PENDING
                }),
                timer: Mutex::new(TimerHandle::default()),
            }
        });
        state.core.set_scheduler(scheduler);
        state
    }

    /// Installs the continuation resumed when the descriptor resolves.
    pub fn await_suspend(&self, cont: Continuation) {
        self.core.install(cont);
    }

    /// Takes the continuation back, if the scheduler has not taken it.
    pub fn take_handle(&self) -> Option<Continuation> {
        self.core.take_handle()
    }

    /// Stores the timer racing this descriptor.
    pub fn set_timer(&self, timer: TimerHandle) {
        let mut slot = self.timer.lock();
        *slot = timer;
        if self.is_resolved() {
            slot.stop();
        }
    }

    /// Returns the joint result: `Some(true)` once every source signaled,
    /// `Some(false)` after a cancel or timeout, `None` while pending.
    #[must_use]
    pub fn result(&self) -> Option<bool> {
        match self.result.load(Ordering::Acquire) {
            RESULT_PENDING => None,
            RESULT_ALL => Some(true),
            _ => Some(false),
        }
    }

    /// Returns the current outcome.
    #[must_use]
    pub fn outcome(&self) -> WaitOutcome {
        match self.result.load(Ordering::Acquire) {
            RESULT_PENDING => WaitOutcome::Pending,
            RESULT_ALL => WaitOutcome::Completed,
            RESULT_TIMED_OUT => WaitOutcome::TimedOut,
            _ => WaitOutcome::Cancelled,
        }
    }

    /// Returns the number of arrivals still missing (negative once failed).
    #[must_use]
    pub fn remaining(&self) -> isize {
        self.counter.load(Ordering::Acquire)
    }

    /// Moves the countdown from a positive value to the failed sentinel.
    fn fail(&self) -> bool {
        let mut current = self.counter.load(Ordering::Acquire);
        while current > 0 {
            match self
                .counter
                .compare_exchange(current, -1, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
        false
    }
}

impl EventWaiter for StateEventAll {
    fn on_notify(&self, source: &EventImpl) -> bool {
        if self.counter.load(Ordering::Acquire) <= 0 {
            return false;
        }
        let previous = self.counter.fetch_sub(1, Ordering::AcqRel);
        if previous == 1 {
            trace!(state_id = ?self.core.id(), event_id = ?source.id(), "wait-all completed");
            self.result.store(RESULT_ALL, Ordering::Release);
            self.timer.lock().stop();
            self.core.requeue();
            return true;
        }
        previous >= 1
    }

    fn on_cancel(&self) {
        if !self.fail() {
            return;
        }
        trace!(state_id = ?self.core.id(), "wait-all cancelled");
        self.result.store(RESULT_CANCELLED, Ordering::Release);
        self.timer.lock().stop();
        drop(self.core.take_handle());
    }

    fn on_timeout(&self) -> bool {
        if !self.fail() {
            return false;
        }
        trace!(state_id = ?self.core.id(), "wait-all timed out");
        self.result.store(RESULT_TIMED_OUT, Ordering::Release);
        self.timer.lock().reset();
        self.core.requeue();
        true
    }

    fn is_resolved(&self) -> bool {
        self.result.load(Ordering::Acquire) != RESULT_PENDING
    }
}

impl State for StateEventAll {
    fn id(&self) -> StateId {
        self.core.id()
    }

    fn resume(&self) {
        self.core.resume_with(self);
    }

    fn has_handler(&self) -> bool {
        self.core.has_handler()
    }

    fn scheduler(&self) -> Option<SchedulerRef> {
        self.core.scheduler()
    }

    fn switch_scheduler_await_suspend(&self, target: &SchedulerRef) -> bool {
        self.core.migrate(self, target)
    }
}

impl fmt::Debug for StateEventAll {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateEventAll")
            .field("id", &self.core.id())
            .field("remaining", &self.remaining())
            .field("outcome", &self.outcome())
            .finish()
    }
}
