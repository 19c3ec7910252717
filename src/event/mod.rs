//! Event signal sources and the waits parked on them.
//!
//! An [`EventImpl`] banks signals in an atomic counter and keeps a FIFO of
//! parked [`EventWaiter`]s behind a lock. [`Event`] is the cheaply clonable
//! public handle; any number of tasks on any number of threads may signal or
//! wait on clones of one event, and the source lives as long as the longest
//! holder.
//!
//! # Signal delivery
//!
//! - `signal()` offers the signal to queued waiters in FIFO order until one
//!   accepts, and banks it in the counter if none does. At most one waiter
//!   is satisfied per call.
//! - `signal_all()` clears the counter and notifies every queued waiter.
//! - `notify()` is the level-style variant: it wakes one waiter like
//!   `signal()` but never banks more than a single signal.
//! - `latch()` leaves the source permanently signaled. Every parked and
//!   every later waiter resolves at once, and `try_wait_one()` always
//!   succeeds.
//! - Waiters that already resolved through another cause reject the offer;
//!   the lock only serializes the queue, never the descriptors.
//!
//! # Waiting from a coroutine body
//!
//! A wait registers a descriptor and reports whether the body has to
//! suspend. Registration installs the body's continuation, arms the timer,
//! and then parks the descriptor on every source. A banked signal found
//! while parking resolves the descriptor immediately; in that case the body
//! takes its continuation back and keeps running.
//!
//! ```
//! use resumef::coroutine::{Step, Suspend};
//! use resumef::event::{Event, EventWait};
//! use resumef::runtime::{Scheduler, SchedulerConfig};
//!
//! let sched = Scheduler::new(SchedulerConfig::default());
//! let event = Event::new(false);
//!
//! let (ev, s) = (event.clone(), sched.clone());
//! let mut wait: Option<EventWait> = None;
//! let task = sched.spawn(move |co: &Suspend<'_>| {
//!     if wait.is_none() {
//!         let registered = ev.wait(&s, co);
//!         let suspended = registered.suspended();
//!         wait = Some(registered);
//!         if suspended {
//!             return Step::Suspended;
//!         }
//!     }
//!     assert!(wait.as_ref().is_some_and(|w| w.outcome().is_signaled()));
//!     Step::Complete
//! });
//!
//! event.signal();
//! sched.run_until_notask();
//! assert!(task.is_finished());
//! ```

pub mod waiter;

pub use waiter::{StateEvent, StateEventAll, WaitOutcome};

use core::fmt;
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicIsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

use crate::coroutine::Suspend;
use crate::runtime::scheduler::Scheduler;
use crate::types::EventId;

/// A descriptor that can be parked on an [`EventImpl`].
///
/// Exactly one of `on_notify`, `on_cancel` and `on_timeout` succeeds per
/// descriptor; all three may be called concurrently from different threads.
pub trait EventWaiter: Send + Sync + fmt::Debug + 'static {
    /// Offers a signal from `source`. Returns true if the offer was taken.
    fn on_notify(&self, source: &EventImpl) -> bool;

    /// Cancels the wait without resuming the waiting body.
    fn on_cancel(&self);

    /// Resolves the wait as timed out. Returns true if this call won.
    fn on_timeout(&self) -> bool;

    /// Returns true once the descriptor is no longer armed.
    fn is_resolved(&self) -> bool;
}

/// The shared signal source behind an [`Event`].
pub struct EventImpl {
    id: EventId,
    counter: AtomicIsize,
    latched: AtomicBool,
    waiters: Mutex<VecDeque<Arc<dyn EventWaiter>>>,
}

impl EventImpl {
    /// Creates a source with one banked signal if `initially` is set.
    #[must_use]
    pub fn new(initially: bool) -> Self {
        Self {
            id: EventId::next(),
            counter: AtomicIsize::new(isize::from(initially)),
            latched: AtomicBool::new(false),
            waiters: Mutex::new(VecDeque::new()),
        }
    }

    /// Returns the source identifier.
    #[must_use]
    pub const fn id(&self) -> EventId {
        self.id
    }

    /// Returns the number of banked signals.
    #[must_use]
    pub fn counter(&self) -> isize {
        self.counter.load(Ordering::Acquire)
    }

    /// Returns the number of parked waiters, including resolved ones not yet
    /// pruned.
    #[must_use]
    pub fn waiter_count(&self) -> usize {
        self.waiters.lock().len()
    }

    /// Wakes at most one waiter, or banks the signal.
    pub fn signal(&self) {
        let mut waiters = self.waiters.lock();
        while let Some(waiter) = waiters.pop_front() {
            if waiter.on_notify(self) {
                trace!(event_id = ?self.id, "signal delivered");
                return;
            }
        }
        let banked = self.counter.fetch_add(1, Ordering::AcqRel) + 1;
        trace!(event_id = ?self.id, banked, "signal banked");
    }

    /// Wakes at most one waiter, or leaves exactly one signal banked.
    ///
    /// Repeated calls with nobody waiting do not accumulate.
    pub fn notify(&self) {
        let mut waiters = self.waiters.lock();
        while let Some(waiter) = waiters.pop_front() {
            if waiter.on_notify(self) {
                trace!(event_id = ?self.id, "notify delivered");
                return;
            }
        }
        self.counter.fetch_max(1, Ordering::AcqRel);
    }

    /// Leaves the source permanently signaled and wakes every parked waiter.
    ///
    /// Returns true if this call latched the source.
    pub fn latch(&self) -> bool {
        let mut waiters = self.waiters.lock();
        if self.latched.swap(true, Ordering::AcqRel) {
            return false;
        }
        let mut notified = 0usize;
        while let Some(waiter) = waiters.pop_front() {
            if waiter.on_notify(self) {
                notified += 1;
            }
        }
        trace!(event_id = ?self.id, notified, "event latched");
        true
    }

    /// Returns true once [`latch`](Self::latch) was called.
    #[must_use]
    pub fn is_latched(&self) -> bool {
        self.latched.load(Ordering::Acquire)
    }

    /// Clears banked signals and notifies every parked waiter.
    pub fn signal_all(&self) {
        let mut waiters = self.waiters.lock();
        self.counter.store(0, Ordering::Release);
        let mut notified = 0usize;
        while let Some(waiter) = waiters.pop_front() {
            if waiter.on_notify(self) {
                notified += 1;
            }
        }
        trace!(event_id = ?self.id, notified, "signal_all delivered");
    }

    /// Clears banked signals without waking anyone.
    ///
    /// A latched source stays latched.
    pub fn reset(&self) {
        let _waiters = self.waiters.lock();
        self.counter.store(0, Ordering::Release);
    }

    /// Consumes one banked signal if available.
    ///
    /// A latched source always succeeds without consuming anything.
    pub fn try_wait_one(&self) -> bool {
        if self.is_latched() {
            return true;
        }
        let mut current = self.counter.load(Ordering::Acquire);
        while current > 0 {
            match self.counter.compare_exchange_weak(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
        false
    }

    /// Parks `waiter`, or hands it a banked signal.
    ///
    /// Returns true if the waiter was queued. If a signal was banked it is
    /// offered to the waiter instead and consumed only if the waiter takes
    /// it; the waiter is not queued either way.
    pub fn park(&self, waiter: Arc<dyn EventWaiter>) -> bool {
        let mut waiters = self.waiters.lock();
        if self.is_latched() {
            waiter.on_notify(self);
            return false;
        }
        if self.try_wait_one() {
            if !waiter.on_notify(self) {
                self.counter.fetch_add(1, Ordering::AcqRel);
            }
            return false;
        }
        if waiter.is_resolved() {
            return false;
        }
        waiters.retain(|w| !w.is_resolved());
        waiters.push_back(waiter);
        true
    }
}

impl Drop for EventImpl {
    fn drop(&mut self) {
        let waiters = std::mem::take(self.waiters.get_mut());
        if !waiters.is_empty() {
            trace!(event_id = ?self.id, dropped = waiters.len(), "event dropped with parked waiters");
        }
    }
}

impl fmt::Debug for EventImpl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventImpl")
            .field("id", &self.id)
            .field("counter", &self.counter())
            .field("latched", &self.is_latched())
            .finish_non_exhaustive()
    }
}

/// A clonable handle to a shared signal source.
#[derive(Clone, Debug)]
pub struct Event {
    inner: Arc<EventImpl>,
}

impl Event {
    /// Creates an event, optionally with one banked signal.
    #[must_use]
    pub fn new(initially: bool) -> Self {
        Self {
            inner: Arc::new(EventImpl::new(initially)),
        }
    }

    /// Returns the source identifier.
    #[must_use]
    pub fn id(&self) -> EventId {
        self.inner.id()
    }

    /// Returns the shared source.
    #[must_use]
    pub fn source(&self) -> &Arc<EventImpl> {
        &self.inner
    }

    /// Wakes at most one waiter, or banks the signal.
    pub fn signal(&self) {
        self.inner.signal();
    }

    /// Clears banked signals and wakes every parked waiter.
    pub fn signal_all(&self) {
        self.inner.signal_all();
    }

    /// Wakes at most one waiter, or leaves one signal banked.
    pub fn notify(&self) {
        self.inner.notify();
    }

    /// Leaves the event permanently signaled.
    #[allow(clippy::must_use_candidate)]
    pub fn latch(&self) -> bool {
        self.inner.latch()
    }

    /// Clears banked signals.
    pub fn reset(&self) {
        self.inner.reset();
    }

    /// Consumes one banked signal without waiting.
    #[must_use]
    pub fn try_wait(&self) -> bool {
        self.inner.try_wait_one()
    }

    /// Waits for this event.
    #[must_use]
    pub fn wait(&self, scheduler: &Arc<Scheduler>, co: &Suspend<'_>) -> EventWait {
        wait_any(std::slice::from_ref(self), scheduler, None, co)
    }

    /// Waits for this event for at most `timeout`.
    #[must_use]
    pub fn wait_timeout(
        &self,
        scheduler: &Arc<Scheduler>,
        timeout: Duration,
        co: &Suspend<'_>,
    ) -> EventWait {
        wait_any(std::slice::from_ref(self), scheduler, Some(timeout), co)
    }
}

/// A registered single-wait.
///
/// Dropping the wait while it is still pending cancels it.
#[must_use = "dropping an EventWait cancels it"]
pub struct EventWait {
    state: Arc<StateEvent>,
    sources: SmallVec<[EventId; 4]>,
    suspended: bool,
}

impl EventWait {
    /// Returns true if the body must return
    /// [`Step::Suspended`](crate::coroutine::Step); the scheduler resumes it
    /// once the wait resolves. False means the wait resolved during
    /// registration and the body keeps running.
    #[must_use]
    pub const fn suspended(&self) -> bool {
        self.suspended
    }

    /// Returns the current outcome.
    #[must_use]
    pub fn outcome(&self) -> WaitOutcome {
        self.state.outcome()
    }

    /// Returns the position of the source that satisfied the wait.
    #[must_use]
    pub fn index(&self) -> Option<usize> {
        match self.outcome() {
            WaitOutcome::Notified(id) => self.sources.iter().position(|s| *s == id),
            _ => None,
        }
    }

    /// Returns the descriptor.
    #[must_use]
    pub fn state(&self) -> &Arc<StateEvent> {
        &self.state
    }

    /// Cancels the wait. Has no effect if it already resolved.
    pub fn cancel(&self) {
        self.state.on_cancel();
    }
}

impl Drop for EventWait {
    fn drop(&mut self) {
        self.state.on_cancel();
    }
}

impl fmt::Debug for EventWait {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventWait")
            .field("state", &self.state)
            .field("sources", &self.sources.len())
            .field("suspended", &self.suspended)
            .finish()
    }
}

/// A registered wait-all.
///
/// Dropping the wait while it is still pending cancels it.
#[must_use = "dropping an EventWaitAll cancels it"]
pub struct EventWaitAll {
    state: Arc<StateEventAll>,
    suspended: bool,
}

impl EventWaitAll {
    /// Returns true if the body must return
    /// [`Step::Suspended`](crate::coroutine::Step).
    #[must_use]
    pub const fn suspended(&self) -> bool {
        self.suspended
    }

    /// Returns the joint result; `None` while pending.
    #[must_use]
    pub fn result(&self) -> Option<bool> {
        self.state.result()
    }

    /// Returns the current outcome.
    #[must_use]
    pub fn outcome(&self) -> WaitOutcome {
        self.state.outcome()
    }

    /// Returns the descriptor.
    #[must_use]
    pub fn state(&self) -> &Arc<StateEventAll> {
        &self.state
    }

    /// Cancels the wait. Has no effect if it already resolved.
    pub fn cancel(&self) {
        self.state.on_cancel();
    }
}

impl Drop for EventWaitAll {
    fn drop(&mut self) {
        self.state.on_cancel();
    }
}

impl fmt::Debug for EventWaitAll {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventWaitAll")
            .field("state", &self.state)
            .field("suspended", &self.suspended)
            .finish()
    }
}

/// Waits until any one of `events` signals, or `timeout` elapses.
///
/// With no events and no timeout the wait times out immediately.
pub fn wait_any(
    events: &[Event],
    scheduler: &Arc<Scheduler>,
    timeout: Option<Duration>,
    co: &Suspend<'_>,
) -> EventWait {
    let state = StateEvent::new(&scheduler.handle());
    state.await_suspend(co.continuation());

    if let Some(timeout) = timeout {
        let weak = Arc::downgrade(&state);
        state.set_timer(scheduler.add_timer(timeout, move || {
            if let Some(state) = weak.upgrade() {
                state.on_timeout();
            }
        }));
    } else if events.is_empty() {
        state.on_timeout();
    }

    let waiter: Arc<dyn EventWaiter> = state.clone();
    for event in events {
        if state.is_resolved() {
            break;
        }
        event.inner.park(Arc::clone(&waiter));
    }

    let suspended = !(state.is_resolved() && state.take_handle().is_some());
    trace!(state_id = ?crate::state::State::id(&*state), sources = events.len(), suspended, "wait_any registered");
    EventWait {
        state,
        sources: events.iter().map(Event::id).collect(),
        suspended,
    }
}

/// Waits until every one of `events` has signaled, or `timeout` elapses.
///
/// Banked signals count down during registration. With no events the wait
/// completes immediately.
pub fn wait_all(
    events: &[Event],
    scheduler: &Arc<Scheduler>,
    timeout: Option<Duration>,
    co: &Suspend<'_>,
) -> EventWaitAll {
    let state = StateEventAll::new(events.len(), &scheduler.handle());
    state.await_suspend(co.continuation());

    if let Some(timeout) = timeout {
        let weak = Arc::downgrade(&state);
        state.set_timer(scheduler.add_timer(timeout, move || {
            if let Some(state) = weak.upgrade() {
                state.on_timeout();
            }
        }));
    }

    let waiter: Arc<dyn EventWaiter> = state.clone();
    for event in events {
        if state.is_resolved() {
            break;
        }
        event.inner.park(Arc::clone(&waiter));
    }

    let suspended = !(state.is_resolved() && state.take_handle().is_some());
    trace!(state_id = ?crate::state::State::id(&*state), sources = events.len(), suspended, "wait_all registered");
    EventWaitAll { state, suspended }
}
