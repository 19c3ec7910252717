//! State objects: the unit a scheduler manipulates.
//!
//! A state object owns at most one [`Continuation`] and holds a non-owning
//! back-reference to the scheduler that should resume it. Producers of
//! results (event sources, future setters, timers) never resume a
//! continuation directly; they hand the owning state back to its scheduler
//! through [`Schedule::add_generator`], and the scheduler calls
//! [`State::resume`] from its run loop.
//!
//! # Variants
//!
//! - [`BaseState`]: generic resumable, the leaf of an await chain
//! - [`FutureState`]: two-phase initiator, parent chaining, result slot
//! - [`GeneratorState`]: self-requeuing, pooled allocation
//! - [`Completion`]: callback-side sender for a [`FutureState`]
//! - [`StateEvent`](crate::event::StateEvent) and
//!   [`StateEventAll`](crate::event::StateEventAll): event waiter descriptors
//!
//! # Take-and-null
//!
//! `resume()` takes the handle out of its slot before running it. A second,
//! concurrent `resume()` observes an empty slot and returns without doing
//! anything, so a continuation is never resumed twice.

pub mod completion;
pub mod future;
pub mod generator;
pub mod pool;
pub mod when;

pub use completion::{completion, from_callback, Completion};
pub use future::{FutureState, Initiator, ResultKind};
pub use generator::GeneratorState;
pub use pool::{FramePool, PoolLease, PoolStats};
pub use when::{when_all, when_any};

use core::fmt;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tracing::{debug, trace};

use crate::coroutine::Continuation;
use crate::runtime::scheduler::{Schedule, SchedulerRef};
use crate::types::StateId;

/// Shared handle to a state object.
pub type StateRef = Arc<dyn State>;

/// Behavior common to every state object.
pub trait State: Send + Sync + fmt::Debug + 'static {
    /// Returns this state's identifier.
    fn id(&self) -> StateId;

    /// Resumes the held continuation, if any.
    fn resume(&self);

    /// Returns true if a continuation is currently held.
    fn has_handler(&self) -> bool;

    /// Returns the next state up the await chain.
    fn parent(&self) -> Option<StateRef> {
        None
    }

    /// Returns the scheduler this state is attached to.
    fn scheduler(&self) -> Option<SchedulerRef>;

    /// Moves this state to `target`.
    ///
    /// Returns false if the state is already attached to `target`.
    fn switch_scheduler_await_suspend(&self, target: &SchedulerRef) -> bool;
}

/// Moves the scheduler slot of `owner` to `target`.
///
/// Any pending entry is detached from the old scheduler before it is
/// attached to the new one, so the entry is never reachable from both.
pub(crate) fn migrate_slot(
    slot: &mut Option<Weak<dyn Schedule>>,
    owner: &dyn State,
    target: &SchedulerRef,
) -> bool {
    match slot.as_ref().and_then(Weak::upgrade) {
        Some(current) => {
            if current.id() == target.id() {
                return false;
            }
            let entry = current.del_switch(owner);
            *slot = Some(Arc::downgrade(target));
            debug!(
                state_id = ?owner.id(),
                from = ?current.id(),
                to = ?target.id(),
                moved_entry = entry.is_some(),
                "state switched scheduler"
            );
            if let Some(task) = entry {
                target.add_switch(task);
            }
        }
        None => {
            *slot = Some(Arc::downgrade(target));
            trace!(state_id = ?owner.id(), to = ?target.id(), "state attached to scheduler");
        }
    }
    true
}

/// Fields shared by the lock-free state variants.
///
/// The handle slot is the take-and-null arbitration point; the scheduler
/// slot is mutated only by migration.
#[derive(Debug)]
pub struct StateCore {
    id: StateId,
    this: Weak<dyn State>,
    handle: Mutex<Option<Continuation>>,
    scheduler: Mutex<Option<Weak<dyn Schedule>>>,
}

impl StateCore {
    /// Creates the shared fields for the state behind `this`.
    #[must_use]
    pub fn new(this: Weak<dyn State>) -> Self {
        Self {
            id: StateId::next(),
            this,
            handle: Mutex::new(None),
            scheduler: Mutex::new(None),
        }
    }

    /// Returns the state identifier.
    #[must_use]
    pub fn id(&self) -> StateId {
        self.id
    }

    /// Returns a strong reference to the owning state, if it is still alive.
    #[must_use]
    pub fn this(&self) -> Option<StateRef> {
        self.this.upgrade()
    }

    /// Installs a continuation, returning any handle it replaced.
    pub fn install(&self, cont: Continuation) -> Option<Continuation> {
        self.handle.lock().replace(cont)
    }

    /// Takes the held continuation, leaving the slot empty.
    pub fn take_handle(&self) -> Option<Continuation> {
        self.handle.lock().take()
    }

    /// Returns true if a continuation is held.
    #[must_use]
    pub fn has_handler(&self) -> bool {
        self.handle.lock().is_some()
    }

    /// Returns the attached scheduler, if it is still alive.
    #[must_use]
    pub fn scheduler(&self) -> Option<SchedulerRef> {
        self.scheduler.lock().as_ref().and_then(Weak::upgrade)
    }

    /// Attaches to a scheduler without migrating pending entries.
    pub fn set_scheduler(&self, scheduler: &SchedulerRef) {
        *self.scheduler.lock() = Some(Arc::downgrade(scheduler));
    }

    /// Migrates `owner` to `target`; see [`State::switch_scheduler_await_suspend`].
    pub fn migrate(&self, owner: &dyn State, target: &SchedulerRef) -> bool {
        let mut slot = self.scheduler.lock();
        migrate_slot(&mut slot, owner, target)
    }

    /// Pushes the owning state onto its scheduler's ready queue if a
    /// continuation is waiting. Returns true if the state was queued.
    pub fn requeue(&self) -> bool {
        if !self.has_handler() {
            return false;
        }
        match (self.scheduler(), self.this()) {
            (Some(scheduler), Some(this)) => {
                trace!(state_id = ?self.id, scheduler_id = ?scheduler.id(), "requeue state");
                scheduler.add_generator(this);
                true
            }
            _ => {
                debug!(state_id = ?self.id, "requeue skipped: no live scheduler");
                false
            }
        }
    }

    /// Generic resume: take the handle, close final bookkeeping, resume.
    pub fn resume_with(&self, owner: &dyn State) {
        let Some(handle) = self.take_handle() else {
            return;
        };
        if let Some(scheduler) = self.scheduler() {
            scheduler.del_final(owner);
        }
        trace!(state_id = ?self.id, frame_id = ?handle.id(), "resume state");
        let _ = handle.resume();
    }
}

/// The generic state object.
#[derive(Debug)]
pub struct BaseState {
    core: StateCore,
}

impl BaseState {
    /// Creates a detached state with no handle.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|this: &Weak<Self>| {
            let this: Weak<dyn State> = this.clone();
            Self {
                core: StateCore::new(this),
            }
        })
    }

    /// Creates a state attached to `scheduler`.
    #[must_use]
    pub fn with_scheduler(scheduler: &SchedulerRef) -> Arc<Self> {
        let state = Self::new();
        state.core.set_scheduler(scheduler);
        state
    }

    /// Installs the continuation this state will resume.
    pub fn await_suspend(&self, cont: Continuation) {
        if let Some(previous) = self.core.install(cont) {
            debug!(state_id = ?self.core.id(), frame_id = ?previous.id(), "replaced pending handle");
        }
    }

    /// Attaches to a scheduler without migrating pending entries.
    pub fn set_scheduler(&self, scheduler: &SchedulerRef) {
        self.core.set_scheduler(scheduler);
    }

    /// Pushes this state onto its scheduler if a continuation is waiting.
    pub fn requeue(&self) -> bool {
        self.core.requeue()
    }
}

impl State for BaseState {
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
