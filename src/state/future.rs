//! Future-state: a settable result awaited from a possibly different thread.
//!
//! A future's result may be produced on one thread while its consumer is
//! driven by a scheduler on another, so every field lives behind one mutex
//! and every check-then-act sequence runs under it. The lock is released
//! before any continuation is resumed or destroyed.
//!
//! # Resume order
//!
//! Each `resume()` fires exactly one of these, checked in order:
//!
//! 1. initiator mode `Initial`: run the setup continuation once
//! 2. a body handle is held: resume it
//! 3. initiator mode `Final`: destroy the teardown continuation
//! 4. otherwise nothing
//!
//! A state with more work pending after one step puts itself back on its
//! scheduler: after setup when a body handle waits, and after resuming the
//! consumer of a resolved future when teardown is still installed. A
//! resolved future with a pending teardown is requeued instead of closing
//! its scheduler entry; the entry is closed once the teardown is destroyed.

use core::fmt;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tracing::{debug, trace};

use super::pool::{PoolLease, FUTURE_POOL};
use super::{migrate_slot, State, StateRef};
use crate::coroutine::Continuation;
use crate::error::{Error, ErrorContext, ErrorKind, Result};
use crate::runtime::scheduler::{Schedule, SchedulerRef};
use crate::types::StateId;

/// Mode of the initiator continuation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Initiator {
    /// Setup code that runs before the coroutine body.
    Initial,
    /// Teardown code destroyed after the body completes.
    Final,
    /// No initiator pending.
    None,
}

/// Which kind of result has been stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultKind {
    /// Not resolved yet.
    None,
    /// A value was set.
    Value,
    /// An exception was set.
    Exception,
}

struct FutureInner<T> {
    handle: Option<Continuation>,
    initiator: Option<Continuation>,
    initiator_mode: Initiator,
    scheduler: Option<Weak<dyn Schedule>>,
    parent: Option<Weak<dyn State>>,
    kind: ResultKind,
    value: Option<T>,
    exception: Option<Error>,
}

/// State object for a future of `T`.
pub struct FutureState<T> {
    id: StateId,
    this: Weak<dyn State>,
    inner: Mutex<FutureInner<T>>,
    lease: PoolLease,
}

impl<T: Send + 'static> FutureState<T> {
    /// Creates an unresolved, detached future state.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|this: &Weak<Self>| {
            let this: Weak<dyn State> = this.clone();
            Self {
                id: StateId::next(),
                this,
                inner: Mutex::new(FutureInner {
                    handle: None,
                    initiator: None,
                    initiator_mode: Initiator::None,
                    scheduler: None,
                    parent: None,
                    kind: ResultKind::None,
                    value: None,
                    exception: None,
                }),
                lease: FUTURE_POOL.lease::<Self>(),
            }
        })
    }

    /// Creates a future state attached to `scheduler`.
    #[must_use]
    pub fn with_scheduler(scheduler: &SchedulerRef) -> Arc<Self> {
        let state = Self::new();
        state.set_scheduler(scheduler);
        state
    }

    /// Attaches to a scheduler without migrating pending entries.
    pub fn set_scheduler(&self, scheduler: &SchedulerRef) {
        self.inner.lock().scheduler = Some(Arc::downgrade(scheduler));
    }

    /// Records the awaiting state one level up the chain.
    pub fn set_parent(&self, parent: &StateRef) {
        self.inner.lock().parent = Some(Arc::downgrade(parent));
    }

    /// Installs a setup (`Initial`) or teardown (`Final`) continuation.
    ///
    /// Installing with [`Initiator::None`] clears any pending initiator. A
    /// replaced initiator is released after the lock is dropped.
    pub fn set_initiator(&self, mode: Initiator, cont: Continuation) {
        let replaced = {
            let mut inner = self.inner.lock();
            inner.initiator_mode = mode;
            let next = match mode {
                Initiator::None => None,
                Initiator::Initial | Initiator::Final => Some(cont),
            };
            std::mem::replace(&mut inner.initiator, next)
        };
        drop(replaced);
    }

    /// Returns the current initiator mode.
    #[must_use]
    pub fn initiator(&self) -> Initiator {
        self.inner.lock().initiator_mode
    }

    /// Installs the consumer's continuation.
    ///
    /// If the result is already available the continuation is handed back
    /// and the caller should continue without suspending.
    pub fn await_suspend(&self, cont: Continuation) -> Option<Continuation> {
        let mut inner = self.inner.lock();
        if inner.kind != ResultKind::None || inner.exception.is_some() {
            return Some(cont);
        }
        if let Some(previous) = inner.handle.replace(cont) {
            debug!(state_id = ?self.id, frame_id = ?previous.id(), "replaced pending handle");
        }
        None
    }

    /// Returns true once a value or exception has been stored.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        let inner = self.inner.lock();
        inner.kind != ResultKind::None || inner.exception.is_some()
    }

    /// Returns which kind of result is stored.
    #[must_use]
    pub fn result_kind(&self) -> ResultKind {
        self.inner.lock().kind
    }

    /// Stores a value and hands the state to its consumer.
    pub fn set_value(&self, value: T) {
        let mut inner = self.inner.lock();
        inner.value = Some(value);
        inner.kind = ResultKind::Value;
        trace!(state_id = ?self.id, "future value set");
        self.deliver(&inner);
    }

    /// Stores an exception and hands the state to its consumer.
    pub fn set_exception(&self, error: Error) {
        let mut inner = self.inner.lock();
        inner.exception = Some(error);
        inner.kind = ResultKind::Exception;
        trace!(state_id = ?self.id, "future exception set");
        self.deliver(&inner);
    }

    /// Retrieves the result.
    ///
    /// A stored exception is moved out and returned first. Querying before
    /// resolution fails with [`ErrorKind::NotReady`]; querying again after
    /// the value was moved out fails with [`ErrorKind::AlreadyAcquired`].
    pub fn future_await_resume(&self) -> Result<T> {
        let mut inner = self.inner.lock();
        if let Some(error) = inner.exception.take() {
            return Err(error);
        }
        match inner.kind {
            ResultKind::None => Err(Error::not_ready().with_context(ErrorContext {
                state_id: Some(self.id),
                task_id: None,
            })),
            ResultKind::Value | ResultKind::Exception => inner
                .value
                .take()
                .ok_or_else(|| Error::new(ErrorKind::AlreadyAcquired)),
        }
    }

    /// Returns the lease accounting for this state's footprint.
    #[must_use]
    pub fn lease(&self) -> &PoolLease {
        &self.lease
    }

    fn deliver(&self, inner: &FutureInner<T>) {
        let Some(scheduler) = inner.scheduler.as_ref().and_then(Weak::upgrade) else {
            return;
        };
        if inner.handle.is_some() || inner.initiator_mode == Initiator::Final {
            if let Some(this) = self.this.upgrade() {
                trace!(state_id = ?self.id, scheduler_id = ?scheduler.id(), "future requeued");
                scheduler.add_generator(this);
            }
        } else {
            scheduler.del_final(self);
        }
    }

    fn requeue(&self, scheduler: Option<SchedulerRef>) {
        if let (Some(scheduler), Some(this)) = (scheduler, self.this.upgrade()) {
            trace!(state_id = ?self.id, scheduler_id = ?scheduler.id(), "future requeued after step");
            scheduler.add_generator(this);
        }
    }
}

impl<T> FutureInner<T> {
    fn resolved(&self) -> bool {
        self.kind != ResultKind::None || self.exception.is_some()
    }

    fn live_scheduler(&self) -> Option<SchedulerRef> {
        self.scheduler.as_ref().and_then(Weak::upgrade)
    }
}

impl<T: Send + 'static> State for FutureState<T> {
    fn id(&self) -> StateId {
        self.id
    }

    fn resume(&self) {
        let mut inner = self.inner.lock();

        if inner.initiator_mode == Initiator::Initial {
            let handle = inner.initiator.take();
            inner.initiator_mode = Initiator::None;
            let body_waits = inner.handle.is_some();
            let scheduler = inner.live_scheduler();
            drop(inner);
            if let Some(handle) = handle {
                trace!(state_id = ?self.id, "run initial initiator");
                let _ = handle.resume();
            }
            if body_waits {
                self.requeue(scheduler);
            }
            return;
        }

        if let Some(handle) = inner.handle.take() {
            let teardown_waits = inner.initiator_mode == Initiator::Final && inner.resolved();
            let scheduler = inner.live_scheduler();
            drop(inner);
            trace!(state_id = ?self.id, frame_id = ?handle.id(), "resume future");
            let _ = handle.resume();
            if teardown_waits {
                self.requeue(scheduler);
            }
            return;
        }

        if inner.initiator_mode == Initiator::Final {
            let handle = inner.initiator.take();
            inner.initiator_mode = Initiator::None;
            let closing = if inner.resolved() { inner.live_scheduler() } else { None };
            drop(inner);
            if let Some(handle) = handle {
                trace!(state_id = ?self.id, "destroy final initiator");
                handle.destroy();
            }
            if let Some(scheduler) = closing {
                scheduler.del_final(self);
            }
        }
    }

    fn has_handler(&self) -> bool {
        self.inner.lock().handle.is_some()
    }

    fn parent(&self) -> Option<StateRef> {
        self.inner.lock().parent.as_ref().and_then(Weak::upgrade)
    }

    fn scheduler(&self) -> Option<SchedulerRef> {
        self.inner.lock().scheduler.as_ref().and_then(Weak::upgrade)
    }

    fn switch_scheduler_await_suspend(&self, target: &SchedulerRef) -> bool {
        let parent = {
            let mut inner = self.inner.lock();
            if !migrate_slot(&mut inner.scheduler, self, target) {
                return false;
            }
            inner.parent.as_ref().and_then(Weak::upgrade)
        };
        if let Some(parent) = parent {
            parent.switch_scheduler_await_suspend(target);
        }
        true
    }
}

impl<T> fmt::Debug for FutureState<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct("FutureState");
        out.field("id", &self.id);
        match self.inner.try_lock() {
            Some(inner) => out
                .field("kind", &inner.kind)
                .field("initiator", &inner.initiator_mode)
                .field("has_handler", &inner.handle.is_some())
                .finish(),
            None => out.finish_non_exhaustive(),
        }
    }
}
