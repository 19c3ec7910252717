//! Generator state: a body that yields and requeues itself.
//!
//! Every `resume()` runs the body to its next yield. If the body is not done
//! the state puts itself back on its scheduler's ready queue; once the body
//! completes the state closes its final bookkeeping and releases the frame.

use std::sync::{Arc, Weak};
use tracing::trace;

use super::pool::{PoolLease, GENERATOR_POOL};
use super::{State, StateCore};
use crate::coroutine::{Continuation, Step};
use crate::runtime::scheduler::SchedulerRef;
use crate::types::StateId;

/// State object for a self-requeuing generator.
#[derive(Debug)]
pub struct GeneratorState {
    core: StateCore,
    lease: PoolLease,
}

impl GeneratorState {
    /// Allocates a generator state holding `body`, attached to `scheduler`.
    #[must_use]
    pub fn alloc(body: Continuation, scheduler: &SchedulerRef) -> Arc<Self> {
        let state = Self::detached(body);
        state.core.set_scheduler(scheduler);
        state
    }

    /// Allocates a generator state that is not attached to any scheduler.
    #[must_use]
    pub fn detached(body: Continuation) -> Arc<Self> {
        let state = Arc::new_cyclic(|this: &Weak<Self>| {
            let this: Weak<dyn State> = this.clone();
            Self {
                core: StateCore::new(this),
                lease: GENERATOR_POOL.lease::<Self>(),
            }
        });
        state.core.install(body);
        state
    }

    /// Returns the lease accounting for this state's footprint.
    #[must_use]
    pub fn lease(&self) -> &PoolLease {
        &self.lease
    }
}

impl State for GeneratorState {
    fn id(&self) -> StateId {
        self.core.id()
    }

    fn resume(&self) {
        let Some(handle) = self.core.take_handle() else {
            return;
        };
        match handle.step() {
            Step::Suspended => {
                self.core.install(handle);
                self.core.requeue();
            }
            Step::Complete => {
                trace!(state_id = ?self.core.id(), "generator finished");
                if let Some(scheduler) = self.core.scheduler() {
                    scheduler.del_final(self);
                }
                handle.destroy();
            }
        }
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
