//! Tasks: a root state plus the cancellation domain it owns.
//!
//! A scheduler keeps one [`Task`] per spawned computation in its task table,
//! keyed by the root state's id. The entry is removed when the root state
//! closes its final bookkeeping (`del_final`) and moved between schedulers by
//! migration (`del_switch`/`add_switch`).
//!
//! The stop source starts in no-stop-state mode and is upgraded the first
//! time anyone asks for it, from either the [`TaskHandle`] or the
//! [`TaskContext`] running inside the body.
//!
//! A body awaiting a child future through [`TaskContext::await_future`]
//! becomes the child's parent, so migrating the child carries the whole task
//! along. [`TaskContext::defer`] installs teardown on the task's root that
//! runs after the body completes and its awaiting consumer has resumed.

use core::fmt;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tracing::debug;

use crate::cancel::{StopSource, StopToken};
use crate::coroutine::{Continuation, Step, Suspend};
use crate::error::{Error, ErrorContext, ErrorKind, Result};
use crate::runtime::scheduler::Scheduler;
use crate::state::{FutureState, Initiator, State, StateRef};
use crate::types::{StateId, TaskId};

type SharedStop = Arc<Mutex<StopSource>>;

fn upgraded(stop: &SharedStop) -> StopSource {
    let mut source = stop.lock();
    source.make_sure_possible();
    source.clone()
}

/// A scheduler's pending entry for one spawned computation.
pub struct Task {
    id: TaskId,
    root: StateRef,
    stop: SharedStop,
}

impl Task {
    /// Creates a task for `root` with a fresh no-stop-state source.
    #[must_use]
    pub fn new(root: StateRef) -> Self {
        Self::with_stop(root, Arc::new(Mutex::new(StopSource::no_stop_state())))
    }

    pub(crate) fn with_stop(root: StateRef, stop: SharedStop) -> Self {
        Self {
            id: TaskId::next(),
            root,
            stop,
        }
    }

    /// Returns the task identifier.
    #[must_use]
    pub const fn id(&self) -> TaskId {
        self.id
    }

    /// Returns the root state's identifier, the task table key.
    #[must_use]
    pub fn root_id(&self) -> StateId {
        self.root.id()
    }

    /// Returns the root state.
    #[must_use]
    pub fn root(&self) -> &StateRef {
        &self.root
    }

    /// Returns the task's stop source, upgrading it on first access.
    #[must_use]
    pub fn stop_source(&self) -> StopSource {
        upgraded(&self.stop)
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("root", &self.root.id())
            .finish()
    }
}

/// Caller-side handle to a spawned task.
#[derive(Clone)]
pub struct TaskHandle {
    id: TaskId,
    root: Arc<FutureState<()>>,
    stop: SharedStop,
}

impl TaskHandle {
    pub(crate) fn new(id: TaskId, root: Arc<FutureState<()>>, stop: SharedStop) -> Self {
        Self { id, root, stop }
    }

    /// Returns the task identifier.
    #[must_use]
    pub const fn id(&self) -> TaskId {
        self.id
    }

    /// Returns the root state's identifier.
    #[must_use]
    pub fn root_id(&self) -> StateId {
        self.root.id()
    }

    /// Returns true once the body has completed.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.root.is_ready()
    }

    /// Returns the task's stop source, upgrading it on first access.
    #[must_use]
    pub fn stop_source(&self) -> StopSource {
        upgraded(&self.stop)
    }

    /// Requests the task to stop. Returns true for the first request.
    #[allow(clippy::must_use_candidate)]
    pub fn request_stop(&self) -> bool {
        self.stop_source().request_stop()
    }

    /// Returns the root future; it resolves when the body completes.
    #[must_use]
    pub fn state(&self) -> &Arc<FutureState<()>> {
        &self.root
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.id)
            .field("root", &self.root.id())
            .field("finished", &self.is_finished())
            .finish()
    }
}

/// Context handed to a task body created with
/// [`Scheduler::spawn_with`].
pub struct TaskContext {
    id: TaskId,
    root: Weak<FutureState<()>>,
    scheduler: Mutex<Weak<Scheduler>>,
    stop: SharedStop,
}

impl TaskContext {
    pub(crate) fn new(
        id: TaskId,
        root: &Arc<FutureState<()>>,
        scheduler: &Arc<Scheduler>,
        stop: SharedStop,
    ) -> Self {
        Self {
            id,
            root: Arc::downgrade(root),
            scheduler: Mutex::new(Arc::downgrade(scheduler)),
            stop,
        }
    }

    /// Returns the task identifier.
    #[must_use]
    pub const fn task_id(&self) -> TaskId {
        self.id
    }

    /// Returns the scheduler currently driving this task.
    #[must_use]
    pub fn scheduler(&self) -> Option<Arc<Scheduler>> {
        self.scheduler.lock().upgrade()
    }

    /// Returns a token observing the task's stop source.
    #[must_use]
    pub fn stop_token(&self) -> StopToken {
        upgraded(&self.stop).token()
    }

    /// Returns true if the task was asked to stop.
    #[must_use]
    pub fn stop_requested(&self) -> bool {
        self.stop.lock().stop_requested()
    }

    /// Fails with [`ErrorKind::StopRequested`] if the task was asked to stop.
    pub fn check_stop(&self) -> Result<()> {
        if self.stop_requested() {
            return Err(Error::new(ErrorKind::StopRequested).with_context(ErrorContext {
                state_id: self.root.upgrade().map(|r| r.id()),
                task_id: Some(self.id),
            }));
        }
        Ok(())
    }

    /// Moves the task to `target`.
    ///
    /// Returns true if the task was migrated and queued on `target`; the body
    /// must then return [`Step::Suspended`](crate::coroutine::Step) and will
    /// continue on the target's run loop. Returns false if the task is
    /// already there, in which case the body simply continues.
    #[must_use]
    pub fn switch_to(&self, target: &Arc<Scheduler>, co: &Suspend<'_>) -> bool {
        let Some(root) = self.root.upgrade() else {
            return false;
        };
        let handle = target.handle();
        if !root.switch_scheduler_await_suspend(&handle) {
            return false;
        }
        *self.scheduler.lock() = Arc::downgrade(target);
        if root.await_suspend(co.continuation()).is_some() {
            return false;
        }
        debug!(task_id = ?self.id, scheduler_id = ?target.id(), "task switched scheduler");
        handle.add_generator(root);
        true
    }

    /// Awaits `child` from the body.
    ///
    /// The task's root is recorded as the child's parent, and a child with
    /// no scheduler is attached to the task's current one. Returns `None`
    /// when the body must return [`Step::Suspended`]; it is resumed once the
    /// child resolves and should call `await_future` again. Returns the
    /// child's result when one is available.
    pub fn await_future<T: Send + 'static>(
        &self,
        child: &Arc<FutureState<T>>,
        co: &Suspend<'_>,
    ) -> Option<Result<T>> {
        if let Some(root) = self.root.upgrade() {
            let parent: StateRef = root;
            child.set_parent(&parent);
        }
        if child.scheduler().is_none() {
            if let Some(scheduler) = self.scheduler() {
                child.set_scheduler(&scheduler.handle());
            }
        }
        child
            .await_suspend(co.continuation())
            .map(|_ready| child.future_await_resume())
    }

    /// Runs `teardown` once the body has completed.
    ///
    /// It runs on the scheduler loop after any consumer awaiting the task's
    /// root has been resumed, before the task leaves the scheduler. A task
    /// dropped before completing still runs it when the root is released.
    /// Installing again replaces the earlier teardown, which then runs
    /// immediately. Returns false if the task is already gone.
    #[allow(clippy::must_use_candidate)]
    pub fn defer(&self, teardown: impl FnOnce() + Send + 'static) -> bool {
        let Some(root) = self.root.upgrade() else {
            return false;
        };
        let guard = Deferred(Some(teardown));
        root.set_initiator(
            Initiator::Final,
            Continuation::new(move |_co: &Suspend<'_>| {
                let _held = &guard;
                Step::Complete
            }),
        );
        debug!(task_id = ?self.id, state_id = ?root.id(), "teardown deferred");
        true
    }
}

/// Runs the wrapped closure when dropped.
struct Deferred<F: FnOnce()>(Option<F>);

impl<F: FnOnce()> Drop for Deferred<F> {
    fn drop(&mut self) {
        if let Some(f) = self.0.take() {
            f();
        }
    }
}

impl fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskContext")
            .field("id", &self.id)
            .field("stop_requested", &self.stop_requested())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::BaseState;
    use crate::test_utils::init_test_logging;

    fn init_test(name: &str) {
        init_test_logging();
        crate::test_phase!(name);
    }

    #[test]
    fn stop_source_is_lazily_upgraded() {
        init_test("stop_source_is_lazily_upgraded");
        let root: StateRef = BaseState::new();
        let task = Task::new(Arc::clone(&root));
        assert_eq!(task.root_id(), root.id());
        assert!(!task.stop.lock().stop_possible());

        let source = task.stop_source();
        assert!(source.stop_possible());
        let token = source.token();
        assert!(task.stop_source().request_stop());
        assert!(token.stop_requested());
        crate::test_complete!("stop_source_is_lazily_upgraded");
    }

    #[test]
    fn ids_are_unique() {
        init_test("ids_are_unique");
        let a = Task::new(BaseState::new());
        let b = Task::new(BaseState::new());
        assert_ne!(a.id(), b.id());
        assert_ne!(a.root_id(), b.root_id());
        crate::test_complete!("ids_are_unique");
    }
}
