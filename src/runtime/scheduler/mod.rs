//! Schedulers: ready queues, task tables and run loops.
//!
//! The [`Schedule`] trait is the contract between state objects and
//! whatever drives them. State objects only ever call these four methods
//! (plus [`Schedule::id`] for migration checks):
//!
//! | Call | Meaning |
//! |------|---------|
//! | `add_generator(state)` | `state` has a continuation ready; resume it later |
//! | `del_final(state)` | `state` has nothing left to run; close its entry |
//! | `del_switch(state)` | hand back `state`'s pending entry, if any |
//! | `add_switch(task)` | adopt an entry detached from another scheduler |
//!
//! [`Scheduler`] is the concrete implementation. It keeps a lock-free
//! ready queue, a task table keyed by root state, and a timer heap. Any
//! number of threads may each run their own scheduler; states produced on
//! one thread may be handed to a scheduler running on another.
//!
//! # Lock order
//!
//! A state's own lock is acquired before the task table. Implementations of
//! [`Schedule`] must not call back into a state's locking methods; they may
//! only read [`State::id`].

pub mod parker;
pub mod ready_queue;

pub use parker::Parker;
pub use ready_queue::ReadyQueue;

use core::fmt;
use core::marker::PhantomData;
use parking_lot::Mutex;
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

use crate::cancel::StopSource;
use crate::coroutine::{Continuation, Coroutine, Suspend};
use crate::runtime::config::SchedulerConfig;
use crate::runtime::env_config::config_from_env;
use crate::runtime::task::{Task, TaskContext, TaskHandle};
use crate::runtime::timer::{self, TimerHandle, TimerHeap};
use crate::state::{FutureState, GeneratorState, Initiator, State, StateRef};
use crate::types::{SchedulerId, StateId};

/// The scheduler contract consumed by state objects.
pub trait Schedule: Send + Sync + fmt::Debug + 'static {
    /// Returns this scheduler's identifier.
    fn id(&self) -> SchedulerId;

    /// Enqueues a ready state for resumption.
    fn add_generator(&self, state: StateRef);

    /// Closes bookkeeping for a state with nothing left to run.
    fn del_final(&self, state: &dyn State);

    /// Detaches and returns the pending entry for `state`, if one exists.
    fn del_switch(&self, state: &dyn State) -> Option<Task>;

    /// Installs an entry detached from another scheduler.
    fn add_switch(&self, task: Task);
}

/// Shared handle to a scheduler.
pub type SchedulerRef = Arc<dyn Schedule>;

static GLOBAL: OnceLock<Arc<Scheduler>> = OnceLock::new();

thread_local! {
    static CURRENT: RefCell<Option<Arc<Scheduler>>> = const { RefCell::new(None) };
}

/// Returns the scheduler installed on this thread, falling back to the
/// global one.
#[must_use]
pub fn this_scheduler() -> Arc<Scheduler> {
    CURRENT
        .with(|current| current.borrow().clone())
        .unwrap_or_else(Scheduler::global)
}

/// Installs a scheduler as this thread's current one until dropped.
struct CurrentGuard {
    previous: Option<Arc<Scheduler>>,
    _not_send: PhantomData<*const ()>,
}

impl CurrentGuard {
    fn enter(scheduler: &Arc<Scheduler>) -> Self {
        let previous =
            CURRENT.with(|current| current.borrow_mut().replace(Arc::clone(scheduler)));
        Self {
            previous,
            _not_send: PhantomData,
        }
    }
}

impl Drop for CurrentGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        let replaced = CURRENT.with(|current| std::mem::replace(&mut *current.borrow_mut(), previous));
        drop(replaced);
    }
}

/// A scheduler installed as the current one for this thread.
///
/// [`this_scheduler`] returns it until the guard drops, at which point the
/// previously installed scheduler (if any) is restored.
pub struct LocalScheduler {
    scheduler: Arc<Scheduler>,
    _guard: CurrentGuard,
}

impl LocalScheduler {
    /// Creates a scheduler and installs it on this thread.
    #[must_use]
    pub fn new(config: SchedulerConfig) -> Self {
        let scheduler = Scheduler::new(config);
        let guard = CurrentGuard::enter(&scheduler);
        Self {
            scheduler,
            _guard: guard,
        }
    }

    /// Returns the installed scheduler.
    #[must_use]
    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }
}

impl fmt::Debug for LocalScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalScheduler")
            .field("scheduler", &self.scheduler.id)
            .finish()
    }
}

/// The default scheduler.
pub struct Scheduler {
    id: SchedulerId,
    config: SchedulerConfig,
    ready: ReadyQueue,
    tasks: Mutex<HashMap<StateId, Task>>,
    timers: Mutex<TimerHeap>,
    parker: Parker,
}

impl Scheduler {
    /// Creates a scheduler from `config`.
    #[must_use]
    pub fn new(mut config: SchedulerConfig) -> Arc<Self> {
        config.normalize();
        let capacity = config.ready_hint;
        let scheduler = Arc::new(Self {
            id: SchedulerId::next(),
            config,
            ready: ReadyQueue::new(),
            tasks: Mutex::new(HashMap::with_capacity(capacity)),
            timers: Mutex::new(TimerHeap::new()),
            parker: Parker::new(),
        });
        debug!(
            scheduler_id = ?scheduler.id,
            name = %scheduler.config.name,
            "scheduler created"
        );
        scheduler
    }

    /// Returns the process-wide scheduler, creating it on first use.
    ///
    /// Its configuration is read from the `RESUMEF_*` environment variables;
    /// invalid values are logged and the defaults used instead.
    #[must_use]
    pub fn global() -> Arc<Self> {
        Arc::clone(GLOBAL.get_or_init(|| {
            let config = config_from_env().unwrap_or_else(|error| {
                warn!(%error, "invalid scheduler environment, using defaults");
                SchedulerConfig::default()
            });
            Self::new(config)
        }))
    }

    /// Returns this scheduler as a [`SchedulerRef`].
    #[must_use]
    pub fn handle(self: &Arc<Self>) -> SchedulerRef {
        Arc::clone(self) as SchedulerRef
    }

    /// Returns the scheduler identifier.
    #[must_use]
    pub const fn id(&self) -> SchedulerId {
        self.id
    }

    /// Returns the effective configuration.
    #[must_use]
    pub const fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Spawns a task running `body`.
    pub fn spawn(self: &Arc<Self>, body: impl Coroutine) -> TaskHandle {
        self.spawn_with(move |_ctx| body)
    }

    /// Spawns a task whose body is built from its [`TaskContext`].
    pub fn spawn_with<F, C>(self: &Arc<Self>, make: F) -> TaskHandle
    where
        F: FnOnce(TaskContext) -> C,
        C: Coroutine,
    {
        self.spawn_task(None, make)
    }

    /// Spawns a task like [`spawn_with`](Self::spawn_with) that runs `setup`
    /// on this scheduler's loop before the body's first step.
    pub fn spawn_with_setup<S, F, C>(self: &Arc<Self>, setup: S, make: F) -> TaskHandle
    where
        S: FnOnce() + Send + 'static,
        F: FnOnce(TaskContext) -> C,
        C: Coroutine,
    {
        self.spawn_task(Some(Continuation::once(setup)), make)
    }

    fn spawn_task<F, C>(self: &Arc<Self>, setup: Option<Continuation>, make: F) -> TaskHandle
    where
        F: FnOnce(TaskContext) -> C,
        C: Coroutine,
    {
        let root = FutureState::<()>::with_scheduler(&self.handle());
        let stop = Arc::new(Mutex::new(StopSource::no_stop_state()));
        let task = Task::with_stop(Arc::clone(&root) as StateRef, Arc::clone(&stop));
        let task_id = task.id();

        let mut body = make(TaskContext::new(task_id, &root, self, Arc::clone(&stop)));
        let finished = Arc::downgrade(&root);
        let cont = Continuation::new(move |co: &Suspend<'_>| {
            let step = body.resume(co);
            if step.is_complete() {
                if let Some(root) = finished.upgrade() {
                    root.set_value(());
                }
            }
            step
        });
        // A fresh root holds no result, so the handle is always installed.
        let _ = root.await_suspend(cont);
        if let Some(setup) = setup {
            root.set_initiator(Initiator::Initial, setup);
        }

        self.tasks.lock().insert(root.id(), task);
        debug!(
            task_id = ?task_id,
            state_id = ?root.id(),
            scheduler_id = ?self.id,
            "task spawned"
        );
        self.add_generator(Arc::clone(&root) as StateRef);
        TaskHandle::new(task_id, root, stop)
    }

    /// Spawns a generator: `body` is stepped once per ready-queue visit
    /// until it completes.
    pub fn spawn_generator(self: &Arc<Self>, body: impl Coroutine) -> Arc<GeneratorState> {
        let state = GeneratorState::alloc(Continuation::new(body), &self.handle());
        let task = Task::new(Arc::clone(&state) as StateRef);
        debug!(
            task_id = ?task.id(),
            state_id = ?state.id(),
            scheduler_id = ?self.id,
            "generator spawned"
        );
        self.tasks.lock().insert(state.id(), task);
        self.add_generator(Arc::clone(&state) as StateRef);
        state
    }

    /// Schedules `callback` to run on this scheduler's loop after `after`.
    pub fn add_timer(&self, after: Duration, callback: impl FnOnce() + Send + 'static) -> TimerHandle {
        let now = Instant::now();
        let deadline = now
            .checked_add(after)
            .unwrap_or_else(|| now + Duration::from_secs(60 * 60 * 24 * 365));
        self.add_timer_at(deadline, callback)
    }

    /// Schedules `callback` to run on this scheduler's loop at `deadline`.
    pub fn add_timer_at(
        &self,
        deadline: Instant,
        callback: impl FnOnce() + Send + 'static,
    ) -> TimerHandle {
        let handle = self.timers.lock().insert(deadline, callback);
        self.parker.unpark();
        handle
    }

    /// Schedules `callback` at `deadline` for as long as `owner` is alive.
    ///
    /// If the owner is dropped first the timer is stopped without firing and
    /// no longer keeps the run loop alive.
    pub fn add_owned_timer_at(
        &self,
        deadline: Instant,
        owner: &StateRef,
        callback: impl FnOnce() + Send + 'static,
    ) -> TimerHandle {
        let handle = self
            .timers
            .lock()
            .insert_owned(deadline, Arc::downgrade(owner), callback);
        self.parker.unpark();
        handle
    }

    /// Fires expired timers, then resumes the states that were ready when
    /// the batch started (at most `max_batch` when non-zero).
    ///
    /// Returns the number of states resumed.
    pub fn run_one_batch(&self) -> usize {
        let expired = self.timers.lock().pop_expired(Instant::now());
        timer::fire_all(expired);

        let mut budget = self.ready.len();
        if self.config.max_batch > 0 {
            budget = budget.min(self.config.max_batch);
        }
        let mut resumed = 0;
        while resumed < budget {
            let Some(state) = self.ready.pop() else {
                break;
            };
            trace!(state_id = ?state.id(), scheduler_id = ?self.id, "resume ready state");
            state.resume();
            resumed += 1;
        }
        resumed
    }

    /// Runs batches until no task, ready state or armed timer remains.
    ///
    /// While idle the loop parks until another thread queues a state, the
    /// next timer deadline passes, or `idle_park` elapses.
    pub fn run_until_notask(self: &Arc<Self>) {
        let _current = CurrentGuard::enter(self);
        debug!(scheduler_id = ?self.id, name = %self.config.name, "run loop started");
        loop {
            if self.run_one_batch() > 0 {
                continue;
            }
            if self.is_drained() {
                break;
            }
            let wait = self.next_wait();
            self.parker.park_timeout(wait);
        }
        debug!(scheduler_id = ?self.id, "run loop finished");
    }

    /// Returns the number of live tasks in the task table.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Returns true if the task table holds an entry for `state`.
    #[must_use]
    pub fn has_task(&self, state: StateId) -> bool {
        self.tasks.lock().contains_key(&state)
    }

    /// Returns the number of states waiting in the ready queue.
    #[must_use]
    pub fn ready_len(&self) -> usize {
        self.ready.len()
    }

    /// Returns true if any timer is still armed.
    #[must_use]
    pub fn has_timers(&self) -> bool {
        self.timers.lock().has_armed()
    }

    fn is_drained(&self) -> bool {
        self.ready.is_empty() && self.tasks.lock().is_empty() && !self.has_timers()
    }

    fn next_wait(&self) -> Duration {
        let idle = self.config.idle_park;
        match self.timers.lock().peek_deadline() {
            Some(deadline) => deadline.saturating_duration_since(Instant::now()).min(idle),
            None => idle,
        }
    }
}

impl Schedule for Scheduler {
    fn id(&self) -> SchedulerId {
        self.id
    }

    fn add_generator(&self, state: StateRef) {
        trace!(state_id = ?state.id(), scheduler_id = ?self.id, "state ready");
        self.ready.push(state);
        self.parker.unpark();
    }

    fn del_final(&self, state: &dyn State) {
        let removed = self.tasks.lock().remove(&state.id());
        if let Some(task) = removed {
            debug!(
                task_id = ?task.id(),
                state_id = ?state.id(),
                scheduler_id = ?self.id,
                "task finished"
            );
            drop(task);
            self.parker.unpark();
        }
    }

    fn del_switch(&self, state: &dyn State) -> Option<Task> {
        let removed = self.tasks.lock().remove(&state.id());
        if removed.is_some() {
            self.parker.unpark();
        }
        removed
    }

    fn add_switch(&self, task: Task) {
        trace!(task_id = ?task.id(), scheduler_id = ?self.id, "task adopted");
        self.tasks.lock().insert(task.root_id(), task);
        self.parker.unpark();
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("id", &self.id)
            .field("name", &self.config.name)
            .field("ready", &self.ready.len())
            .finish_non_exhaustive()
    }
}
