//! Test utilities for resumef.
//!
//! This module provides shared helpers for unit tests:
//! - Consistent tracing-based logging initialization
//! - Phase/section macros for readable test output
//! - A recording [`Schedule`] implementation for state-object tests
//! - A helper coroutine that counts its resumes

use crate::coroutine::{Continuation, Step, Suspend};
use crate::runtime::scheduler::{Schedule, SchedulerRef};
use crate::runtime::task::Task;
use crate::state::{State, StateRef};
use crate::types::{SchedulerId, StateId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use tracing_subscriber::fmt::format::FmtSpan;

static INIT_LOGGING: Once = Once::new();
static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

/// Initialize test logging with trace-level output.
///
/// Safe to call multiple times; only initializes once.
pub fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_test_writer()
            .with_file(true)
            .with_line_number(true)
            .with_target(true)
            .with_thread_ids(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_ansi(false)
            .try_init();
    });
}

/// Acquire the global environment lock for tests that mutate env vars.
pub fn env_lock() -> std::sync::MutexGuard<'static, ()> {
    ENV_LOCK
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Log a test phase transition with a visual separator.
#[macro_export]
macro_rules! test_phase {
    ($name:expr) => {
        tracing::info!(phase = %$name, "========================================");
        tracing::info!(phase = %$name, "TEST PHASE: {}", $name);
        tracing::info!(phase = %$name, "========================================");
    };
}

/// Log a section within a test phase.
#[macro_export]
macro_rules! test_section {
    ($name:expr) => {
        tracing::debug!(section = %$name, "--- {} ---", $name);
    };
}

/// Log test completion.
#[macro_export]
macro_rules! test_complete {
    ($name:expr) => {
        tracing::info!(test = %$name, "test completed successfully: {}", $name);
    };
}

/// Log before assertions for context.
#[macro_export]
macro_rules! assert_with_log {
    ($cond:expr, $msg:expr, $expected:expr, $actual:expr) => {
        tracing::debug!(
            expected = ?$expected,
            actual = ?$actual,
            "Asserting: {}",
            $msg
        );
        assert!($cond, "{}: expected {:?}, got {:?}", $msg, $expected, $actual);
    };
}

/// A [`Schedule`] that records every call instead of running anything.
#[derive(Debug, Default)]
pub struct RecordingScheduler {
    id: Option<SchedulerId>,
    ready: Mutex<Vec<StateRef>>,
    finals: Mutex<Vec<StateId>>,
    pending: Mutex<HashMap<StateId, Task>>,
    switched_in: AtomicUsize,
}

impl RecordingScheduler {
    /// Creates a new recorder behind an `Arc`.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            id: Some(SchedulerId::next()),
            ..Self::default()
        })
    }

    /// Returns the recorder as a scheduler reference.
    #[must_use]
    pub fn handle(self: &Arc<Self>) -> SchedulerRef {
        Arc::clone(self) as SchedulerRef
    }

    /// Number of `add_generator` calls so far.
    #[must_use]
    pub fn ready_len(&self) -> usize {
        self.ready.lock().len()
    }

    /// Drains recorded ready states.
    pub fn take_ready(&self) -> Vec<StateRef> {
        std::mem::take(&mut *self.ready.lock())
    }

    /// States passed to `del_final`, in call order.
    #[must_use]
    pub fn finals(&self) -> Vec<StateId> {
        self.finals.lock().clone()
    }

    /// Installs a pending entry for `del_switch` to hand back.
    pub fn insert_pending(&self, task: Task) {
        self.pending.lock().insert(task.root_id(), task);
    }

    /// Returns true if a pending entry exists for the state.
    #[must_use]
    pub fn has_pending(&self, id: StateId) -> bool {
        self.pending.lock().contains_key(&id)
    }

    /// Number of entries received through `add_switch`.
    #[must_use]
    pub fn switched_in(&self) -> usize {
        self.switched_in.load(Ordering::SeqCst)
    }
}

impl Schedule for RecordingScheduler {
    fn id(&self) -> SchedulerId {
        self.id.unwrap_or_else(|| SchedulerId::from_raw(0))
    }

    fn add_generator(&self, state: StateRef) {
        self.ready.lock().push(state);
    }

    fn del_final(&self, state: &dyn State) {
        self.finals.lock().push(state.id());
    }

    fn del_switch(&self, state: &dyn State) -> Option<Task> {
        self.pending.lock().remove(&state.id())
    }

    fn add_switch(&self, task: Task) {
        self.switched_in.fetch_add(1, Ordering::SeqCst);
        self.pending.lock().insert(task.root_id(), task);
    }
}

/// Returns a continuation that completes after `steps` resumes, counting
/// every resume in the returned counter.
#[must_use]
pub fn counting_continuation(steps: usize) -> (Continuation, Arc<AtomicUsize>) {
    let count = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&count);
    let cont = Continuation::new(move |_co: &Suspend<'_>| {
        let n = seen.fetch_add(1, Ordering::SeqCst) + 1;
        if n >= steps {
            Step::Complete
        } else {
            Step::Suspended
        }
    });
    (cont, count)
}
