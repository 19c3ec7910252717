#![allow(dead_code)]
#![allow(unused_imports)]
//! Shared integration test utilities.
//!
//! Import with:
//! ```
//! mod common;
//! use common::*;
//! ```

use parking_lot::Mutex;
use proptest::prelude::ProptestConfig;
use proptest::test_runner::RngSeed;
use resumef::runtime::{Schedule, Task};
use resumef::state::{State, StateRef};
use resumef::types::{SchedulerId, StateId};
use std::collections::HashMap;
use std::sync::{Arc, Once};
use tracing_subscriber::fmt::format::FmtSpan;

static INIT_LOGGING: Once = Once::new();

/// Default seed for property tests when running under CI.
pub const DEFAULT_PROPTEST_SEED: u64 = 0x5EED_5EED;

const PROPTEST_SEED_ENV: &str = "RESUMEF_PROPTEST_SEED";

/// Build a ProptestConfig with deterministic seed support for CI.
#[must_use]
pub fn test_proptest_config(cases: u32) -> ProptestConfig {
    let mut config = ProptestConfig::with_cases(cases);
    if matches!(config.rng_seed, RngSeed::Random) {
        if let Some(seed) = read_proptest_seed() {
            config.rng_seed = RngSeed::Fixed(seed);
        }
    }
    config
}

fn read_proptest_seed() -> Option<u64> {
    if let Ok(value) = std::env::var(PROPTEST_SEED_ENV) {
        return value.parse::<u64>().ok();
    }
    std::env::var("CI").ok().map(|_| DEFAULT_PROPTEST_SEED)
}

/// Initialize test logging with trace-level output.
pub fn init_test_logging() {
    init_test_logging_with_level(tracing::Level::TRACE);
}

/// Initialize test logging with a custom level.
pub fn init_test_logging_with_level(level: tracing::Level) {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(level)
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

/// Log test completion with summary.
#[macro_export]
macro_rules! test_complete {
    ($name:expr) => {
        tracing::info!(test = %$name, "test completed successfully: {}", $name);
    };
    ($name:expr, $($key:ident = $value:expr),* $(,)?) => {
        tracing::info!(
            test = %$name,
            $($key = %$value,)*
            "test completed successfully: {}",
            $name
        );
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

/// A scheduler stand-in that records requeues without running anything.
#[derive(Debug)]
pub struct Recorder {
    id: SchedulerId,
    ready: Mutex<Vec<StateRef>>,
    finals: Mutex<Vec<StateId>>,
    pending: Mutex<HashMap<StateId, Task>>,
}

impl Recorder {
    /// Creates a recorder behind an `Arc`.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            id: SchedulerId::next(),
            ready: Mutex::new(Vec::new()),
            finals: Mutex::new(Vec::new()),
            pending: Mutex::new(HashMap::new()),
        })
    }

    /// Returns the recorder as a scheduler reference.
    #[must_use]
    pub fn handle(self: &Arc<Self>) -> resumef::runtime::SchedulerRef {
        Arc::clone(self) as resumef::runtime::SchedulerRef
    }

    /// Number of recorded requeues.
    #[must_use]
    pub fn ready_len(&self) -> usize {
        self.ready.lock().len()
    }

    /// Drains recorded requeues.
    pub fn take_ready(&self) -> Vec<StateRef> {
        std::mem::take(&mut *self.ready.lock())
    }

    /// States passed to `del_final`, in call order.
    #[must_use]
    pub fn finals(&self) -> Vec<StateId> {
        self.finals.lock().clone()
    }
}

impl Schedule for Recorder {
    fn id(&self) -> SchedulerId {
        self.id
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
        self.pending.lock().insert(task.root_id(), task);
    }
}
