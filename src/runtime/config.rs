//! Scheduler configuration types.
//!
//! These types hold the concrete values that drive a [`Scheduler`]'s run
//! loop. Construct them with [`SchedulerConfig::default`] and the
//! builder-style setters, then optionally layer environment overrides with
//! [`apply_env_overrides`](super::env_config::apply_env_overrides).
//!
//! # Defaults
//!
//! | Field | Default |
//! |-------|---------|
//! | `name` | `"resumef-scheduler"` |
//! | `max_batch` | 0 (drain everything ready at batch start) |
//! | `idle_park` | 10 ms |
//! | `ready_hint` | 64 |
//!
//! [`Scheduler`]: super::scheduler::Scheduler

use std::time::Duration;

/// Default scheduler name used in logs.
pub const DEFAULT_SCHEDULER_NAME: &str = "resumef-scheduler";

/// Scheduler configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Name reported in tracing output.
    pub name: String,
    /// Maximum states resumed per batch (0 = all that were ready at batch start).
    pub max_batch: usize,
    /// Longest time an idle run loop parks before re-checking its tasks.
    pub idle_park: Duration,
    /// Expected number of concurrently live tasks; sizes the task table.
    pub ready_hint: usize,
}

impl SchedulerConfig {
    /// Sets the scheduler name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the per-batch resume limit.
    #[must_use]
    pub const fn max_batch(mut self, max_batch: usize) -> Self {
        self.max_batch = max_batch;
        self
    }

    /// Sets the idle park interval.
    #[must_use]
    pub const fn idle_park(mut self, idle_park: Duration) -> Self {
        self.idle_park = idle_park;
        self
    }

    /// Sets the task table sizing hint.
    #[must_use]
    pub const fn ready_hint(mut self, ready_hint: usize) -> Self {
        self.ready_hint = ready_hint;
        self
    }

    /// Normalize configuration values to safe defaults.
    pub fn normalize(&mut self) {
        if self.name.is_empty() {
            self.name = DEFAULT_SCHEDULER_NAME.to_string();
        }
        if self.idle_park.is_zero() {
            self.idle_park = Duration::from_millis(1);
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_SCHEDULER_NAME.to_string(),
            max_batch: 0,
            idle_park: Duration::from_millis(10),
            ready_hint: 64,
        }
    }
}
