//! Runtime machinery: schedulers, tasks and timers.
//!
//! - [`config`]: Scheduler configuration types
//! - [`env_config`]: `RESUMEF_*` environment overrides
//! - [`scheduler`]: The [`Schedule`] contract and the default [`Scheduler`]
//! - [`task`]: Task table entries, handles and body contexts
//! - [`timer`]: Timer heap for deadline management
//! - [`sleep`]: Timer-backed futures
//!
//! # Quick Start
//!
//! ```
//! use resumef::coroutine::{Step, Suspend};
//! use resumef::runtime::{Scheduler, SchedulerConfig};
//!
//! let sched = Scheduler::new(SchedulerConfig::default().name("demo"));
//! let task = sched.spawn(|_co: &Suspend<'_>| Step::Complete);
//! sched.run_until_notask();
//! assert!(task.is_finished());
//! ```

pub mod config;
pub mod env_config;
pub mod scheduler;
pub mod sleep;
pub mod task;
pub mod timer;

pub use config::SchedulerConfig;
pub use env_config::{apply_env_overrides, config_from_env, ConfigError};
pub use scheduler::{this_scheduler, LocalScheduler, Schedule, Scheduler, SchedulerRef};
pub use sleep::{sleep_for, sleep_until};
pub use task::{Task, TaskContext, TaskHandle};
pub use timer::{TimerHandle, TimerHeap};
