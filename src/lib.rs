//! resumef: a cooperative coroutine runtime with explicit continuation handles.
//!
//! # Overview
//!
//! Coroutine bodies run on user-space schedulers. A body that cannot make
//! progress hands its continuation to a state object and returns; whoever
//! resolves that state (an event, a timer, a finished child future) puts it
//! back on the owning scheduler's ready queue. Any number of OS threads may
//! run their own scheduler next to the shared global one, and a task can move
//! between them at a suspension point.
//!
//! # Core Guarantees
//!
//! - **Exactly-once resolution**: a waiter descriptor is resolved by exactly
//!   one of notify, timeout or cancel, decided by a single atomic transition
//! - **No lost signals**: a signal with no willing waiter is banked in the
//!   event's counter
//! - **Move-only continuations**: a continuation token is consumed when
//!   resumed, so a frame cannot be resumed twice from one registration
//! - **No unsafe code**
//!
//! # Module Structure
//!
//! - [`coroutine`]: Continuation handles, frames and the `Coroutine` trait
//! - [`state`]: State objects (base, future, generator) and frame pools
//! - [`event`]: Event signal sources and single-wait/wait-all descriptors
//! - [`cancel`]: Stop sources, tokens and callbacks
//! - [`runtime`]: Schedulers, tasks, timers and sleeping
//! - [`channel`]: Bounded channel built on events
//! - [`sync`]: Async mutex built on events
//! - [`error`]: Error types
//! - [`types`]: Identifier newtypes

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_inception)]
#![allow(clippy::doc_markdown)]

pub mod cancel;
pub mod channel;
pub mod coroutine;
pub mod error;
pub mod event;
pub mod runtime;
pub mod state;
pub mod sync;
pub mod types;

#[cfg(test)]
pub(crate) mod test_utils;

// Re-exports for convenient access to core types
pub use cancel::{StopCallback, StopSource, StopToken};
pub use channel::{Channel, TrySendError};
pub use coroutine::{Continuation, Coroutine, Step, Suspend};
pub use error::{Error, ErrorCategory, ErrorKind, Result};
pub use event::{wait_all, wait_any, Event, EventWait, EventWaitAll, WaitOutcome};
pub use runtime::{
    this_scheduler, LocalScheduler, Schedule, Scheduler, SchedulerConfig, TaskContext, TaskHandle,
};
pub use state::{
    completion, from_callback, when_all, when_any, Completion, FutureState, GeneratorState, State,
    StateRef,
};
pub use types::{EventId, SchedulerId, StateId, TaskId};
