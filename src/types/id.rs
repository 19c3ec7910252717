//! Identifier types for runtime entities.
//!
//! State objects, schedulers, tasks, coroutine frames and event sources are
//! shared through reference counting rather than an arena, so their
//! identifiers are drawn from process-wide monotonic counters. Identifiers
//! are never reused.

use core::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static STATE_COUNTER: AtomicU64 = AtomicU64::new(1);
static SCHEDULER_COUNTER: AtomicU64 = AtomicU64::new(1);
static TASK_COUNTER: AtomicU64 = AtomicU64::new(1);
static FRAME_COUNTER: AtomicU64 = AtomicU64::new(1);
static EVENT_COUNTER: AtomicU64 = AtomicU64::new(1);

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $counter:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(u64);

        impl $name {
            /// Allocates the next identifier.
            #[must_use]
            pub fn next() -> Self {
                Self($counter.fetch_add(1, Ordering::Relaxed))
            }

            /// Rebuilds an identifier from its raw value.
            #[must_use]
            pub const fn from_raw(raw: u64) -> Self {
                Self(raw)
            }

            /// Returns the raw value.
            #[must_use]
            pub const fn as_u64(self) -> u64 {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}{}", $prefix, self.0)
            }
        }
    };
}

define_id!(
    /// A unique identifier for a state object.
    StateId,
    STATE_COUNTER,
    "S"
);

define_id!(
    /// A unique identifier for a scheduler instance.
    SchedulerId,
    SCHEDULER_COUNTER,
    "Sch"
);

define_id!(
    /// A unique identifier for a task.
    ///
    /// A task is the unit a scheduler keeps alive until its root state
    /// reports completion through `del_final`.
    TaskId,
    TASK_COUNTER,
    "T"
);

define_id!(
    /// A unique identifier for a coroutine frame.
    FrameId,
    FRAME_COUNTER,
    "F"
);

define_id!(
    /// A unique identifier for an event signal source.
    EventId,
    EVENT_COUNTER,
    "E"
);
