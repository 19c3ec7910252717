//! Async mutex whose lock may be held across suspension points.
//!
//! The protected value sits behind a `parking_lot` lock that is only ever
//! try-acquired, so no scheduler thread blocks on it. A body that finds the
//! mutex held waits on the mutex's event and retries [`Mutex::try_lock`]
//! after it wakes; another body may have taken the lock in between.
//!
//! Releasing a guard notifies the event: one parked body wakes, or a single
//! signal is banked for the next waiter. Any body calling `try_lock` before
//! the woken one runs may take the lock first, so the mutex is not fair.
//!
//! # Example
//!
//! ```ignore
//! let mut wait = None;
//! sched.spawn(move |co: &Suspend<'_>| loop {
//!     drop(wait.take());
//!     match counter.try_lock() {
//!         Some(mut guard) => {
//!             *guard += 1;
//!             return Step::Complete;
//!         }
//!         None => {
//!             let registered = counter.wait_unlocked(&s, co);
//!             let suspended = registered.suspended();
//!             wait = Some(registered);
//!             if suspended {
//!                 return Step::Suspended;
//!             }
//!         }
//!     }
//! });
//! ```

use core::fmt;
use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::RawMutex;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use tracing::trace;

use crate::coroutine::Suspend;
use crate::event::{Event, EventWait};
use crate::runtime::scheduler::Scheduler;

/// An async mutex protecting a `T`. Clones share the same lock.
pub struct Mutex<T> {
    value: Arc<parking_lot::Mutex<T>>,
    unlocked: Event,
}

impl<T> Mutex<T> {
    /// Creates an unlocked mutex holding `value`.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            value: Arc::new(parking_lot::Mutex::new(value)),
            unlocked: Event::new(false),
        }
    }

    /// Returns true if a guard is currently held.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.value.is_locked()
    }

    /// Acquires the lock if it is free.
    #[must_use]
    pub fn try_lock(&self) -> Option<MutexGuard<T>> {
        let guard = self.value.try_lock_arc()?;
        trace!(event_id = ?self.unlocked.id(), "mutex acquired");
        Some(MutexGuard {
            guard,
            _release: Release(self.unlocked.clone()),
        })
    }

    /// Parks the calling body until a guard is released.
    ///
    /// Resolves inline if a release is already banked. Retry
    /// [`try_lock`](Self::try_lock) once the body runs again.
    pub fn wait_unlocked(&self, scheduler: &Arc<Scheduler>, co: &Suspend<'_>) -> EventWait {
        self.unlocked.wait(scheduler, co)
    }

    /// Returns the event notified on every release.
    #[must_use]
    pub fn unlocked_event(&self) -> &Event {
        &self.unlocked
    }

    /// Consumes the mutex, returning the value if no clone or guard remains.
    pub fn into_inner(self) -> Option<T> {
        Arc::try_unwrap(self.value)
            .ok()
            .map(|value| value.into_inner())
    }
}

impl<T> Clone for Mutex<T> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
            unlocked: self.unlocked.clone(),
        }
    }
}

impl<T: Default> Default for Mutex<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> fmt::Debug for Mutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mutex")
            .field("locked", &self.is_locked())
            .field("event", &self.unlocked.id())
            .finish()
    }
}

/// Owned guard for a [`Mutex`]. Releasing it wakes one waiter.
///
/// The guard is `Send`, so a body may keep it across a suspension and
/// resume on another scheduler thread.
pub struct MutexGuard<T> {
    // Dropped before `_release`, so the lock is free when waiters wake.
    guard: ArcMutexGuard<RawMutex, T>,
    _release: Release,
}

struct Release(Event);

impl Drop for Release {
    fn drop(&mut self) {
        trace!(event_id = ?self.0.id(), "mutex released");
        self.0.notify();
    }
}

impl<T> MutexGuard<T> {
    /// Returns the protected value.
    #[must_use]
    pub fn get(&self) -> &T {
        self
    }

    /// Returns the protected value mutably.
    pub fn get_mut(&mut self) -> &mut T {
        self
    }
}

impl<T> Deref for MutexGuard<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for MutexGuard<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T: fmt::Debug> fmt::Debug for MutexGuard<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MutexGuard").field(self.get()).finish()
    }
}
