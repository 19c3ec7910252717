//! Idle parking for a scheduler's run loop.

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::Duration;

/// A mechanism for parking and unparking a run loop.
///
/// An `unpark` that happens while nobody is parked is remembered, so the
/// next `park_timeout` returns immediately.
#[derive(Debug, Clone, Default)]
pub struct Parker {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl Parker {
    /// Creates a new parker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parks the current thread until notified or `duration` elapses.
    ///
    /// Returns true if woken by [`unpark`](Self::unpark).
    pub fn park_timeout(&self, duration: Duration) -> bool {
        let (lock, cvar) = &*self.inner;
        let mut notified = lock.lock();
        if !*notified {
            let _ = cvar.wait_for(&mut notified, duration);
        }
        std::mem::replace(&mut *notified, false)
    }

    /// Unparks a parked thread.
    pub fn unpark(&self) {
        let (lock, cvar) = &*self.inner;
        *lock.lock() = true;
        cvar.notify_one();
    }
}
