//! Cooperative cancellation domain.
//!
//! A [`StopSource`] starts either live or in "no stop state" mode. A source
//! in no-stop-state mode allocates nothing and can never be stopped; the
//! first caller that needs to observe stop requests upgrades it with
//! [`StopSource::make_sure_possible`]. Once live, every [`StopToken`] derived
//! from it sees the request, and every registered [`StopCallback`] runs once.
//!
//! Requesting stop is idempotent: only the first request returns true and
//! runs callbacks.

use core::fmt;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::trace;

type Callback = Box<dyn FnOnce() + Send>;

struct StopState {
    requested: AtomicBool,
    next_callback: AtomicU64,
    callbacks: Mutex<Vec<(u64, Callback)>>,
}

impl StopState {
    fn new() -> Self {
        Self {
            requested: AtomicBool::new(false),
            next_callback: AtomicU64::new(1),
            callbacks: Mutex::new(Vec::new()),
        }
    }

    fn request(&self) -> bool {
        if self
            .requested
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        let callbacks = std::mem::take(&mut *self.callbacks.lock());
        trace!(callbacks = callbacks.len(), "stop requested");
        // Run outside the lock; a callback may register or drop others.
        for (_, callback) in callbacks {
            callback();
        }
        true
    }

    fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

/// Owner side of a cancellation domain.
#[derive(Clone, Default)]
pub struct StopSource {
    state: Option<Arc<StopState>>,
}

impl StopSource {
    /// Creates a live stop source.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Some(Arc::new(StopState::new())),
        }
    }

    /// Creates a source that cannot be stopped until upgraded.
    #[must_use]
    pub const fn no_stop_state() -> Self {
        Self { state: None }
    }

    /// Upgrades a no-stop-state source to a live one. No-op if already live.
    pub fn make_sure_possible(&mut self) {
        if self.state.is_none() {
            self.state = Some(Arc::new(StopState::new()));
        }
    }

    /// Returns true if a stop request can be observed through this source.
    #[must_use]
    pub fn stop_possible(&self) -> bool {
        self.state.is_some()
    }

    /// Returns true once stop has been requested.
    #[must_use]
    pub fn stop_requested(&self) -> bool {
        self.state.as_ref().is_some_and(|s| s.is_requested())
    }

    /// Requests stop.
    ///
    /// Returns true only for the first request on a live source.
    #[allow(clippy::must_use_candidate)]
    pub fn request_stop(&self) -> bool {
        self.state.as_ref().is_some_and(|s| s.request())
    }

    /// Returns a token observing this source.
    #[must_use]
    pub fn token(&self) -> StopToken {
        StopToken {
            state: self.state.clone(),
        }
    }
}

impl fmt::Debug for StopSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StopSource")
            .field("possible", &self.stop_possible())
            .field("requested", &self.stop_requested())
            .finish()
    }
}

/// Observer side of a cancellation domain.
#[derive(Clone, Default)]
pub struct StopToken {
    state: Option<Arc<StopState>>,
}

impl StopToken {
    /// Returns a token that is never stoppable.
    #[must_use]
    pub const fn never() -> Self {
        Self { state: None }
    }

    /// Returns true once stop has been requested.
    #[must_use]
    pub fn stop_requested(&self) -> bool {
        self.state.as_ref().is_some_and(|s| s.is_requested())
    }

    /// Returns true if a stop request can ever be observed.
    #[must_use]
    pub fn stop_possible(&self) -> bool {
        self.state.is_some()
    }
}

impl fmt::Debug for StopToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StopToken")
            .field("possible", &self.stop_possible())
            .field("requested", &self.stop_requested())
            .finish()
    }
}

/// Runs a closure once when stop is requested; deregisters on drop.
#[must_use = "dropping a StopCallback deregisters it"]
pub struct StopCallback {
    state: Weak<StopState>,
    key: u64,
}

impl StopCallback {
    /// Registers `f` on `token`.
    ///
    /// If stop was already requested, `f` runs immediately on this thread.
    /// If the token can never be stopped, `f` is dropped without running.
    pub fn new(token: &StopToken, f: impl FnOnce() + Send + 'static) -> Self {
        let Some(state) = token.state.as_ref() else {
            return Self {
                state: Weak::new(),
                key: 0,
            };
        };

        let key = state.next_callback.fetch_add(1, Ordering::Relaxed);
        // Hold the list across the check: request() flips the flag before
        // draining, so a callback pushed here is always seen by the drain.
        let mut callbacks = state.callbacks.lock();
        if state.is_requested() {
            drop(callbacks);
            f();
            return Self {
                state: Weak::new(),
                key,
            };
        }
        callbacks.push((key, Box::new(f)));
        Self {
            state: Arc::downgrade(state),
            key,
        }
    }
}

impl Drop for StopCallback {
    fn drop(&mut self) {
        if let Some(state) = self.state.upgrade() {
            let removed = {
                let mut callbacks = state.callbacks.lock();
                callbacks
                    .iter()
                    .position(|(key, _)| *key == self.key)
                    .map(|index| callbacks.swap_remove(index))
            };
            drop(removed);
        }
    }
}

impl fmt::Debug for StopCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StopCallback")
            .field("key", &self.key)
            .field("registered", &(self.state.strong_count() > 0))
            .finish()
    }
}
