//! Adapting callback-style APIs to future states.
//!
//! [`completion`] pairs a future with a [`Completion`], a one-shot sender that
//! can be moved into a callback and fired from any thread. [`from_callback`]
//! does the same for an API that takes the callback as an argument.
//!
//! A completion dropped without a result fails its future with
//! [`ErrorKind::CallbackDropped`], so an awaiting body is never stranded by
//! an API that silently discards its callback.

use core::fmt;
use std::sync::Arc;
use tracing::debug;

use super::future::FutureState;
use super::State;
use crate::error::{Error, ErrorKind, Result};
use crate::runtime::scheduler::SchedulerRef;

/// One-shot sender resolving a [`FutureState`].
pub struct Completion<T: Send + 'static> {
    future: Option<Arc<FutureState<T>>>,
}

impl<T: Send + 'static> Completion<T> {
    /// Resolves the future with `value`.
    pub fn complete(mut self, value: T) {
        if let Some(future) = self.future.take() {
            future.set_value(value);
        }
    }

    /// Fails the future with `error`.
    pub fn fail(mut self, error: Error) {
        if let Some(future) = self.future.take() {
            future.set_exception(error);
        }
    }

    /// Resolves the future from a `Result`.
    pub fn resolve(self, result: Result<T>) {
        match result {
            Ok(value) => self.complete(value),
            Err(error) => self.fail(error),
        }
    }

    /// Converts into a plain callback taking the value.
    pub fn into_callback(self) -> impl FnOnce(T) + Send + 'static {
        move |value| self.complete(value)
    }
}

impl<T: Send + 'static> Drop for Completion<T> {
    fn drop(&mut self) {
        if let Some(future) = self.future.take() {
            debug!(state_id = ?future.id(), "completion dropped without a result");
            future.set_exception(Error::new(ErrorKind::CallbackDropped));
        }
    }
}

impl<T: Send + 'static> fmt::Debug for Completion<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("state", &self.future.as_ref().map(|s| s.id()))
            .finish()
    }
}

/// Returns a future attached to `scheduler` and the completion resolving it.
#[must_use]
pub fn completion<T: Send + 'static>(
    scheduler: &SchedulerRef,
) -> (Arc<FutureState<T>>, Completion<T>) {
    let future = FutureState::<T>::with_scheduler(scheduler);
    let sender = Completion {
        future: Some(Arc::clone(&future)),
    };
    (future, sender)
}

/// Calls `start` with a completion and returns the future it resolves.
///
/// `start` typically hands the completion (or
/// [`Completion::into_callback`]) to a callback-taking API.
pub fn from_callback<T, F>(scheduler: &SchedulerRef, start: F) -> Arc<FutureState<T>>
where
    T: Send + 'static,
    F: FnOnce(Completion<T>),
{
    let (future, sender) = completion(scheduler);
    start(sender);
    future
}
