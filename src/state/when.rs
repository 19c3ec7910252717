//! Combinators over future states.
//!
//! [`when_all`] resolves once every input has resolved, with the values in
//! input order; the first input to fail fails the aggregate. [`when_any`]
//! resolves with the index and value of the first input to resolve, and
//! leaves the other inputs' results where they are.
//!
//! Both take over the inputs' consumer slots: each input gets a small
//! continuation that reports its result to the aggregate. Awaiting an input
//! directly after handing it to a combinator replaces that continuation.
//! Inputs with no scheduler are attached to the combinator's scheduler so
//! their completion has a loop to run on.
//!
//! The aggregate keeps its inputs alive until it resolves and releases them
//! then. A [`when_any`] loser the caller no longer holds is dropped at that
//! point, which also stops a pending sleep behind it.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, trace};

use super::future::FutureState;
use super::State;
use crate::coroutine::Continuation;
use crate::error::{Error, ErrorKind};
use crate::runtime::scheduler::SchedulerRef;

/// Hooks `on_ready` to `input`'s resolution.
///
/// Runs it inline if `input` already holds a result.
fn on_resolved<T, F>(scheduler: &SchedulerRef, input: &Arc<FutureState<T>>, on_ready: F)
where
    T: Send + 'static,
    F: FnOnce(&FutureState<T>) + Send + 'static,
{
    if input.scheduler().is_none() {
        input.set_scheduler(scheduler);
    }
    let weak: Weak<FutureState<T>> = Arc::downgrade(input);
    let cont = Continuation::once(move || {
        if let Some(input) = weak.upgrade() {
            on_ready(&input);
        }
    });
    if let Some(cont) = input.await_suspend(cont) {
        let _ = cont.resume();
    }
}

/// Drops the strong references an aggregate holds on its inputs.
fn release<T>(inputs: &Mutex<Vec<Arc<FutureState<T>>>>) {
    let released = std::mem::take(&mut *inputs.lock());
    drop(released);
}

struct AllShared<T> {
    inputs: Mutex<Vec<Arc<FutureState<T>>>>,
    slots: Mutex<Vec<Option<T>>>,
    remaining: AtomicUsize,
    failed: AtomicBool,
    output: Arc<FutureState<Vec<T>>>,
}

impl<T: Send + 'static> AllShared<T> {
    fn record(&self, index: usize, input: &FutureState<T>) {
        if self.failed.load(Ordering::Acquire) {
            return;
        }
        match input.future_await_resume() {
            Ok(value) => {
                self.slots.lock()[index] = Some(value);
                if self.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                    let values = self.slots.lock().drain(..).flatten().collect();
                    trace!(state_id = ?self.output.id(), "when_all resolved");
                    release(&self.inputs);
                    self.output.set_value(values);
                }
            }
            Err(error) => {
                if !self.failed.swap(true, Ordering::AcqRel) {
                    debug!(state_id = ?self.output.id(), index, %error, "when_all failed");
                    release(&self.inputs);
                    self.output.set_exception(error);
                }
            }
        }
    }
}

/// Returns a future resolved with every input's value, in input order.
///
/// The first input to fail fails the returned future with that input's
/// error; results of inputs resolving after that are left in place. An
/// empty input resolves immediately with an empty vector.
#[must_use]
pub fn when_all<T: Send + 'static>(
    scheduler: &SchedulerRef,
    inputs: &[Arc<FutureState<T>>],
) -> Arc<FutureState<Vec<T>>> {
    let output = FutureState::<Vec<T>>::with_scheduler(scheduler);
    if inputs.is_empty() {
        output.set_value(Vec::new());
        return output;
    }
    let shared = Arc::new(AllShared {
        inputs: Mutex::new(inputs.to_vec()),
        slots: Mutex::new(inputs.iter().map(|_| None).collect()),
        remaining: AtomicUsize::new(inputs.len()),
        failed: AtomicBool::new(false),
        output: Arc::clone(&output),
    });
    for (index, input) in inputs.iter().enumerate() {
        let shared = Arc::clone(&shared);
        on_resolved(scheduler, input, move |input| shared.record(index, input));
    }
    output
}

/// Returns a future resolved by whichever input resolves first.
///
/// The value is the winner's index and value; if the winner failed, the
/// returned future fails with its error. An empty input can never resolve
/// and fails at once with [`ErrorKind::NotReady`].
#[must_use]
pub fn when_any<T: Send + 'static>(
    scheduler: &SchedulerRef,
    inputs: &[Arc<FutureState<T>>],
) -> Arc<FutureState<(usize, T)>> {
    let output = FutureState::<(usize, T)>::with_scheduler(scheduler);
    if inputs.is_empty() {
        output.set_exception(Error::new(ErrorKind::NotReady));
        return output;
    }
    let shared = Arc::new(AnyShared {
        inputs: Mutex::new(inputs.to_vec()),
        won: AtomicBool::new(false),
        output: Arc::clone(&output),
    });
    for (index, input) in inputs.iter().enumerate() {
        let shared = Arc::clone(&shared);
        on_resolved(scheduler, input, move |input| shared.record(index, input));
    }
    output
}

struct AnyShared<T> {
    inputs: Mutex<Vec<Arc<FutureState<T>>>>,
    won: AtomicBool,
    output: Arc<FutureState<(usize, T)>>,
}

impl<T: Send + 'static> AnyShared<T> {
    fn record(&self, index: usize, input: &FutureState<T>) {
        if self.won.swap(true, Ordering::AcqRel) {
            return;
        }
        trace!(state_id = ?self.output.id(), index, "when_any resolved");
        let result = input.future_await_resume();
        release(&self.inputs);
        match result {
            Ok(value) => self.output.set_value((index, value)),
            Err(error) => self.output.set_exception(error),
        }
    }
}
