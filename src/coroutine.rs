//! Continuation handles and resumable coroutine frames.
//!
//! A coroutine body is any [`Coroutine`]: it runs until its next suspension
//! point and reports whether it finished. The body lives inside a shared
//! frame; a [`Continuation`] is a move-only token naming that frame, owned
//! by exactly one state object at a time.
//!
//! ```text
//!   state object ──owns──> Continuation ──names──> frame { body }
//!                                                    ^
//!   body, while running: Suspend::continuation() ────┘  (mints a new token)
//! ```
//!
//! # Handle Discipline
//!
//! - [`Continuation::resume`] consumes the token: resuming a handle twice is
//!   unrepresentable.
//! - [`Continuation::destroy`] drops the body without running it. Teardown
//!   happens through the body's `Drop`.
//! - Before returning [`Step::Suspended`], a body that expects to be resumed
//!   later must hand a fresh token (from [`Suspend::continuation`]) to
//!   whichever state object will resume it.
//! - Stepping or resuming a frame that already finished is a checked no-op
//!   that reports [`Step::Complete`].
//!
//! Frames are resumed from scheduler run loops only. If two threads resume
//! the same frame, the second blocks on the frame lock until the running
//! step returns; a body must not synchronously resume its own frame.

use core::fmt;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::trace;

use crate::types::FrameId;

/// Result of running a coroutine body up to its next suspension point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// The body yielded and expects to be resumed again.
    Suspended,
    /// The body ran to completion.
    Complete,
}

impl Step {
    /// Returns true if the body finished.
    #[must_use]
    pub const fn is_complete(self) -> bool {
        matches!(self, Self::Complete)
    }
}

/// A resumable unit of work.
///
/// Closures of the shape `FnMut(&Suspend<'_>) -> Step` implement this trait.
pub trait Coroutine: Send + 'static {
    /// Runs the body until it suspends or completes.
    fn resume(&mut self, co: &Suspend<'_>) -> Step;
}

impl<F> Coroutine for F
where
    F: FnMut(&Suspend<'_>) -> Step + Send + 'static,
{
    fn resume(&mut self, co: &Suspend<'_>) -> Step {
        self(co)
    }
}

struct Frame {
    id: FrameId,
    body: Mutex<Option<Box<dyn Coroutine>>>,
    done: AtomicBool,
}

impl Frame {
    fn run(self: &Arc<Self>) -> Step {
        let mut body = self.body.lock();
        let Some(co) = body.as_mut() else {
            trace!(frame_id = ?self.id, "resume of finished frame ignored");
            return Step::Complete;
        };

        let step = co.resume(&Suspend { frame: self });
        if step.is_complete() {
            let finished = body.take();
            self.done.store(true, Ordering::Release);
            drop(body);
            trace!(frame_id = ?self.id, "frame completed");
            drop(finished);
        }
        step
    }

    fn destroy(&self) {
        let body = self.body.lock().take();
        self.done.store(true, Ordering::Release);
        if body.is_some() {
            trace!(frame_id = ?self.id, "frame destroyed");
        }
        drop(body);
    }
}

/// Context handed to a running coroutine body.
pub struct Suspend<'a> {
    frame: &'a Arc<Frame>,
}

impl Suspend<'_> {
    /// Mints a continuation for the running frame.
    ///
    /// Hand the token to the state object that should resume this body, then
    /// return [`Step::Suspended`].
    #[must_use]
    pub fn continuation(&self) -> Continuation {
        Continuation {
            frame: Arc::clone(self.frame),
        }
    }

    /// Returns the running frame's identifier.
    #[must_use]
    pub fn frame_id(&self) -> FrameId {
        self.frame.id
    }
}

impl fmt::Debug for Suspend<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Suspend")
            .field("frame_id", &self.frame.id)
            .finish()
    }
}

/// An opaque, move-only token for a suspended computation.
pub struct Continuation {
    frame: Arc<Frame>,
}

impl Continuation {
    /// Creates a new suspended computation from a coroutine body.
    ///
    /// The body does not run until the continuation is resumed.
    #[must_use]
    pub fn new(body: impl Coroutine) -> Self {
        let frame = Arc::new(Frame {
            id: FrameId::next(),
            body: Mutex::new(Some(Box::new(body))),
            done: AtomicBool::new(false),
        });
        Self { frame }
    }

    /// Creates a continuation that runs `f` once and completes.
    #[must_use]
    pub fn once(f: impl FnOnce() + Send + 'static) -> Self {
        let mut f = Some(f);
        Self::new(move |_co: &Suspend<'_>| {
            if let Some(f) = f.take() {
                f();
            }
            Step::Complete
        })
    }

    /// Returns the frame identifier.
    #[must_use]
    pub fn id(&self) -> FrameId {
        self.frame.id
    }

    /// Returns true once the frame has completed or been destroyed.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.frame.done.load(Ordering::Acquire)
    }

    /// Transfers control into the suspended computation, consuming the token.
    pub fn resume(self) -> Step {
        self.frame.run()
    }

    /// Resumes without consuming the token.
    ///
    /// Only state objects that keep their handle across resumes (generators)
    /// use this form.
    pub fn step(&self) -> Step {
        self.frame.run()
    }

    /// Releases the computation without resuming it.
    pub fn destroy(self) {
        self.frame.destroy();
    }
}

impl fmt::Debug for Continuation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Continuation")
            .field("frame_id", &self.frame.id)
            .field("done", &self.is_done())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{counting_continuation, init_test_logging};
    use std::sync::atomic::AtomicUsize;

    fn init_test(name: &str) {
        init_test_logging();
        crate::test_phase!(name);
    }

    #[test]
    fn once_runs_exactly_once() {
        init_test("once_runs_exactly_once");
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let cont = Continuation::once(move || {
            h.fetch_add(1, Ordering::SeqCst);
        });
        let step = cont.resume();
        assert_eq!(step, Step::Complete);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        crate::test_complete!("once_runs_exactly_once");
    }

    #[test]
    fn step_keeps_handle_until_done() {
        init_test("step_keeps_handle_until_done");
        let (cont, count) = counting_continuation(3);
        assert_eq!(cont.step(), Step::Suspended);
        assert_eq!(cont.step(), Step::Suspended);
        assert!(!cont.is_done());
        assert_eq!(cont.step(), Step::Complete);
        assert!(cont.is_done());
        // Finished frame: checked no-op.
        assert_eq!(cont.step(), Step::Complete);
        assert_eq!(count.load(Ordering::SeqCst), 3);
        crate::test_complete!("step_keeps_handle_until_done");
    }

    #[test]
    fn destroy_drops_body_without_running() {
        init_test("destroy_drops_body_without_running");
        struct Guard(Arc<AtomicUsize>);
        impl Drop for Guard {
            fn drop(&mut self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let dropped = Arc::new(AtomicUsize::new(0));
        let ran = Arc::new(AtomicUsize::new(0));
        let guard = Guard(Arc::clone(&dropped));
        let r = Arc::clone(&ran);
        let cont = Continuation::new(move |_co: &Suspend<'_>| {
            let _keep = &guard;
            r.fetch_add(1, Ordering::SeqCst);
            Step::Suspended
        });
        cont.destroy();
        assert_eq!(dropped.load(Ordering::SeqCst), 1);
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        crate::test_complete!("destroy_drops_body_without_running");
    }

    #[test]
    fn minted_token_resumes_same_frame() {
        init_test("minted_token_resumes_same_frame");
        let slot: Arc<Mutex<Option<Continuation>>> = Arc::new(Mutex::new(None));
        let stash = Arc::clone(&slot);
        let mut visits = 0;
        let first = Continuation::new(move |co: &Suspend<'_>| {
            visits += 1;
            if visits == 1 {
                *stash.lock() = Some(co.continuation());
                Step::Suspended
            } else {
                Step::Complete
            }
        });
        let frame_id = first.id();

        assert_eq!(first.resume(), Step::Suspended);
        let second = slot.lock().take().expect("body minted a token");
        assert_eq!(second.id(), frame_id);
        assert_eq!(second.resume(), Step::Complete);
        crate::test_complete!("minted_token_resumes_same_frame");
    }

    #[test]
    fn stale_token_after_completion_is_noop() {
        init_test("stale_token_after_completion_is_noop");
        let slot: Arc<Mutex<Option<Continuation>>> = Arc::new(Mutex::new(None));
        let stash = Arc::clone(&slot);
        let cont = Continuation::new(move |co: &Suspend<'_>| {
            *stash.lock() = Some(co.continuation());
            Step::Complete
        });
        assert_eq!(cont.resume(), Step::Complete);
        let stale = slot.lock().take().expect("token minted");
        assert!(stale.is_done());
        assert_eq!(stale.resume(), Step::Complete);
        crate::test_complete!("stale_token_after_completion_is_noop");
    }
}
