//! Property-based tests for event arbitration.
//!
//! # Single-wait Invariants
//! - Exactly one of notify/timeout/cancel wins, and it is the first cause
//!   applied to the descriptor
//! - A descriptor is requeued at most once, and never after a cancel
//!
//! # Wait-all Invariants
//! - Completes only after N accepted arrivals
//! - A timeout or cancel before the last arrival fails the group for good
//!
//! # Signal Source Invariants
//! - The banked counter equals signals minus the waiters they satisfied
//! - `signal_all` empties both the counter and the waiter queue

#[macro_use]
mod common;

use common::*;
use proptest::prelude::*;
use resumef::coroutine::Continuation;
use resumef::event::{EventImpl, EventWaiter, StateEvent, StateEventAll, WaitOutcome};
use resumef::state::State;
use std::collections::VecDeque;
use std::sync::Arc;

// ============================================================================
// Arbitrary Generators
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum Cause {
    Notify(usize),
    Timeout,
    Cancel,
}

fn arb_cause(sources: usize) -> impl Strategy<Value = Cause> {
    prop_oneof![
        4 => (0..sources).prop_map(Cause::Notify),
        1 => Just(Cause::Timeout),
        1 => Just(Cause::Cancel),
    ]
}

fn arb_causes(sources: usize) -> impl Strategy<Value = Vec<Cause>> {
    proptest::collection::vec(arb_cause(sources), 1..16)
}

#[derive(Debug, Clone, Copy)]
enum SourceOp {
    Signal,
    SignalAll,
    Park,
    CancelOldest,
    TryWait,
    Reset,
}

fn arb_source_ops() -> impl Strategy<Value = Vec<SourceOp>> {
    proptest::collection::vec(
        prop_oneof![
            4 => Just(SourceOp::Signal),
            1 => Just(SourceOp::SignalAll),
            4 => Just(SourceOp::Park),
            1 => Just(SourceOp::CancelOldest),
            2 => Just(SourceOp::TryWait),
            1 => Just(SourceOp::Reset),
        ],
        0..64,
    )
}

fn armed_single(recorder: &Arc<Recorder>) -> Arc<StateEvent> {
    let state = StateEvent::new(&recorder.handle());
    state.await_suspend(Continuation::once(|| {}));
    state
}

fn expected_single(first: Cause, sources: &[EventImpl]) -> WaitOutcome {
    match first {
        Cause::Notify(i) => WaitOutcome::Notified(sources[i].id()),
        Cause::Timeout => WaitOutcome::TimedOut,
        Cause::Cancel => WaitOutcome::Cancelled,
    }
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(test_proptest_config(256))]

    #[test]
    fn single_wait_first_cause_wins(causes in arb_causes(3)) {
        init_test_logging();
        let recorder = Recorder::new();
        let sources: Vec<EventImpl> = (0..3).map(|_| EventImpl::new(false)).collect();
        let state = armed_single(&recorder);

        let mut wins = 0usize;
        for cause in &causes {
            let won = match *cause {
                Cause::Notify(i) => state.on_notify(&sources[i]),
                Cause::Timeout => state.on_timeout(),
                Cause::Cancel => {
                    let before = state.outcome();
                    state.on_cancel();
                    before == WaitOutcome::Pending
                }
            };
            wins += usize::from(won);
        }

        prop_assert_eq!(wins, 1);
        prop_assert_eq!(state.outcome(), expected_single(causes[0], &sources));
        let requeues = recorder.ready_len();
        match causes[0] {
            Cause::Cancel => {
                prop_assert_eq!(requeues, 0);
                prop_assert!(!state.has_handler());
            }
            _ => prop_assert_eq!(requeues, 1),
        }
    }

    #[test]
    fn wait_all_needs_every_arrival(count in 1usize..6, causes in arb_causes(6)) {
        init_test_logging();
        let recorder = Recorder::new();
        let sources: Vec<EventImpl> = (0..count).map(|_| EventImpl::new(false)).collect();
        let state = StateEventAll::new(count, &recorder.handle());
        state.await_suspend(Continuation::once(|| {}));

        let mut arrivals = 0usize;
        let mut failed = false;
        for cause in &causes {
            match *cause {
                Cause::Notify(i) if i < count => {
                    if state.on_notify(&sources[i]) && !failed {
                        arrivals += 1;
                    }
                }
                Cause::Notify(_) => {}
                Cause::Timeout => {
                    if arrivals < count && !failed {
                        prop_assert!(state.on_timeout());
                        failed = true;
                    } else {
                        prop_assert!(!state.on_timeout());
                    }
                }
                Cause::Cancel => {
                    if arrivals < count {
                        failed = true;
                    }
                    state.on_cancel();
                }
            }
        }

        let expected = if failed {
            Some(false)
        } else if arrivals >= count {
            Some(true)
        } else {
            None
        };
        prop_assert_eq!(state.result(), expected);
        prop_assert!(recorder.ready_len() <= 1);
    }

    #[test]
    fn signal_source_matches_model(ops in arb_source_ops()) {
        init_test_logging();
        let recorder = Recorder::new();
        let source = EventImpl::new(false);

        let mut counter: isize = 0;
        let mut queued: VecDeque<Arc<StateEvent>> = VecDeque::new();
        let mut satisfied = 0usize;
        let mut parked_total = Vec::new();

        for op in ops {
            match op {
                SourceOp::Signal => {
                    if queued.pop_front().is_some() {
                        satisfied += 1;
                    } else {
                        counter += 1;
                    }
                    source.signal();
                }
                SourceOp::SignalAll => {
                    satisfied += queued.len();
                    queued.clear();
                    counter = 0;
                    source.signal_all();
                }
                SourceOp::Park => {
                    let state = armed_single(&recorder);
                    parked_total.push(Arc::clone(&state));
                    let was_queued = source.park(state.clone());
                    if counter > 0 {
                        counter -= 1;
                        satisfied += 1;
                        prop_assert!(!was_queued);
                    } else {
                        prop_assert!(was_queued);
                        queued.push_back(state);
                    }
                }
                SourceOp::CancelOldest => {
                    if let Some(waiter) = queued.pop_front() {
                        waiter.on_cancel();
                    }
                }
                SourceOp::TryWait => {
                    let expected = counter > 0;
                    if expected {
                        counter -= 1;
                    }
                    prop_assert_eq!(source.try_wait_one(), expected);
                }
                SourceOp::Reset => {
                    counter = 0;
                    source.reset();
                }
            }
            prop_assert_eq!(source.counter(), counter);
        }

        let notified = parked_total
            .iter()
            .filter(|s| s.outcome() == WaitOutcome::Notified(source.id()))
            .count();
        prop_assert_eq!(notified, satisfied);
        prop_assert_eq!(recorder.ready_len(), satisfied);
    }
}
