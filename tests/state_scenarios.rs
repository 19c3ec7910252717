//! Scenario tests for future-states, generators and cancellation.
//!
//! - A task awaits a child future resolved by another task
//! - A stored exception reaches the awaiting body exactly once
//! - A final initiator is torn down only after the consumer ran
//! - Spawn setup, body and deferred teardown run in that order
//! - A stop request cancels a pending sleep inside a running task
//! - Generators and future-awaiting tasks share one ready queue fairly

#[macro_use]
mod common;

use common::*;
use parking_lot::Mutex;
use resumef::coroutine::{Continuation, Step, Suspend};
use resumef::error::{ErrorKind, Result};
use resumef::runtime::{sleep_for, Scheduler, SchedulerConfig};
use resumef::state::{FutureState, Initiator, ResultKind, State};
use std::sync::Arc;
use std::time::Duration;

fn init_test(name: &str) {
    init_test_logging();
    test_phase!(name);
}

#[derive(Debug)]
struct Boom;

impl std::fmt::Display for Boom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("boom")
    }
}

impl std::error::Error for Boom {}

/// Spawns a task that awaits `child` and records both retrievals.
fn spawn_awaiter<T: Send + 'static>(
    sched: &Arc<Scheduler>,
    child: Arc<FutureState<T>>,
) -> Arc<Mutex<Vec<Result<T>>>> {
    let results = Arc::new(Mutex::new(Vec::new()));
    let out = Arc::clone(&results);
    sched.spawn(move |co: &Suspend<'_>| {
        if child.await_suspend(co.continuation()).is_none() {
            return Step::Suspended;
        }
        let mut out = out.lock();
        out.push(child.future_await_resume());
        out.push(child.future_await_resume());
        Step::Complete
    });
    results
}

#[test]
fn child_future_resolved_by_sibling_task() {
    init_test("child_future_resolved_by_sibling_task");
    let sched = Scheduler::new(SchedulerConfig::default());
    let child = FutureState::<u32>::with_scheduler(&sched.handle());
    let results = spawn_awaiter(&sched, Arc::clone(&child));

    let producer = Arc::clone(&child);
    let mut rounds = 0;
    sched.spawn_generator(move |_co: &Suspend<'_>| {
        rounds += 1;
        if rounds < 3 {
            return Step::Suspended;
        }
        producer.set_value(42);
        Step::Complete
    });

    sched.run_until_notask();

    let results = results.lock();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].as_ref().ok(), Some(&42));
    assert_eq!(
        results[1].as_ref().err().map(resumef::Error::kind),
        Some(ErrorKind::AlreadyAcquired)
    );
    assert_eq!(sched.task_count(), 0);
    test_complete!("child_future_resolved_by_sibling_task");
}

#[test]
fn stored_exception_is_raised_once() {
    init_test("stored_exception_is_raised_once");
    let sched = Scheduler::new(SchedulerConfig::default());
    let child = FutureState::<u32>::with_scheduler(&sched.handle());
    let results = spawn_awaiter(&sched, Arc::clone(&child));

    assert_eq!(sched.run_one_batch(), 1);
    assert!(child.has_handler(), "awaiter parked its continuation");
    child.set_exception(resumef::Error::user(Boom));
    assert_eq!(child.result_kind(), ResultKind::Exception);
    sched.run_until_notask();

    let results = results.lock();
    let first = results[0].as_ref().err().map(resumef::Error::kind);
    assert_eq!(first, Some(ErrorKind::User));
    assert_eq!(
        results[1].as_ref().err().map(resumef::Error::kind),
        Some(ErrorKind::AlreadyAcquired)
    );
    test_complete!("stored_exception_is_raised_once");
}

#[test]
fn stop_request_cancels_sleep_in_task() {
    init_test("stop_request_cancels_sleep_in_task");
    let sched = Scheduler::new(SchedulerConfig::default());
    let outcome = Arc::new(Mutex::new(None));

    let out = Arc::clone(&outcome);
    let handle = sched.spawn_with(move |ctx| {
        let mut sleeper = None;
        move |co: &Suspend<'_>| {
            let fut = match &sleeper {
                Some(fut) => Arc::clone(fut),
                None => {
                    let Some(s) = ctx.scheduler() else {
                        return Step::Complete;
                    };
                    let fut = sleep_for(&s, Duration::from_secs(60), &ctx.stop_token());
                    sleeper = Some(Arc::clone(&fut));
                    fut
                }
            };
            if fut.await_suspend(co.continuation()).is_none() {
                return Step::Suspended;
            }
            *out.lock() = Some(fut.future_await_resume().map_err(|e| e.kind()));
            if ctx.check_stop().is_err() {
                tracing::debug!("task observed stop request");
            }
            Step::Complete
        }
    });

    assert_eq!(sched.run_one_batch(), 1);
    assert!(sched.has_timers());
    assert!(!handle.is_finished());

    assert!(handle.request_stop());
    assert!(!handle.request_stop());
    sched.run_until_notask();

    assert!(handle.is_finished());
    assert_eq!(*outcome.lock(), Some(Err(ErrorKind::TimerCanceled)));
    assert!(!sched.has_timers());
    test_complete!("stop_request_cancels_sleep_in_task");
}

#[test]
fn generators_and_awaiters_interleave() {
    init_test("generators_and_awaiters_interleave");
    let sched = Scheduler::new(SchedulerConfig::default());
    let log = Arc::new(Mutex::new(Vec::new()));
    let gate = FutureState::<()>::with_scheduler(&sched.handle());

    let (l, g) = (Arc::clone(&log), Arc::clone(&gate));
    sched.spawn(move |co: &Suspend<'_>| {
        if g.await_suspend(co.continuation()).is_none() {
            l.lock().push("awaiter parked");
            return Step::Suspended;
        }
        l.lock().push("awaiter resumed");
        Step::Complete
    });

    let (l, g) = (Arc::clone(&log), Arc::clone(&gate));
    let mut n = 0;
    sched.spawn_generator(move |_co: &Suspend<'_>| {
        n += 1;
        l.lock().push("tick");
        if n == 2 {
            g.set_value(());
        }
        if n == 3 {
            Step::Complete
        } else {
            Step::Suspended
        }
    });

    sched.run_until_notask();
    assert_eq!(
        *log.lock(),
        vec!["awaiter parked", "tick", "tick", "awaiter resumed", "tick"]
    );
    test_complete!("generators_and_awaiters_interleave");
}

#[test]
fn final_initiator_destroys_after_consumer() {
    init_test("final_initiator_destroys_after_consumer");
    let sched = Scheduler::new(SchedulerConfig::default());
    let order = Arc::new(Mutex::new(Vec::new()));
    let fut = FutureState::<u8>::with_scheduler(&sched.handle());

    struct Teardown(Arc<Mutex<Vec<&'static str>>>);
    impl Drop for Teardown {
        fn drop(&mut self) {
            self.0.lock().push("teardown");
        }
    }

    let teardown = Teardown(Arc::clone(&order));
    fut.set_initiator(
        Initiator::Final,
        Continuation::new(move |_co: &Suspend<'_>| {
            let _keep = &teardown;
            Step::Complete
        }),
    );
    let o = Arc::clone(&order);
    assert!(fut
        .await_suspend(Continuation::once(move || o.lock().push("consumer")))
        .is_none());

    fut.set_value(7);
    sched.run_until_notask();

    // The loop resumed the consumer, then came back for the teardown.
    assert_eq!(*order.lock(), vec!["consumer", "teardown"]);
    assert_eq!(fut.initiator(), Initiator::None);
    assert_eq!(fut.future_await_resume().ok(), Some(7));
    test_complete!("final_initiator_destroys_after_consumer");
}

#[test]
fn setup_body_and_deferred_teardown_run_in_order() {
    init_test("setup_body_and_deferred_teardown_run_in_order");
    let sched = Scheduler::new(SchedulerConfig::default());
    let order = Arc::new(Mutex::new(Vec::new()));

    let o = Arc::clone(&order);
    let setup = move || o.lock().push("setup".to_string());
    let (o, s) = (Arc::clone(&order), Arc::clone(&sched));
    let task = sched.spawn_with_setup(setup, move |ctx| {
        move |_co: &Suspend<'_>| {
            o.lock().push("body".to_string());
            let (o, s) = (Arc::clone(&o), Arc::clone(&s));
            assert!(ctx.defer(move || {
                let still_listed = s.task_count();
                o.lock().push(format!("teardown with {still_listed} task"));
            }));
            Step::Complete
        }
    });

    test_section!("setup runs alone in the first batch");
    assert_eq!(sched.run_one_batch(), 1);
    assert_eq!(*order.lock(), vec!["setup"]);

    test_section!("body and teardown");
    sched.run_until_notask();
    assert!(task.is_finished());
    assert_eq!(sched.task_count(), 0);
    assert_eq!(
        *order.lock(),
        vec!["setup", "body", "teardown with 1 task"]
    );
    test_complete!("setup_body_and_deferred_teardown_run_in_order");
}
