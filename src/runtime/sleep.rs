//! Sleeping as a future.
//!
//! [`sleep_for`] returns a future-state that the scheduler's timer resolves
//! with `()`. If the supplied stop token fires first, the timer is stopped
//! and the future fails with [`ErrorKind::TimerCanceled`]. The timer's
//! armed-state transition decides which of the two happens.
//!
//! The timer is bound to the returned future: dropping the future before the
//! deadline stops the timer, so an abandoned sleep does not hold the run loop
//! open.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::trace;

use crate::cancel::{StopCallback, StopToken};
use crate::error::{Error, ErrorKind};
use crate::runtime::scheduler::Scheduler;
use crate::state::{FutureState, StateRef};

/// Returns a future resolved after `duration` on `scheduler`'s loop.
#[must_use]
pub fn sleep_for(
    scheduler: &Arc<Scheduler>,
    duration: Duration,
    stop: &StopToken,
) -> Arc<FutureState<()>> {
    let now = Instant::now();
    let deadline = now
        .checked_add(duration)
        .unwrap_or_else(|| now + Duration::from_secs(60 * 60 * 24 * 365));
    sleep_until(scheduler, deadline, stop)
}

/// Returns a future resolved at `deadline` on `scheduler`'s loop.
#[must_use]
pub fn sleep_until(
    scheduler: &Arc<Scheduler>,
    deadline: Instant,
    stop: &StopToken,
) -> Arc<FutureState<()>> {
    let future = FutureState::<()>::with_scheduler(&scheduler.handle());
    if stop.stop_requested() {
        future.set_exception(Error::new(ErrorKind::TimerCanceled));
        return future;
    }

    let guard: Arc<Mutex<Option<StopCallback>>> = Arc::new(Mutex::new(None));
    let on_fire = Arc::downgrade(&future);
    let fire_guard = Arc::clone(&guard);
    let owner: StateRef = future.clone();
    let timer = scheduler.add_owned_timer_at(deadline, &owner, move || {
        drop(fire_guard.lock().take());
        if let Some(future) = on_fire.upgrade() {
            trace!("sleep elapsed");
            future.set_value(());
        }
    });

    if stop.stop_possible() {
        let on_stop = Arc::downgrade(&future);
        let callback = StopCallback::new(stop, move || {
            if timer.stop() {
                if let Some(future) = on_stop.upgrade() {
                    trace!("sleep canceled");
                    future.set_exception(Error::new(ErrorKind::TimerCanceled));
                }
            }
        });
        *guard.lock() = Some(callback);
    }
    future
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::StopSource;
    use crate::coroutine::{Step, Suspend};
    use crate::runtime::config::SchedulerConfig;
    use crate::test_utils::init_test_logging;

    fn init_test(name: &str) {
        init_test_logging();
        crate::test_phase!(name);
    }

    #[test]
    fn sleep_resolves_after_duration() {
        init_test("sleep_resolves_after_duration");
        let sched = Scheduler::new(SchedulerConfig::default());
        let start = Instant::now();
        let outcome = Arc::new(Mutex::new(None));

        let s = Arc::clone(&sched);
        let out = Arc::clone(&outcome);
        let mut sleeper = None;
        sched.spawn(move |co: &Suspend<'_>| {
            let fut = sleeper
                .get_or_insert_with(|| sleep_for(&s, Duration::from_millis(15), &StopToken::never()));
            if fut.await_suspend(co.continuation()).is_none() {
                return Step::Suspended;
            }
            *out.lock() = Some(fut.future_await_resume().map_err(|e| e.kind()));
            Step::Complete
        });
        sched.run_until_notask();

        assert_eq!(*outcome.lock(), Some(Ok(())));
        assert!(start.elapsed() >= Duration::from_millis(15));
        crate::test_complete!("sleep_resolves_after_duration");
    }

    #[test]
    fn stop_request_cancels_sleep() {
        init_test("stop_request_cancels_sleep");
        let sched = Scheduler::new(SchedulerConfig::default());
        let source = StopSource::new();
        let fut = sleep_for(&sched, Duration::from_secs(60), &source.token());
        assert!(sched.has_timers());

        assert!(source.request_stop());
        assert!(!sched.has_timers());
        let err = fut.future_await_resume().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TimerCanceled);
        assert!(err.is_cancelled());

        sched.run_until_notask();
        crate::test_complete!("stop_request_cancels_sleep");
    }

    #[test]
    fn already_stopped_fails_immediately() {
        init_test("already_stopped_fails_immediately");
        let sched = Scheduler::new(SchedulerConfig::default());
        let source = StopSource::new();
        source.request_stop();
        let fut = sleep_for(&sched, Duration::from_secs(60), &source.token());
        assert!(fut.is_ready());
        assert!(!sched.has_timers());
        crate::test_complete!("already_stopped_fails_immediately");
    }

    #[test]
    fn dropped_sleep_releases_run_loop() {
        init_test("dropped_sleep_releases_run_loop");
        let sched = Scheduler::new(SchedulerConfig::default());
        let source = StopSource::new();
        let fut = sleep_for(&sched, Duration::from_secs(2), &source.token());
        assert!(sched.has_timers());

        drop(fut);
        assert!(!sched.has_timers());
        let start = Instant::now();
        sched.run_until_notask();
        let elapsed = start.elapsed();
        crate::assert_with_log!(
            elapsed < Duration::from_secs(1),
            "run loop returns without waiting for the deadline",
            "< 1s",
            elapsed
        );
        // The stop callback went away with the timer.
        source.request_stop();
        assert!(!sched.has_timers());
        crate::test_complete!("dropped_sleep_releases_run_loop");
    }

    #[test]
    fn sleep_raced_against_event_does_not_linger() {
        init_test("sleep_raced_against_event_does_not_linger");
        let sched = Scheduler::new(SchedulerConfig::default());
        let event = crate::event::Event::new(false);
        let outcome = Arc::new(Mutex::new(None));

        let (ev, s, out) = (event.clone(), Arc::clone(&sched), Arc::clone(&outcome));
        let mut race: Option<(Arc<FutureState<()>>, crate::event::EventWait)> = None;
        sched.spawn(move |co: &Suspend<'_>| {
            if race.is_none() {
                let sleeper = sleep_for(&s, Duration::from_secs(30), &StopToken::never());
                let wait = ev.wait(&s, co);
                let suspended = wait.suspended();
                race = Some((sleeper, wait));
                if suspended {
                    return Step::Suspended;
                }
            }
            if let Some((sleeper, wait)) = race.take() {
                *out.lock() = Some((wait.outcome().is_signaled(), sleeper.is_ready()));
            }
            Step::Complete
        });
        sched.run_one_batch();
        event.signal();

        let start = Instant::now();
        sched.run_until_notask();
        assert!(start.elapsed() < Duration::from_secs(5));
        assert_eq!(*outcome.lock(), Some((true, false)));
        assert!(!sched.has_timers());
        crate::test_complete!("sleep_raced_against_event_does_not_linger");
    }

    #[test]
    fn stop_after_fire_is_ignored() {
        init_test("stop_after_fire_is_ignored");
        let sched = Scheduler::new(SchedulerConfig::default());
        let source = StopSource::new();
        let fut = sleep_for(&sched, Duration::ZERO, &source.token());
        sched.run_until_notask();
        source.request_stop();
        assert!(fut.future_await_resume().is_ok());
        crate::test_complete!("stop_after_fire_is_ignored");
    }
}
