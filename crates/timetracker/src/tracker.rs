//! The timetracker: registration, cancellation and the dispatch pass.
//!
//! # Locking
//!
//! Three locks, always taken in this order:
//!
//! 1. `dispatch` - held for a whole pass so only one pass runs at a time.
//! 2. `registry` - the id map and ordered sequence.
//! 3. `cleanup` - the pending-removal id list.
//!
//! No lock is held while an action runs. Actions may register, cancel and
//! inspect timers on the tracker that is firing them.

use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::action::{CallbackArg, CallbackFn, Outcome, TimerAction, TimerEvent};
use crate::config::TimetrackerConfig;
use crate::error::{TimerError, TimerResult};
use crate::queue::CleanupQueue;
use crate::record::{DueSpec, TimerId, TimerRecord, TimerSnapshot};
use crate::registry::Registry;
use crate::time::{Clock, SystemClock, Timestamp};

/// Counters for one dispatch pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TickReport {
    /// The single time snapshot every comparison in the pass used.
    pub captured_at: Timestamp,
    /// Actions invoked.
    pub fired: usize,
    /// Recurring timers that stay live with a new trigger time.
    pub rescheduled: usize,
    /// Timers finished by this pass.
    pub retired: usize,
    /// Cancelled records passed over without firing.
    pub skipped_cancelled: usize,
    /// Records physically erased during cleanup.
    pub removed: usize,
}

impl TickReport {
    const fn new(captured_at: Timestamp) -> Self {
        Self {
            captured_at,
            fired: 0,
            rescheduled: 0,
            retired: 0,
            skipped_cancelled: 0,
            removed: 0,
        }
    }
}

/// Clears the dispatching-thread marker when a pass ends, however it ends.
struct PassOwner<'a> {
    slot: &'a Mutex<Option<ThreadId>>,
}

impl<'a> PassOwner<'a> {
    fn claim(slot: &'a Mutex<Option<ThreadId>>) -> Self {
        *slot.lock() = Some(thread::current().id());
        Self { slot }
    }
}

impl Drop for PassOwner<'_> {
    fn drop(&mut self) {
        *self.slot.lock() = None;
    }
}

/// Tick-driven timer scheduler.
///
/// Share it behind an `Arc`; every method takes `&self`.
pub struct Timetracker {
    config: TimetrackerConfig,
    clock: Arc<dyn Clock>,
    start_time: Timestamp,
    last_tick: Mutex<Timestamp>,
    dispatch: Mutex<()>,
    dispatching_thread: Mutex<Option<ThreadId>>,
    registry: Mutex<Registry>,
    cleanup: CleanupQueue,
}

impl Timetracker {
    /// Create a tracker on the wall clock.
    #[must_use]
    pub fn new(config: TimetrackerConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a tracker on a caller-supplied clock.
    #[must_use]
    pub fn with_clock(config: TimetrackerConfig, clock: Arc<dyn Clock>) -> Self {
        let start_time = clock.now();
        Self {
            config,
            clock,
            start_time,
            last_tick: Mutex::new(start_time),
            dispatch: Mutex::new(()),
            dispatching_thread: Mutex::new(None),
            registry: Mutex::new(Registry::default()),
            cleanup: CleanupQueue::default(),
        }
    }

    /// Register a timer.
    ///
    /// Relative timers trigger `slices` after now and, when `recurring`,
    /// repeat with that period for as long as the action asks to continue.
    /// Absolute timers fire once at their trigger time.
    ///
    /// The capacity limit is an addition over plain argument validation:
    /// it is the only way a well-formed registration can be refused, and a
    /// large `max_timers` disables it in practice.
    ///
    /// # Errors
    ///
    /// Returns `CapacityExceeded` when `max_timers` records are already held,
    /// or `IdSpaceExhausted` if the id counter cannot advance.
    pub fn register(
        &self,
        due: DueSpec,
        recurring: bool,
        action: TimerAction,
    ) -> TimerResult<TimerId> {
        let now = self.clock.now();
        let mut registry = self.registry.lock();

        if registry.len() >= self.config.max_timers {
            return Err(TimerError::CapacityExceeded {
                max: self.config.max_timers,
            });
        }

        let id = registry.allocate_id()?;
        let record = TimerRecord::new(id, due, recurring, action, now);
        debug!(
            timer_id = %id,
            kind = record.action_kind(),
            recurring,
            trigger_at = %record.trigger_at(),
            "Timer registered"
        );
        registry.insert(Arc::new(record));

        Ok(id)
    }

    /// Register a function pointer with an opaque argument.
    ///
    /// # Errors
    ///
    /// See [`Timetracker::register`].
    pub fn register_timer_callback(
        &self,
        due: DueSpec,
        recurring: bool,
        func: CallbackFn,
        arg: CallbackArg,
    ) -> TimerResult<TimerId> {
        self.register(due, recurring, TimerAction::callback_shared(func, arg))
    }

    /// Register a shared event object.
    ///
    /// # Errors
    ///
    /// See [`Timetracker::register`].
    pub fn register_timer_event(
        &self,
        due: DueSpec,
        recurring: bool,
        handle: Arc<dyn TimerEvent>,
    ) -> TimerResult<TimerId> {
        self.register(due, recurring, TimerAction::event(handle))
    }

    /// Register an owned closure.
    ///
    /// # Errors
    ///
    /// See [`Timetracker::register`].
    pub fn register_timer_fn<F>(&self, due: DueSpec, recurring: bool, f: F) -> TimerResult<TimerId>
    where
        F: FnMut(TimerId) -> Outcome + Send + 'static,
    {
        self.register(due, recurring, TimerAction::closure(f))
    }

    /// Cancel a timer. Its action will not be invoked again.
    ///
    /// Returns immediately; the record is erased by the next pass's cleanup.
    ///
    /// # Errors
    ///
    /// Returns `UnknownTimerId` if the id was never issued or was already
    /// erased. Cancelling a record that is still held but already pending
    /// removal succeeds without queueing it again.
    pub fn cancel(&self, id: TimerId) -> TimerResult<()> {
        let registry = self.registry.lock();

        let record = registry.get(id).ok_or(TimerError::unknown_timer(id))?;
        if record.cancel() {
            self.cleanup.push(id);
            debug!(timer_id = %id, "Timer cancelled");
        } else {
            trace!(timer_id = %id, state = ?record.state(), "Timer already pending removal");
        }
        Ok(())
    }

    /// Boolean form of [`Timetracker::cancel`].
    pub fn remove_timer(&self, id: TimerId) -> bool {
        self.cancel(id).is_ok()
    }

    /// Run one dispatch pass.
    ///
    /// Concurrent callers block until the running pass finishes.
    ///
    /// # Errors
    ///
    /// Returns `ReentrantDispatch` when called from inside an action of the
    /// pass currently running on this thread.
    pub fn tick(&self) -> TimerResult<TickReport> {
        if *self.dispatching_thread.lock() == Some(thread::current().id()) {
            return Err(TimerError::ReentrantDispatch);
        }

        let _pass = self.dispatch.lock();
        let _owner = PassOwner::claim(&self.dispatching_thread);

        let now = self.clock.now();
        *self.last_tick.lock() = now;

        let working = self.registry.lock().snapshot_sorted();
        let mut report = TickReport::new(now);

        for record in &working {
            let id = record.id();

            if !record.is_active() {
                if record.is_cancelled() {
                    report.skipped_cancelled = report.skipped_cancelled.saturating_add(1);
                }
                self.cleanup.push(id);
                continue;
            }

            if record.trigger_at() > now {
                break;
            }

            let started = Instant::now();
            let outcome = record.fire();
            report.fired = report.fired.saturating_add(1);
            self.warn_if_slow(id, started.elapsed());

            if outcome.is_reschedule() && record.recurring() && record.is_active() {
                if let Some(next) = record.reschedule_from(now) {
                    trace!(timer_id = %id, trigger_at = %next, "Timer rescheduled");
                    report.rescheduled = report.rescheduled.saturating_add(1);
                    continue;
                }
            }

            if record.retire() {
                debug!(timer_id = %id, ?outcome, "Timer retired");
                report.retired = report.retired.saturating_add(1);
            }
            self.cleanup.push(id);
        }

        report.removed = self.run_cleanup();

        trace!(
            fired = report.fired,
            rescheduled = report.rescheduled,
            retired = report.retired,
            removed = report.removed,
            "Dispatch pass complete"
        );

        Ok(report)
    }

    /// Erase every queued id from both registry views.
    fn run_cleanup(&self) -> usize {
        let mut registry = self.registry.lock();
        self.cleanup
            .drain()
            .into_iter()
            .filter(|id| registry.erase(*id))
            .count()
    }

    fn warn_if_slow(&self, id: TimerId, elapsed: Duration) {
        let limit = Duration::from_millis(self.config.slow_action_warn_ms);
        if elapsed > limit {
            warn!(
                timer_id = %id,
                elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                limit_ms = self.config.slow_action_warn_ms,
                "Timer action exceeded slow threshold"
            );
        }
    }

    /// Number of records held, including those pending removal.
    pub fn len(&self) -> usize {
        self.registry.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `id` is still held by the registry.
    pub fn contains(&self, id: TimerId) -> bool {
        self.registry.lock().get(id).is_some()
    }

    pub fn get(&self, id: TimerId) -> Option<TimerSnapshot> {
        self.registry.lock().get(id).map(|record| record.snapshot())
    }

    /// Ids in dispatch order as of the last sort.
    pub fn ordered_ids(&self) -> Vec<TimerId> {
        self.registry.lock().ordered_ids()
    }

    /// Earliest trigger time of any timer that can still fire.
    pub fn next_trigger(&self) -> Option<Timestamp> {
        self.registry.lock().next_trigger()
    }

    /// Ids waiting for the next cleanup phase.
    pub fn pending_removal(&self) -> usize {
        self.cleanup.len()
    }

    /// When this tracker was created.
    pub const fn start_time(&self) -> Timestamp {
        self.start_time
    }

    /// Captured time of the most recent pass, or the start time before any.
    pub fn last_tick(&self) -> Timestamp {
        *self.last_tick.lock()
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    pub const fn config(&self) -> &TimetrackerConfig {
        &self.config
    }
}

impl std::fmt::Debug for Timetracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Timetracker")
            .field("config", &self.config)
            .field("start_time", &self.start_time)
            .field("timers", &self.len())
            .finish_non_exhaustive()
    }
}

impl Drop for Timetracker {
    fn drop(&mut self) {
        let live = self.registry.get_mut().len();
        if live > 0 {
            debug!(live, "Timetracker dropped; releasing timers");
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]
    #![allow(clippy::panic)]

    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::time::{ManualClock, Timeslices};

    fn tracker() -> (Arc<ManualClock>, Timetracker) {
        let clock = Arc::new(ManualClock::default());
        let tracker = Timetracker::with_clock(TimetrackerConfig::default(), clock.clone());
        (clock, tracker)
    }

    #[test]
    fn test_register_returns_increasing_ids() {
        let (_clock, tracker) = tracker();
        let a = tracker
            .register_timer_fn(DueSpec::slices(1).unwrap(), false, |_| Outcome::Retire)
            .unwrap();
        let b = tracker
            .register_timer_fn(DueSpec::slices(1).unwrap(), false, |_| Outcome::Retire)
            .unwrap();
        assert!(b > a);
        assert_eq!(tracker.len(), 2);
    }

    #[test]
    fn test_capacity_limit() {
        let clock = Arc::new(ManualClock::default());
        let tracker =
            Timetracker::with_clock(TimetrackerConfig::default().with_max_timers(1), clock);

        tracker
            .register_timer_fn(DueSpec::slices(1).unwrap(), false, |_| Outcome::Retire)
            .unwrap();
        let second =
            tracker.register_timer_fn(DueSpec::slices(1).unwrap(), false, |_| Outcome::Retire);

        assert_eq!(second, Err(TimerError::CapacityExceeded { max: 1 }));
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_cancel_unknown_id() {
        let (_clock, tracker) = tracker();
        let missing = TimerId::from_raw(77);
        assert_eq!(tracker.cancel(missing), Err(TimerError::UnknownTimerId(missing)));
        assert!(!tracker.remove_timer(missing));
    }

    #[test]
    fn test_cancel_twice_succeeds_while_record_is_held() {
        let (_clock, tracker) = tracker();
        let id = tracker
            .register_timer_fn(DueSpec::slices(50).unwrap(), false, |_| Outcome::Retire)
            .unwrap();

        assert!(tracker.remove_timer(id));
        assert!(tracker.contains(id));
        assert!(tracker.remove_timer(id));
        assert_eq!(tracker.cancel(id), Ok(()));
        // Only the first transition queues the id.
        assert_eq!(tracker.pending_removal(), 1);

        tracker.tick().unwrap();
        assert!(!tracker.contains(id));
        assert!(!tracker.remove_timer(id));
    }

    #[test]
    fn test_cancel_defers_physical_removal_to_tick() {
        let (_clock, tracker) = tracker();
        let id = tracker
            .register_timer_fn(DueSpec::slices(50).unwrap(), false, |_| Outcome::Retire)
            .unwrap();

        assert!(tracker.remove_timer(id));
        assert!(tracker.contains(id));
        assert!(tracker.get(id).unwrap().state.is_cancelled());

        let report = tracker.tick().unwrap();
        assert_eq!(report.removed, 1);
        assert!(!tracker.contains(id));
        assert_eq!(tracker.pending_removal(), 0);
    }

    #[test]
    fn test_tick_records_last_tick_time() {
        let (clock, tracker) = tracker();
        assert_eq!(tracker.last_tick(), tracker.start_time());

        clock.advance(Timeslices::new(3).unwrap());
        let report = tracker.tick().unwrap();
        assert_eq!(report.captured_at, clock.now());
        assert_eq!(tracker.last_tick(), clock.now());
    }

    #[test]
    fn test_reentrant_tick_is_rejected() {
        let (_clock, tracker) = tracker();
        let tracker = Arc::new(tracker);
        let inner_result = Arc::new(Mutex::new(None));

        let weak = Arc::downgrade(&tracker);
        let slot = Arc::clone(&inner_result);
        tracker
            .register_timer_fn(DueSpec::slices(0).unwrap(), false, move |_| {
                if let Some(tracker) = weak.upgrade() {
                    *slot.lock() = Some(tracker.tick());
                }
                Outcome::Retire
            })
            .unwrap();

        let report = tracker.tick().unwrap();
        assert_eq!(report.fired, 1);
        assert_eq!(*inner_result.lock(), Some(Err(TimerError::ReentrantDispatch)));

        // The marker is cleared once the pass ends.
        assert!(tracker.tick().is_ok());
    }

    #[test]
    fn test_absolute_recurring_timer_fires_once() {
        let (clock, tracker) = tracker();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);

        tracker
            .register_timer_fn(DueSpec::at(clock.now()), true, move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Outcome::Reschedule
            })
            .unwrap();

        tracker.tick().unwrap();
        clock.advance(Timeslices::from_secs(10));
        tracker.tick().unwrap();

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_action_cancelling_itself_is_not_rescheduled() {
        let (_clock, tracker) = tracker();
        let tracker = Arc::new(tracker);
        let weak = Arc::downgrade(&tracker);

        let id = tracker
            .register_timer_fn(DueSpec::slices(0).unwrap(), true, move |id| {
                if let Some(tracker) = weak.upgrade() {
                    tracker.remove_timer(id);
                }
                Outcome::Reschedule
            })
            .unwrap();

        let report = tracker.tick().unwrap();
        assert_eq!(report.fired, 1);
        assert_eq!(report.rescheduled, 0);
        assert!(!tracker.contains(id));
    }

    #[test]
    fn test_next_trigger_tracks_earliest_live_timer() {
        let (clock, tracker) = tracker();
        assert_eq!(tracker.next_trigger(), None);

        tracker
            .register_timer_fn(DueSpec::slices(20).unwrap(), false, |_| Outcome::Retire)
            .unwrap();
        let soon = tracker
            .register_timer_fn(DueSpec::slices(5).unwrap(), false, |_| Outcome::Retire)
            .unwrap();

        assert_eq!(
            tracker.next_trigger(),
            Some(Timeslices::new(5).unwrap().after(clock.now()))
        );
        assert_eq!(tracker.ordered_ids().first(), Some(&soon));
    }
}
