//! Built-in recurring timers installed by the daemon.
//!
//! One timer per action kind: the heartbeat is a closure, the stats reporter
//! is a shared event object, and the sweep is a plain callback carrying its
//! state as an opaque argument.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use timetracker::{
    CallbackArg, DueSpec, Outcome, TimerEvent, TimerId, TimerResult, Timetracker,
};
use tracing::{debug, info, warn};

use crate::config::HousekeepingConfig;

/// Periodic summary of tracker occupancy.
///
/// Holds the tracker weakly; the tracker owns this object through the
/// timer record.
#[derive(Debug)]
pub struct StatsReporter {
    tracker: Weak<Timetracker>,
    reports: AtomicU64,
}

impl StatsReporter {
    #[must_use]
    pub fn new(tracker: &Arc<Timetracker>) -> Self {
        Self {
            tracker: Arc::downgrade(tracker),
            reports: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn reports(&self) -> u64 {
        self.reports.load(Ordering::Relaxed)
    }
}

impl TimerEvent for StatsReporter {
    fn timer_fired(&self, id: TimerId) -> Outcome {
        let Some(tracker) = self.tracker.upgrade() else {
            return Outcome::Retire;
        };
        self.reports.fetch_add(1, Ordering::Relaxed);
        info!(
            timer_id = %id,
            live = tracker.len(),
            pending_removal = tracker.pending_removal(),
            next_trigger = ?tracker.next_trigger(),
            last_tick = %tracker.last_tick(),
            "timetracker stats"
        );
        Outcome::Reschedule
    }
}

/// State threaded through the sweep callback.
#[derive(Debug, Default)]
pub struct SweepState {
    runs: AtomicU64,
}

impl SweepState {
    #[must_use]
    pub fn runs(&self) -> u64 {
        self.runs.load(Ordering::Relaxed)
    }
}

fn sweep(id: TimerId, arg: &CallbackArg) -> Outcome {
    let Some(state) = arg.downcast_ref::<SweepState>() else {
        warn!(timer_id = %id, "sweep argument has the wrong type; retiring");
        return Outcome::Retire;
    };
    let run = state.runs.fetch_add(1, Ordering::Relaxed);
    debug!(timer_id = %id, run, "sweep");
    Outcome::Reschedule
}

/// Handles to the installed housekeeping timers.
#[derive(Debug)]
pub struct Housekeeping {
    pub heartbeat: TimerId,
    pub stats: TimerId,
    pub sweep: TimerId,
    pub heartbeats: Arc<AtomicU64>,
    pub reporter: Arc<StatsReporter>,
    pub sweep_state: Arc<SweepState>,
}

impl Housekeeping {
    /// Register the three housekeeping timers on `tracker`.
    ///
    /// # Errors
    ///
    /// Returns error if any registration is refused.
    pub fn install(tracker: &Arc<Timetracker>, config: &HousekeepingConfig) -> TimerResult<Self> {
        let heartbeats = Arc::new(AtomicU64::new(0));
        let beat_counter = Arc::clone(&heartbeats);
        let started = tracker.start_time();
        let clock_source = Arc::downgrade(tracker);
        let heartbeat = tracker.register_timer_fn(
            DueSpec::Slices(config.heartbeat),
            true,
            move |id| {
                let Some(tracker) = clock_source.upgrade() else {
                    return Outcome::Retire;
                };
                let beat = beat_counter.fetch_add(1, Ordering::Relaxed);
                let uptime = tracker.now().signed_duration_since(started);
                debug!(timer_id = %id, beat, uptime_secs = uptime.num_seconds(), "heartbeat");
                Outcome::Reschedule
            },
        )?;

        let reporter = Arc::new(StatsReporter::new(tracker));
        let stats = tracker.register_timer_event(
            DueSpec::Slices(config.stats),
            true,
            Arc::clone(&reporter) as Arc<dyn TimerEvent>,
        )?;

        let sweep_state = Arc::new(SweepState::default());
        let sweep = tracker.register_timer_callback(
            DueSpec::Slices(config.sweep),
            true,
            sweep,
            Arc::clone(&sweep_state) as CallbackArg,
        )?;

        info!(%heartbeat, %stats, %sweep, "housekeeping timers installed");
        Ok(Self {
            heartbeat,
            stats,
            sweep,
            heartbeats,
            reporter,
            sweep_state,
        })
    }

    /// Cancel every housekeeping timer still live.
    pub fn cancel(&self, tracker: &Timetracker) {
        for id in [self.heartbeat, self.stats, self.sweep] {
            if !tracker.remove_timer(id) {
                debug!(timer_id = %id, "housekeeping timer already gone");
            }
        }
    }
}
