//! # Timetracker
//!
//! Tick-driven timer scheduling for long-running daemons.
//!
//! Producers register one-shot or recurring timers from any thread; a
//! periodic driver calls [`Timetracker::tick`] to fire whatever is due.
//! Cancellation is deferred: a cancelled timer never fires again and is
//! erased during the cleanup phase of the next pass.
//!
//! ```
//! use timetracker::{DueSpec, Outcome, Timetracker, TimetrackerConfig};
//!
//! # fn main() -> timetracker::TimerResult<()> {
//! let tracker = Timetracker::new(TimetrackerConfig::default());
//! let id = tracker.register_timer_fn(DueSpec::slices(0)?, false, |_id| Outcome::Retire)?;
//!
//! let report = tracker.tick()?;
//! assert_eq!(report.fired, 1);
//! assert!(!tracker.contains(id));
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![deny(clippy::expect_used)]

mod action;
mod config;
mod error;
mod queue;
mod record;
mod registry;
mod time;
mod tracker;

pub use action::{CallbackArg, CallbackFn, Outcome, TimerAction, TimerClosure, TimerEvent};
pub use config::TimetrackerConfig;
pub use error::{TimerError, TimerResult};
pub use record::{DueSpec, TimerId, TimerSnapshot, TimerState};
pub use time::{
    Clock, MAX_TIMESLICES, MICROS_PER_SECOND, MICROS_PER_SLICE, ManualClock, SystemClock,
    TICKS_PER_SECOND, Timeslices, Timestamp, timestamp_from_timeval,
};
pub use tracker::{TickReport, Timetracker};
