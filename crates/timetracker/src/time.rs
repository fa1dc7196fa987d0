//! Timeslice units, timestamps and clocks.
//!
//! Relative timers are expressed in timeslices: fixed fractions of a second
//! defined by [`TICKS_PER_SECOND`]. Every conversion from slices to wall time
//! goes through [`Timeslices::to_duration`].

use chrono::{DateTime, SubsecRound, TimeDelta, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{TimerError, TimerResult};

/// Number of timeslices in one second.
pub const TICKS_PER_SECOND: i64 = 10;

/// Microseconds in one second.
pub const MICROS_PER_SECOND: i64 = 1_000_000;

/// Microseconds covered by a single timeslice.
pub const MICROS_PER_SLICE: i64 = MICROS_PER_SECOND / TICKS_PER_SECOND;

/// Largest accepted interval: one hundred years of slices.
pub const MAX_TIMESLICES: i64 = 100 * 365 * 24 * 3600 * TICKS_PER_SECOND;

/// Scheduler timestamps, kept at microsecond resolution.
pub type Timestamp = DateTime<Utc>;

/// A non-negative relative interval measured in scheduler ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Timeslices(i64);

impl Timeslices {
    /// Zero slices: due on the next pass.
    pub const ZERO: Self = Self(0);

    /// Validate a raw slice count.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInterval` for negative counts or counts above
    /// [`MAX_TIMESLICES`].
    pub fn new(slices: i64) -> TimerResult<Self> {
        if slices < 0 {
            return Err(TimerError::invalid_interval(format!(
                "negative timeslice count {slices}"
            )));
        }
        if slices > MAX_TIMESLICES {
            return Err(TimerError::invalid_interval(format!(
                "timeslice count {slices} exceeds maximum {MAX_TIMESLICES}"
            )));
        }
        Ok(Self(slices))
    }

    /// Whole seconds expressed as slices, clamped to [`MAX_TIMESLICES`].
    #[must_use]
    pub fn from_secs(secs: u32) -> Self {
        Self(i64::from(secs).saturating_mul(TICKS_PER_SECOND).min(MAX_TIMESLICES))
    }

    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }

    /// Convert to a wall-clock offset.
    ///
    /// Whole seconds come from `slices / TICKS_PER_SECOND`, the remainder is
    /// scaled to microseconds. Sub-second overflow carries into seconds.
    #[must_use]
    pub fn to_duration(self) -> TimeDelta {
        let whole_secs = self.0 / TICKS_PER_SECOND;
        let frac_micros = (self.0 % TICKS_PER_SECOND).saturating_mul(MICROS_PER_SLICE);

        TimeDelta::try_seconds(whole_secs)
            .and_then(|secs| secs.checked_add(&TimeDelta::microseconds(frac_micros)))
            .unwrap_or(TimeDelta::MAX)
    }

    /// The instant `self` slices after `from`.
    #[must_use]
    pub fn after(self, from: Timestamp) -> Timestamp {
        from.checked_add_signed(self.to_duration())
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

impl TryFrom<i64> for Timeslices {
    type Error = TimerError;

    fn try_from(value: i64) -> TimerResult<Self> {
        Self::new(value)
    }
}

impl From<Timeslices> for i64 {
    fn from(value: Timeslices) -> Self {
        value.0
    }
}

impl std::fmt::Display for Timeslices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} slices", self.0)
    }
}

/// Build a timestamp from a (seconds, microseconds) pair.
///
/// # Errors
///
/// Returns `InvalidInterval` if `usecs` is not below one second or the
/// seconds fall outside the representable range.
pub fn timestamp_from_timeval(secs: i64, usecs: u32) -> TimerResult<Timestamp> {
    if i64::from(usecs) >= MICROS_PER_SECOND {
        return Err(TimerError::invalid_interval(format!(
            "microsecond field {usecs} is not below one second"
        )));
    }

    DateTime::from_timestamp(secs, usecs.saturating_mul(1_000)).ok_or_else(|| {
        TimerError::invalid_interval(format!("timestamp {secs}.{usecs:06} is out of range"))
    })
}

/// Source of "now" for the scheduler.
pub trait Clock: Send + Sync {
    /// Current time at microsecond resolution.
    fn now(&self) -> Timestamp;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now().trunc_subsecs(6)
    }
}

/// Deterministic clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Timestamp>,
}

impl ManualClock {
    #[must_use]
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Mutex::new(start.trunc_subsecs(6)),
        }
    }

    /// Move the clock forward by `slices`.
    pub fn advance(&self, slices: Timeslices) {
        let mut now = self.now.lock();
        *now = slices.after(*now);
    }

    /// Move the clock forward by whole microseconds.
    pub fn advance_micros(&self, micros: i64) {
        let mut now = self.now.lock();
        *now = now
            .checked_add_signed(TimeDelta::microseconds(micros))
            .unwrap_or(*now);
    }

    pub fn set(&self, at: Timestamp) {
        *self.now.lock() = at.trunc_subsecs(6);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(DateTime::<Utc>::UNIX_EPOCH)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.now.lock()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]
    #![allow(clippy::panic)]
    #![allow(clippy::arithmetic_side_effects)]

    use super::*;

    #[test]
    fn test_negative_slices_rejected() {
        assert!(matches!(
            Timeslices::new(-1),
            Err(TimerError::InvalidInterval { .. })
        ));
    }

    #[test]
    fn test_slices_above_maximum_rejected() {
        assert!(Timeslices::new(MAX_TIMESLICES).is_ok());
        assert!(Timeslices::new(MAX_TIMESLICES + 1).is_err());
    }

    #[test]
    fn test_whole_and_fractional_conversion() {
        let d = Timeslices::new(25).unwrap().to_duration();
        assert_eq!(d.num_seconds(), 2);
        assert_eq!(d.num_microseconds(), Some(2_500_000));
    }

    #[test]
    fn test_sub_second_fraction_carries_into_seconds() {
        let start = timestamp_from_timeval(100, 900_000).unwrap();
        let next = Timeslices::new(3).unwrap().after(start);
        assert_eq!(next, timestamp_from_timeval(101, 200_000).unwrap());
    }

    #[test]
    fn test_from_secs_uses_tick_rate() {
        assert_eq!(Timeslices::from_secs(3).get(), 3 * TICKS_PER_SECOND);
    }

    #[test]
    fn test_from_secs_clamps_to_maximum() {
        let huge = Timeslices::from_secs(u32::MAX);
        assert_eq!(huge.get(), MAX_TIMESLICES);
        // Still accepted by the validating path.
        assert_eq!(Timeslices::try_from(i64::from(huge)).unwrap(), huge);
    }

    #[test]
    fn test_timeval_rejects_full_second_of_micros() {
        assert!(timestamp_from_timeval(0, 1_000_000).is_err());
        assert!(timestamp_from_timeval(0, 999_999).is_ok());
    }

    #[test]
    fn test_manual_clock_advances_only_on_request() {
        let clock = ManualClock::default();
        let before = clock.now();
        assert_eq!(clock.now(), before);

        clock.advance(Timeslices::new(1).unwrap());
        assert_eq!(
            (clock.now() - before).num_microseconds(),
            Some(MICROS_PER_SLICE)
        );
    }

    #[test]
    fn test_system_clock_is_microsecond_truncated() {
        let now = SystemClock.now();
        assert_eq!(now.timestamp_subsec_nanos() % 1_000, 0);
    }
}
