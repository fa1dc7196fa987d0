//! Timer records: identity, scheduling state and lifecycle.

use std::sync::atomic::{AtomicU8, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::action::{Outcome, TimerAction};
use crate::error::TimerResult;
use crate::time::{Timeslices, Timestamp, timestamp_from_timeval};

/// Unique identifier for a timer. Never reused by the scheduler that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimerId(u64);

impl TimerId {
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for TimerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "timer-{}", self.0)
    }
}

/// When a timer first becomes due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DueSpec {
    /// Relative to registration time. The slice count is also the period.
    Slices(Timeslices),
    /// Absolute trigger time. Fires at most once.
    At(Timestamp),
}

impl DueSpec {
    /// Relative due spec from a raw slice count.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInterval` for a negative or oversized count.
    pub fn slices(slices: i64) -> TimerResult<Self> {
        Timeslices::new(slices).map(Self::Slices)
    }

    #[must_use]
    pub const fn at(trigger: Timestamp) -> Self {
        Self::At(trigger)
    }

    /// Absolute due spec from seconds and microseconds.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInterval` for a malformed pair.
    pub fn at_timeval(secs: i64, usecs: u32) -> TimerResult<Self> {
        timestamp_from_timeval(secs, usecs).map(Self::At)
    }

    /// The reschedule period, present only for relative timers.
    #[must_use]
    pub const fn period(&self) -> Option<Timeslices> {
        match self {
            Self::Slices(slices) => Some(*slices),
            Self::At(_) => None,
        }
    }

    #[must_use]
    pub fn first_trigger(&self, now: Timestamp) -> Timestamp {
        match self {
            Self::Slices(slices) => slices.after(now),
            Self::At(trigger) => *trigger,
        }
    }
}

impl From<Timeslices> for DueSpec {
    fn from(value: Timeslices) -> Self {
        Self::Slices(value)
    }
}

impl From<Timestamp> for DueSpec {
    fn from(value: Timestamp) -> Self {
        Self::At(value)
    }
}

/// Lifecycle of a record still held by the registry.
///
/// Anything other than `Active` is pending removal; a removed record is
/// simply absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum TimerState {
    Active = 0,
    Cancelled = 1,
    Retired = 2,
}

impl TimerState {
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }

    #[must_use]
    pub const fn is_cancelled(self) -> bool {
        matches!(self, Self::Cancelled)
    }

    #[must_use]
    pub const fn is_pending_removal(self) -> bool {
        !self.is_active()
    }

    const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Active,
            1 => Self::Cancelled,
            _ => Self::Retired,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Schedule {
    scheduled_at: Timestamp,
    trigger_at: Timestamp,
}

/// Point-in-time view of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerSnapshot {
    pub id: TimerId,
    pub scheduled_at: Timestamp,
    pub trigger_at: Timestamp,
    pub period: Option<Timeslices>,
    pub recurring: bool,
    pub state: TimerState,
}

/// One timer owned by the registry.
///
/// `schedule` is only rewritten by the dispatch pass; `action` is only locked
/// while firing. Both are leaf locks.
#[derive(Debug)]
pub(crate) struct TimerRecord {
    id: TimerId,
    period: Option<Timeslices>,
    recurring: bool,
    state: AtomicU8,
    schedule: Mutex<Schedule>,
    action: Mutex<TimerAction>,
}

impl TimerRecord {
    pub(crate) fn new(
        id: TimerId,
        due: DueSpec,
        recurring: bool,
        action: TimerAction,
        now: Timestamp,
    ) -> Self {
        Self {
            id,
            period: due.period(),
            recurring,
            state: AtomicU8::new(TimerState::Active as u8),
            schedule: Mutex::new(Schedule {
                scheduled_at: now,
                trigger_at: due.first_trigger(now),
            }),
            action: Mutex::new(action),
        }
    }

    pub(crate) const fn id(&self) -> TimerId {
        self.id
    }

    pub(crate) const fn recurring(&self) -> bool {
        self.recurring
    }

    pub(crate) fn trigger_at(&self) -> Timestamp {
        self.schedule.lock().trigger_at
    }

    pub(crate) fn state(&self) -> TimerState {
        TimerState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn is_active(&self) -> bool {
        self.state().is_active()
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.state().is_cancelled()
    }

    /// `Active -> Cancelled`. False if the record already left `Active`.
    pub(crate) fn cancel(&self) -> bool {
        self.leave_active(TimerState::Cancelled)
    }

    /// `Active -> Retired`. False if the record already left `Active`.
    pub(crate) fn retire(&self) -> bool {
        self.leave_active(TimerState::Retired)
    }

    fn leave_active(&self, to: TimerState) -> bool {
        self.state
            .compare_exchange(
                TimerState::Active as u8,
                to as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    pub(crate) fn fire(&self) -> Outcome {
        self.action.lock().fire(self.id)
    }

    pub(crate) fn action_kind(&self) -> &'static str {
        self.action.lock().kind()
    }

    /// Restart the period from `now`. `None` for absolute timers.
    pub(crate) fn reschedule_from(&self, now: Timestamp) -> Option<Timestamp> {
        let period = self.period?;
        let mut schedule = self.schedule.lock();
        schedule.scheduled_at = now;
        schedule.trigger_at = period.after(now);
        Some(schedule.trigger_at)
    }

    pub(crate) fn snapshot(&self) -> TimerSnapshot {
        let schedule = *self.schedule.lock();
        TimerSnapshot {
            id: self.id,
            scheduled_at: schedule.scheduled_at,
            trigger_at: schedule.trigger_at,
            period: self.period,
            recurring: self.recurring,
            state: self.state(),
        }
    }
}
