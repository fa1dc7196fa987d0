//! What a timer does when it fires.

use std::any::Any;
use std::sync::Arc;

use crate::record::TimerId;

/// Result of one firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Keep the timer live; recurring relative timers are rescheduled.
    Reschedule,
    /// The timer is finished.
    Retire,
}

impl Outcome {
    /// Map an integer status code. Positive continues, zero or negative retires.
    #[must_use]
    pub const fn from_code(code: i32) -> Self {
        if code > 0 { Self::Reschedule } else { Self::Retire }
    }

    #[must_use]
    pub const fn is_reschedule(self) -> bool {
        matches!(self, Self::Reschedule)
    }
}

/// A long-lived, stateful object that receives timer firings.
///
/// Implementors own their interior mutability; the handle is shared.
pub trait TimerEvent: Send + Sync {
    /// Called when a timer registered with this handle is due.
    fn timer_fired(&self, id: TimerId) -> Outcome;
}

/// Opaque argument passed back to a [`CallbackFn`]. Downcast to recover it.
pub type CallbackArg = Arc<dyn Any + Send + Sync>;

/// Plain function callback.
pub type CallbackFn = fn(TimerId, &CallbackArg) -> Outcome;

/// Owned closure callback.
pub type TimerClosure = Box<dyn FnMut(TimerId) -> Outcome + Send>;

/// The action bound to a timer record. Exactly one variant per record.
pub enum TimerAction {
    /// Function pointer plus opaque argument.
    Callback { func: CallbackFn, arg: CallbackArg },
    /// Shared handle to a stateful event object.
    Event(Arc<dyn TimerEvent>),
    /// Owned closure.
    Closure(TimerClosure),
}

impl TimerAction {
    /// Function pointer with an argument of any shareable type.
    pub fn callback<A: Any + Send + Sync>(func: CallbackFn, arg: A) -> Self {
        Self::Callback {
            func,
            arg: Arc::new(arg),
        }
    }

    /// Function pointer with an already shared argument.
    #[must_use]
    pub fn callback_shared(func: CallbackFn, arg: CallbackArg) -> Self {
        Self::Callback { func, arg }
    }

    #[must_use]
    pub fn event(handle: Arc<dyn TimerEvent>) -> Self {
        Self::Event(handle)
    }

    pub fn closure<F>(f: F) -> Self
    where
        F: FnMut(TimerId) -> Outcome + Send + 'static,
    {
        Self::Closure(Box::new(f))
    }

    /// Variant name, for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Callback { .. } => "callback",
            Self::Event(_) => "event",
            Self::Closure(_) => "closure",
        }
    }

    /// Invoke the action for timer `id`.
    pub fn fire(&mut self, id: TimerId) -> Outcome {
        match self {
            Self::Callback { func, arg } => func(id, arg),
            Self::Event(handle) => handle.timer_fired(id),
            Self::Closure(f) => f(id),
        }
    }
}

impl std::fmt::Debug for TimerAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("TimerAction").field(&self.kind()).finish()
    }
}
