//! Timer-specific error types

use thiserror::Error;

use crate::record::TimerId;

/// Errors reported synchronously by registration, cancellation and dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimerError {
    #[error("Invalid interval: {reason}")]
    InvalidInterval { reason: String },

    #[error("Unknown timer id: {0}")]
    UnknownTimerId(TimerId),

    #[error("Timer capacity exceeded: at most {max} live timers")]
    CapacityExceeded { max: usize },

    #[error("Timer id space exhausted")]
    IdSpaceExhausted,

    #[error("tick() called from inside a timer action on the dispatching thread")]
    ReentrantDispatch,

    #[error("Invalid timetracker configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl TimerError {
    pub fn invalid_interval(reason: impl Into<String>) -> Self {
        Self::InvalidInterval {
            reason: reason.into(),
        }
    }

    pub const fn unknown_timer(id: TimerId) -> Self {
        Self::UnknownTimerId(id)
    }

    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }
}

/// Result type for timer operations
pub type TimerResult<T> = std::result::Result<T, TimerError>;
