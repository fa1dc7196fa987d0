//! Configuration for the timetracker.

use serde::{Deserialize, Serialize};

use crate::error::{TimerError, TimerResult};

/// Scheduler limits and diagnostics thresholds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimetrackerConfig {
    /// Maximum number of records held at once, including pending removals.
    #[serde(default = "default_max_timers")]
    pub max_timers: usize,

    /// Actions running longer than this are logged at warn level.
    #[serde(default = "default_slow_action_warn_ms")]
    pub slow_action_warn_ms: u64,
}

const fn default_max_timers() -> usize {
    10_000
}

const fn default_slow_action_warn_ms() -> u64 {
    250
}

impl Default for TimetrackerConfig {
    fn default() -> Self {
        Self {
            max_timers: default_max_timers(),
            slow_action_warn_ms: default_slow_action_warn_ms(),
        }
    }
}

impl TimetrackerConfig {
    /// Override the capacity limit.
    #[must_use]
    pub const fn with_max_timers(mut self, max_timers: usize) -> Self {
        self.max_timers = max_timers;
        self
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns error if `max_timers` is zero.
    pub fn validate(&self) -> TimerResult<()> {
        if self.max_timers == 0 {
            return Err(TimerError::invalid_config(
                "max_timers must be greater than zero",
            ));
        }
        Ok(())
    }
}
