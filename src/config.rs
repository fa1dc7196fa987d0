//! Daemon configuration loaded from TOML.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tickd_core::{Error, Result};
use timetracker::{Timeslices, TimetrackerConfig};

use crate::cli::Args;

/// Top-level daemon configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Milliseconds between dispatch passes.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Fallback tracing filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,

    #[serde(default)]
    pub timetracker: TimetrackerConfig,

    #[serde(default)]
    pub housekeeping: HousekeepingConfig,
}

/// Periods of the built-in housekeeping timers, in timeslices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HousekeepingConfig {
    #[serde(default = "default_heartbeat")]
    pub heartbeat: Timeslices,

    #[serde(default = "default_stats")]
    pub stats: Timeslices,

    #[serde(default = "default_sweep")]
    pub sweep: Timeslices,
}

// One timeslice.
const fn default_tick_interval_ms() -> u64 {
    100
}

fn default_log_filter() -> String {
    "info".to_string()
}

fn default_heartbeat() -> Timeslices {
    Timeslices::from_secs(30)
}

fn default_stats() -> Timeslices {
    Timeslices::from_secs(60)
}

fn default_sweep() -> Timeslices {
    Timeslices::from_secs(10)
}

impl Default for HousekeepingConfig {
    fn default() -> Self {
        Self {
            heartbeat: default_heartbeat(),
            stats: default_stats(),
            sweep: default_sweep(),
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            log_filter: default_log_filter(),
            timetracker: TimetrackerConfig::default(),
            housekeeping: HousekeepingConfig::default(),
        }
    }
}

impl DaemonConfig {
    /// Read and validate a TOML config file.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read, does not parse, or fails
    /// validation.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::config_read_failed(path, e.to_string()))?;
        let config = Self::parse(path, &raw)?;
        config.validate()?;
        Ok(config)
    }

    fn parse(path: &Path, raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| Error::toml_parse_failed(path, e.to_string()))
    }

    /// Load from `args.config` when given, else defaults; then apply CLI
    /// overrides and validate.
    ///
    /// # Errors
    ///
    /// Returns error if loading or validation fails.
    pub fn resolve(args: &Args) -> Result<Self> {
        let mut config = match &args.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply_overrides(args);
        config.validate()?;
        Ok(config)
    }

    /// CLI flags win over file values.
    pub fn apply_overrides(&mut self, args: &Args) {
        if let Some(ms) = args.tick_interval_ms {
            self.tick_interval_ms = ms;
        }
        if let Some(filter) = &args.log_filter {
            self.log_filter.clone_from(filter);
        }
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the tick interval or any housekeeping period is zero,
    /// or the timetracker section is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.tick_interval_ms == 0 {
            return Err(Error::invalid_config(
                "tick_interval_ms",
                "must be greater than zero",
            ));
        }

        let periods = [
            ("housekeeping.heartbeat", self.housekeeping.heartbeat),
            ("housekeeping.stats", self.housekeeping.stats),
            ("housekeeping.sweep", self.housekeeping.sweep),
        ];
        if let Some((field, _)) = periods.iter().find(|(_, period)| period.get() == 0) {
            return Err(Error::invalid_config(
                *field,
                "recurring period must be at least one timeslice",
            ));
        }

        self.timetracker
            .validate()
            .map_err(|e| Error::invalid_config("timetracker", e.to_string()))
    }

    #[must_use]
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}
