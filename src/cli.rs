//! CLI definitions using clap.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use std::path::PathBuf;

use clap::Parser;

/// tickd - timeslice scheduler daemon
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "tickd")]
#[command(version)]
#[command(about = "Drives a timer registry at a fixed timeslice cadence")]
#[command(
    long_about = "tickd owns a timer registry, installs its housekeeping timers, and runs a dispatch pass every tick interval until interrupted."
)]
pub struct Args {
    /// TOML config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Milliseconds between dispatch passes (overrides config)
    #[arg(short, long)]
    pub tick_interval_ms: Option<u64>,

    /// Tracing filter used when RUST_LOG is unset (overrides config)
    #[arg(short, long)]
    pub log_filter: Option<String>,

    /// Stop after this many passes
    #[arg(long)]
    pub max_ticks: Option<u64>,
}
