//! # tickd - Main Entry Point
//!
//! ## Startup Sequence
//!
//! 1. **Arguments** - parse CLI flags
//! 2. **Configuration** - load the TOML file, apply flag overrides, validate
//! 3. **Tracing** - `RUST_LOG` if set, else the configured filter
//! 4. **Timetracker** - build the registry and install housekeeping timers
//! 5. **Driver** - tick at the configured interval
//!
//! ## Shutdown
//!
//! Ctrl+C or the `--max-ticks` limit stops the driver. Housekeeping timers
//! are then cancelled and one final pass erases them.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![deny(clippy::expect_used)]

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use tickd::cli::Args;
use tickd::config::DaemonConfig;
use tickd::driver;
use tickd::housekeeping::Housekeeping;
use tickd::tickd_core::LoggedResultExt;
use tickd::timetracker::Timetracker;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = DaemonConfig::resolve(&args).context("Failed to load configuration")?;

    init_tracing(&config.log_filter);
    info!(
        tick_interval_ms = config.tick_interval_ms,
        max_timers = config.timetracker.max_timers,
        "tickd starting"
    );

    let tracker = Arc::new(Timetracker::new(config.timetracker.clone()));
    let housekeeping = Housekeeping::install(&tracker, &config.housekeeping)
        .context("Failed to install housekeeping timers")?;

    let stats = driver::run(
        Arc::clone(&tracker),
        config.tick_interval(),
        args.max_ticks,
        wait_for_shutdown(),
    )
    .await;

    info!("Cleaning up...");
    housekeeping.cancel(&tracker);
    let removed = tracker
        .tick()
        .map(|report| report.removed)
        .or_default_logged("final cleanup pass", 0);

    info!(
        passes = stats.passes,
        fired = stats.fired,
        failed_passes = stats.failed_passes,
        removed,
        remaining = tracker.len(),
        "tickd stopped gracefully"
    );
    Ok(())
}

/// Initialize tracing subscriber with environment filter.
fn init_tracing(fallback: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for shutdown signal (Ctrl+C).
async fn wait_for_shutdown() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, initiating graceful shutdown"),
        Err(err) => {
            error!("Failed to listen for shutdown signal: {}", err);
            // Without a signal handler only --max-ticks can stop the driver.
            std::future::pending::<()>().await;
        }
    }
}
