//! Fixed-cadence driver that runs dispatch passes from a tokio runtime.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tickd_core::{Error, LoggedResultExt};
use timetracker::{TickReport, Timetracker};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info};

/// Totals over one driver run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverStats {
    pub passes: u64,
    pub fired: u64,
    pub failed_passes: u64,
}

impl DriverStats {
    fn record(&mut self, report: Option<TickReport>) {
        self.passes = self.passes.saturating_add(1);
        match report {
            Some(report) => {
                let fired = u64::try_from(report.fired).unwrap_or(u64::MAX);
                self.fired = self.fired.saturating_add(fired);
            }
            None => self.failed_passes = self.failed_passes.saturating_add(1),
        }
    }
}

/// Run a pass on a blocking thread so slow actions never stall the runtime.
async fn pass(tracker: &Arc<Timetracker>) -> Option<TickReport> {
    let tracker = Arc::clone(tracker);
    tokio::task::spawn_blocking(move || tracker.tick())
        .await
        .map_err(|e| Error::scheduler(format!("dispatch task failed: {e}")))
        .ok_logged("dispatch pass")?
        .ok_logged("dispatch pass")
}

/// Tick `tracker` every `period` until `shutdown` resolves or `max_ticks`
/// passes have run.
///
/// Missed intervals are not replayed in a burst; the next pass is delayed
/// instead. Timer trigger times are absolute, so a late pass still fires
/// everything that became due.
pub async fn run<F>(
    tracker: Arc<Timetracker>,
    period: Duration,
    max_ticks: Option<u64>,
    shutdown: F,
) -> DriverStats
where
    F: Future<Output = ()>,
{
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    let mut stats = DriverStats::default();
    info!(
        period_ms = u64::try_from(period.as_millis()).unwrap_or(u64::MAX),
        ?max_ticks,
        "Driver started"
    );

    loop {
        if max_ticks.is_some_and(|limit| stats.passes >= limit) {
            info!(passes = stats.passes, "Tick limit reached");
            break;
        }

        tokio::select! {
            () = &mut shutdown => {
                info!(passes = stats.passes, "Driver stopping on shutdown signal");
                break;
            }
            _ = ticker.tick() => {
                let report = pass(&tracker).await;
                if let Some(report) = &report {
                    if report.fired > 0 {
                        debug!(fired = report.fired, removed = report.removed, "Pass fired timers");
                    }
                }
                stats.record(report);
            }
        }
    }

    stats
}
