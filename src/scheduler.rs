use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::reporter;
use crate::types::{ClientKind, ClientSummary, TickEvent};

/// A client driven on a fixed period by [`spawn`].
#[async_trait]
pub trait PeriodicTask: Send {
    fn kind(&self) -> ClientKind;

    fn period(&self) -> Duration;

    /// One execution of the loop body. Errors are logged by the runner.
    async fn tick(&mut self) -> Result<TickEvent>;

    fn summary(&self) -> ClientSummary;
}

/// Run `task` on a fixed-rate timer until `shutdown` flips to `true`.
///
/// The first tick fires immediately. Ticks never overlap: a tick that
/// overruns its period swallows the missed ones. An in-flight tick is
/// always finished before the task returns its summary.
pub fn spawn<T>(mut task: T, mut shutdown: watch::Receiver<bool>) -> JoinHandle<ClientSummary>
where
    T: PeriodicTask + 'static,
{
    tokio::spawn(async move {
        let prefix = task.kind().prefix();
        let period = task.period();
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut tick_errors = 0u64;

        info!("{prefix}: client started (period {}s)", period.as_secs());

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                changed = shutdown.changed() => {
                    // A dropped sender also means stop.
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    match task.tick().await {
                        Ok(event) => reporter::report_event(&event),
                        Err(e) => {
                            tick_errors += 1;
                            warn!("{prefix}: tick error: {e:#}");
                        }
                    }
                }
            }
        }

        info!("{prefix}: client stopped");
        let mut summary = task.summary();
        summary.tick_errors += tick_errors;
        summary
    })
}
