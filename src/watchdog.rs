use log::{info, trace};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::session::SessionTable;

/// Periodically reaps closed sessions and expires stale passive listeners.
pub fn start_watchdog(
    table: Arc<SessionTable>,
    sweep_interval: Duration,
    data_timeout: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(sweep_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let report = table.sweep(data_timeout).await;
            if report.reaped > 0 || report.timed_out > 0 {
                info!(
                    "Sweep: {} session(s) closed, {} data connection(s) timed out, {} client(s) connected",
                    report.reaped,
                    report.timed_out,
                    table.len()
                );
            } else {
                trace!("Sweep: {} client(s) connected", table.len());
            }
        }
    })
}
