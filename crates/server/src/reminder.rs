//! Background reminder loop.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use printshop_core::ReminderScheduler;

/// Runs one sweep immediately, then one per interval, until the server shuts
/// down. Sweep errors are logged and do not stop the loop.
pub fn spawn(scheduler: Arc<ReminderScheduler>, interval_secs: u64) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
        info!(event_name = "system.reminder.loop_started", interval_secs, "reminder loop started");

        loop {
            interval.tick().await;
            match scheduler.run_once(Utc::now()).await {
                Ok(run) => {
                    if run.scanned > 0 {
                        info!(
                            event_name = "system.reminder.sweep",
                            scanned = run.scanned,
                            reminded = run.reminded,
                            skipped = run.skipped,
                            "reminder sweep finished"
                        );
                    }
                }
                Err(error) => {
                    error!(event_name = "system.reminder.sweep_failed", %error, "reminder sweep failed");
                }
            }
        }
    })
}
