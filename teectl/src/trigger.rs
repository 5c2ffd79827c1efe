//! Built-in interval trigger for the run-once entry point.
//!
//! Deployments normally point an external timer (cron, cloud scheduler) at
//! `/run-reservation`; this loop is the self-contained stand-in for hosts
//! without one. Each tick performs exactly one claim-attempt-resolve
//! cycle, identical to the HTTP trigger.

use std::time::Duration;

use crate::AppState;

pub async fn run_trigger_loop(state: AppState, interval_seconds: u64) {
    tracing::info!(interval_seconds, "Starting background reservation trigger");

    let mut interval = tokio::time::interval(Duration::from_secs(interval_seconds.max(1)));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        interval.tick().await;

        match crate::run_and_notify(&state).await {
            Ok(results) if results.is_empty() => {
                tracing::debug!("Trigger tick: no claimable reservations");
            }
            Ok(results) => {
                for report in results {
                    tracing::info!(
                        key = %report.key,
                        status = %report.status,
                        retry_count = report.retry_count,
                        "Trigger tick processed a reservation"
                    );
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Trigger tick failed");
            }
        }
    }
}
