//! Periodic reconciliation loop.
//!
//! Starts the tool, then ticks at a fixed interval, each tick sampling
//! `linphonecsh` through the [`Orchestrator`]. A tick that overruns the
//! interval delays the next one instead of bursting to catch up.
//!
//! # Shutdown
//!
//! Cancellation is checked between ticks. A tick already running finishes
//! (its tool invocations are bounded by their timeouts) before the task
//! returns.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, Instrument};

use crate::orchestrator::Orchestrator;

/// Spawns the monitor task.
///
/// # Arguments
///
/// * `orchestrator` - Shared with the bus server
/// * `poll_interval` - Time between two ticks
/// * `cancel_token` - Token for graceful shutdown
pub fn spawn_monitor_task(
    orchestrator: Arc<Orchestrator>,
    poll_interval: Duration,
    cancel_token: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(
        async move {
            tokio::select! {
                biased;

                _ = cancel_token.cancelled() => {
                    info!("Monitor cancelled during startup");
                    return;
                }

                _ = orchestrator.start_tool() => {}
            }

            let mut tick = interval(poll_interval);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; start_tool already sampled.
            tick.tick().await;

            info!(interval_ms = poll_interval.as_millis() as u64, "Monitor started");

            loop {
                tokio::select! {
                    biased;

                    _ = cancel_token.cancelled() => {
                        info!("Monitor shutting down");
                        break;
                    }

                    _ = tick.tick() => {
                        let report = orchestrator.poll_once().await;
                        if report.failed_samples > 0 {
                            debug!(failed = report.failed_samples, "Tick completed with failures");
                        }
                    }
                }
            }

            debug!("Monitor task completed");
        }
        .instrument(info_span!("monitor")),
    )
}
