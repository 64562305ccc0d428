use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::capture::screenshot::capture_region;
use crate::engine::orchestrator::RuleEngine;
use crate::engine::packet::RegionData;
use crate::errors::VigilError;
use crate::profile::RegionRect;

/// Handle to the single monitoring worker. Dropping it does not stop the
/// worker; call `shutdown`.
pub struct MonitorHandle {
    stop_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
    grace: Duration,
}

impl MonitorHandle {
    /// Signal the worker to stop and wait for it, bounded by a grace
    /// period. An in-flight cycle always completes; if it takes longer than
    /// the grace period the caller is warned that the worker may still be
    /// finishing.
    pub async fn shutdown(self) {
        let _ = self.stop_tx.send(true);
        match tokio::time::timeout(self.grace, self.join).await {
            Ok(_) => tracing::info!("monitoring worker stopped"),
            Err(_) => {
                tracing::warn!(
                    grace_s = self.grace.as_secs_f64(),
                    "monitoring worker did not stop in time, may still be finishing"
                );
            }
        }
    }
}

/// Start the monitoring loop on a dedicated worker task.
pub fn spawn(engine: RuleEngine, regions: Vec<RegionRect>, interval: Duration) -> MonitorHandle {
    let (stop_tx, stop_rx) = watch::channel(false);
    let grace = interval + Duration::from_secs(5);
    let join = tokio::spawn(run_loop(engine, regions, interval, stop_rx));
    MonitorHandle {
        stop_tx,
        join,
        grace,
    }
}

/// One strictly sequential cycle per interval: capture every region, run the
/// required analyses, evaluate all rules in order, then sleep out the rest
/// of the interval (interruptible). No two cycles overlap.
async fn run_loop(
    mut engine: RuleEngine,
    regions: Vec<RegionRect>,
    interval: Duration,
    mut stop_rx: watch::Receiver<bool>,
) {
    tracing::info!(
        regions = regions.len(),
        interval_s = interval.as_secs_f64(),
        "monitoring loop started"
    );
    let mut cycle: u64 = 0;

    loop {
        if *stop_rx.borrow() {
            break;
        }
        cycle += 1;
        let started = Instant::now();
        tracing::debug!(cycle, "cycle starting");

        let mut data: HashMap<String, RegionData> = HashMap::new();
        for region in &regions {
            let image = capture_region(region);
            let packet = engine.build_packet(&region.name, image);
            data.insert(region.name.clone(), packet);
        }

        match engine.evaluate_cycle(&data).await {
            Ok(dispatched) => {
                tracing::debug!(cycle, dispatched, elapsed_ms = started.elapsed().as_millis() as u64, "cycle finished");
            }
            Err(e @ VigilError::FailSafe(_)) => {
                tracing::error!(cycle, error = %e, "fail-safe abort, monitoring loop terminating");
                break;
            }
            Err(e) => {
                tracing::error!(cycle, error = %e, "unexpected engine error, monitoring loop terminating");
                break;
            }
        }

        let elapsed = started.elapsed();
        if elapsed >= interval {
            tracing::warn!(
                cycle,
                elapsed_s = elapsed.as_secs_f64(),
                interval_s = interval.as_secs_f64(),
                "cycle over-ran the interval, starting next cycle immediately"
            );
            continue;
        }

        tokio::select! {
            _ = tokio::time::sleep(interval - elapsed) => {}
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
            }
        }
    }

    tracing::info!(cycles = cycle, "monitoring loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::evaluators::test_support::FixedOcr;
    use crate::engine::orchestrator::EngineDeps;
    use crate::executor::actions::ActionExecutor;
    use crate::executor::input::test_support::RecordingDriver;
    use crate::profile::{Profile, ProfileSettings};
    use std::sync::Arc;

    #[tokio::test]
    async fn worker_stops_on_shutdown() {
        let profile = Profile {
            regions: Vec::new(),
            rules: Vec::new(),
            settings: ProfileSettings::default(),
            base_dir: std::env::temp_dir(),
        };
        let (driver, _) = RecordingDriver::new();
        let engine = RuleEngine::new(
            &profile,
            EngineDeps {
                ocr: Arc::new(FixedOcr::failing()),
                vision: None,
                tasks: None,
            },
            ActionExecutor::new(Box::new(driver), 0.0),
        );

        let handle = spawn(engine, Vec::new(), Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(60)).await;
        handle.shutdown().await;
    }
}
