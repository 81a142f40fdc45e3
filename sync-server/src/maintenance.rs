//! Background maintenance for in-memory limiter state.

use crate::limits::RateLimits;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

/// Spawn a task that periodically evicts idle rate-limiter keys.
///
/// The task ends when `shutdown` fires.
pub fn spawn_maintenance_task(
    limits: RateLimits,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!(interval_secs = every.as_secs(), "maintenance task started");
        let mut timer = interval(every);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        timer.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = timer.tick() => {
                    let before = limits.tracked_keys();
                    limits.shrink();
                    tracing::debug!(
                        before,
                        after = limits.tracked_keys(),
                        "evicted idle rate limiter keys"
                    );
                }
            }
        }
        tracing::info!("maintenance task stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LimitsConfig;

    #[tokio::test]
    async fn maintenance_task_stops_on_shutdown() {
        let limits = RateLimits::new(&LimitsConfig::default());
        let (tx, rx) = watch::channel(false);
        let handle = spawn_maintenance_task(limits, Duration::from_millis(5), rx);

        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("task should stop on shutdown")
            .expect("task should not panic");
    }
}
