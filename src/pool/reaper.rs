//! Background idle-connection reaper.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time;

use crate::pool::ConnectionPool;

/// Periodically close expired and stale idle connections until shutdown.
pub fn spawn_reaper(
    pool: Arc<ConnectionPool>,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!(interval_secs = interval.as_secs_f64(), "Idle reaper starting");

        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let reaped = pool.reap_idle();
                    if reaped > 0 {
                        tracing::debug!(reaped, "Reaped idle backend connections");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Idle reaper received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    })
}
