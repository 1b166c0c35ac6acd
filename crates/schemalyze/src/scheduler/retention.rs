use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::store::JobStore;

/// Periodically drops finished jobs older than `retention`.
///
/// Runs until `shutdown` is cancelled.
pub fn spawn_retention_sweeper(
    store: Arc<dyn JobStore>,
    retention: Duration,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let retention = match chrono::Duration::from_std(retention) {
            Ok(d) => d,
            Err(e) => {
                log::error!("Invalid retention period {:?}: {}", retention, e);
                return;
            }
        };

        let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let Some(cutoff) = Utc::now().checked_sub_signed(retention) else {
                        log::warn!("Retention period {} reaches before the earliest date, skipping sweep", retention);
                        continue;
                    };
                    let removed = store.remove_finished_before(cutoff);
                    if removed > 0 {
                        log::info!("Evicted {} finished jobs", removed);
                    }
                }
            }
        }

        log::debug!("Retention sweeper stopped");
    })
}
