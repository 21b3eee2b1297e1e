//! Background reaping sweep

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, trace};

use super::supervisor::Supervisor;

/// Spawn a task that calls [`Supervisor::reap`] every `interval`.
///
/// Abort the returned handle to stop sweeping.
pub fn spawn_reaper(supervisor: Arc<Supervisor>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let supervisor = Arc::clone(&supervisor);
            match tokio::task::spawn_blocking(move || supervisor.reap()).await {
                Ok(Ok(0)) => trace!("Reap sweep found nothing"),
                Ok(Ok(n)) => trace!("Reap sweep marked {} workloads dead", n),
                Ok(Err(e)) => error!("Reap sweep failed: {}", e),
                Err(e) => error!("Reap sweep task failed: {}", e),
            }
        }
    })
}
